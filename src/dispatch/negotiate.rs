//! Header-driven content negotiation.
//!
//! # Responsibilities
//! - Select the route's dispatcher(s) for the request method
//! - Match the `Accept` header against the route's `accept.*` entries
//! - Match the `Content-Type` header against `content-type.*` entries
//! - Splice the negotiated dispatchers in immediately after the selector
//!
//! # Design Decisions
//! - Matching tolerates wildcards both ways: the supported type may be a
//!   prefix of the client preference or vice versa (cut at `*`)
//! - Selectors iterate route entries in definition order; the first match
//!   in client-preference order wins
//! - Failures carry the hint headers clients need: `Allow` on 405,
//!   `Accept` on 406/415

use async_trait::async_trait;
use http::header::{HeaderValue, ACCEPT, ALLOW, CONTENT_TYPE};

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, ErrorKind};
use crate::http::request::Request;
use crate::session::Session;

const METHOD_PREFIX: &str = "method.";
const ACCEPT_PREFIX: &str = "accept.";
const CONTENT_TYPE_PREFIX: &str = "content-type.";

/// Wildcard-tolerant media type match.
///
/// `supported` matches `client` when one is a prefix of the other, with
/// the supported side cut at its `*`.
fn media_matches(supported: &str, client: &str) -> bool {
    let supported_prefix = supported.split('*').next().unwrap_or("");
    supported.starts_with(client) || client.starts_with(supported_prefix)
}

/// Normalize one media type token: trim, lowercase, cut at `;` and `*`.
fn normalize_media(token: &str) -> String {
    let token = token.trim().to_lowercase();
    let token = token.split(';').next().unwrap_or("");
    token.split('*').next().unwrap_or("").to_string()
}

/// Selects the dispatcher(s) registered for the request method.
///
/// Looks up `method.<verb>` first, then `method.*`. When neither exists
/// the request fails with 405 and an `Allow` header listing every defined
/// method, upper-case and sorted.
pub struct MethodSelect;

#[async_trait]
impl Dispatcher for MethodSelect {
    async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        let route = session.route().ok_or_else(no_route_bound)?;

        let verb = request.method().as_str().to_lowercase();
        let selected = route
            .select(&format!("{}{}", METHOD_PREFIX, verb))
            .or_else(|| route.select("method.*"));

        match selected {
            Some(dispatchers) => {
                session.chain.splice_after_cursor(dispatchers);
                Ok(())
            }
            None => {
                let mut methods: Vec<String> = route
                    .entries_with_prefix(METHOD_PREFIX)
                    .map(|(verb, _)| verb.to_uppercase())
                    .filter(|verb| verb != "*")
                    .collect();
                methods.sort();

                Err(DispatchError::kind(
                    ErrorKind::NoRoute,
                    format!("no dispatcher for method {}", request.method()),
                )
                .with_status(405)
                .with_header(ALLOW, header_value(&methods.join(", "))))
            }
        }
    }
}

/// Matches the request `Accept` header against the route's `accept.*`
/// entries and splices the first hit, in client-preference order.
pub struct AcceptSelect;

#[async_trait]
impl Dispatcher for AcceptSelect {
    async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        let route = session.route().ok_or_else(no_route_bound)?;

        let header = request
            .headers()
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                DispatchError::kind(ErrorKind::HeaderMissing, "accept header missing")
                    .with_status(406)
            })?;

        let preferences: Vec<String> = header.split(',').map(normalize_media).collect();

        for preference in &preferences {
            for (supported, dispatchers) in route.entries_with_prefix(ACCEPT_PREFIX) {
                if media_matches(supported, preference) {
                    session.chain.splice_after_cursor(dispatchers);
                    return Ok(());
                }
            }
        }

        let supported: Vec<&str> = route
            .entries_with_prefix(ACCEPT_PREFIX)
            .map(|(media, _)| media)
            .collect();

        Err(DispatchError::kind(
            ErrorKind::NoRoute,
            format!("no dispatcher accepts '{}'", header),
        )
        .with_status(406)
        .with_header(ACCEPT, header_value(&supported.join(", "))))
    }
}

/// Matches the request `Content-Type` header against the route's
/// `content-type.*` entries and splices the hit.
pub struct ContentTypeSelect;

#[async_trait]
impl Dispatcher for ContentTypeSelect {
    async fn dispatch(
        &self,
        request: &mut Request,
        session: &mut Session,
    ) -> Result<(), DispatchError> {
        let route = session.route().ok_or_else(no_route_bound)?;

        let header = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                DispatchError::kind(ErrorKind::HeaderMissing, "content-type header missing")
                    .with_status(415)
            })?;

        let media = normalize_media(header);

        for (supported, dispatchers) in route.entries_with_prefix(CONTENT_TYPE_PREFIX) {
            if media_matches(supported, &media) {
                session.chain.splice_after_cursor(dispatchers);
                return Ok(());
            }
        }

        let supported: Vec<&str> = route
            .entries_with_prefix(CONTENT_TYPE_PREFIX)
            .map(|(media, _)| media)
            .collect();

        Err(DispatchError::kind(
            ErrorKind::NoRoute,
            format!("no dispatcher consumes '{}'", header),
        )
        .with_status(415)
        .with_header(ACCEPT, header_value(&supported.join(", "))))
    }
}

fn no_route_bound() -> DispatchError {
    DispatchError::kind(ErrorKind::NoRoute, "no route bound to the session").with_status(404)
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_match_tolerates_wildcards() {
        // Exact and prefix relations.
        assert!(media_matches("application/json", "application/json"));
        assert!(media_matches("application/json", "application/"));
        assert!(media_matches("application/json", ""));
        // Supported wildcard cut at '*'.
        assert!(media_matches("application/*", "application/json"));
        assert!(media_matches("*", "text/html"));
        // Disjoint types never match.
        assert!(!media_matches("application/json", "text/html"));
    }

    #[test]
    fn normalize_cuts_parameters_and_wildcards() {
        assert_eq!(normalize_media(" Text/HTML;q=0.9 "), "text/html");
        assert_eq!(normalize_media("text/*"), "text/");
        assert_eq!(normalize_media("*/*"), "");
        assert_eq!(normalize_media("application/json"), "application/json");
    }
}
