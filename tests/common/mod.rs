//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{rustls, TlsConnector};

use switchboard::dispatch::FnDispatcher;
use switchboard::{Dispatcher, Route, RouteTable, Server, ServerConfig};

/// A server config bound to an ephemeral loopback port with logging muted.
pub fn muted_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.log.mute = true;
    config.server.bind_address = "127.0.0.1:0".into();
    config
}

/// Bootstrap and listen with the default test config.
pub async fn serve(routes: RouteTable) -> (Server, SocketAddr) {
    serve_with(muted_config(), routes).await
}

pub async fn serve_with(config: ServerConfig, routes: RouteTable) -> (Server, SocketAddr) {
    let server = Server::bootstrap(config, routes).expect("bootstrap");
    let addr = server.listen(None).await.expect("listen");
    (server, addr)
}

/// A dispatcher that merges `{ <name>: true }` into the view body.
pub fn marker(name: &'static str) -> Arc<dyn Dispatcher> {
    Arc::new(FnDispatcher::new(move |_request, session| {
        session.view.merge_body(serde_json::json!({ name: true }));
        Ok(())
    }))
}

/// The route table used by the basic-dispatch scenarios.
pub fn basic_routes() -> RouteTable {
    let mut routes = RouteTable::new();
    routes.define("/test/foo", Route::new().on("method.*", marker("foo")));
    routes.define("/test/bar", Route::new().on("method.*", marker("bar")));
    routes
}

/// A parsed HTTP response, protocol-agnostic.
#[derive(Debug)]
pub struct ParsedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parse a raw HTTP/1.1 response, de-chunking the body when necessary.
pub fn parse_h1_response(raw: &[u8]) -> ParsedResponse {
    let split = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("response head terminator");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let mut body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().expect("status line");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse()
        .expect("numeric status");

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let chunked = headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked")
    });
    if chunked {
        body = dechunk(&body);
    }

    ParsedResponse {
        status,
        headers,
        body,
    }
}

fn dechunk(mut body: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    loop {
        let Some(line_end) = body.windows(2).position(|window| window == b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&body[..line_end]);
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        decoded.extend_from_slice(&body[start..start + size]);
        body = &body[start + size + 2..];
    }
    decoded
}

fn build_h1_request(
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Vec<u8> {
    let mut raw = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
    for (name, value) in headers {
        raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    let has_connection = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("connection"));
    if !has_connection {
        raw.push_str("Connection: close\r\n");
    }
    if !body.is_empty() {
        raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    raw.push_str("\r\n");

    let mut bytes = raw.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// One-shot HTTP/1.1 request over any byte stream (TCP or TLS), reading
/// the response until the peer closes.
pub async fn h1_over<S>(
    mut stream: S,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> ParsedResponse
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&build_h1_request(method, path, headers, body))
        .await
        .expect("write request");

    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;
    parse_h1_response(&raw)
}

pub async fn h1_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> ParsedResponse {
    let stream = TcpStream::connect(addr).await.expect("connect");
    h1_over(stream, method, path, headers, body).await
}

pub async fn h1_get(addr: SocketAddr, path: &str) -> ParsedResponse {
    h1_request(addr, "GET", path, &[], b"").await
}

/// One request/response exchange on a persistent socket, framed by
/// Content-Length so the connection stays open for the next exchange.
pub async fn h1_exchange(
    stream: &mut TcpStream,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> ParsedResponse {
    stream
        .write_all(&build_h1_request(method, path, headers, b""))
        .await
        .expect("write request");

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.expect("read response");
        assert!(n > 0, "connection closed mid-response");
        raw.extend_from_slice(&buf[..n]);

        let Some(split) = raw.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&raw[..split]).into_owned();
        let content_length = head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if raw.len() >= split + 4 + content_length {
            return parse_h1_response(&raw[..split + 4 + content_length]);
        }
    }
}

/// One-shot HTTP/2 request over any byte stream (TCP or TLS).
pub async fn h2_over<S>(
    io: S,
    scheme: &str,
    authority: &str,
    method: &str,
    path: &str,
) -> ParsedResponse
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client, connection) = h2::client::handshake(io).await.expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let mut client = client.ready().await.expect("h2 client ready");
    let request = http::Request::builder()
        .method(method)
        .uri(format!("{}://{}{}", scheme, authority, path))
        .body(())
        .expect("build request");

    let (response, _) = client.send_request(request, true).expect("send request");
    let response = response.await.expect("response head");

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let mut body = response.into_body();
    let mut data = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.expect("body chunk");
        let _ = body.flow_control().release_capacity(chunk.len());
        data.extend_from_slice(&chunk);
    }

    ParsedResponse {
        status,
        headers,
        body: data,
    }
}

pub async fn h2_request(addr: SocketAddr, method: &str, path: &str) -> ParsedResponse {
    let tcp = TcpStream::connect(addr).await.expect("connect");
    h2_over(tcp, "http", &addr.to_string(), method, path).await
}

pub async fn h2_get(addr: SocketAddr, path: &str) -> ParsedResponse {
    h2_request(addr, "GET", path).await
}

/// Certificate key algorithms exercised by the TLS scenarios.
#[derive(Debug, Clone, Copy)]
pub enum CertAlg {
    EcdsaP256,
    EcdsaP384,
    Ed25519,
}

/// A self-signed certificate written to disk for the server config.
pub struct TestCert {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub cert_pem: String,
}

static CERT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mint a self-signed localhost certificate with the given key algorithm.
pub fn make_cert(alg: CertAlg) -> TestCert {
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};

    let key_pair = match alg {
        CertAlg::EcdsaP256 => KeyPair::generate().expect("generate key"),
        CertAlg::EcdsaP384 => {
            KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).expect("generate key")
        }
        CertAlg::Ed25519 => KeyPair::generate_for(&rcgen::PKCS_ED25519).expect("generate key"),
    };

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "localhost");
    params.distinguished_name = dn;
    params
        .subject_alt_names
        .push(SanType::DnsName("localhost".try_into().expect("dns name")));

    let cert = params.self_signed(&key_pair).expect("self-sign");
    let cert_pem = cert.pem();
    let key_pem = key_pair.serialize_pem();

    let seq = CERT_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir();
    let cert_path = dir.join(format!(
        "switchboard-test-{}-{}-{:?}.cert.pem",
        std::process::id(),
        seq,
        alg
    ));
    let key_path = dir.join(format!(
        "switchboard-test-{}-{}-{:?}.key.pem",
        std::process::id(),
        seq,
        alg
    ));
    std::fs::write(&cert_path, &cert_pem).expect("write cert");
    std::fs::write(&key_path, key_pem).expect("write key");

    TestCert {
        cert_path,
        key_path,
        cert_pem,
    }
}

/// A TLS client stream trusting exactly the given self-signed certificate.
pub async fn tls_connect(addr: SocketAddr, cert_pem: &str) -> tokio_rustls::client::TlsStream<TcpStream> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut cert_pem.as_bytes()) {
        roots.add(cert.expect("parse cert")).expect("trust cert");
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect(addr).await.expect("connect");
    connector
        .connect(ServerName::try_from("localhost").expect("server name"), tcp)
        .await
        .expect("TLS handshake")
}
