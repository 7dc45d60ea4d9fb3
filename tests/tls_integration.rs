//! Mixed-protocol serving over TLS with mixed certificate algorithms.

mod common;

use serde_json::json;

use common::{
    basic_routes, h1_over, h2_over, make_cert, muted_config, serve_with, tls_connect, CertAlg,
};

async fn round_trip_with(alg: CertAlg) {
    let cert = make_cert(alg);

    let mut config = muted_config();
    config.server.key = Some(cert.key_path.clone());
    config.server.cert = Some(cert.cert_path.clone());
    let (server, addr) = serve_with(config, basic_routes()).await;

    // Same route table, both protocols, one TLS port.
    let stream = tls_connect(addr, &cert.cert_pem).await;
    let over_h1 = h1_over(stream, "GET", "/test/foo", &[], b"").await;

    let stream = tls_connect(addr, &cert.cert_pem).await;
    let over_h2 = h2_over(stream, "https", "localhost", "GET", "/test/foo").await;

    assert_eq!(over_h1.status, 200);
    assert_eq!(over_h2.status, 200);
    assert_eq!(over_h1.json(), json!({ "foo": true }));
    assert_eq!(over_h1.json(), over_h2.json());

    server.close().await.unwrap();
}

#[tokio::test]
async fn serves_both_protocols_with_an_ecdsa_p256_certificate() {
    round_trip_with(CertAlg::EcdsaP256).await;
}

#[tokio::test]
async fn serves_both_protocols_with_an_ecdsa_p384_certificate() {
    round_trip_with(CertAlg::EcdsaP384).await;
}

#[tokio::test]
async fn serves_both_protocols_with_an_ed25519_certificate() {
    round_trip_with(CertAlg::Ed25519).await;
}

#[tokio::test]
async fn honours_the_configured_version_floor() {
    let cert = make_cert(CertAlg::EcdsaP256);

    let mut config = muted_config();
    config.server.key = Some(cert.key_path.clone());
    config.server.cert = Some(cert.cert_path.clone());
    config.server.min_version = Some("TLSv1.3".into());
    let (server, addr) = serve_with(config, basic_routes()).await;

    let stream = tls_connect(addr, &cert.cert_pem).await;
    let response = h1_over(stream, "GET", "/test/foo", &[], b"").await;
    assert_eq!(response.status, 200);

    server.close().await.unwrap();
}
