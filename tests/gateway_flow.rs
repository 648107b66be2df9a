#![forbid(unsafe_code)]

//! Full signed-request loop: the frontend gateway signs a query, the proxy
//! verifies it and streams BIRD output back.

use async_trait::async_trait;
use routelens::core::bird::{BirdBackend, BirdError, BirdSink};
use routelens::core::signing::{generate_keypair, RequestSigner, RequestVerifier};
use routelens::monitoring::metrics::Metrics;
use routelens::service::frontend::{is_bird_syntax_error, FrontendGateway};
use routelens::service::proxy::{router, ProxyState};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

struct ScriptedBird;

#[async_trait]
impl BirdBackend for ScriptedBird {
    async fn call_restricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
        let body = match query {
            "show protocols" => {
                "Name       Proto      Table      State  Since         Info\n\
                 upstream1  BGP        ---        up     2024-11-02    Established\n"
            }
            "show route for banana all" => "syntax error, unexpected CF_SYM_UNDEFINED\n",
            _ => "0 routes\n",
        };
        out.write_all(body.as_bytes())
            .await
            .map_err(|e| BirdError::Io(e.to_string()))
    }

    async fn call_unrestricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
        self.call_restricted(query, out).await
    }
}

async fn serve_proxy() -> (u16, RequestSigner) {
    let (secret, public) = generate_keypair().expect("keypair");
    let state = Arc::new(ProxyState {
        verifier: RequestVerifier::new(&public),
        bird: Arc::new(ScriptedBird),
        traceroute: None,
        metrics: Arc::new(Metrics::new().expect("metrics")),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });
    (port, RequestSigner::new(&secret))
}

#[tokio::test]
async fn signed_round_trip_to_the_proxy() {
    let (port, signer) = serve_proxy().await;
    // The "PoP id" is the literal proxy host here: empty suffix, fixture port.
    let gateway = FrontendGateway::new(Some(signer), "", port, 5).expect("gateway");

    let body = gateway
        .bird_request("127.0.0.1", "show protocols")
        .await
        .expect("bird request");
    assert!(body.contains("upstream1"), "{body}");
}

#[tokio::test]
async fn syntax_errors_come_back_as_200_bodies() {
    let (port, signer) = serve_proxy().await;
    let gateway = FrontendGateway::new(Some(signer), "", port, 5).expect("gateway");

    let body = gateway
        .bird_request("127.0.0.1", "show route for banana all")
        .await
        .expect("bird request");
    // The proxy answered 200; the probe reclassifies the body.
    assert!(is_bird_syntax_error(&body));
}

#[tokio::test]
async fn wrong_key_surfaces_the_auth_body() {
    let (port, _) = serve_proxy().await;
    // A signer whose key the proxy does not trust.
    let (other_secret, _) = generate_keypair().expect("keypair");
    let gateway = FrontendGateway::new(
        Some(RequestSigner::new(&other_secret)),
        "",
        port,
        5,
    )
    .expect("gateway");

    // The gateway returns the body regardless of status; for a rejected
    // signature that body is the proxy's auth error text.
    let body = gateway
        .bird_request("127.0.0.1", "show protocols")
        .await
        .expect("request completes");
    assert_eq!(body, "Invalid authentication");
}
