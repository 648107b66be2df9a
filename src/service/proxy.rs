// Copyright (c) 2026 Routelens
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! PoP proxy agent.
//!
//! Three endpoints, each taking `q`, `ts` and `sig` query parameters:
//! `/bird` streams restricted BIRD output, `/traceroute` returns plain
//! text, `/tracerouteh` returns an HTML rendering. Empty or unparsable
//! parameters are a 400; a failed signature is a 403; handler panics are
//! recovered into a 500.

use crate::core::bird::BirdBackend;
use crate::core::signing::{RequestVerifier, SignedRequest};
use crate::monitoring::metrics::Metrics;
use crate::net::traceroute::TracerouteRunner;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared proxy handler state.
pub struct ProxyState {
    /// Signature verifier (public key is mandatory on the proxy side).
    pub verifier: RequestVerifier,
    /// BIRD dispatch capability.
    pub bird: Arc<dyn BirdBackend>,
    /// Traceroute runner, absent when autodetection failed.
    pub traceroute: Option<Arc<dyn TracerouteRunner>>,
    /// Metrics container.
    pub metrics: Arc<Metrics>,
}

/// Build the proxy router.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/bird", get(bird_handler))
        .route("/traceroute", get(traceroute_handler))
        .route("/tracerouteh", get(traceroute_html_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extract and verify `q`/`ts`/`sig`. Errors are ready-made responses.
fn security_check(
    state: &ProxyState,
    params: &HashMap<String, String>,
) -> Result<String, Response> {
    state.metrics.requests_total.inc();

    let q = params.get("q").map(String::as_str).unwrap_or_default();
    let ts = params.get("ts").map(String::as_str).unwrap_or_default();
    let sig = params.get("sig").map(String::as_str).unwrap_or_default();
    if q.is_empty() || ts.is_empty() || sig.is_empty() {
        state.metrics.bad_request_total.inc();
        return Err((StatusCode::BAD_REQUEST, "Invalid parameters").into_response());
    }
    let Ok(ts) = ts.parse::<i64>() else {
        state.metrics.bad_request_total.inc();
        return Err((StatusCode::BAD_REQUEST, "Invalid parameters").into_response());
    };

    let req = SignedRequest {
        query: q.to_string(),
        ts,
        signature: sig.to_string(),
    };
    if state.verifier.verify(&req).is_err() {
        state.metrics.auth_failures_total.inc();
        return Err((StatusCode::FORBIDDEN, "Invalid authentication").into_response());
    }
    Ok(q.to_string())
}

/// `AsyncWrite` adapter pushing chunks into an unbounded channel; the
/// receiving side is the HTTP response body stream.
struct ChannelWriter {
    tx: mpsc::UnboundedSender<Result<Bytes, std::io::Error>>,
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        // A closed receiver means the client went away; swallow the rest.
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(buf)));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Poll::Ready(Ok(()))
    }
}

async fn bird_handler(
    State(state): State<Arc<ProxyState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = match security_check(&state, &params) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    state.metrics.bird_queries_total.inc();

    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, std::io::Error>>();
    let bird = Arc::clone(&state.bird);
    tokio::spawn(async move {
        let mut writer = ChannelWriter { tx };
        if let Err(e) = bird.call_restricted(&q, &mut writer).await {
            error!(error = %e, "bird call failed");
            // The output stream doubles as the error channel.
            let _ = writer.tx.send(Ok(Bytes::from(e.to_string())));
        }
    });

    Body::from_stream(UnboundedReceiverStream::new(rx)).into_response()
}

async fn traceroute_handler(
    State(state): State<Arc<ProxyState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = match security_check(&state, &params) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    state.metrics.traceroute_total.inc();

    let Some(runner) = state.traceroute.as_ref() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "traceroute binary not configured")
            .into_response();
    };
    match runner.text(&q).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!(error = %e, "traceroute failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn traceroute_html_handler(
    State(state): State<Arc<ProxyState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = match security_check(&state, &params) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    state.metrics.traceroute_total.inc();

    let Some(runner) = state.traceroute.as_ref() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "traceroute binary not configured")
            .into_response();
    };
    match runner.html(&q).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "traceroute html failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn metrics_handler(State(state): State<Arc<ProxyState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bird::{BirdError, BirdSink};
    use crate::core::signing::{generate_keypair, RequestSigner};
    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;

    struct EchoBird;

    #[async_trait]
    impl BirdBackend for EchoBird {
        async fn call_restricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
            out.write_all(format!("echo: {query}\n").as_bytes())
                .await
                .map_err(|e| BirdError::Io(e.to_string()))
        }

        async fn call_unrestricted(&self, query: &str, out: &mut BirdSink) -> Result<(), BirdError> {
            self.call_restricted(query, out).await
        }
    }

    fn state_with_keys() -> (Arc<ProxyState>, RequestSigner) {
        let (secret, public) = generate_keypair().unwrap();
        let state = Arc::new(ProxyState {
            verifier: RequestVerifier::new(&public),
            bird: Arc::new(EchoBird),
            traceroute: None,
            metrics: Arc::new(Metrics::new().unwrap()),
        });
        (state, RequestSigner::new(&secret))
    }

    fn signed_params(signer: &RequestSigner, q: &str) -> HashMap<String, String> {
        let req = signer.sign(q).unwrap();
        HashMap::from([
            ("q".to_string(), req.query),
            ("ts".to_string(), req.ts.to_string()),
            ("sig".to_string(), req.signature),
        ])
    }

    #[test]
    fn missing_params_are_bad_requests() {
        let (state, _) = state_with_keys();
        let params = HashMap::from([("q".to_string(), "show protocols".to_string())]);
        let err = security_check(&state, &params).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unparsable_ts_is_a_bad_request() {
        let (state, signer) = state_with_keys();
        let mut params = signed_params(&signer, "show protocols");
        params.insert("ts".to_string(), "yesterday".to_string());
        let err = security_check(&state, &params).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_signature_is_forbidden() {
        let (state, signer) = state_with_keys();
        let mut params = signed_params(&signer, "show protocols");
        params.insert("q".to_string(), "show route".to_string());
        let err = security_check(&state, &params).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.metrics.auth_failures_total.get(), 1);
    }

    #[test]
    fn valid_signature_passes() {
        let (state, signer) = state_with_keys();
        let params = signed_params(&signer, "show protocols");
        assert_eq!(security_check(&state, &params).unwrap(), "show protocols");
    }
}
