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

//! Frontend gateway.
//!
//! Signs user queries, fans them out to the PoP proxies, and renders the
//! annotated results. BIRD commands are built by literal interpolation;
//! the validators in [`crate::core::validate`] are the only defence, so
//! every handler validates before building a command.

use crate::asn::lookup::{parse_asn, AsnLookup};
use crate::asn::fallback::AsnResolver;
use crate::core::signing::{RequestSigner, SigningError};
use crate::core::summary::SummaryParser;
use crate::core::validate;
use crate::monitoring::metrics::Metrics;
use crate::net::whois::WhoisClient;
use crate::registry::communities::CommunityRegistry;
use crate::registry::pops::PopRegistry;
use crate::service::format::{escape_html, FormatContext, OutputFormatter};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// BIRD's parser rejects an undefined symbol with this message; the proxy
/// still answers 200, so the body is probed for it and the request is
/// reclassified as bad input.
const BIRD_SYNTAX_ERROR: &str = "syntax error, unexpected CF_SYM_UNDEFINED";

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The frontend has no private key and cannot sign requests.
    #[error("no private key loaded")]
    NoPrivateKey,
    /// Signing failed.
    #[error("sign request: {0}")]
    Sign(#[from] SigningError),
    /// The proxy could not be reached.
    #[error("proxy request: {0}")]
    Fetch(String),
}

/// Signs and dispatches requests to PoP proxies.
pub struct FrontendGateway {
    signer: Option<RequestSigner>,
    proxy_suffix: String,
    proxy_port: u16,
    timeout: Duration,
    http: reqwest::Client,
}

impl FrontendGateway {
    /// Build the gateway. `signer` may be absent; requests then fail with
    /// [`GatewayError::NoPrivateKey`] instead of preventing startup.
    pub fn new(
        signer: Option<RequestSigner>,
        proxy_suffix: &str,
        proxy_port: u16,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        Ok(Self {
            signer,
            proxy_suffix: proxy_suffix.to_string(),
            proxy_port,
            timeout: Duration::from_secs(timeout_secs),
            http,
        })
    }

    async fn proxy_request(&self, pop: &str, kind: &str, q: &str) -> Result<String, GatewayError> {
        let signer = self.signer.as_ref().ok_or(GatewayError::NoPrivateKey)?;
        let signed = signer.sign(q)?;
        let base = format!(
            "http://{pop}{}:{}/{kind}",
            self.proxy_suffix, self.proxy_port
        );
        let ts = signed.ts.to_string();
        let resp = self
            .http
            .get(&base)
            .query(&[
                ("q", signed.query.as_str()),
                ("ts", ts.as_str()),
                ("sig", signed.signature.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        resp.text().await.map_err(|e| GatewayError::Fetch(e.to_string()))
    }

    /// Run a BIRD query on a PoP.
    pub async fn bird_request(&self, pop: &str, q: &str) -> Result<String, GatewayError> {
        self.proxy_request(pop, "bird", q).await
    }

    /// Run a traceroute on a PoP (plain text).
    pub async fn traceroute_request(&self, pop: &str, q: &str) -> Result<String, GatewayError> {
        self.proxy_request(pop, "traceroute", q).await
    }

    /// Run a traceroute on a PoP (HTML rendering).
    pub async fn traceroute_html_request(&self, pop: &str, q: &str) -> Result<String, GatewayError> {
        self.proxy_request(pop, "tracerouteh", q).await
    }
}

/// Whether a 200 BIRD body is actually a parser rejection.
pub fn is_bird_syntax_error(body: &str) -> bool {
    body.contains(BIRD_SYNTAX_ERROR)
}

/// Shared frontend handler state.
pub struct FrontendState {
    /// Request gateway.
    pub gateway: FrontendGateway,
    /// PoP registry.
    pub pops: Arc<PopRegistry>,
    /// Community matcher registry.
    pub communities: Arc<CommunityRegistry>,
    /// Bulk ASN cache.
    pub asn: Arc<AsnLookup>,
    /// Fallback name resolver.
    pub resolver: Arc<AsnResolver>,
    /// Output formatter.
    pub formatter: OutputFormatter,
    /// Summary parser.
    pub summary: SummaryParser,
    /// Whois client, absent when unconfigured.
    pub whois: Option<Arc<dyn WhoisClient>>,
    /// Metrics container.
    pub metrics: Arc<Metrics>,
}

impl FrontendState {
    /// Resolve names for every ASN on the as-path lines of `raw`: one
    /// batched cache read, then per-miss fallbacks.
    async fn resolve_as_path_names(&self, raw: &str) -> HashMap<String, String> {
        let texts = self.formatter.collect_as_path_asns(raw);
        let numeric: Vec<u32> = texts
            .iter()
            .filter_map(|t| parse_asn(&format!("AS{t}")).ok())
            .collect();
        let bulk = Arc::clone(&self.asn)
            .batch_query(&numeric)
            .await
            .unwrap_or_default();

        let mut names = HashMap::new();
        for text in texts {
            if let Ok(n) = parse_asn(&format!("AS{text}")) {
                if let Some(record) = bulk.get(&n) {
                    if !record.name.is_empty() {
                        names.insert(text, record.name.clone());
                        continue;
                    }
                }
            }
            let name = self.resolver.lookup_name(&text).await;
            names.insert(text, name);
        }
        names
    }

    async fn render_bird(&self, pop: &str, title: &str, cmd: &str, raw: &str, proto: Option<&str>) -> Response {
        let trimmed = raw.trim();
        let names = self.resolve_as_path_names(trimmed).await;
        let ctx = FormatContext {
            pop_id: pop.to_string(),
            proto: proto.map(str::to_string),
        };
        let communities = self.communities.snapshot();
        let formatted = self
            .formatter
            .format(trimmed, &ctx, &names, &communities);
        let body = format!(
            "<h1>{}</h1>\n<p><code>{}</code></p>\n<pre>{formatted}</pre>\n<p><a href=\"/detail/{}\">Go back to summary</a></p>",
            escape_html(title),
            escape_html(cmd),
            escape_html(pop),
        );
        Html(page(title, &body)).into_response()
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{body}\n</body>\n</html>\n",
        escape_html(title)
    )
}

fn error_page(code: StatusCode, msg: &str, back: &str, back_msg: &str) -> Response {
    let body = format!(
        "<p>{}</p>\n<p><a href=\"{back}\">{}</a></p>",
        escape_html(msg),
        escape_html(back_msg),
    );
    (code, Html(page("Error", &body))).into_response()
}

fn mode_error(pop: &str, msg: &str) -> Response {
    error_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        msg,
        &format!("/detail/{pop}"),
        "Go back to summary",
    )
}

/// Build the frontend router.
pub fn router(state: Arc<FrontendState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/robots.txt", get(robots_handler))
        .route("/detail/:id", get(detail_handler))
        .route("/detail/:id/:protocol", get(protocol_handler))
        .route("/whois", get(whois_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn robots_handler() -> &'static str {
    "User-agent: *\nDisallow: /"
}

async fn home_handler(State(state): State<Arc<FrontendState>>) -> Response {
    let pops = state.pops.get_all();
    let mut body = String::from("<h1>Looking glass</h1>\n<ul>\n");
    for pop in pops.iter() {
        body.push_str(&format!(
            "<li><a href=\"/detail/{}\">{}</a> ({})</li>\n",
            escape_html(&pop.id),
            escape_html(&pop.id),
            escape_html(&pop.location),
        ));
    }
    body.push_str("</ul>");
    Html(page("Looking glass", &body)).into_response()
}

async fn metrics_handler(State(state): State<Arc<FrontendState>>) -> Response {
    state.metrics.observe_asn(&state.asn.stats());
    match state.metrics.render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics").into_response(),
    }
}

async fn detail_handler(
    State(state): State<Arc<FrontendState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.metrics.requests_total.inc();

    if state.pops.get_by_id(&id).is_none() {
        state.pops.notify();
        return error_page(
            StatusCode::NOT_FOUND,
            "PoP not found. Please try again later.",
            "/",
            "Go back to home",
        );
    }

    let mode = params.get("mode").map(String::as_str).unwrap_or_default();
    let q = params.get("q").map(String::as_str).unwrap_or_default();
    if !mode.is_empty() && !q.is_empty() {
        return match mode {
            "route" => route_view(&state, &id, q).await,
            "filter" => filter_view(&state, &id, q).await,
            "traceroute" => traceroute_view(&state, &id, q).await,
            _ => mode_error(&id, "Invalid request."),
        };
    }

    summary_view(&state, &id).await
}

async fn summary_view(state: &FrontendState, id: &str) -> Response {
    let resp = match state.gateway.bird_request(id, "show protocols").await {
        Ok(resp) => resp,
        Err(e) => {
            error!(pop = id, error = %e, "failed to fetch summary");
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch BGP summary.",
                "/",
                "Go back to home",
            );
        }
    };

    let table = match state.summary.parse(&resp) {
        Ok(table) => table,
        Err(e) => {
            error!(pop = id, error = %e, "failed to parse summary");
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to parse BGP summary.",
                "/",
                "Go back to home",
            );
        }
    };

    let mut body = format!("<h1>{}</h1>\n<table>\n<tr>", escape_html(id));
    for col in &table.header {
        body.push_str(&format!("<th>{}</th>", escape_html(col)));
    }
    body.push_str("</tr>\n");
    for row in &table.rows {
        body.push_str(&format!(
            "<tr class=\"state-{}\"><td><a href=\"/detail/{}/{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&row.mapped_state),
            escape_html(id),
            escape_html(&row.name),
            escape_html(&row.name),
            escape_html(&row.proto),
            escape_html(&row.state),
            escape_html(&row.since),
            escape_html(&row.info),
        ));
    }
    body.push_str("</table>");
    Html(page(id, &body)).into_response()
}

async fn route_view(state: &FrontendState, id: &str, q: &str) -> Response {
    if !(validate::is_ip(q) || validate::is_cidr(q)) {
        return mode_error(id, "Invalid IP address or CIDR notation.");
    }

    let cmd = format!("show route for {q} all");
    let resp = match state.gateway.bird_request(id, &cmd).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(pop = id, q, error = %e, "failed to fetch route");
            return mode_error(id, "Failed to fetch information.");
        }
    };
    if is_bird_syntax_error(&resp) {
        return mode_error(id, "Invalid parameter. Please try again later.");
    }

    state
        .render_bird(id, &format!("show route for {q}"), &cmd, &resp, None)
        .await
}

async fn filter_view(state: &FrontendState, id: &str, q: &str) -> Response {
    if !validate::is_valid_protocol(q) {
        return mode_error(id, "Invalid protocol name.");
    }

    let cmd = format!("show route filtered all protocol '{q}'");
    match state.gateway.bird_request(id, &cmd).await {
        Ok(resp) if !is_bird_syntax_error(&resp) => {
            state
                .render_bird(id, &format!("filtered routes {q}"), &cmd, &resp, Some(q))
                .await
        }
        Ok(_) => mode_error(id, "Failed to fetch information. Please try again later."),
        Err(e) => {
            error!(pop = id, q, error = %e, "failed to fetch filtered routes");
            mode_error(id, "Failed to fetch information. Please try again later.")
        }
    }
}

async fn traceroute_view(state: &FrontendState, id: &str, q: &str) -> Response {
    if !(validate::is_ip(q) || validate::is_domain(q)) {
        return mode_error(id, "Invalid IP address or domain name.");
    }

    let resp = match state.gateway.traceroute_request(id, q).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(pop = id, q, error = %e, "failed to run traceroute");
            return mode_error(id, "Failed to perform traceroute.");
        }
    };

    state
        .render_bird(id, &format!("traceroute {q}"), &format!("traceroute {q}"), &resp, None)
        .await
}

async fn protocol_handler(
    State(state): State<Arc<FrontendState>>,
    Path((id, protocol)): Path<(String, String)>,
) -> Response {
    state.metrics.requests_total.inc();

    if !validate::is_valid_protocol(&protocol) {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid protocol name.",
            &format!("/detail/{id}"),
            "Go back to summary",
        );
    }

    if state.pops.get_by_id(&id).is_none() {
        state.pops.notify();
        return error_page(
            StatusCode::NOT_FOUND,
            "PoP not found. Please try again later.",
            "/",
            "Go back to home",
        );
    }

    let cmd = format!("show protocols all '{protocol}'");
    match state.gateway.bird_request(&id, &cmd).await {
        Ok(resp) if !is_bird_syntax_error(&resp) => {
            state
                .render_bird(&id, &protocol, &cmd, &resp, Some(&protocol))
                .await
        }
        Ok(_) => error_page(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid protocol name or failed to fetch protocol details. Please try again later.",
            &format!("/detail/{id}"),
            "Go back to summary",
        ),
        Err(e) => {
            error!(pop = %id, protocol = %protocol, error = %e, "failed to fetch protocol details");
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid protocol name or failed to fetch protocol details. Please try again later.",
                &format!("/detail/{id}"),
                "Go back to summary",
            )
        }
    }
}

async fn whois_handler(
    State(state): State<Arc<FrontendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(whois) = state.whois.as_ref() else {
        return error_page(
            StatusCode::NOT_ACCEPTABLE,
            "Not supported",
            "/",
            "Go back to home",
        );
    };

    let q = params.get("q").map(String::as_str).unwrap_or_default();
    if q.is_empty() {
        let body = "<h1>WHOIS query</h1>\n<form method=\"get\"><input name=\"q\"><button>Query</button></form>";
        return Html(page("WHOIS query", body)).into_response();
    }

    let result = match whois.query(q).await {
        Ok(result) => result,
        Err(e) => e.to_string(),
    };
    let body = format!(
        "<h1>WHOIS query - {}</h1>\n<pre>{}</pre>\n<p><a href=\"/\">Go back to home</a></p>",
        escape_html(q),
        escape_html(result.trim()),
    );
    Html(page(&format!("WHOIS query - {q}"), &body)).into_response()
}
