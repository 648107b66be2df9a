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

//! Frontend gateway entrypoint.

use anyhow::{Context, Result};
use routelens::asn::fallback::AsnResolver;
use routelens::asn::lookup::{AsnLookup, AsnLookupConfig};
use routelens::core::config::Config;
use routelens::core::signing::{import_private_key_hex, RequestSigner};
use routelens::core::summary::SummaryParser;
use routelens::monitoring::metrics::Metrics;
use routelens::net::whois::{TcpWhois, WhoisClient};
use routelens::registry::communities::CommunityRegistry;
use routelens::registry::pops::PopRegistry;
use routelens::service::format::OutputFormatter;
use routelens::service::frontend::{self, FrontendGateway, FrontendState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// `RUST_LOG` wins; the config `log.level` (or `ROUTELENS_LOG_LEVEL`) is
/// the fallback, then `info`.
fn log_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if level.is_empty() {
            tracing_subscriber::EnvFilter::new("info")
        } else {
            tracing_subscriber::EnvFilter::new(level)
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load_default().context("load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cfg.log.level))
        .with_target(false)
        .compact()
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Background data planes.
    let pops = Arc::new(PopRegistry::new(&cfg).context("pop registry")?);
    Arc::clone(&pops).spawn_puller(shutdown_rx.clone());

    let communities = Arc::new(
        CommunityRegistry::new(cfg.bgp_communities.list.clone(), cfg.servers.timeout)
            .context("community registry")?,
    );
    Arc::clone(&communities).spawn_puller(shutdown_rx.clone());

    let asn = Arc::new(AsnLookup::new(AsnLookupConfig::from_config(&cfg.asn)).context("asn cache")?);
    Arc::clone(&asn).start(shutdown_rx.clone());

    let whois: Option<Arc<dyn WhoisClient>> = TcpWhois::from_config(&cfg.servers.whois)
        .map(|client| Arc::new(client) as Arc<dyn WhoisClient>);
    let resolver = Arc::new(AsnResolver::new(
        Arc::clone(&asn),
        whois.clone(),
        Duration::from_secs(24 * 60 * 60),
    ));

    // The frontend may run without a private key; it just cannot sign.
    let signer = if cfg.authentication.privatekey.is_empty() {
        warn!("no private key configured, proxy requests will fail");
        None
    } else {
        match import_private_key_hex(&cfg.authentication.privatekey) {
            Ok(secret) => Some(RequestSigner::new(&secret)),
            Err(e) => {
                error!(error = %e, "failed to load private key, proxy requests will fail");
                None
            }
        }
    };

    let gateway = FrontendGateway::new(
        signer,
        &cfg.servers.proxy_suffix,
        cfg.servers.proxy_port,
        cfg.servers.timeout,
    )
    .context("gateway")?;

    let state = Arc::new(FrontendState {
        gateway,
        pops,
        communities,
        asn,
        resolver,
        formatter: OutputFormatter::new().context("output formatter")?,
        summary: SummaryParser::new(&cfg.frontend.name_filter).context("name filter")?,
        whois,
        metrics: Arc::new(Metrics::new().context("metrics")?),
    });

    let addr = format!("{}:{}", cfg.net.host, cfg.net.port.unwrap_or(1790));
    info!(addr = %addr, "frontend listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    let mut shutdown = shutdown_rx.clone();
    axum::serve(listener, frontend::router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.changed() => {}
            }
        })
        .await
        .context("serve")?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
