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

//! PoP proxy agent entrypoint.

use anyhow::{bail, Context, Result};
use routelens::core::bird::BirdClient;
use routelens::core::config::Config;
use routelens::core::signing::{
    export_private_key_hex, export_public_key_hex, generate_keypair, import_public_key_hex,
    RequestVerifier,
};
use routelens::monitoring::metrics::Metrics;
use routelens::net::traceroute::{self, TracerouteRunner};
use routelens::service::proxy::{self, ProxyState};
use std::sync::Arc;
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

    // The proxy must never serve with a generated ephemeral key: a fresh
    // pair is printed as guidance for the operator, then startup fails.
    let public = match import_public_key_hex(&cfg.authentication.publickey) {
        Ok(public) => public,
        Err(e) => {
            error!(error = %e, "failed to load public key");
            if let Ok((secret, public)) = generate_keypair() {
                if let (Ok(priv_hex), Ok(pub_hex)) = (
                    export_private_key_hex(&secret),
                    export_public_key_hex(&public),
                ) {
                    info!("generated a new key pair for signing proxy requests");
                    info!(private_key = %priv_hex, "generated private key");
                    info!(public_key = %pub_hex, "generated public key");
                }
            }
            bail!("cannot continue without a valid public key");
        }
    };

    let traceroute: Option<Arc<dyn TracerouteRunner>> = traceroute::autodetect(&cfg.traceroute)
        .await
        .map(|runner| Arc::new(runner) as Arc<dyn TracerouteRunner>);
    if traceroute.is_none() {
        warn!("traceroute endpoints disabled");
    }

    let state = Arc::new(ProxyState {
        verifier: RequestVerifier::new(&public),
        bird: Arc::new(BirdClient::new(&cfg.bird.socket)),
        traceroute,
        metrics: Arc::new(Metrics::new().context("metrics")?),
    });

    let addr = format!("{}:{}", cfg.net.host, cfg.net.port.unwrap_or(10179));
    info!(addr = %addr, bird_socket = %cfg.bird.socket, "proxy listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    axum::serve(listener, proxy::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serve")?;
    Ok(())
}
