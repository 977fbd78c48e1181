//! Keel server entry point.
//!
//! Configuration is environment-driven:
//!
//! - `KEEL_ADDR`: bind address (default: 0.0.0.0:8400)
//! - `KEEL_DATA_DIR`: log directory (default: ./data/log)
//! - `KEEL_MAX_STORE_BYTES` / `KEEL_MAX_INDEX_BYTES`: per-segment limits
//!   (0 or unset: engine defaults)
//! - `KEEL_ACL_POLICY`: path to the JSON ACL policy file; without it every
//!   request is permitted (development only)
//! - `KEEL_TLS_CERT` / `KEEL_TLS_KEY`: server certificate and key (PEM);
//!   both set enables TLS
//! - `KEEL_TLS_CLIENT_CA`: CA bundle for verifying client certificates;
//!   enables mutual TLS and fingerprint-based ACL subjects
//!
//! Logging is controlled via `RUST_LOG` (default level: info).

use std::sync::Arc;

use tonic::transport::Server;
use tracing::{info, warn};

use keel_proto::v1::log_server::LogServer;
use keel_server::{Acl, Authorizer, LogService, TlsSettings};
use keel_storage::{Log, LogConfig};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind_addr = env_or("KEEL_ADDR", "0.0.0.0:8400").parse()?;
    let data_dir = env_or("KEEL_DATA_DIR", "./data/log");
    let config = LogConfig {
        max_store_bytes: env_or("KEEL_MAX_STORE_BYTES", "0").parse()?,
        max_index_bytes: env_or("KEEL_MAX_INDEX_BYTES", "0").parse()?,
    };

    info!(dir = %data_dir, "opening log");
    let log = Arc::new(Log::open(&data_dir, config)?);

    let authorizer: Arc<dyn Authorizer> = match std::env::var("KEEL_ACL_POLICY") {
        Ok(path) => {
            info!(policy = %path, "loading acl policy");
            Arc::new(Acl::from_file(path)?)
        }
        Err(_) => {
            warn!("no KEEL_ACL_POLICY set, permitting all requests");
            Arc::new(Acl::allow_all())
        }
    };

    let service = LogService::new(Arc::clone(&log), authorizer);

    let mut builder = Server::builder();
    if let (Ok(cert), Ok(key)) = (std::env::var("KEEL_TLS_CERT"), std::env::var("KEEL_TLS_KEY")) {
        let mut settings = TlsSettings::new(cert, key);
        if let Ok(ca) = std::env::var("KEEL_TLS_CLIENT_CA") {
            info!("mutual TLS enabled");
            settings = settings.with_client_ca(ca);
        }
        builder = builder.tls_config(settings.load()?)?;
    } else {
        warn!("TLS not configured, serving plaintext");
    }

    info!(addr = %bind_addr, "starting server");
    builder
        .add_service(LogServer::new(service))
        .serve_with_shutdown(bind_addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    log.close()?;
    Ok(())
}
