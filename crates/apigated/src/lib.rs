//! apigated - gate a candidate service, then report it ready.
//!
//! The readiness port is bound only after every API version passed, so an
//! orchestrator polling it never sees a candidate that failed the gate.

use std::net::SocketAddr;
use std::sync::Arc;

use apigate_ci::{Evaluator, GateReport, RemoteGate};
use apigate_core::{GateConfig, Result};
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Environment variable selecting log format (`json` for JSON lines).
pub const ENV_LOG_FORMAT: &str = "APIGATE_LOG_FORMAT";

/// Router answering `200 OK` to any method and path.
pub fn readiness_router() -> Router {
    Router::new().fallback(ready)
}

async fn ready() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// A bound readiness listener.
pub struct ReadinessServer {
    listener: TcpListener,
}

impl ReadinessServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Answer readiness requests until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!(event = "readiness.listening", %addr, "readiness server listening");
        axum::serve(self.listener, readiness_router()).await?;
        Ok(())
    }
}

/// Address the readiness server binds for `config`.
pub fn listen_addr(config: &GateConfig) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], config.listen_port))
}

/// Log every failing version and its failing results.
pub fn log_failures(report: &GateReport) {
    for check in report.checks.iter().filter(|c| !c.passed()) {
        error!(api = %check.api, version = %check.version, "{}", check.failure_message());
        for located in check.results.iter().filter(|r| !r.result.passed) {
            error!(
                api = %check.api,
                version = %check.version,
                change = %located.result.change,
                "{}",
                located.result.message
            );
        }
    }
}

/// Run the remote gate and, only if it passes, bind the readiness server.
pub async fn gate_and_bind(
    config: &GateConfig,
    evaluator: Arc<dyn Evaluator>,
    addr: SocketAddr,
) -> Result<(GateReport, ReadinessServer)> {
    let report = RemoteGate::new(config, evaluator)?.run_all().await?;
    log_failures(&report);
    let report = report.into_result()?;
    let server = ReadinessServer::bind(addr).await?;
    Ok((report, server))
}
