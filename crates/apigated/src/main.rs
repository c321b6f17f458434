use std::sync::Arc;

use anyhow::{Context, Result};
use apigate_ci::{default_candidates, locate_evaluator, ProcessEvaluator};
use apigate_core::{init_tracing, GateConfig, ProcessEnv};
use apigated::{gate_and_bind, listen_addr, ENV_LOG_FORMAT};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    init_tracing(json, Level::INFO);
    info!(version = apigate_core::VERSION, "apigated starting");

    let config = GateConfig::from_env()?;
    let program = locate_evaluator(&default_candidates(&ProcessEnv))?;
    let evaluator = Arc::new(ProcessEvaluator::new(program, config.evaluator_timeout));

    let addr = listen_addr(&config);
    let (report, server) = gate_and_bind(&config, evaluator, addr)
        .await
        .with_context(|| format!("apigated did not become ready on {addr}"))?;
    info!(
        checked = report.checks.len(),
        "all API versions passed; reporting ready"
    );

    server.serve().await.context("readiness server failed")?;
    Ok(())
}
