use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use loadtester::http::build_client;
use loadtester::tls::install_crypto_provider;
use loadtester::{Environment, LoadConfig, Runner, RunnerSettings, assemble};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadtester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    install_crypto_provider();

    let env = Environment::from_process();
    let config = LoadConfig::resolve(&env, Utc::now()).context("Invalid load configuration")?;
    let settings = RunnerSettings::resolve(&env).context("Invalid runner settings")?;

    println!("{config}");

    if let Some(addr) = settings.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exposed on http://{}/metrics", addr);
    }

    let client = build_client(&config)?;
    let scenarios = match assemble(&config, client) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            error!("{}", e);
            println!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let runner = Runner::new()
        .register_scenarios(scenarios)
        .with_reporting_interval(settings.report_interval);

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping workers");
                token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let report = runner.run().await;
    report.print_summary();
    println!("JSON: {}", report.to_json());

    Ok(ExitCode::SUCCESS)
}
