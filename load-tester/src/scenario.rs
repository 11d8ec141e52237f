//! Scenario assembly
//!
//! Binds the HTTP steps and the hub handshake to ramp/hold load plans taken
//! from the resolved configuration.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use crate::config::LoadConfig;
use crate::http::{HttpEndpoint, http_get};
use crate::hub::handshake_once;
use crate::runner::{LoadPlan, ScenarioBody, ScenarioContext, ScenarioProps, StepError};

pub const HTTP_SCENARIO: &str = "app_boot_http";
pub const HUB_SCENARIO: &str = "live_hub_ws";
pub const HUB_STEP: &str = "hub_connect";

/// Think time after each HTTP iteration, in milliseconds
const HTTP_PAUSE_MS: Range<u64> = 100..500;
/// Think time after each hub iteration, in milliseconds
const HUB_PAUSE_MS: Range<u64> = 1000..3000;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No scenarios enabled. Set RUN_HTTP=1 and/or RUN_HUB=1.")]
    NoScenariosEnabled,
}

fn random_pause(range: Range<u64>) -> Duration {
    Duration::from_millis(rand::rng().random_range(range))
}

/// Runs the five HTTP endpoints in order
pub struct HttpScenario {
    client: Client,
    requests: Vec<(&'static str, String)>,
}

impl HttpScenario {
    pub fn new(client: Client, base_http: &str, match_date: &str) -> Self {
        let requests = HttpEndpoint::ALL
            .iter()
            .map(|endpoint| (endpoint.step_name(), endpoint.url(base_http, match_date)))
            .collect();
        Self { client, requests }
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.requests.iter().map(|(_, url)| url.as_str())
    }
}

#[async_trait]
impl ScenarioBody for HttpScenario {
    async fn run(&self, ctx: &ScenarioContext) -> Result<(), StepError> {
        let mut first_failure = None;

        for (step, url) in &self.requests {
            match ctx.step(*step, http_get(ctx, &self.client, url)).await {
                Ok(()) => {}
                Err(StepError::Cancelled) => return Err(StepError::Cancelled),
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }

        ctx.sleep(random_pause(HTTP_PAUSE_MS)).await?;
        first_failure.map_or(Ok(()), Err)
    }
}

/// Performs one hub handshake per iteration
pub struct HubScenario {
    hub_uri: String,
}

impl HubScenario {
    pub fn new(hub_uri: impl Into<String>) -> Self {
        Self {
            hub_uri: hub_uri.into(),
        }
    }
}

#[async_trait]
impl ScenarioBody for HubScenario {
    async fn init(&self) -> anyhow::Result<()> {
        self.hub_uri
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid hub URI {:?}", self.hub_uri))?;
        Ok(())
    }

    async fn run(&self, ctx: &ScenarioContext) -> Result<(), StepError> {
        ctx.step(HUB_STEP, handshake_once(ctx, &self.hub_uri))
            .await?;
        ctx.sleep(random_pause(HUB_PAUSE_MS)).await
    }
}

pub fn build_http_scenario(config: &LoadConfig, client: Client) -> ScenarioProps {
    ScenarioProps::new(
        HTTP_SCENARIO,
        Arc::new(HttpScenario::new(client, &config.base_http, &config.match_date)),
        LoadPlan::ramp_then_hold(
            config.http_copies,
            Duration::from_secs(config.http_ramp_secs),
            Duration::from_secs(config.http_hold_secs),
        ),
    )
}

pub fn build_hub_scenario(config: &LoadConfig) -> ScenarioProps {
    ScenarioProps::new(
        HUB_SCENARIO,
        Arc::new(HubScenario::new(config.hub_wss.clone())),
        LoadPlan::ramp_then_hold(
            config.hub_copies,
            Duration::from_secs(config.hub_ramp_secs),
            Duration::from_secs(config.hub_hold_secs),
        ),
    )
}

/// Build every enabled scenario, refusing an all-disabled configuration
pub fn assemble(config: &LoadConfig, client: Client) -> Result<Vec<ScenarioProps>, AssemblyError> {
    let mut scenarios = Vec::new();
    if config.run_http {
        scenarios.push(build_http_scenario(config, client));
    }
    if config.run_hub {
        scenarios.push(build_hub_scenario(config));
    }

    if scenarios.is_empty() {
        return Err(AssemblyError::NoScenariosEnabled);
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::runner::LoadSimulation;
    use chrono::Utc;

    fn config(pairs: &[(&str, &str)]) -> LoadConfig {
        let env: Environment = pairs.iter().copied().collect();
        LoadConfig::resolve(&env, Utc::now()).unwrap()
    }

    #[test]
    fn test_both_disabled_is_degenerate() {
        let config = config(&[("RUN_HTTP", "0"), ("RUN_HUB", "0")]);
        let result = assemble(&config, Client::new());
        assert!(matches!(result, Err(AssemblyError::NoScenariosEnabled)));
    }

    #[test]
    fn test_only_enabled_scenarios_are_registered() {
        let cases = [
            (("1", "1"), vec![HTTP_SCENARIO, HUB_SCENARIO]),
            (("1", "0"), vec![HTTP_SCENARIO]),
            (("0", "1"), vec![HUB_SCENARIO]),
        ];
        for ((http, hub), expected) in cases {
            let config = config(&[("RUN_HTTP", http), ("RUN_HUB", hub)]);
            let scenarios = assemble(&config, Client::new()).unwrap();
            let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_load_plans_follow_config() {
        let config = config(&[
            ("LOAD_PROFILE", "stress"),
            ("HUB_COPIES", "20"),
            ("HUB_HOLD_S", "45"),
        ]);

        let http = build_http_scenario(&config, Client::new());
        assert_eq!(
            http.plan.phases(),
            [
                LoadSimulation::Ramp {
                    copies: 500,
                    during: Duration::from_secs(60)
                },
                LoadSimulation::Hold {
                    copies: 500,
                    during: Duration::from_secs(120)
                },
            ]
        );

        let hub = build_hub_scenario(&config);
        assert_eq!(
            hub.plan.phases(),
            [
                LoadSimulation::Ramp {
                    copies: 20,
                    during: Duration::from_secs(60)
                },
                LoadSimulation::Hold {
                    copies: 20,
                    during: Duration::from_secs(45)
                },
            ]
        );
    }

    #[test]
    fn test_http_scenario_builds_urls_in_order() {
        let scenario = HttpScenario::new(
            Client::new(),
            "http://localhost:9000/api",
            "2024-03-01T00:00:00.000Z",
        );
        let urls: Vec<_> = scenario.urls().collect();
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0], "http://localhost:9000/api/League/get-featured-9-leagues");
        assert_eq!(
            urls[1],
            "http://localhost:9000/api/Match/get-daily-matches?MatchDate=2024-03-01T00%3A00%3A00.000Z&"
        );
        assert_eq!(urls[4], "http://localhost:9000/api/Story/get-stories?");
    }

    #[test]
    fn test_random_pause_stays_in_range() {
        for _ in 0..1000 {
            let pause = random_pause(HTTP_PAUSE_MS);
            assert!(pause >= Duration::from_millis(100) && pause < Duration::from_millis(500));
            let pause = random_pause(HUB_PAUSE_MS);
            assert!(pause >= Duration::from_millis(1000) && pause < Duration::from_millis(3000));
        }
    }

    #[tokio::test]
    async fn test_hub_setup_rejects_invalid_uri() {
        assert!(HubScenario::new("not a uri").init().await.is_err());
        assert!(HubScenario::new("ws://127.0.0.1:1/hub").init().await.is_ok());
    }
}
