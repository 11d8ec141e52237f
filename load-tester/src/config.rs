//! Load configuration
//!
//! Configuration is resolved from an explicit environment snapshot. Each load
//! profile supplies a bundle of defaults; every setting can be overridden
//! individually by its own variable.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// Default HTTP API origin
pub const DEFAULT_BASE_HTTP: &str = "https://tbfapi.nikayazilim.com/webapi-service/api";
/// Default WebSocket hub origin
pub const DEFAULT_HUB_WSS: &str = "wss://tbfapi.nikayazilim.com/webapi-service/hub";

/// Errors raised while resolving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a base-10 integer, got {value:?}: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{var} must be a socket address like 0.0.0.0:9184, got {value:?}: {source}")]
    InvalidAddress {
        var: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },
}

/// Snapshot of environment variables
///
/// Resolution reads only from this snapshot, never from the process
/// environment directly.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    ///
    /// Entries whose name or value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        vars.into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    debug!("Skipping non UTF-8 environment entry {:?}", key);
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    fn number_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr<Err = ParseIntError>,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidNumber {
                    var: key,
                    value: raw.to_string(),
                    source,
                }),
            None => Ok(default),
        }
    }

    /// Run flags are enabled unless set to the literal `0`
    fn flag(&self, key: &str) -> bool {
        self.get(key) != Some("0")
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Named bundle of load defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadProfile {
    #[default]
    Baseline,
    Stress,
    Soak,
}

/// Defaults applied by a profile (shared by the HTTP and hub curves)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileDefaults {
    pub copies: usize,
    pub ramp_secs: u64,
    pub hold_secs: u64,
    pub timeout_secs: u64,
}

impl LoadProfile {
    /// Parse a profile name, ignoring case. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "baseline" => Some(Self::Baseline),
            "stress" => Some(Self::Stress),
            "soak" => Some(Self::Soak),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoadProfile::Baseline => "baseline",
            LoadProfile::Stress => "stress",
            LoadProfile::Soak => "soak",
        }
    }

    pub fn defaults(&self) -> ProfileDefaults {
        match self {
            LoadProfile::Baseline => ProfileDefaults {
                copies: 50,
                ramp_secs: 10,
                hold_secs: 30,
                timeout_secs: 15,
            },
            LoadProfile::Stress => ProfileDefaults {
                copies: 500,
                ramp_secs: 60,
                hold_secs: 120,
                timeout_secs: 20,
            },
            LoadProfile::Soak => ProfileDefaults {
                copies: 200,
                ramp_secs: 60,
                hold_secs: 900,
                timeout_secs: 20,
            },
        }
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved load configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// HTTP API base URL
    pub base_http: String,
    /// WebSocket hub URL
    pub hub_wss: String,
    /// ISO-8601 instant passed to the daily matches endpoint
    pub match_date: String,

    pub http_copies: usize,
    pub http_ramp_secs: u64,
    pub http_hold_secs: u64,

    pub hub_copies: usize,
    pub hub_ramp_secs: u64,
    pub hub_hold_secs: u64,

    /// Per-request HTTP timeout
    pub http_timeout_secs: u64,

    pub run_http: bool,
    pub run_hub: bool,

    pub profile: LoadProfile,
}

impl LoadConfig {
    /// Resolve configuration from an environment snapshot.
    ///
    /// `now` only feeds the default `MATCH_DATE`; set `MATCH_DATE` explicitly
    /// for deterministic runs.
    pub fn resolve(env: &Environment, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let profile = match env.get("LOAD_PROFILE") {
            Some(name) => LoadProfile::parse(name).unwrap_or_else(|| {
                warn!(
                    "Unknown LOAD_PROFILE {:?}, falling back to {}",
                    name,
                    LoadProfile::Baseline
                );
                LoadProfile::Baseline
            }),
            None => LoadProfile::Baseline,
        };
        let defaults = profile.defaults();

        let default_date = midnight_utc(now);

        Ok(Self {
            base_http: env.get_or("BASE_HTTP", DEFAULT_BASE_HTTP).to_string(),
            hub_wss: env.get_or("HUB_WSS", DEFAULT_HUB_WSS).to_string(),
            match_date: env.get_or("MATCH_DATE", &default_date).to_string(),
            http_copies: env.number_or("HTTP_COPIES", defaults.copies)?,
            http_ramp_secs: env.number_or("HTTP_RAMP_S", defaults.ramp_secs)?,
            http_hold_secs: env.number_or("HTTP_HOLD_S", defaults.hold_secs)?,
            hub_copies: env.number_or("HUB_COPIES", defaults.copies)?,
            hub_ramp_secs: env.number_or("HUB_RAMP_S", defaults.ramp_secs)?,
            hub_hold_secs: env.number_or("HUB_HOLD_S", defaults.hold_secs)?,
            http_timeout_secs: env.number_or("HTTP_TIMEOUT_S", defaults.timeout_secs)?,
            run_http: env.flag("RUN_HTTP"),
            run_hub: env.flag("RUN_HUB"),
            profile,
        })
    }

    /// Resolve configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(&Environment::from_process(), Utc::now())
    }

    /// Whether at least one scenario is enabled
    pub fn has_runnable_scenario(&self) -> bool {
        self.run_http || self.run_hub
    }
}

/// Settings for the runner and observability, separate from the load shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Interval between progress log lines
    pub report_interval: Duration,
    /// Address for the Prometheus exporter, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

impl RunnerSettings {
    pub fn resolve(env: &Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let report_interval = Duration::from_secs(
            env.number_or("REPORT_INTERVAL_S", defaults.report_interval.as_secs())?,
        );

        let metrics_addr = match env.get("METRICS_ADDR") {
            Some(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|source| ConfigError::InvalidAddress {
                    var: "METRICS_ADDR",
                    value: raw.to_string(),
                    source,
                })?)
            }
            _ => None,
        };

        Ok(Self {
            report_interval,
            metrics_addr,
        })
    }
}

/// `now`'s UTC calendar date at midnight, e.g. `2024-03-01T00:00:00.000Z`
fn midnight_utc(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT00:00:00.000Z").to_string()
}

impl fmt::Display for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PROFILE={}", self.profile)?;
        writeln!(f, "MATCH_DATE={}", self.match_date)?;
        writeln!(f, "BASE_HTTP={}", self.base_http)?;
        writeln!(f, "HUB_WSS={}", self.hub_wss)?;
        writeln!(f, "RUN_HTTP={}, RUN_HUB={}", self.run_http, self.run_hub)?;
        writeln!(
            f,
            "HTTP_COPIES={}, HTTP_RAMP_S={}, HTTP_HOLD_S={}",
            self.http_copies, self.http_ramp_secs, self.http_hold_secs
        )?;
        writeln!(
            f,
            "HUB_COPIES={}, HUB_RAMP_S={}, HUB_HOLD_S={}",
            self.hub_copies, self.hub_ramp_secs, self.hub_hold_secs
        )?;
        write!(f, "HTTP_TIMEOUT_S={}", self.http_timeout_secs)
    }
}
