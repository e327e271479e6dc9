use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::matching::{OrchestratorSettings, SalaryUnitPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
    pub salary_policy: SalaryUnitPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let concurrency_override = match optional_number::<usize>("SCORING_CONCURRENCY")? {
            Some(0) => return Err(ConfigError::ZeroConcurrency),
            other => other,
        };
        let scoring = ScoringConfig {
            concurrency_override,
            pacing_ms: optional_number("SCORING_PACING_MS")?.unwrap_or(250),
            timeout_ms: optional_number("SCORING_TIMEOUT_MS")?.unwrap_or(30_000),
        };

        let defaults = SalaryUnitPolicy::default();
        let salary_policy = SalaryUnitPolicy {
            annual_threshold: optional_number("SALARY_ANNUAL_THRESHOLD")?
                .unwrap_or(defaults.annual_threshold),
            monthly_threshold: optional_number("SALARY_MONTHLY_THRESHOLD")?
                .unwrap_or(defaults.monthly_threshold),
        };
        if salary_policy.monthly_threshold > salary_policy.annual_threshold {
            return Err(ConfigError::SalaryThresholdOrder);
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring,
            salary_policy,
        })
    }
}

fn optional_number<T: std::str::FromStr>(variable: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(variable) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        _ => Ok(None),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scoring run scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    pub concurrency_override: Option<usize>,
    pub pacing_ms: u64,
    pub timeout_ms: u64,
}

impl ScoringConfig {
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            concurrency_override: self.concurrency_override,
            pacing: Duration::from_millis(self.pacing_ms),
            call_timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    ZeroConcurrency,
    SalaryThresholdOrder,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a non-negative number")
            }
            ConfigError::ZeroConcurrency => {
                write!(f, "SCORING_CONCURRENCY must be at least 1 when set")
            }
            ConfigError::SalaryThresholdOrder => write!(
                f,
                "SALARY_MONTHLY_THRESHOLD must not exceed SALARY_ANNUAL_THRESHOLD"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "SCORING_CONCURRENCY",
            "SCORING_PACING_MS",
            "SCORING_TIMEOUT_MS",
            "SALARY_ANNUAL_THRESHOLD",
            "SALARY_MONTHLY_THRESHOLD",
        ] {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scoring.concurrency_override, None);
        assert_eq!(config.scoring.pacing_ms, 250);
        assert_eq!(config.salary_policy, SalaryUnitPolicy::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn scoring_overrides_flow_into_orchestrator_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCORING_CONCURRENCY", "4");
        env::set_var("SCORING_PACING_MS", "0");
        env::set_var("SCORING_TIMEOUT_MS", "0");
        let settings = AppConfig::load()
            .expect("config loads")
            .scoring
            .orchestrator_settings();
        reset_env();

        assert_eq!(settings.concurrency_override, Some(4));
        assert_eq!(settings.pacing, Duration::ZERO);
        assert_eq!(settings.call_timeout, None);
    }

    #[test]
    fn rejects_zero_concurrency_and_garbage_numbers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCORING_CONCURRENCY", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::ZeroConcurrency)
        ));

        reset_env();
        env::set_var("SALARY_ANNUAL_THRESHOLD", "lots");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                variable: "SALARY_ANNUAL_THRESHOLD"
            })
        ));
        reset_env();
    }
}
