use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    runtime: RuntimeSettings,
    session: SessionSettings,
    repair: RepairSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wall-clock length of one session clock step.
    pub tick_interval_ms: u64,
}

impl SessionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct RepairSettings {
    pub results_path: PathBuf,
    pub exams_path: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("file configured by {field} does not exist: {path}")]
    MissingFile { field: &'static str, path: String },
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(env_optional("CBT_ENV"));
        let strict_config =
            env_optional("CBT_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let tick_interval_ms =
            parse_u64("CBT_TICK_INTERVAL_MS", env_or_default("CBT_TICK_INTERVAL_MS", "1000"))?;

        let results_path =
            PathBuf::from(env_or_default("CBT_REPAIR_RESULTS_PATH", "data/results.json"));
        let exams_path = PathBuf::from(env_or_default("CBT_REPAIR_EXAMS_PATH", "data/exams.json"));
        let dry_run =
            env_optional("CBT_REPAIR_DRY_RUN").map(|value| parse_bool(&value)).unwrap_or(false);

        let log_level = env_or_default("CBT_LOG_LEVEL", "info");
        let json = env_optional("CBT_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            session: SessionSettings { tick_interval_ms },
            repair: RepairSettings { results_path, exams_path, dry_run },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub fn repair(&self) -> &RepairSettings {
        &self.repair
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    /// Command-line overrides for the maintenance binary.
    pub fn with_repair_overrides(
        mut self,
        results_path: Option<PathBuf>,
        exams_path: Option<PathBuf>,
        dry_run: bool,
    ) -> Self {
        if let Some(path) = results_path {
            self.repair.results_path = path;
        }
        if let Some(path) = exams_path {
            self.repair.exams_path = path;
        }
        self.repair.dry_run |= dry_run;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.tick_interval_ms == 0 {
            return Err(ConfigError::NotPositive { field: "CBT_TICK_INTERVAL_MS" });
        }

        if self.runtime.strict_config {
            require_file("CBT_REPAIR_RESULTS_PATH", &self.repair.results_path)?;
            require_file("CBT_REPAIR_EXAMS_PATH", &self.repair.exams_path)?;
        }

        Ok(())
    }
}

fn require_file(field: &'static str, path: &std::path::Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingFile { field, path: path.display().to_string() })
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}
