//! fleetscale.toml configuration parser.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults of the matrix-multiply fleet the scheduler cron job was first
//! written for.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetscaleConfig {
    pub fleet: FleetConfig,
    pub samples: SamplesConfig,
    pub policy: PolicyConfig,
    pub orchestrator: OrchestratorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub namespace: String,
    pub deployment: String,
    /// Label selector matching the fleet's instances.
    pub selector: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            deployment: "matrix-multiply".to_string(),
            selector: "app=matrix-multiply".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplesConfig {
    pub results_dir: PathBuf,
    /// Defaults to `<results_dir>/AnalyzedPods`.
    pub archive_dir: Option<PathBuf>,
    /// Reserved filename of the history document inside `results_dir`.
    pub history_file: String,
    pub extension: String,
    /// Wall-clock span one check is expected to cover.
    pub interval_secs: u64,
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("/app/results"),
            archive_dir: None,
            history_file: "podStatus.json".to_string(),
            extension: "json".to_string(),
            interval_secs: 60,
        }
    }
}

impl SamplesConfig {
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.results_dir.join("AnalyzedPods"))
    }

    pub fn history_path(&self) -> PathBuf {
        self.results_dir.join(&self.history_file)
    }
}

/// Which decision strategy a check uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStrategy {
    #[default]
    Local,
    Delegated,
}

impl FromStr for PolicyStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(PolicyStrategy::Local),
            "delegated" => Ok(PolicyStrategy::Delegated),
            other => Err(ConfigError::Invalid(format!(
                "unknown strategy {other:?} (expected \"local\" or \"delegated\")"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub strategy: PolicyStrategy,
    /// Response-time threshold in seconds.
    pub threshold: f64,
    pub local: LocalPolicyConfig,
    pub delegated: DelegatedPolicyConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strategy: PolicyStrategy::Local,
            threshold: 0.6,
            local: LocalPolicyConfig::default(),
            delegated: DelegatedPolicyConfig::default(),
        }
    }
}

/// Bucket boundaries (seconds) and target counts of the threshold strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalPolicyConfig {
    pub scale_up_above: f64,
    pub scale_down_below: f64,
    pub scale_up_to: u32,
    pub scale_down_to: u32,
    pub baseline: u32,
}

impl Default for LocalPolicyConfig {
    fn default() -> Self {
        Self {
            scale_up_above: 0.2,
            scale_down_below: 0.1,
            scale_up_to: 5,
            scale_down_to: 2,
            baseline: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegatedPolicyConfig {
    pub endpoint: Option<String>,
    pub timeout: String,
}

impl Default for DelegatedPolicyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: "2s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub api_server: String,
    pub token_file: Option<PathBuf>,
    pub timeout: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_server: "http://127.0.0.1:8001".to_string(),
            token_file: None,
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prometheus textfile written after every check.
    pub metrics_textfile: Option<PathBuf>,
}

impl FleetscaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check cross-field constraints. Call after CLI overrides are applied.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.fleet.namespace.trim().is_empty() {
            return invalid("fleet.namespace must not be empty");
        }
        if self.fleet.deployment.trim().is_empty() {
            return invalid("fleet.deployment must not be empty");
        }
        if self.samples.interval_secs == 0 {
            return invalid("samples.interval_secs must be positive");
        }
        if self.samples.history_file.contains(['/', '\\']) {
            return invalid("samples.history_file must be a bare filename");
        }
        if !(self.policy.threshold.is_finite() && self.policy.threshold > 0.0) {
            return invalid("policy.threshold must be a positive number");
        }

        let local = &self.policy.local;
        if local.scale_down_below > local.scale_up_above {
            return invalid("policy.local.scale_down_below must not exceed scale_up_above");
        }
        if local.scale_up_to == 0 || local.scale_down_to == 0 || local.baseline == 0 {
            return invalid("policy.local target counts must be positive");
        }

        if self.policy.strategy == PolicyStrategy::Delegated
            && self.policy.delegated.endpoint.as_deref().is_none_or(str::is_empty)
        {
            return invalid("policy.delegated.endpoint is required for the delegated strategy");
        }

        self.decision_timeout()?;
        self.orchestrator_timeout()?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.samples.interval_secs)
    }

    pub fn decision_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.policy.delegated.timeout).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "policy.delegated.timeout: bad duration {:?}",
                self.policy.delegated.timeout
            ))
        })
    }

    pub fn orchestrator_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.orchestrator.timeout).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "orchestrator.timeout: bad duration {:?}",
                self.orchestrator.timeout
            ))
        })
    }
}

/// Parse a duration string like "5s", "500ms", "1m". Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = FleetscaleConfig::from_toml_str("").unwrap();
        assert_eq!(config.fleet.deployment, "matrix-multiply");
        assert_eq!(config.samples.history_file, "podStatus.json");
        assert_eq!(config.policy.strategy, PolicyStrategy::Local);
        assert_eq!(
            config.samples.archive_dir(),
            PathBuf::from("/app/results/AnalyzedPods")
        );
        config.validate().unwrap();
    }

    #[test]
    fn parse_delegated_section() {
        let config = FleetscaleConfig::from_toml_str(
            r#"
[fleet]
namespace = "batch"

[policy]
strategy = "delegated"
threshold = 1.5

[policy.delegated]
endpoint = "http://decider:9000/decide"
timeout = "500ms"
"#,
        )
        .unwrap();
        assert_eq!(config.fleet.namespace, "batch");
        assert_eq!(config.fleet.deployment, "matrix-multiply");
        assert_eq!(config.policy.strategy, PolicyStrategy::Delegated);
        assert_eq!(config.decision_timeout().unwrap(), Duration::from_millis(500));
        config.validate().unwrap();
    }

    #[test]
    fn delegated_without_endpoint_is_invalid() {
        let mut config = FleetscaleConfig::default();
        config.policy.strategy = PolicyStrategy::Delegated;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn inverted_buckets_are_invalid() {
        let mut config = FleetscaleConfig::default();
        config.policy.local.scale_down_below = 0.5;
        config.policy.local.scale_up_above = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_threshold_is_invalid() {
        let mut config = FleetscaleConfig::default();
        config.policy.threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_field_value_fails_to_parse() {
        let err = FleetscaleConfig::from_toml_str("[policy]\nstrategy = \"magic\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn strategy_from_str() {
        assert_eq!("Delegated".parse::<PolicyStrategy>().unwrap(), PolicyStrategy::Delegated);
        assert!("remote".parse::<PolicyStrategy>().is_err());
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("soon"), None);
    }
}
