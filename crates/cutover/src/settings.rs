//! Run settings and environment
//!
//! [`Settings`] come from `cutover.toml` (every key optional). Secrets come
//! only from the environment and are captured once into [`Environment`].

use cutover_core::{DegradationThresholds, ServiceLevel, SystemMetrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings file looked up at the repository root
pub const SETTINGS_FILE: &str = "cutover.toml";

/// Data store URL
pub const ENV_STORE_URL: &str = "SUPABASE_URL";
/// Data store service credential
pub const ENV_STORE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
/// Email API key
pub const ENV_SENDGRID_KEY: &str = "SENDGRID_API_KEY";
/// Verified sender address
pub const ENV_SENDGRID_FROM: &str = "SENDGRID_FROM_EMAIL";
/// Token for workflow dispatch
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// `owner/repo` for workflow dispatch
pub const ENV_GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file unreadable
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// Settings file malformed
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required environment values are unset
    #[error("missing required environment values: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),
}

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// File locations
    pub paths: PathSettings,
    /// Forward run
    pub migration: MigrationSettings,
    /// Reverse run
    pub rollback: RollbackSettings,
    /// Tracked tables
    pub store: StoreSettings,
    /// Service levels
    pub degradation: DegradationSettings,
}

impl Settings {
    /// Load settings
    ///
    /// An explicit path must exist. Without one, `<root>/cutover.toml` is used
    /// if present, otherwise defaults.
    ///
    /// # Errors
    /// Unreadable or malformed settings file
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = root.join(SETTINGS_FILE);
                if !default.is_file() {
                    tracing::debug!("no {} found, using defaults", SETTINGS_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Self::from_toml(&text)?;
        tracing::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse settings text
    ///
    /// # Errors
    /// [`SettingsError::Parse`]
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }
}

/// File locations, relative to the repository root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Live deployment configuration
    pub deployment_config: PathBuf,
    /// Snapshot directories
    pub backups: PathBuf,
    /// Run logs (`migration/` and `rollback/` below it)
    pub logs: PathBuf,
    /// Pre-rollback safety copies
    pub rollback_safety: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            deployment_config: PathBuf::from("vercel.json"),
            backups: PathBuf::from("backups"),
            logs: PathBuf::from("logs"),
            rollback_safety: PathBuf::from("backups/rollback-safety"),
        }
    }
}

impl PathSettings {
    /// Resolve against a repository root
    #[must_use]
    pub fn layout(&self, root: &Path) -> Layout {
        let logs = root.join(&self.logs);
        Layout {
            root: root.to_path_buf(),
            deployment_config: root.join(&self.deployment_config),
            backups: root.join(&self.backups),
            migration_logs: logs.join("migration"),
            rollback_logs: logs.join("rollback"),
            rollback_safety: root.join(&self.rollback_safety),
        }
    }
}

/// Absolute paths for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Repository root
    pub root: PathBuf,
    /// Live deployment configuration
    pub deployment_config: PathBuf,
    /// Snapshot directories
    pub backups: PathBuf,
    /// Forward run logs
    pub migration_logs: PathBuf,
    /// Reverse run logs
    pub rollback_logs: PathBuf,
    /// Pre-rollback safety copies
    pub rollback_safety: PathBuf,
}

/// What a new-system component provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// An API route
    Route,
    /// Monitoring hook
    Monitoring,
    /// Cache layer
    Cache,
}

impl ComponentKind {
    /// Check-name segment
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Monitoring => "monitoring",
            Self::Cache => "cache",
        }
    }
}

/// A source file the new system needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Path relative to the root
    pub path: PathBuf,
    /// What it provides
    pub kind: ComponentKind,
}

impl Component {
    fn new(path: &str, kind: ComponentKind) -> Self {
        Self {
            path: PathBuf::from(path),
            kind,
        }
    }
}

/// Forward run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Jobs the current deployment configuration must declare
    pub expected_jobs: usize,
    /// Endpoint files the current deployment serves
    pub endpoint_files: Vec<PathBuf>,
    /// Files the new system consists of
    pub components: Vec<Component>,
    /// Workflow the fallback dispatches
    pub fallback_workflow: PathBuf,
    /// Operation the fallback workflow covers
    pub fallback_operation: String,
    /// Data store round trip above which the timing check warns
    pub timing_budget_ms: u64,
    /// Command printed in the report's rollback hint
    pub rollback_command: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            expected_jobs: 2,
            endpoint_files: vec![
                PathBuf::from("app/api/cron/daily-scan/route.ts"),
                PathBuf::from("app/api/cron/validate/route.ts"),
            ],
            components: vec![
                Component::new("app/api/audit/route.ts", ComponentKind::Route),
                Component::new("lib/monitoring/health.ts", ComponentKind::Monitoring),
                Component::new("lib/cache/audit-cache.ts", ComponentKind::Cache),
            ],
            fallback_workflow: PathBuf::from(".github/workflows/fallback-audit.yml"),
            fallback_operation: "audit-complete".to_string(),
            timing_budget_ms: 1000,
            rollback_command: "rollback".to_string(),
        }
    }
}

/// Reverse run settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackSettings {
    /// Endpoint files that must exist after a rollback
    pub canonical_endpoints: Vec<PathBuf>,
    /// Recipient of the rollback email
    pub operator_email: String,
    /// Simulated traffic pause
    pub pause_secs: u64,
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            canonical_endpoints: MigrationSettings::default().endpoint_files,
            operator_email: "ops@example.com".to_string(),
            pause_secs: 2,
        }
    }
}

/// Tracked tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Tables backed up and restored, in restore order
    pub tables: Vec<String>,
    /// Identity column stripped before re-insertion
    pub identity_field: String,
    /// Upsert key per table for non-transactional stores
    ///
    /// Rows of one dump that share a key collapse to the last of them, so
    /// a keyed table may restore fewer rows than were backed up. Restores
    /// into a transactional store ignore these keys.
    pub natural_keys: BTreeMap<String, String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            tables: [
                "scan_results",
                "validation_results",
                "corrections",
                "requests",
                "audit_history",
                "metrics",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            identity_field: "id".to_string(),
            natural_keys: BTreeMap::new(),
        }
    }
}

impl StoreSettings {
    /// Table used for connectivity probes
    #[must_use]
    pub fn probe_table(&self) -> &str {
        self.tables.first().map_or("scan_results", String::as_str)
    }

    /// Upsert key for `table`, if any
    #[must_use]
    pub fn natural_key(&self, table: &str) -> Option<&str> {
        self.natural_keys.get(table).map(String::as_str)
    }
}

/// Service level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationSettings {
    /// Metric thresholds
    pub thresholds: DegradationThresholds,
    /// Lowest level each function stays enabled at
    pub functions: BTreeMap<String, ServiceLevel>,
    /// Platform usage reported by the simulated metrics probe
    pub simulated_usage: SystemMetrics,
}

impl Default for DegradationSettings {
    fn default() -> Self {
        let functions = [
            ("health-endpoint", ServiceLevel::Minimal),
            ("audit-complete", ServiceLevel::Essential),
            ("corrections", ServiceLevel::Essential),
            ("analytics", ServiceLevel::Full),
            ("social-sharing", ServiceLevel::Full),
        ]
        .into_iter()
        .map(|(name, level)| (name.to_string(), level))
        .collect();
        Self {
            thresholds: DegradationThresholds::default(),
            functions,
            simulated_usage: SystemMetrics {
                memory_usage: 45.0,
                cpu_usage: 30.0,
                error_rate: 0.01,
            },
        }
    }
}

/// Data store connection values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStoreEnv {
    /// URL
    pub url: String,
    /// Service credential
    pub service_key: String,
}

/// Email sender values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendGridEnv {
    /// API key
    pub api_key: String,
    /// Verified sender
    pub from: String,
}

/// Environment values, captured once at startup
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    values: BTreeMap<&'static str, String>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

const KNOWN: [&str; 6] = [
    ENV_STORE_URL,
    ENV_STORE_KEY,
    ENV_SENDGRID_KEY,
    ENV_SENDGRID_FROM,
    ENV_GITHUB_TOKEN,
    ENV_GITHUB_REPOSITORY,
];

impl Environment {
    /// Snapshot the process environment (empty values count as unset)
    #[must_use]
    pub fn capture() -> Self {
        Self::from_pairs(KNOWN.iter().filter_map(|&name| std::env::var(name).ok().map(|v| (name, v))))
    }

    /// Build from explicit pairs; unknown names are ignored
    #[must_use]
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .filter(|(name, _)| KNOWN.contains(name))
            .map(|(name, value)| (name, value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        Self { values }
    }

    /// Value of one variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether a variable is set
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Data store values, required in both directions
    ///
    /// # Errors
    /// [`SettingsError::MissingEnv`] naming every unset value
    pub fn require_data_store(&self) -> Result<DataStoreEnv, SettingsError> {
        match (self.get(ENV_STORE_URL), self.get(ENV_STORE_KEY)) {
            (Some(url), Some(key)) => Ok(DataStoreEnv {
                url: url.to_string(),
                service_key: key.to_string(),
            }),
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push(ENV_STORE_URL);
                }
                if key.is_none() {
                    missing.push(ENV_STORE_KEY);
                }
                Err(SettingsError::MissingEnv(missing))
            }
        }
    }

    /// Email values, if both are set
    #[must_use]
    pub fn sendgrid(&self) -> Option<SendGridEnv> {
        Some(SendGridEnv {
            api_key: self.get(ENV_SENDGRID_KEY)?.to_string(),
            from: self.get(ENV_SENDGRID_FROM)?.to_string(),
        })
    }

    /// Workflow dispatch credentials, if both are set
    #[must_use]
    pub fn github(&self) -> Option<(&str, &str)> {
        Some((self.get(ENV_GITHUB_TOKEN)?, self.get(ENV_GITHUB_REPOSITORY)?))
    }
}
