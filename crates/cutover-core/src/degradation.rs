//! Degradation and fallback policy
//!
//! Two axes:
//! - a [`ServiceLevel`] chosen from system metrics against tunable thresholds,
//!   gating which named functions stay enabled;
//! - a [`FallbackManager`] mapping logical operations to compensating
//!   [`FallbackAction`]s (e.g. dispatching an external workflow).
//!
//! # Monotonicity
//!
//! Each function is registered with the *lowest* level at which it remains
//! enabled. A function is enabled at level `L` iff `L >= required`, so
//! anything enabled at `Minimal` is enabled at `Essential` and `Full`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Service level, ordered by feature availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLevel {
    /// Only what keeps the system alive
    Minimal,
    /// Core functions, optional work shed
    Essential,
    /// Everything enabled
    Full,
}

impl fmt::Display for ServiceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "MINIMAL",
            Self::Essential => "ESSENTIAL",
            Self::Full => "FULL",
        })
    }
}

/// Point-in-time system load
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// Memory in use, percent
    pub memory_usage: f64,
    /// CPU in use, percent
    pub cpu_usage: f64,
    /// Failed operations over total, 0.0..=1.0
    pub error_rate: f64,
}

/// Warning and critical thresholds per metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DegradationThresholds {
    /// Memory percent that drops to `Essential`
    pub memory_warning: f64,
    /// Memory percent that drops to `Minimal`
    pub memory_critical: f64,
    /// CPU percent that drops to `Essential`
    pub cpu_warning: f64,
    /// CPU percent that drops to `Minimal`
    pub cpu_critical: f64,
    /// Error rate that drops to `Essential`
    pub error_rate_warning: f64,
    /// Error rate that drops to `Minimal`
    pub error_rate_critical: f64,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            memory_warning: 75.0,
            memory_critical: 90.0,
            cpu_warning: 70.0,
            cpu_critical: 90.0,
            error_rate_warning: 0.05,
            error_rate_critical: 0.15,
        }
    }
}

impl DegradationThresholds {
    /// Map metrics to a service level
    ///
    /// Any critical breach gives `Minimal`, any warning breach `Essential`.
    #[must_use]
    pub fn assess(&self, metrics: &SystemMetrics) -> ServiceLevel {
        if metrics.memory_usage >= self.memory_critical
            || metrics.cpu_usage >= self.cpu_critical
            || metrics.error_rate >= self.error_rate_critical
        {
            ServiceLevel::Minimal
        } else if metrics.memory_usage >= self.memory_warning
            || metrics.cpu_usage >= self.cpu_warning
            || metrics.error_rate >= self.error_rate_warning
        {
            ServiceLevel::Essential
        } else {
            ServiceLevel::Full
        }
    }
}

/// Current service level plus the function registry
#[derive(Debug, Clone)]
pub struct DegradationManager {
    thresholds: DegradationThresholds,
    level: ServiceLevel,
    functions: BTreeMap<String, ServiceLevel>,
    activated_at: Option<DateTime<Utc>>,
}

impl DegradationManager {
    /// Create a manager at `Full` with no registered functions
    #[inline]
    #[must_use]
    pub fn new(thresholds: DegradationThresholds) -> Self {
        Self {
            thresholds,
            level: ServiceLevel::Full,
            functions: BTreeMap::new(),
            activated_at: None,
        }
    }

    /// Register functions with the lowest level each survives at
    #[must_use]
    pub fn with_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = (S, ServiceLevel)>,
        S: Into<String>,
    {
        for (name, lowest) in functions {
            self.functions.insert(name.into(), lowest);
        }
        self
    }

    /// Register one function
    pub fn register_function(&mut self, name: impl Into<String>, lowest: ServiceLevel) {
        self.functions.insert(name.into(), lowest);
    }

    /// Level chosen for the given metrics (does not change the current level)
    #[inline]
    #[must_use]
    pub fn assess_system_load(&self, metrics: &SystemMetrics) -> ServiceLevel {
        self.thresholds.assess(metrics)
    }

    /// Switch to `level`
    pub fn activate_degradation(&mut self, level: ServiceLevel) {
        if level == self.level {
            return;
        }
        if level < self.level {
            tracing::warn!("degrading service level {} -> {}", self.level, level);
        } else {
            tracing::info!("restoring service level {} -> {}", self.level, level);
        }
        self.level = level;
        self.activated_at = Some(Utc::now());
    }

    /// Current level
    #[inline]
    #[must_use]
    pub fn current_level(&self) -> ServiceLevel {
        self.level
    }

    /// When the current level was activated, if ever changed
    #[inline]
    #[must_use]
    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    /// Whether `name` is enabled at the current level
    #[inline]
    #[must_use]
    pub fn is_function_enabled(&self, name: &str) -> bool {
        self.is_enabled_at(name, self.level)
    }

    /// Whether `name` would be enabled at `level`
    ///
    /// Unregistered functions are enabled only at `Full`.
    #[must_use]
    pub fn is_enabled_at(&self, name: &str, level: ServiceLevel) -> bool {
        let required = self
            .functions
            .get(name)
            .copied()
            .unwrap_or(ServiceLevel::Full);
        level >= required
    }

    /// Functions enabled at the current level
    #[must_use]
    pub fn enabled_functions(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|(_, &required)| self.level >= required)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Result of running a fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackOutcome {
    /// Operation that was compensated
    pub operation: String,
    /// Action that ran
    pub action: String,
    /// Action-specific payload
    pub detail: Value,
}

/// Fallback errors
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// No action registered for the operation
    #[error("no fallback registered for operation: {0}")]
    NotRegistered(String),

    /// The action ran and failed
    #[error("fallback {action} failed: {message}")]
    ActionFailed {
        /// Action name
        action: String,
        /// Failure description
        message: String,
    },
}

/// A compensating action for a logical operation
#[async_trait::async_trait]
pub trait FallbackAction: Send + Sync + fmt::Debug {
    /// Action name (for logs)
    fn name(&self) -> &str;

    /// Run the action
    async fn run(&self, operation: &str, params: &Value) -> Result<FallbackOutcome, FallbackError>;
}

/// Registry of fallbacks by operation name
#[derive(Debug, Clone, Default)]
pub struct FallbackManager {
    actions: BTreeMap<String, Arc<dyn FallbackAction>>,
}

impl FallbackManager {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the action for `operation`
    pub fn register(&mut self, operation: impl Into<String>, action: Arc<dyn FallbackAction>) {
        self.actions.insert(operation.into(), action);
    }

    /// Whether `operation` has a fallback
    #[inline]
    #[must_use]
    pub fn is_registered(&self, operation: &str) -> bool {
        self.actions.contains_key(operation)
    }

    /// Registered operation names
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Run the fallback for `operation`
    ///
    /// # Errors
    /// [`FallbackError::NotRegistered`] for unknown operations, otherwise
    /// whatever the action returns
    pub async fn execute_fallback(
        &self,
        operation: &str,
        params: &Value,
    ) -> Result<FallbackOutcome, FallbackError> {
        let action = self
            .actions
            .get(operation)
            .ok_or_else(|| FallbackError::NotRegistered(operation.to_string()))?;
        tracing::warn!("executing fallback {} for {}", action.name(), operation);
        action.run(operation, params).await
    }
}
