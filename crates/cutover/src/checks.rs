//! Individual observations shared by both directions
//!
//! Each helper returns a [`HealthCheck`] and never fails; the caller decides
//! whether to record it or raise.

use crate::settings::Environment;
use cutover_backup::ConfigGateway;
use cutover_core::{HealthCheck, HealthStatus};
use cutover_store::DataStore;
use serde_json::json;
use std::path::Path;
use std::time::{Duration, Instant};

/// Deployment configuration declares `expected` jobs
#[must_use]
pub fn deployment_config(name: &str, gateway: &ConfigGateway, expected: usize) -> HealthCheck {
    match gateway.job_count() {
        Ok(found) if found == expected => {
            HealthCheck::pass(name, format!("{found} cron jobs configured")).with_details(json!({ "jobs": found }))
        }
        Ok(found) => HealthCheck::fail(name, format!("Expected {expected} cron jobs, found {found}"))
            .with_details(json!({ "expected": expected, "found": found })),
        Err(e) => HealthCheck::fail(name, e.to_string()),
    }
}

/// Data store answers a probe; also returns the round trip
pub async fn data_store(name: &str, store: &dyn DataStore) -> (HealthCheck, Duration) {
    let started = Instant::now();
    let outcome = store.ping().await;
    let elapsed = started.elapsed();
    let check = match outcome {
        Ok(()) => HealthCheck::pass(name, format!("Data store reachable ({})", store.kind()))
            .with_details(json!({ "latencyMs": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX) })),
        Err(e) => HealthCheck::fail(name, format!("Data store unreachable: {e}")),
    };
    (check, elapsed)
}

/// File exists under `root`; `missing` decides the status when it does not
#[must_use]
pub fn file_present(name: &str, root: &Path, rel: &Path, missing: HealthStatus) -> HealthCheck {
    if root.join(rel).is_file() {
        HealthCheck::pass(name, format!("{} present", rel.display()))
    } else {
        HealthCheck::new(name, missing, format!("{} missing", rel.display()))
    }
}

/// Environment value is set
#[must_use]
pub fn env_value(name: &str, env: &Environment, var: &str) -> HealthCheck {
    if env.is_set(var) {
        HealthCheck::pass(name, format!("{var} is set"))
    } else {
        HealthCheck::fail(name, format!("{var} is not set"))
    }
}
