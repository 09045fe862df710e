//! Cutover Core - guarded state transitions between deployments
//!
//! The building blocks shared by the forward migration and the reverse
//! rollback:
//! - [`HealthLog`]: append-only pass/fail/warning observations
//! - [`StageSpec`]: a stage declared as data (name, tag, criticality, rollback)
//! - [`Sequencer`]: the one sequential executor both directions run through
//! - [`RunResult`]: ordered step records, errors and overall success
//! - [`report`]: pure renderers over the accumulated records
//! - [`degradation`]: service levels and the named fallback registry
//!
//! # Example
//!
//! ```rust,ignore
//! use cutover_core::prelude::*;
//!
//! let plan = vec![
//!     StageSpec::new("validate-backup", "Check backup integrity", Step::ValidateBackup),
//!     StageSpec::new("stop-current-system", "Pause traffic", Step::Stop).non_critical(),
//! ];
//! let result = Sequencer::new(&plan, FailurePolicy::critical_unless_forced(false))
//!     .run(&handler, &mut ctx)
//!     .await?;
//! println!("success: {}", result.success);
//! ```

pub mod degradation;
pub mod error;
pub mod executor;
pub mod health;
pub mod plan;
pub mod report;
pub mod result;
pub mod time;

pub use degradation::{
    DegradationManager, DegradationThresholds, FallbackAction, FallbackError, FallbackManager,
    FallbackOutcome, ServiceLevel, SystemMetrics,
};
pub use error::{CutoverError, StageError};
pub use executor::{Sequencer, StageHandler, StageOutcome};
pub use health::{HealthCheck, HealthLog, HealthStatus, HealthTally};
pub use plan::{FailurePolicy, StageSpec};
pub use result::{RunResult, StepRecord, StepStatus};
pub use time::RunTimestamp;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for declaring and running stage plans
    pub use crate::{
        CutoverError, FailurePolicy, HealthCheck, HealthLog, HealthStatus, RunResult, Sequencer,
        StageError, StageHandler, StageOutcome, StageSpec, StepStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
