//! Cutover - guarded migration and rollback of a serverless deployment
//!
//! Two orchestrators over the same executor:
//! - [`MigrationDeployer`]: the forward path (validate, back up, deploy,
//!   check, clean up); a failing phase may compensate itself, then the run
//!   aborts
//! - [`MigrationRollback`]: the reverse path (restore from a backup);
//!   critical failures abort unless forced
//!
//! Both accumulate records into an explicit context, render a report and
//! persist a JSON run log.
//!
//! # Example
//!
//! ```rust,ignore
//! use cutover::prelude::*;
//!
//! let settings = Settings::load(&root, None)?;
//! let layout = settings.paths.layout(&root);
//! let deployer = MigrationDeployer::new(settings, layout, env, store);
//! let mut ctx = ForwardContext::new(MigrationRun::new().dry_run(true));
//! let outcome = deployer.execute(&mut ctx).await;
//! ```

pub mod checks;
pub mod cli;
pub mod deploy;
pub mod logs;
pub mod rollback;
pub mod settings;

pub use deploy::{migration_plan, ForwardContext, MigrationDeployer, MigrationRun, Phase};
pub use rollback::{rollback_plan, MigrationRollback, RollbackContext, RollbackRun, Step};
pub use settings::{Environment, Layout, Settings, SettingsError};

/// Prelude module for common imports
pub mod prelude {
    //! Orchestrators, their run types and settings
    pub use crate::{
        Environment, ForwardContext, Layout, MigrationDeployer, MigrationRollback, MigrationRun, RollbackContext,
        Settings,
    };
    pub use cutover_core::{CutoverError, RunResult};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
