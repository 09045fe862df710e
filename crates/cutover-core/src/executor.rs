//! Sequential stage executor
//!
//! One executor serves both directions. It walks a plan in declared order,
//! calls `execute` then `validate` for each stage, records a [`StepRecord`]
//! and applies the run's [`FailurePolicy`] on failure.
//!
//! # Invariants
//!
//! - Stages run strictly in plan order, one at a time.
//! - A stage's rollback runs at most once, only right after that same
//!   stage's validation returned `false`, and only under
//!   [`FailurePolicy::Compensate`]. Earlier stages are never compensated.
//! - When the run aborts, no later stage is touched. A failed non-critical
//!   stage never aborts the run under either policy.
//! - `success` is derived from critical stages only.

use crate::error::{CutoverError, StageError};
use crate::plan::{FailurePolicy, StageSpec};
use crate::result::{RunResult, StepRecord, StepStatus};
use std::time::Instant;
use tracing::Instrument;

/// What a stage body reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Work done; proceed to validation
    Done(String),
    /// Nothing to do; validation is not run
    Skipped(String),
}

impl StageOutcome {
    /// Work done with a message
    #[inline]
    pub fn done(message: impl Into<String>) -> Self {
        Self::Done(message.into())
    }

    /// Nothing to do, with the reason
    #[inline]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// Stage behavior, dispatched on the stage tag
///
/// Implement this trait to give a plan's tags their side effects.
#[async_trait::async_trait]
pub trait StageHandler: Send + Sync {
    /// Tag type used in the plan
    type Stage: Send + Sync;
    /// Per-run state threaded through every stage
    type Context: Send;

    /// Perform the stage's side effects
    ///
    /// `progress` holds the records of the stages attempted so far.
    async fn execute(
        &self,
        stage: &Self::Stage,
        ctx: &mut Self::Context,
        progress: &RunResult,
    ) -> Result<StageOutcome, StageError>;

    /// Check the stage left the system in the expected state
    async fn validate(&self, stage: &Self::Stage, ctx: &mut Self::Context)
        -> Result<bool, StageError>;

    /// Compensate a failed validation (only called for compensated stages)
    async fn rollback(&self, stage: &Self::Stage, ctx: &mut Self::Context) -> Result<(), StageError> {
        let _ = (stage, ctx);
        Ok(())
    }
}

enum Attempt {
    Passed(String),
    Skipped(String),
    Invalid,
    Errored(StageError),
}

async fn attempt<H: StageHandler>(
    handler: &H,
    stage: &H::Stage,
    ctx: &mut H::Context,
    progress: &RunResult,
) -> Attempt {
    let outcome = match handler.execute(stage, ctx, progress).await {
        Ok(outcome) => outcome,
        Err(e) => return Attempt::Errored(e),
    };
    match outcome {
        StageOutcome::Skipped(reason) => Attempt::Skipped(reason),
        StageOutcome::Done(message) => match handler.validate(stage, ctx).await {
            Ok(true) => Attempt::Passed(message),
            Ok(false) => Attempt::Invalid,
            Err(e) => Attempt::Errored(e),
        },
    }
}

/// Runs a plan under a failure policy
#[derive(Debug, Clone, Copy)]
pub struct Sequencer<'p, K> {
    plan: &'p [StageSpec<K>],
    policy: FailurePolicy,
}

impl<'p, K> Sequencer<'p, K>
where
    K: Send + Sync,
{
    /// Create a sequencer over a plan
    #[inline]
    #[must_use]
    pub fn new(plan: &'p [StageSpec<K>], policy: FailurePolicy) -> Self {
        Self { plan, policy }
    }

    /// The plan being run
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &'p [StageSpec<K>] {
        self.plan
    }

    /// Run every stage in order
    ///
    /// # Errors
    /// - [`CutoverError::PhaseFailed`] under [`FailurePolicy::Compensate`] on
    ///   the first failing critical stage
    /// - [`CutoverError::CriticalStepFailed`] under
    ///   [`FailurePolicy::CriticalUnlessForced`] when a critical stage fails
    ///   and `force` is off
    ///
    /// Both carry the partial [`RunResult`].
    pub async fn run<H>(&self, handler: &H, ctx: &mut H::Context) -> Result<RunResult, CutoverError>
    where
        H: StageHandler<Stage = K>,
    {
        let started = Instant::now();
        let mut result = RunResult::new();

        for spec in self.plan {
            let span = tracing::info_span!("stage", name = spec.name);
            tracing::info!(parent: &span, "▶ {}: {}", spec.name, spec.description);

            let step_started = Instant::now();
            let outcome = attempt(handler, &spec.kind, ctx, &result)
                .instrument(span.clone())
                .await;
            let elapsed = step_started.elapsed();

            let (reason, validation_failed) = match outcome {
                Attempt::Passed(message) => {
                    tracing::info!(parent: &span, "✅ {} completed", spec.name);
                    result.steps.push(StepRecord::new(
                        spec.name,
                        StepStatus::Success,
                        message,
                        elapsed,
                        spec.critical,
                    ));
                    continue;
                }
                Attempt::Skipped(reason) => {
                    tracing::info!(parent: &span, "⏭️ {} skipped: {}", spec.name, reason);
                    result.steps.push(StepRecord::new(
                        spec.name,
                        StepStatus::Skipped,
                        reason,
                        elapsed,
                        spec.critical,
                    ));
                    continue;
                }
                Attempt::Invalid => {
                    tracing::error!(parent: &span, "❌ {} failed validation", spec.name);
                    result.steps.push(StepRecord::new(
                        spec.name,
                        StepStatus::Failed,
                        "Validation failed",
                        elapsed,
                        spec.critical,
                    ));
                    ("validation failed".to_string(), true)
                }
                Attempt::Errored(e) => {
                    let reason = e.to_string();
                    tracing::error!(parent: &span, "❌ {} raised: {}", spec.name, reason);
                    result.steps.push(StepRecord::new(
                        spec.name,
                        StepStatus::Failed,
                        reason.clone(),
                        elapsed,
                        spec.critical,
                    ));
                    result.errors.push(format!("{}: {}", spec.name, reason));
                    (reason, false)
                }
            };

            match self.policy {
                FailurePolicy::Compensate => {
                    if !spec.critical {
                        tracing::warn!(parent: &span, "non-critical phase {} failed, continuing", spec.name);
                        if validation_failed {
                            result.errors.push(format!("{}: validation failed", spec.name));
                        }
                        continue;
                    }
                    if validation_failed && spec.compensated {
                        tracing::warn!(parent: &span, "↩ rolling back {}", spec.name);
                        if let Err(e) = handler
                            .rollback(&spec.kind, ctx)
                            .instrument(span.clone())
                            .await
                        {
                            tracing::error!(parent: &span, "rollback of {} failed: {}", spec.name, e);
                            result.errors.push(format!("{} rollback: {}", spec.name, e));
                        }
                    }
                    result.finish(started.elapsed());
                    return Err(CutoverError::PhaseFailed {
                        phase: spec.name.to_string(),
                        reason,
                        result: Box::new(result),
                    });
                }
                FailurePolicy::CriticalUnlessForced { force } => {
                    if !spec.critical {
                        tracing::warn!(parent: &span, "non-critical step {} failed, continuing", spec.name);
                        continue;
                    }
                    if force {
                        tracing::warn!(parent: &span, "critical step {} failed, continuing (force)", spec.name);
                        if validation_failed {
                            result
                                .errors
                                .push(format!("{}: validation failed (forced)", spec.name));
                        }
                        continue;
                    }
                    result.finish(started.elapsed());
                    return Err(CutoverError::CriticalStepFailed {
                        step: spec.name.to_string(),
                        reason,
                        result: Box::new(result),
                    });
                }
            }
        }

        result.finish(started.elapsed());
        Ok(result)
    }
}
