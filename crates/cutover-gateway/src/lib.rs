//! Cutover Gateway - outbound HTTP collaborators
//!
//! - [`NotificationGateway`] / [`SendGridNotifier`]: operator email
//! - [`WorkflowDispatch`]: a [`FallbackAction`](cutover_core::FallbackAction)
//!   that triggers a CI workflow

pub mod email;
pub mod error;
pub mod workflow;

pub use email::{compose_rollback_email, EmailMessage, NotificationGateway, RollbackNotice, SendGridNotifier};
pub use error::GatewayError;
pub use workflow::WorkflowDispatch;
