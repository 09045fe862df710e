//! Gateway errors

use cutover_core::StageError;

/// Errors from outbound HTTP collaborators
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request never got a response
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote API rejected the request
    #[error("api returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Email body could not be rendered
    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),

    /// Credential is not a valid header value
    #[error("invalid credential for {0}")]
    InvalidCredential(&'static str),
}

impl GatewayError {
    /// Map a non-success response into [`GatewayError::Api`]
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Self::Api { status, message }
    }
}

impl From<GatewayError> for StageError {
    fn from(err: GatewayError) -> Self {
        StageError::collaborator("notification gateway", err)
    }
}
