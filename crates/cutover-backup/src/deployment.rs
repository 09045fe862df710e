//! Deployment configuration file
//!
//! The live `vercel.json` at the repository root. Only its shape is
//! enforced: a top-level object whose `crons` member is an array.

use crate::error::BackupError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reads and replaces the live deployment configuration
#[derive(Debug, Clone)]
pub struct ConfigGateway {
    path: PathBuf,
}

/// Why a configuration value has the wrong shape, if it does
#[must_use]
pub fn shape_error(config: &Value) -> Option<&'static str> {
    match config.get("crons") {
        None => Some("missing crons"),
        Some(Value::Array(_)) => None,
        Some(_) => Some("crons is not an array"),
    }
}

impl ConfigGateway {
    /// Gateway for the file at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Live configuration path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the live file exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Parse the live file
    ///
    /// # Errors
    /// Unreadable file or invalid JSON
    pub fn load(&self) -> Result<Value, BackupError> {
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Parse and check the `crons` array
    ///
    /// # Errors
    /// [`BackupError::InvalidConfig`] on a wrong shape, plus [`load`](Self::load) errors
    pub fn validate_shape(&self) -> Result<Value, BackupError> {
        let config = self.load()?;
        match shape_error(&config) {
            None => Ok(config),
            Some(reason) => Err(BackupError::InvalidConfig {
                path: self.path.clone(),
                reason: reason.to_string(),
            }),
        }
    }

    /// Number of declared jobs
    ///
    /// # Errors
    /// See [`validate_shape`](Self::validate_shape)
    pub fn job_count(&self) -> Result<usize, BackupError> {
        let config = self.validate_shape()?;
        Ok(config["crons"].as_array().map_or(0, Vec::len))
    }

    /// Copy the live file to `dest`, creating parent directories
    ///
    /// # Errors
    /// I/O failures
    pub fn copy_aside(&self, dest: &Path) -> Result<(), BackupError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.path, dest)?;
        tracing::debug!("copied {} to {}", self.path.display(), dest.display());
        Ok(())
    }

    /// Overwrite the live file with `source`
    ///
    /// # Errors
    /// I/O failures
    pub fn restore_from(&self, source: &Path) -> Result<(), BackupError> {
        if !source.is_file() {
            return Err(BackupError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", source.display()),
            )));
        }
        std::fs::copy(source, &self.path)?;
        tracing::info!("restored {} from {}", self.path.display(), source.display());
        Ok(())
    }
}
