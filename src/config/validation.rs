//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (events and dependencies name known warnables)
//! - Catch duplicate warnable codes before registration would panic
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HealthConfig → Result<(), Vec<ValidationError>>

use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::schema::HealthConfig;

/// Longest accepted startup grace window.
pub const MAX_STARTUP_GRACE_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("warnable #{index} has an empty code")]
    EmptyCode { index: usize },

    #[error("warnable code {0:?} is defined more than once")]
    DuplicateCode(String),

    #[error("warnable {warnable:?} depends on unknown warnable {dependency:?}")]
    UnknownDependency { warnable: String, dependency: String },

    #[error("event #{index} references unknown warnable {warnable:?}")]
    UnknownEventWarnable { index: usize, warnable: String },

    #[error("startup grace of {0} ms exceeds the {max} ms maximum", max = MAX_STARTUP_GRACE_MS)]
    GraceTooLong(u64),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HealthConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tracker.startup_grace_ms > MAX_STARTUP_GRACE_MS {
        errors.push(ValidationError::GraceTooLong(config.tracker.startup_grace_ms));
    }

    let mut codes = BTreeSet::new();
    for (index, w) in config.warnables.iter().enumerate() {
        if w.code.is_empty() {
            errors.push(ValidationError::EmptyCode { index });
        } else if !codes.insert(w.code.as_str()) {
            errors.push(ValidationError::DuplicateCode(w.code.clone()));
        }
    }

    for w in &config.warnables {
        for dep in &w.depends_on {
            if !codes.contains(dep.as_str()) {
                errors.push(ValidationError::UnknownDependency {
                    warnable: w.code.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    for (index, event) in config.events.iter().enumerate() {
        if let Some(code) = event.warnable() {
            if !codes.contains(code) {
                errors.push(ValidationError::UnknownEventWarnable {
                    index,
                    warnable: code.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
