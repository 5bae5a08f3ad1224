use crate::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration literal '{0}' has no unit suffix")]
    MissingUnit(String),
    #[error("duration literal '{0}' has no integer value")]
    MissingValue(String),
    #[error("unknown duration unit '{0}'")]
    UnknownUnit(String),
}

#[derive(Debug, Error, Clone)]
#[error("scenario validation failed with {errors_count} error(s)")]
pub struct ValidationError {
    pub diagnostics: Vec<Diagnostic>,
    pub errors_count: usize,
}

impl ValidationError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        let errors_count = diagnostics.iter().filter(|d| d.is_error()).count();
        Self {
            diagnostics,
            errors_count,
        }
    }
}
