use std::sync::Arc;

use crate::error::{FailureKind, PipelineError};

/// Progress/outcome report for one orchestrated operation.
///
/// A stream of these always ends in exactly one `Succeeded` or `Failed`.
#[derive(Debug, Clone)]
pub enum ResultState<T> {
    Pending,
    Succeeded(T),
    Failed {
        message: String,
        cause: Option<Arc<PipelineError>>,
    },
}

impl<T> ResultState<T> {
    pub fn from_error(err: PipelineError) -> Self {
        Self::Failed {
            message: err.to_string(),
            cause: Some(Arc::new(err)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn succeeded(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) => Some(value),
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    pub fn into_succeeded(self) -> Option<T> {
        match self {
            Self::Succeeded(value) => Some(value),
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            Self::Pending | Self::Succeeded(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { cause, .. } => cause.as_ref().map(|cause| cause.kind()),
            Self::Pending | Self::Succeeded(_) => None,
        }
    }
}

impl<T> From<Result<T, PipelineError>> for ResultState<T> {
    fn from(value: Result<T, PipelineError>) -> Self {
        match value {
            Ok(value) => Self::Succeeded(value),
            Err(err) => Self::from_error(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/result_tests.rs"]
mod tests;
