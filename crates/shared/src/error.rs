use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Storage,
    NoCandidates,
    EmptyCache,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("storage failure: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("no candidates: remote listing returned zero items")]
    NoCandidates,
    #[error("empty cache: {0}")]
    EmptyCache(String),
}

impl PipelineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn storage_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } => FailureKind::Transport,
            Self::Storage { .. } => FailureKind::Storage,
            Self::NoCandidates => FailureKind::NoCandidates,
            Self::EmptyCache(_) => FailureKind::EmptyCache,
        }
    }
}
