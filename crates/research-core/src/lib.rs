use chrono::Local;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One earlier exchange handed to the answering collaborator as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorTurn {
    pub user_query: String,
    pub ai_response: String,
}

impl PriorTurn {
    pub fn new(user_query: impl Into<String>, ai_response: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ai_response: ai_response.into(),
        }
    }
}

impl From<(String, String)> for PriorTurn {
    fn from((user_query, ai_response): (String, String)) -> Self {
        Self {
            user_query,
            ai_response,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub text: String,
    /// Human-readable "today" label the answerer uses to anchor time-sensitive searches.
    pub time_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<PriorTurn>>,
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time_label: Local::now().format("%Y-%m-%d").to_string(),
            history: None,
        }
    }

    pub fn with_time_label(mut self, label: impl Into<String>) -> Self {
        self.time_label = label.into();
        self
    }

    pub fn with_history(mut self, history: Vec<PriorTurn>) -> Self {
        self.history = if history.is_empty() { None } else { Some(history) };
        self
    }
}

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("No active session")]
    NoActiveSession,

    #[error("Query cannot be empty")]
    EmptyQuery,

    #[error("External query failed: {0}")]
    ExternalQuery(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Export failed: {0}")]
    ExportIo(std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ResearchError>;

/// The external collaborator that turns a query (plus earlier turns) into an answer.
///
/// Implementations may be slow and perform network I/O; the session core
/// treats them as opaque.
#[async_trait::async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, query: ResearchQuery) -> Result<String>;
}
