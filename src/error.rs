use thiserror::Error;

pub type Result<T> = std::result::Result<T, GainError>;

/// Errors surfaced by the library layer.
///
/// Per-file analysis problems never show up here: they are folded into an
/// `AnalysisResult::Failure` and the batch carries on.
#[derive(Error, Debug)]
pub enum GainError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("Loudness analysis failed: {0}")]
    Loudness(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl From<ebur128::Error> for GainError {
    fn from(err: ebur128::Error) -> Self {
        Self::Loudness(format!("{:?}", err))
    }
}
