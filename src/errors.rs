use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudioError {
    #[error("invalid input: {0}")] Validation(String),
    #[error("transport error: {0}")] Transport(String),
    #[error("cancelled by user")] Cancelled,
    #[error("could not extract a document from the response: {0}")] Extraction(String),
    #[error("image limit reached ({0} max)")] Capacity(usize),
    #[error("storage error: {0}")] Storage(String),
    #[error("provider error: {0}")] Provider(String),
}

/// How an error should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Warning,
    Error,
}

impl StudioError {
    pub fn tone(&self) -> Tone {
        match self {
            StudioError::Cancelled => Tone::Neutral,
            StudioError::Validation(_) | StudioError::Extraction(_) | StudioError::Capacity(_) => Tone::Warning,
            StudioError::Transport(_) | StudioError::Storage(_) | StudioError::Provider(_) => Tone::Error,
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(e: reqwest::Error) -> Self {
        StudioError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for StudioError {
    fn from(e: std::io::Error) -> Self {
        StudioError::Storage(e.to_string())
    }
}
