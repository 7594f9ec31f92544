use thiserror::Error;

/// Failure taxonomy shared by the transport client and the flow controllers.
///
/// `Cancelled` is deliberately part of the error type: controllers treat it as
/// a silent no-op rather than something to surface to the user.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Login required")]
    AuthRequired,
    #[error("Network failure: {0}")]
    Transport(String),
    #[error("Backend rejected request: HTTP {status}")]
    BackendRejection { status: u16, body: String },
    #[error("Response missing expected field; keys present: [{}]", keys.join(", "))]
    PayloadMismatch { keys: Vec<String> },
    #[error("{0}")]
    UserInput(String),
    #[error("Cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
