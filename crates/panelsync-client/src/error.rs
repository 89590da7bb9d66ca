use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("Malformed token payload: {0}")]
    Token(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
