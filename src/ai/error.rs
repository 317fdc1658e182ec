use derive_more::Display;
use reqwest::StatusCode;

/// Everything that can go wrong while scoring a leave reason.
#[derive(Debug, Display)]
pub enum ReasonCheckError {
    #[display(fmt = "reason check disabled: no API key configured")]
    MissingApiKey,

    #[display(fmt = "invalid API key header: {}", _0)]
    InvalidApiKey(String),

    #[display(fmt = "transport error: {}", _0)]
    Transport(reqwest::Error),

    #[display(fmt = "HTTP {} from {}: {}", status, url, snippet)]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    #[display(fmt = "no choices in response")]
    EmptyChoices,

    #[display(fmt = "invalid message structure")]
    InvalidMessage,

    #[display(fmt = "empty response content")]
    EmptyContent,

    #[display(fmt = "decode error: {}", _0)]
    Decode(String),
}

impl std::error::Error for ReasonCheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReasonCheckError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ReasonCheckError {
    fn from(e: reqwest::Error) -> Self {
        ReasonCheckError::Transport(e)
    }
}

/// First 200 characters of an upstream body, for logs.
pub fn make_snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
