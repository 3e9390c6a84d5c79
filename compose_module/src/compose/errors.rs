use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ComposeError {
    Io(io::Error),
    MissingApiKey,
    EmptyRequest,
    Http(reqwest::Error),
    Api { status: u16, message: String },
    EmptyResponse,
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::Io(err) => write!(f, "I/O error: {}", err),
            ComposeError::MissingApiKey => write!(f, "GEMINI_API_KEY is not configured."),
            ComposeError::EmptyRequest => write!(f, "Provide a prompt, an image, or both."),
            ComposeError::Http(err) => write!(f, "Gemini request failed: {}", err),
            ComposeError::Api { status, message } => {
                write!(f, "Gemini API error (status {}): {}", status, message)
            }
            ComposeError::EmptyResponse => write!(f, "Gemini returned no text."),
        }
    }
}

impl std::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposeError::Io(err) => Some(err),
            ComposeError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ComposeError {
    fn from(err: io::Error) -> Self {
        ComposeError::Io(err)
    }
}

impl From<reqwest::Error> for ComposeError {
    fn from(err: reqwest::Error) -> Self {
        ComposeError::Http(err)
    }
}
