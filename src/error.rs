use thiserror::Error as ThisError;

use crate::failover::ErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type for medscribe operations
#[derive(Debug, ThisError)]
pub enum Error
{   /// API key is missing at startup
    #[error("Missing API key for: {0}")]
    MissingApiKey(String)
  , /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
  , /// Caller passed something we refuse to send to a model
    #[error("Validation error: {0}")]
    InvalidInput(String)
  , /// Fatal model call failure, shown verbatim
    #[error("{0}")]
    Call(CallError)
  , /// Every candidate model reported a rate limit
    #[error(
      "API rate limit exceeded on all models. Models tried: {}",
      .models.join(", ")
    )]
    RateLimitExhausted
    {   models: Vec<String>
    }
  , /// Model answered with nothing
    #[error("Model generated empty output")]
    EmptyOutput
  , /// Model output did not have the expected JSON shape
    #[error("Model did not return valid JSON: {source}")]
    MalformedOutput
    {   #[source]
        source: crate::extract::ExtractionError
      , raw_output: String
      , generation_time_seconds: f64
    }
  , /// Audio file missing, empty or unreadable
    #[error("Audio file error: {0}")]
    AudioFile(String)
  , /// Remote side could not process an uploaded file
    #[error("Upload failed: {0}")]
    UploadFailed(String)
  , #[error("Template not found: {0}")]
    TemplateNotFound(String)
  , #[error("Template '{0}' already exists")]
    TemplateExists(String)
  , #[error("I/O error: {0}")]
    Io(#[from] std::io::Error)
  , #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error)
}

impl Error
{   /// Kind of the underlying call error, if this came from a model call
    pub fn call_kind(&self) -> Option<ErrorKind>
    {   match self
        {   Error::Call(e) => Some(e.kind)
          , _ => None
        }
    }
}

/// Failure reported by a model backend for a single call.
///
/// `kind` is decided once, at the backend boundary, by
/// [`crate::failover::classify_error`].
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct CallError
{   pub kind: ErrorKind
  , pub message: String
}

impl CallError
{   /// Build a call error and classify it from its message
    pub fn from_message(message: impl Into<String>) -> Self
    {   let message = message.into();
        let kind = crate::failover::classify_error(&message);
        CallError { kind, message }
    }

    pub fn fatal(message: impl Into<String>) -> Self
    {   CallError
        {   kind: ErrorKind::Fatal
          , message: message.into()
        }
    }
}

impl From<CallError> for Error
{   fn from(e: CallError) -> Self
    {   Error::Call(e)
    }
}
