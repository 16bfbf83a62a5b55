//! Request, result and envelope types shared by all operations

use std::time::Instant;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to a file already uploaded to the model provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment
{   pub file_uri: String
  , pub mime_type: String
}

/// What gets sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Contents
{   Text(String)
  , WithAttachment(String, Attachment)
}

impl Contents
{   pub fn prompt(&self) -> &str
    {   match self
        {   Contents::Text(p) | Contents::WithAttachment(p, _) => p
        }
    }
}

/// One generation request. Built once, then handed to the
/// orchestrator by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest
{   pub contents: Contents
  , pub primary_model: String
  , pub max_output_tokens: u32
  , /// Overrides the configured default when set
    pub temperature: Option<f32>
  , /// Overrides the configured default when set
    pub top_p: Option<f32>
}

impl GenerationRequest
{   pub fn new(
      contents: Contents
    , primary_model: impl Into<String>
    , max_output_tokens: u32
    ) -> Self
    {   GenerationRequest
        {   contents
          , primary_model: primary_model.into()
          , max_output_tokens
          , temperature: None
          , top_p: None
        }
    }

    pub fn text(
      prompt: impl Into<String>
    , primary_model: impl Into<String>
    , max_output_tokens: u32
    ) -> Self
    {   Self::new(
          Contents::Text(prompt.into())
        , primary_model
        , max_output_tokens
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self
    {   self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self
    {   self.top_p = Some(top_p);
        self
    }
}

/// Successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult
{   /// Generated text, trimmed
    pub text: String
  , /// Model that produced the text
    pub model: String
  , pub generation_time_seconds: f64
}

/// Outcome of one call against one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome
{   Success
  , TransientFailure(String)
  , RateLimited
  , FatalFailure(String)
}

/// A single call, kept only long enough to be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt
{   pub model_name: String
  , pub attempt_number: usize
  , pub outcome: AttemptOutcome
}

// ===== Envelopes =====

/// Extra data attached when the model output had the wrong shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails
{   pub raw_output: String
  , pub parse_error: String
  , pub generation_time_seconds: f64
}

/// Uniform result of every caller-facing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T>
{   pub success: bool
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
  , /// Wall time of the whole operation, in seconds
    pub time_elapsed: f64
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetails>
}

impl<T> Envelope<T>
{   pub fn ok(payload: T, time_elapsed: f64) -> Self
    {   Envelope
        {   success: true
          , payload: Some(payload)
          , error: None
          , time_elapsed
          , failure: None
        }
    }

    pub fn fail(error: &crate::error::Error, time_elapsed: f64) -> Self
    {   let failure = match error
        {   crate::error::Error::MalformedOutput
            {   source
              , raw_output
              , generation_time_seconds
            } => Some(FailureDetails
              {   raw_output: raw_output.clone()
                , parse_error: source.to_string()
                , generation_time_seconds: *generation_time_seconds
              })
          , _ => None
        };
        Envelope
        {   success: false
          , payload: None
          , error: Some(error.to_string())
          , time_elapsed
          , failure
        }
    }

    /// Wrap a result, timing from `started`
    pub fn from_result(
      result: crate::error::Result<T>
    , started: Instant
    ) -> Self
    {   let elapsed = started.elapsed().as_secs_f64();
        match result
        {   Ok(payload) => Envelope::ok(payload, elapsed)
          , Err(e) => Envelope::fail(&e, elapsed)
        }
    }
}

/// Payload of a generated note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note
{   /// Template fields filled by the model, plus `_generation_time`
    pub medical_note: Map<String, Value>
  , pub generation_time_seconds: f64
}

/// Payload of a template extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFields
{   #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>
  , pub fields: Map<String, Value>
  , pub field_count: usize
}

/// Payload of an audio transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription
{   pub text: String
  , pub file_size_mb: f64
}
