//! Model provider boundary and implementations

pub mod gemini;

// Re-export for convenience
pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::request::{Attachment, Contents};

/// A single generation call against one named model.
///
/// Implementations report failures as [`CallError`] so the orchestrator
/// can decide between retrying, falling back or giving up.
#[async_trait]
pub trait ModelBackend: Send + Sync
{   async fn generate(
      &self
    , model: &str
    , contents: &Contents
    , max_tokens: u32
    , temperature: f32
    , top_p: f32
    ) -> Result<String, CallError>;
}

/// Processing state of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState
{   Processing
  , Ready
  , Failed
}

/// Handle to a file held by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile
{   /// Provider-side resource name, used for status and delete
    pub name: String
  , pub uri: String
  , pub mime_type: String
  , pub state: FileState
}

impl UploadedFile
{   pub fn attachment(&self) -> Attachment
    {   Attachment
        {   file_uri: self.uri.clone()
          , mime_type: self.mime_type.clone()
        }
    }
}

/// Upload / poll / delete of binary attachments
#[async_trait]
pub trait FileStore: Send + Sync
{   async fn upload(
      &self
    , bytes: Vec<u8>
    , mime_type: &str
    , display_name: &str
    ) -> Result<UploadedFile, CallError>;

    async fn status(
      &self
    , file: &UploadedFile
    ) -> Result<FileState, CallError>;

    async fn delete(
      &self
    , file: &UploadedFile
    ) -> Result<(), CallError>;
}
