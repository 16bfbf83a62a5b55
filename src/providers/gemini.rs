use async_trait::async_trait;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{CallError, Error};
use crate::providers::{FileState, FileStore, ModelBackend, UploadedFile};
use crate::request::Contents;

const API_VERSION: &str = "v1beta";

// ===== Message Types =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData
{   pub mime_type: String
  , pub file_uri: String
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>
  , #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings
{   pub temperature: f32
  , pub top_p: f32
  , pub max_output_tokens: u32
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest
{   pub contents: Vec<Content>
  , pub generation_config: GenerationSettings
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<Content>
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource
{   pub name: String
  , #[serde(default)]
    pub uri: String
  , #[serde(default)]
    pub mime_type: String
  , #[serde(default)]
    pub state: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
struct UploadResponse
{   file: FileResource
}

impl GenerateContentRequest
{   pub fn build(
      contents: &Contents
    , max_tokens: u32
    , temperature: f32
    , top_p: f32
    ) -> Self
    {   let mut parts = vec![
          Part
          {   text: Some(contents.prompt().to_string())
            , file_data: None
          }
        ];
        if let Contents::WithAttachment(_, attachment) = contents
        {   parts.push(Part
            {   text: None
              , file_data: Some(FileData
                {   mime_type: attachment.mime_type.clone()
                  , file_uri: attachment.file_uri.clone()
                })
            });
        }
        GenerateContentRequest
        {   contents: vec![
              Content
              {   role: Some("user".to_string())
                , parts
              }
            ]
          , generation_config: GenerationSettings
            {   temperature
              , top_p
              , max_output_tokens: max_tokens
            }
        }
    }
}

impl GenerateContentResponse
{   /// Concatenated text of the first candidate
    pub fn text(&self) -> Option<String>
    {   let candidate = self.candidates.first()?;
        let content = candidate.content.as_ref()?;
        Some(
          content.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>()
        )
    }

    /// Why [`GenerateContentResponse::text`] came back empty
    fn missing_text_reason(&self) -> String
    {   match self.candidates.first()
        {   None => "Gemini response contained no candidates".to_string()
          , Some(candidate) => format!(
              "Gemini returned no content (finish reason: {})",
              candidate.finish_reason.as_deref().unwrap_or("unknown")
            )
        }
    }
}

impl FileResource
{   fn file_state(&self) -> FileState
    {   match self.state.as_deref()
        {   Some("PROCESSING") => FileState::Processing
          , Some("FAILED") => FileState::Failed
          , _ => FileState::Ready
        }
    }

    fn into_uploaded(self) -> UploadedFile
    {   let state = self.file_state();
        UploadedFile
        {   name: self.name
          , uri: self.uri
          , mime_type: self.mime_type
          , state
        }
    }
}

// ===== Gemini Client =====

/// HTTP client for the Gemini generative language API.
///
/// Constructed once by the application and shared; it keeps no state
/// between calls beyond the connection pool.
#[derive(Clone)]
pub struct GeminiClient
{   api_key: String
  , api_base: String
  , http_client: reqwest::Client
}

impl GeminiClient
{   /// Fails with [`Error::MissingApiKey`] when no key is configured
    pub fn new(config: &ProviderConfig) -> Result<Self, Error>
    {   let api_key = config.api_key
          .as_deref()
          .filter(|k| !k.trim().is_empty())
          .ok_or_else(|| {
            error!("Gemini API key not configured");
            Error::MissingApiKey("GEMINI_API_KEY".to_string())
          })?
          .to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs
        {   builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(|e| {
          error!("Failed to build HTTP client: {}", e);
          Error::InvalidConfiguration(e.to_string())
        })?;

        debug!("Creating GeminiClient for {}", config.api_base);
        Ok(GeminiClient
        {   api_key
          , api_base: config.api_base.trim_end_matches('/').to_string()
          , http_client
        })
    }

    fn resource_url(&self, name: &str) -> String
    {   format!("{}/{}/{}", self.api_base, API_VERSION, name)
    }
}

impl std::fmt::Debug for GeminiClient
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.debug_struct("GeminiClient")
          .field("api_base", &self.api_base)
          .field("api_key", &"[REDACTED]")
          .finish()
    }
}

fn transport_error(e: reqwest::Error) -> CallError
{   error!("HTTP error: {}", e);
    if e.is_timeout()
    {   CallError::from_message(format!("timeout: {}", e))
    } else
    {   CallError::from_message(e.to_string())
    }
}

async fn status_error(response: reqwest::Response) -> CallError
{   let status = response.status();
    let body = response.text().await
      .unwrap_or_else(|_| "Unknown error".to_string());
    error!("Gemini API error {}: {}", status, body);
    CallError::from_message(format!("HTTP {}: {}", status, body))
}

fn parse_error(e: reqwest::Error) -> CallError
{   error!("Parse error: {}", e);
    CallError::fatal(format!("Failed to parse Gemini response: {}", e))
}

#[async_trait]
impl ModelBackend for GeminiClient
{   async fn generate(
      &self
    , model: &str
    , contents: &Contents
    , max_tokens: u32
    , temperature: f32
    , top_p: f32
    ) -> Result<String, CallError>
    {   debug!("Gemini generateContent on {}", model);
        let request = GenerateContentRequest::build(
          contents, max_tokens, temperature, top_p
        );
        trace!("Gemini request: {:?}", request);

        let response = self.http_client
          .post(self.resource_url(&format!("models/{}:generateContent", model)))
          .header("x-goog-api-key", &self.api_key)
          .json(&request)
          .send()
          .await
          .map_err(transport_error)?;

        trace!("Gemini response status: {}", response.status());
        if !response.status().is_success()
        {   return Err(status_error(response).await);
        }

        let body: GenerateContentResponse
          = response.json().await.map_err(parse_error)?;

        body.text().ok_or_else(|| {
          let message = body.missing_text_reason();
          error!("{}", message);
          CallError::fatal(message)
        })
    }
}

#[async_trait]
impl FileStore for GeminiClient
{   async fn upload(
      &self
    , bytes: Vec<u8>
    , mime_type: &str
    , display_name: &str
    ) -> Result<UploadedFile, CallError>
    {   debug!(
          "Uploading {} ({} bytes, {})",
          display_name, bytes.len(), mime_type
        );

        let start = self.http_client
          .post(format!("{}/upload/{}/files", self.api_base, API_VERSION))
          .header("x-goog-api-key", &self.api_key)
          .header("X-Goog-Upload-Protocol", "resumable")
          .header("X-Goog-Upload-Command", "start")
          .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
          .header("X-Goog-Upload-Header-Content-Type", mime_type)
          .json(&serde_json::json!({ "file": { "display_name": display_name } }))
          .send()
          .await
          .map_err(transport_error)?;

        if !start.status().is_success()
        {   return Err(status_error(start).await);
        }

        let upload_url = start.headers()
          .get("x-goog-upload-url")
          .and_then(|v| v.to_str().ok())
          .map(str::to_string)
          .ok_or_else(|| {
            CallError::fatal("Gemini upload session returned no upload URL")
          })?;

        let finished = self.http_client
          .post(upload_url)
          .header("X-Goog-Upload-Offset", "0")
          .header("X-Goog-Upload-Command", "upload, finalize")
          .body(bytes)
          .send()
          .await
          .map_err(transport_error)?;

        if !finished.status().is_success()
        {   return Err(status_error(finished).await);
        }

        let uploaded: UploadResponse
          = finished.json().await.map_err(parse_error)?;
        debug!("File uploaded: {}", uploaded.file.name);
        Ok(uploaded.file.into_uploaded())
    }

    async fn status(
      &self
    , file: &UploadedFile
    ) -> Result<FileState, CallError>
    {   let response = self.http_client
          .get(self.resource_url(&file.name))
          .header("x-goog-api-key", &self.api_key)
          .send()
          .await
          .map_err(transport_error)?;

        if !response.status().is_success()
        {   return Err(status_error(response).await);
        }

        let resource: FileResource
          = response.json().await.map_err(parse_error)?;
        trace!("File {} state {:?}", resource.name, resource.state);
        Ok(resource.file_state())
    }

    async fn delete(
      &self
    , file: &UploadedFile
    ) -> Result<(), CallError>
    {   debug!("Deleting uploaded file {}", file.name);
        let response = self.http_client
          .delete(self.resource_url(&file.name))
          .header("x-goog-api-key", &self.api_key)
          .send()
          .await
          .map_err(transport_error)?;

        if !response.status().is_success()
        {   return Err(status_error(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::request::Attachment;
    use serde_json::json;

    #[test]
    fn request_body_uses_api_field_names()
    {   let contents = Contents::WithAttachment(
          "transcribe".to_string()
        , Attachment
          {   file_uri: "https://files/abc".to_string()
            , mime_type: "audio/wav".to_string()
          }
        );
        let body = serde_json::to_value(
          GenerateContentRequest::build(&contents, 2048, 0.1, 0.95)
        ).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(2048));
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], json!("transcribe"));
        assert_eq!(parts[1]["fileData"]["fileUri"], json!("https://files/abc"));
        assert!(parts[1].get("text").is_none());
    }

    #[test]
    fn response_text_joins_parts()
    {   let response: GenerateContentResponse = serde_json::from_value(json!({
          "candidates": [{
            "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
            "finishReason": "STOP"
          }]
        })).unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello there"));

        let empty: GenerateContentResponse
          = serde_json::from_value(json!({})).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn blocked_candidates_report_their_finish_reason()
    {   let blocked: GenerateContentResponse = serde_json::from_value(json!({
          "candidates": [{"finishReason": "SAFETY"}]
        })).unwrap();
        assert!(blocked.text().is_none());
        assert_eq!(
          blocked.missing_text_reason(),
          "Gemini returned no content (finish reason: SAFETY)"
        );

        let empty: GenerateContentResponse
          = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert_eq!(empty.missing_text_reason(), "Gemini response contained no candidates");
    }

    #[test]
    fn file_states_map_from_api_strings()
    {   let resource = |state: &str| FileResource
        {   name: "files/1".to_string()
          , uri: String::new()
          , mime_type: String::new()
          , state: Some(state.to_string())
        };
        assert_eq!(resource("PROCESSING").file_state(), FileState::Processing);
        assert_eq!(resource("ACTIVE").file_state(), FileState::Ready);
        assert_eq!(resource("FAILED").file_state(), FileState::Failed);
    }

    #[test]
    fn client_requires_an_api_key()
    {   let err = GeminiClient::new(&ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey(_)));
    }
}
