//! Audio transcription through an uploaded attachment

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::{Orchestrator, Sleeper};
use crate::prompts;
use crate::providers::{FileState, FileStore, UploadedFile};
use crate::request::{Contents, GenerationRequest, Transcription};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// MIME type for an audio file, from its extension
pub fn mime_type_for(path: &Path) -> &'static str
{   let ext = path.extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase);
    match ext.as_deref()
    {   Some("mp3") => "audio/mpeg"
      , Some("m4a") => "audio/mp4"
      , Some("ogg") => "audio/ogg"
      , Some("flac") => "audio/flac"
      , Some("webm") => "audio/webm"
      , _ => "audio/wav"
    }
}

/// A validated audio file read into memory
#[derive(Debug, Clone)]
pub struct AudioFile
{   pub bytes: Vec<u8>
  , pub size_mb: f64
  , pub mime_type: &'static str
  , pub display_name: String
}

impl AudioFile
{   /// Read `path`, rejecting missing or empty files
    pub async fn load(path: &Path) -> Result<Self>
    {   let metadata = tokio::fs::metadata(path).await.map_err(|_| {
          Error::AudioFile(format!("Audio file not found: {}", path.display()))
        })?;
        if !metadata.is_file()
        {   return Err(Error::AudioFile(
              format!("Not a file: {}", path.display())
            ));
        }
        if metadata.len() == 0
        {   return Err(Error::AudioFile("Audio file is empty".to_string()));
        }

        let bytes = tokio::fs::read(path).await?;
        let display_name = path.file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_else(|| "audio".to_string());

        Ok(AudioFile
        {   size_mb: bytes.len() as f64 / BYTES_PER_MB
          , bytes
          , mime_type: mime_type_for(path)
          , display_name
        })
    }
}

/// Uploads audio, waits for the provider to accept it and asks the
/// orchestrator for a transcript.
pub struct Transcriber
{   orchestrator: Arc<Orchestrator>
  , files: Arc<dyn FileStore>
  , sleeper: Arc<dyn Sleeper>
  , model: String
  , max_tokens: u32
  , temperature: f32
  , poll_interval: Duration
}

impl Transcriber
{   pub fn new(
      orchestrator: Arc<Orchestrator>
    , files: Arc<dyn FileStore>
    , sleeper: Arc<dyn Sleeper>
    , config: &Config
    ) -> Self
    {   Transcriber
        {   orchestrator
          , files
          , sleeper
          , model: config.generation.transcription_model.clone()
          , max_tokens: config.generation.max_tokens_transcription
          , temperature: config.transcription.temperature
          , poll_interval: config.transcription.poll_interval()
        }
    }

    pub async fn transcribe(&self, path: &Path) -> Result<Transcription>
    {   let audio = AudioFile::load(path).await?;
        info!(
          "Transcribing {} ({:.2} MB, {})",
          path.display(), audio.size_mb, audio.mime_type
        );

        let file = self.files
          .upload(audio.bytes, audio.mime_type, &audio.display_name)
          .await?;

        let result = self.transcribe_uploaded(&file).await;

        if let Err(e) = self.files.delete(&file).await
        {   warn!("Failed to delete uploaded file {}: {}", file.name, e);
        }

        let text = result?;
        info!("Transcription completed: {} characters", text.chars().count());
        Ok(Transcription
        {   text
          , file_size_mb: audio.size_mb
        })
    }

    async fn transcribe_uploaded(&self, file: &UploadedFile) -> Result<String>
    {   let mut state = file.state;
        while state == FileState::Processing
        {   debug!("File {} still processing", file.name);
            self.sleeper.sleep(self.poll_interval).await;
            state = self.files.status(file).await?;
        }
        if state == FileState::Failed
        {   return Err(Error::UploadFailed(
              "Provider failed to process audio file".to_string()
            ));
        }

        let request = GenerationRequest::new(
          Contents::WithAttachment(prompts::audio_transcription(), file.attachment())
        , self.model.clone()
        , self.max_tokens
        )
        .with_temperature(self.temperature);

        let text = self.orchestrator.generate(&request).await?.text;
        if text.is_empty()
        {   warn!("Model returned an empty transcript for {}", file.name);
            return Err(Error::EmptyOutput);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn mime_types_follow_the_extension()
    {   assert_eq!(mime_type_for(Path::new("visit.MP3")), "audio/mpeg");
        assert_eq!(mime_type_for(Path::new("a/b/visit.m4a")), "audio/mp4");
        assert_eq!(mime_type_for(Path::new("visit.flac")), "audio/flac");
        assert_eq!(mime_type_for(Path::new("visit.webm")), "audio/webm");
        assert_eq!(mime_type_for(Path::new("visit.ogg")), "audio/ogg");
        assert_eq!(mime_type_for(Path::new("visit.wav")), "audio/wav");
        assert_eq!(mime_type_for(Path::new("visit.xyz")), "audio/wav");
        assert_eq!(mime_type_for(Path::new("visit")), "audio/wav");
    }

    #[tokio::test]
    async fn missing_and_empty_files_are_rejected()
    {   let dir = std::env::temp_dir().join(format!("medscribe-audio-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let missing = AudioFile::load(&dir.join("nope.wav")).await.unwrap_err();
        assert!(missing.to_string().contains("not found"));

        let empty = dir.join("empty.wav");
        tokio::fs::write(&empty, b"").await.unwrap();
        let err = AudioFile::load(&empty).await.unwrap_err();
        assert!(err.to_string().contains("empty"));

        let ok = dir.join("visit.mp3");
        tokio::fs::write(&ok, vec![0u8; 2048]).await.unwrap();
        let audio = AudioFile::load(&ok).await.unwrap();
        assert_eq!(audio.mime_type, "audio/mpeg");
        assert_eq!(audio.display_name, "visit.mp3");
        assert!((audio.size_mb - 2048.0 / BYTES_PER_MB).abs() < 1e-12);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
