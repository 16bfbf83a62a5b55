//! Template storage boundary, an in-memory store and a JSON-file store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::extract::count_fields;

pub const MAX_TEMPLATE_NAME_LEN: usize = 50;

/// A named note template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template
{   pub name: String
  , pub fields: Map<String, Value>
}

/// Listing entry for a stored template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary
{   pub name: String
  , pub field_count: usize
}

#[async_trait]
pub trait TemplateStore: Send + Sync
{   async fn get_template(&self, name: &str) -> Option<Map<String, Value>>;

    /// Fails with [`Error::TemplateExists`] if the name is taken
    async fn save_template(&self, template: Template) -> Result<()>;

    async fn list_templates(&self) -> Vec<TemplateSummary>;

    /// Returns whether anything was removed
    async fn delete_template(&self, name: &str) -> bool;
}

/// Trim a user-supplied template name and check its length
pub fn validate_template_name(name: &str) -> Result<String>
{   let trimmed = name.trim();
    if trimmed.is_empty()
    {   return Err(Error::InvalidInput("Template name cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TEMPLATE_NAME_LEN
    {   return Err(Error::InvalidInput(format!(
          "Template name too long (max {} characters)",
          MAX_TEMPLATE_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateStore
{   templates: RwLock<BTreeMap<String, Map<String, Value>>>
}

impl InMemoryTemplateStore
{   pub fn new() -> Self
    {   Self::default()
    }

    /// Store pre-loaded with the built-in templates
    pub fn with_defaults() -> Self
    {   let mut templates = BTreeMap::new();
        for template in default_templates()
        {   templates.insert(template.name, template.fields);
        }
        debug!("Seeded {} default templates", templates.len());
        InMemoryTemplateStore
        {   templates: RwLock::new(templates)
        }
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore
{   async fn get_template(&self, name: &str) -> Option<Map<String, Value>>
    {   self.templates.read().await.get(name).cloned()
    }

    async fn save_template(&self, template: Template) -> Result<()>
    {   let mut templates = self.templates.write().await;
        if templates.contains_key(&template.name)
        {   return Err(Error::TemplateExists(template.name));
        }
        info!(
          "Saving template '{}' ({} fields)",
          template.name, count_fields(&template.fields)
        );
        templates.insert(template.name, template.fields);
        Ok(())
    }

    async fn list_templates(&self) -> Vec<TemplateSummary>
    {   self.templates.read().await
          .iter()
          .map(|(name, fields)| TemplateSummary
          {   name: name.clone()
            , field_count: count_fields(fields)
          })
          .collect()
    }

    async fn delete_template(&self, name: &str) -> bool
    {   let removed = self.templates.write().await.remove(name).is_some();
        if removed
        {   info!("Deleted template '{}'", name);
        }
        removed
    }
}

/// Templates kept in memory and written to one JSON file after every
/// change. The file maps template names to their field objects.
#[derive(Debug)]
pub struct JsonFileTemplateStore
{   path: PathBuf
  , inner: InMemoryTemplateStore
  , write_lock: Mutex<()>
}

impl JsonFileTemplateStore
{   /// Load `path`, or start from the built-in templates when it does
    /// not exist yet. A file that is not a JSON object is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self>
    {   let path = path.into();
        let inner = match tokio::fs::read_to_string(&path).await
        {   Ok(raw) => {
              let templates: BTreeMap<String, Map<String, Value>>
                = serde_json::from_str(&raw)?;
              info!("Loaded {} templates from {}", templates.len(), path.display());
              InMemoryTemplateStore
              {   templates: RwLock::new(templates)
              }
            }
          , Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
              debug!("No template file at {}, using defaults", path.display());
              InMemoryTemplateStore::with_defaults()
            }
          , Err(e) => return Err(e.into())
        };
        Ok(JsonFileTemplateStore
        {   path
          , inner
          , write_lock: Mutex::new(())
        })
    }

    pub fn path(&self) -> &Path
    {   &self.path
    }

    /// Write the current templates through a temporary file and a rename
    async fn persist(&self) -> Result<()>
    {   let _guard = self.write_lock.lock().await;
        let raw = {
          let templates = self.inner.templates.read().await;
          serde_json::to_string_pretty(&*templates)?
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty())
        {   tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Templates written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for JsonFileTemplateStore
{   async fn get_template(&self, name: &str) -> Option<Map<String, Value>>
    {   self.inner.get_template(name).await
    }

    async fn save_template(&self, template: Template) -> Result<()>
    {   self.inner.save_template(template).await?;
        self.persist().await
    }

    async fn list_templates(&self) -> Vec<TemplateSummary>
    {   self.inner.list_templates().await
    }

    async fn delete_template(&self, name: &str) -> bool
    {   let removed = self.inner.delete_template(name).await;
        if removed
        {   if let Err(e) = self.persist().await
            {   warn!("Template '{}' deleted in memory only: {}", name, e);
            }
        }
        removed
    }
}

fn default_templates() -> Vec<Template>
{   let soap = json!({
      "patient_name": "Full name of the patient",
      "age_gender": "Age and gender of the patient",
      "date_of_visit": "Date of the visit as stated",
      "chief_complaint": "Main reason for the visit",
      "history_of_present_illness": "Current symptoms, onset and progression",
      "relevant_medical_history": "Past conditions, surgeries, chronic illnesses",
      "current_medications_allergies": "Current medications with doses, and known allergies",
      "physical_examination": {
        "vital_signs": {
          "temperature": "Body temperature with unit",
          "blood_pressure": "Systolic/diastolic in mmHg",
          "heart_rate": "Pulse in beats per minute",
          "respiratory_rate": "Breaths per minute",
          "oxygen_saturation": "SpO2 percentage and oxygen source"
        },
        "general_findings": "Overall examination findings"
      },
      "assessment": "Clinical impression or diagnosis as stated",
      "plan": "Treatment, prescriptions and recommendations",
      "follow_up": "Follow-up instructions and timeline"
    });
    match soap
    {   Value::Object(fields) => vec![Template
        {   name: "general_soap_note".to_string()
          , fields
        }]
      , _ => vec![]
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[tokio::test]
    async fn defaults_include_the_soap_note()
    {   let store = InMemoryTemplateStore::with_defaults();
        let fields = store.get_template("general_soap_note").await.unwrap();
        assert!(fields.contains_key("chief_complaint"));
        let listed = store.list_templates().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].field_count, 16);
    }

    #[tokio::test]
    async fn names_are_unique()
    {   let store = InMemoryTemplateStore::new();
        let template = Template
        {   name: "cardio".to_string()
          , fields: Map::new()
        };
        store.save_template(template.clone()).await.unwrap();
        let err = store.save_template(template).await.unwrap_err();
        assert!(matches!(err, Error::TemplateExists(name) if name == "cardio"));
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_went()
    {   let store = InMemoryTemplateStore::with_defaults();
        assert!(store.delete_template("general_soap_note").await);
        assert!(!store.delete_template("general_soap_note").await);
        assert!(store.get_template("general_soap_note").await.is_none());
    }

    fn temp_store_path(name: &str) -> PathBuf
    {   std::env::temp_dir()
          .join(format!("medscribe-templates-{}-{}", std::process::id(), name))
          .join("templates.json")
    }

    #[tokio::test]
    async fn file_store_survives_a_reopen()
    {   let path = temp_store_path("reopen");
        let _ = tokio::fs::remove_file(&path).await;

        let store = JsonFileTemplateStore::open(&path).await.unwrap();
        assert!(store.get_template("general_soap_note").await.is_some());
        store.save_template(Template
        {   name: "cardio".to_string()
          , fields: json!({"bp": "Blood pressure"}).as_object().cloned().unwrap()
        }).await.unwrap();
        drop(store);

        let reopened = JsonFileTemplateStore::open(&path).await.unwrap();
        let names: Vec<String> = reopened.list_templates().await
          .into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["cardio", "general_soap_note"]);

        assert!(reopened.delete_template("cardio").await);
        let again = JsonFileTemplateStore::open(&path).await.unwrap();
        assert!(again.get_template("cardio").await.is_none());

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn unreadable_template_file_is_an_error()
    {   let path = temp_store_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let err = JsonFileTemplateStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[test]
    fn template_names_are_trimmed_and_bounded()
    {   assert_eq!(validate_template_name("  Cardiology Consult ").unwrap(), "Cardiology Consult");
        assert!(validate_template_name("   ").is_err());
        assert!(validate_template_name(&"x".repeat(51)).is_err());
    }
}
