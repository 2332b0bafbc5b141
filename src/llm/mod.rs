//! Narrative analysis over KPI reports. Sits outside the aggregation core:
//! it only reads report output and never feeds anything back into it.

pub mod analysis;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

pub const PROVIDER_KEY: &str = "llm_provider";
pub const MODEL_KEY: &str = "llm_model";

/// Provider and model for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmSettings {
    pub provider: String,
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "bedrock".to_string(),
            model: "claude-sonnet-4-5".to_string(),
        }
    }
}

impl LlmSettings {
    /// Settings from the `llm_provider` and `llm_model` config keys.
    pub async fn load(db: &Database) -> Result<Self> {
        let (provider, model) = db
            .reader()
            .call(|conn| {
                let provider = repository::get_config(conn, PROVIDER_KEY)?;
                let model = repository::get_config(conn, MODEL_KEY)?;
                Ok::<(Option<String>, Option<String>), rusqlite::Error>((provider, model))
            })
            .await?;

        let defaults = Self::default();
        Ok(Self {
            provider: provider.unwrap_or(defaults.provider),
            model: model.unwrap_or(defaults.model),
        })
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(m) = model {
            self.model = m;
        }
        self
    }

    fn is_haiku(&self) -> bool {
        matches!(self.model.as_str(), "claude-haiku-4-5" | "haiku")
    }
}

/// Build a mixtape agent for the configured provider and model.
pub async fn build_agent(settings: &LlmSettings) -> Result<mixtape_core::Agent> {
    // Each combination needs its own builder call since the model types differ.
    match (settings.provider.as_str(), settings.is_haiku()) {
        ("bedrock", true) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("bedrock", false) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", true) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        ("anthropic", false) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::Llm(e.to_string())),
        (other, _) => Err(Error::Config(format!("unknown llm_provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_default_and_config() {
        let db = Database::open_memory().await.unwrap();
        assert_eq!(
            LlmSettings::load(&db).await.unwrap(),
            LlmSettings::default()
        );

        db.writer()
            .call(|conn| {
                repository::set_config(conn, PROVIDER_KEY, "anthropic")?;
                repository::set_config(conn, MODEL_KEY, "haiku")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let settings = LlmSettings::load(&db).await.unwrap();
        assert_eq!(settings.provider, "anthropic");
        assert!(settings.is_haiku());

        let overridden = settings.with_model(Some("claude-sonnet-4-5".into()));
        assert!(!overridden.is_haiku());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let settings = LlmSettings {
            provider: "openai".into(),
            model: "gpt".into(),
        };
        assert!(matches!(
            build_agent(&settings).await,
            Err(Error::Config(_))
        ));
    }
}
