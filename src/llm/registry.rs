//! Registry of named models.

use crate::llm::driver::{connect_driver, ModelDriver, REPROMPT};
use crate::types::{AgentError, PromptResult, Result, ToolInfo};
use crate::utils::config::AiConfig;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;

struct ModelEntry {
    /// Serialises access: a driver owns mutable conversation state, so
    /// concurrent prompts to the same model queue here. Distinct models
    /// stay parallel.
    driver: Mutex<Box<dyn ModelDriver>>,
}

/// Named models and the uniform prompt surface over them.
pub struct ModelRegistry {
    models: parking_lot::RwLock<Vec<(String, Arc<ModelEntry>)>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            models: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// The names of all registered models, in registration order.
    pub fn ais(&self) -> Vec<String> {
        self.models
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn entry(&self, name: &str) -> Option<Arc<ModelEntry>> {
        self.models
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| Arc::clone(entry))
    }

    /// Build, prime and register the driver described by `config`.
    pub async fn add(&self, config: &AiConfig) -> Result<()> {
        if self.entry(&config.name).is_some() {
            return Err(AgentError::AlreadyExists(config.name.clone()));
        }

        let driver = connect_driver(config).await?;
        self.insert_driver(&config.name, driver)?;

        tracing::info!("model \"{}\" ({}) registered", config.name, config.kind);

        Ok(())
    }

    /// Register an already-built driver under `name`. This is the seam for
    /// custom driver implementations.
    pub fn insert_driver(&self, name: &str, driver: Box<dyn ModelDriver>) -> Result<()> {
        let mut models = self.models.write();
        if models.iter().any(|(n, _)| n == name) {
            return Err(AgentError::AlreadyExists(name.to_string()));
        }
        models.push((
            name.to_string(),
            Arc::new(ModelEntry {
                driver: Mutex::new(driver),
            }),
        ));
        Ok(())
    }

    /// Discard the named model's conversation, keeping its preamble
    /// priming.
    pub async fn reset(&self, name: &str) -> Result<()> {
        let entry = self
            .entry(name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;
        entry.driver.lock().await.reset();
        Ok(())
    }

    /// Drop the named model and its conversation.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut models = self.models.write();
        let index = models
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;
        models.remove(index);
        Ok(())
    }

    /// Prompt the named model.
    ///
    /// A reply that breaks the `PromptResult` contract is corrected once
    /// with a re-prompt; a second malformed reply surfaces as
    /// [`AgentError::ModelProtocol`].
    pub async fn prompt(&self, name: &str, text: &str) -> Result<PromptResult> {
        let entry = self
            .entry(name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;

        let mut driver = entry.driver.lock().await;
        match driver.prompt(text).await {
            Err(AgentError::ModelProtocol(reason)) => {
                tracing::warn!("model \"{name}\" broke the reply contract ({reason}); re-prompting once");
                driver.prompt(REPROMPT).await
            }
            other => other,
        }
    }

    /// Announce the available tools to every registered model, in
    /// parallel. Per-model failures are logged; the return value is the
    /// overall success.
    pub async fn register_tools(&self, tools: &[ToolInfo]) -> bool {
        let announcement = match serde_json::to_string(tools) {
            Ok(encoded) => format!("These tools are now available:\n{encoded}"),
            Err(e) => {
                tracing::error!("failed to encode tool announcement: {e}");
                return false;
            }
        };

        let snapshot: Vec<(String, Arc<ModelEntry>)> = self
            .models
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let announcements = snapshot.into_iter().map(|(name, entry)| {
            let announcement = announcement.clone();
            async move {
                let mut driver = entry.driver.lock().await;
                match driver.prompt(&announcement).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!("failed to register tools for {name}: {e}");
                        false
                    }
                }
            }
        });

        join_all(announcements).await.into_iter().all(|ok| ok)
    }
}
