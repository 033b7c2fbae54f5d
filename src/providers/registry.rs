use parking_lot::RwLock;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, ErrorCode, Result};
use crate::providers::Provider;

/// Name-keyed lookup of direct provider clients.
///
/// Names are case-sensitive. Registering an existing name replaces the
/// previous client.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, client: Arc<dyn Provider>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::new(
                "Provider name must be a non-empty string",
                500,
                ErrorCode::InvalidProviderName,
            ));
        }

        let capabilities = client.capabilities();
        if capabilities.is_empty() {
            return Err(Error::new(
                format!("Provider client for '{}' exposes no capability", name),
                500,
                ErrorCode::InvalidProviderClient,
            ));
        }

        info!("Registered provider {} with capabilities {:?}", name, capabilities);
        self.providers.write().insert(name.to_string(), client);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        let providers = self.providers.read();
        if let Some(client) = providers.get(name) {
            return Ok(Arc::clone(client));
        }

        let available: Vec<&String> = providers.keys().collect();
        let listing = if available.is_empty() {
            "none".to_string()
        } else {
            available
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Err(Error::provider_not_found(format!(
            "Provider '{}' not found. Available providers: {}",
            name, listing
        ))
        .with_details(json!({
            "provider": name,
            "available": available,
        })))
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }
}
