pub mod base;
pub mod cgv_blitz;
mod registry;
pub mod xxi;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::{CinemaError, Result};

pub(crate) use registry::{canonical_date, canonical_time};
pub use registry::{
    split_theatre_variant, standardize_title, Registry, ScreeningEntry, TheatreEntry,
    DEFAULT_VARIANT,
};

/// One cinema chain. Adapters only scrape and call the registry; storage,
/// normalization and keyword indexing stay on the registry side.
#[async_trait]
pub trait Provider: Send + Sync {
    fn provider_id(&self) -> &'static str;
    fn provider_name(&self) -> &'static str;
    fn provider_url(&self) -> &'static str;

    /// Discovers and registers every city this chain serves.
    async fn init(&self, registry: &Registry) -> anyhow::Result<()>;

    /// Registers every theatre, film and screening for one city. Cities the
    /// chain does not serve are a no-op.
    async fn load_city(&self, registry: &Registry, city_name: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

pub fn list_providers(providers: &[Arc<dyn Provider>]) -> Vec<ProviderInfo> {
    providers
        .iter()
        .map(|provider| ProviderInfo {
            id: provider.provider_id().to_string(),
            name: provider.provider_name().to_string(),
            url: provider.provider_url().to_string(),
        })
        .collect()
}

/// Builds the adapters enabled in `config`, in configured order.
pub fn active_providers(config: &AppConfig) -> Result<Vec<Arc<dyn Provider>>> {
    let client = base::build_client(
        Duration::from_secs(config.http_timeout_secs),
        &config.user_agent,
    )
    .map_err(|err| CinemaError::Config(err.to_string()))?;
    let timezone = config.timezone()?;

    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for id in &config.providers {
        match id.trim().to_ascii_lowercase().as_str() {
            "xxi" => providers.push(Arc::new(xxi::Xxi::new(client.clone()))),
            "cgvblitz" => providers.push(Arc::new(cgv_blitz::CgvBlitz::new(client.clone(), timezone))),
            other => return Err(CinemaError::Config(format!("unknown provider id: {other}"))),
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_configured_providers_in_order() {
        let config = AppConfig {
            providers: vec!["cgvblitz".into(), "XXI".into()],
            ..AppConfig::default()
        };
        let providers = active_providers(&config).expect("providers");
        let ids: Vec<String> = list_providers(&providers).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["cgvblitz".to_string(), "xxi".to_string()]);
    }

    #[test]
    fn rejects_unknown_providers() {
        let config = AppConfig {
            providers: vec!["cinemaxx".into()],
            ..AppConfig::default()
        };
        assert!(matches!(active_providers(&config), Err(CinemaError::Config(_))));
    }
}
