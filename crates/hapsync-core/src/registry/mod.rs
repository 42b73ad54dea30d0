//! Plugin-based brand registry
//!
//! The registry maps brand keys to adapter instances, and factory names to
//! the factories that build those adapters from configuration. Adapter crates
//! contribute their factory at startup instead of being discovered from disk.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! # use hapsync_core::registry::PluginRegistry;
//!
//! // In hapsync-plugin-lg crate
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_factory("lg", Box::new(LgFactory));
//! }
//! ```
//!
//! The daemon then builds one adapter per configured brand:
//!
//! ```rust,ignore
//! let registry = PluginRegistry::new();
//! hapsync_plugin_lg::register(&registry);
//! for plugin_config in &config.plugins {
//!     registry.instantiate(plugin_config)?;
//! }
//! ```

use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::traits::{BrandPlugin, PluginFactory};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of brand adapters and adapter factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct PluginRegistry {
    /// Live adapters keyed by lowercase brand
    plugins: RwLock<HashMap<String, Arc<dyn BrandPlugin>>>,

    /// Registered adapter factories keyed by factory name
    factories: RwLock<HashMap<String, Box<dyn PluginFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its brand
    ///
    /// A previous adapter for the same brand is replaced.
    pub fn register(&self, plugin: Arc<dyn BrandPlugin>) {
        let brand = plugin.brand().to_lowercase();
        let mut plugins = self.plugins.write();
        if plugins.insert(brand.clone(), plugin).is_some() {
            warn!("Replacing existing plugin for brand {}", brand);
        } else {
            debug!("Registered plugin for brand {}", brand);
        }
    }

    /// Find the adapter for a brand (case-insensitive)
    pub fn lookup(&self, brand: &str) -> Result<Arc<dyn BrandPlugin>> {
        self.plugins
            .read()
            .get(&brand.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::plugin_not_found(brand))
    }

    /// All registered adapters, ordered by brand
    pub fn all(&self) -> Vec<Arc<dyn BrandPlugin>> {
        let plugins = self.plugins.read();
        let mut brands: Vec<&String> = plugins.keys().collect();
        brands.sort();
        brands
            .into_iter()
            .filter_map(|brand| plugins.get(brand).cloned())
            .collect()
    }

    /// Register an adapter factory
    ///
    /// # Parameters
    ///
    /// - `name`: Factory name, matched against [`PluginConfig::type_name`]
    /// - `factory`: Factory object for creating adapter instances
    pub fn register_factory(&self, name: impl Into<String>, factory: Box<dyn PluginFactory>) {
        let name = name.into();
        let mut factories = self.factories.write();
        factories.insert(name, factory);
    }

    /// Build an adapter from configuration and register it
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn BrandPlugin>)`: The registered adapter
    /// - `Err(Error)`: If the factory is not registered or creation fails
    pub fn instantiate(&self, config: &PluginConfig) -> Result<Arc<dyn BrandPlugin>> {
        let plugin_type = config.type_name();
        let plugin = {
            let factories = self.factories.read();
            let factory = factories
                .get(plugin_type)
                .ok_or_else(|| Error::config(format!("Unknown plugin type: {}", plugin_type)))?;
            factory.create(config)?
        };

        self.register(Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Check if an adapter is registered for a brand
    pub fn has_plugin(&self, brand: &str) -> bool {
        self.plugins.read().contains_key(&brand.to_lowercase())
    }

    /// List registered brands, sorted
    pub fn list_brands(&self) -> Vec<String> {
        let mut brands: Vec<String> = self.plugins.read().keys().cloned().collect();
        brands.sort();
        brands
    }

    /// List registered factory names
    pub fn list_factories(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DiscoveryInfo, NormalizedCommand};
    use crate::traits::{ApplianceDevice, FetchResult};
    use async_trait::async_trait;

    struct NamedPlugin(&'static str);

    #[async_trait]
    impl BrandPlugin for NamedPlugin {
        fn brand(&self) -> &str {
            self.0
        }

        fn supported_device_types(&self) -> Vec<String> {
            Vec::new()
        }

        async fn discover_devices(&self) -> Result<Vec<DiscoveryInfo>> {
            Ok(Vec::new())
        }

        async fn fetch_state(&self, _device_id: &str, _device_type: &str) -> Result<FetchResult> {
            Ok(FetchResult::Unreachable)
        }

        async fn send_command(&self, _device_id: &str, _command: &NormalizedCommand) -> Result<bool> {
            Ok(false)
        }

        fn create_device(
            &self,
            device_type: &str,
            _info: &DiscoveryInfo,
        ) -> Result<Arc<dyn ApplianceDevice>> {
            Err(Error::unsupported_device(device_type))
        }
    }

    struct NamedFactory;

    impl PluginFactory for NamedFactory {
        fn create(&self, config: &PluginConfig) -> Result<Arc<dyn BrandPlugin>> {
            match config {
                PluginConfig::Custom { .. } => Ok(Arc::new(NamedPlugin("acme"))),
                _ => Err(Error::config("expected custom config")),
            }
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(NamedPlugin("LG")));

        assert!(registry.has_plugin("lg"));
        assert_eq!(registry.lookup("Lg").unwrap().brand(), "LG");
        assert!(matches!(
            registry.lookup("samsung"),
            Err(Error::PluginNotFound(_))
        ));
    }

    #[test]
    fn register_overwrites_same_brand() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(NamedPlugin("lg")));
        registry.register(Arc::new(NamedPlugin("LG")));

        assert_eq!(registry.list_brands(), vec!["lg".to_string()]);
        assert_eq!(registry.lookup("lg").unwrap().brand(), "LG");
    }

    #[test]
    fn all_is_sorted_by_brand() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(NamedPlugin("samsung")));
        registry.register(Arc::new(NamedPlugin("lg")));

        let brands: Vec<String> = registry.all().iter().map(|p| p.brand().to_string()).collect();
        assert_eq!(brands, vec!["lg", "samsung"]);
    }

    #[test]
    fn instantiate_uses_registered_factory() {
        let registry = PluginRegistry::new();
        registry.register_factory("acme", Box::new(NamedFactory));

        let config = PluginConfig::Custom {
            factory: "acme".to_string(),
            config: serde_json::json!({}),
        };
        let plugin = registry.instantiate(&config).unwrap();

        assert_eq!(plugin.brand(), "acme");
        assert!(registry.has_plugin("acme"));
        assert!(registry.list_factories().contains(&"acme".to_string()));
    }

    #[test]
    fn instantiate_unknown_factory_fails() {
        let registry = PluginRegistry::new();
        let config = PluginConfig::Custom {
            factory: "missing".to_string(),
            config: serde_json::json!({}),
        };

        assert!(matches!(registry.instantiate(&config), Err(Error::Config(_))));
    }
}
