//! Tenant registry.
//!
//! Configured tenants are registered at startup. Unknown tenant IDs are
//! registered lazily from the default template on first sight and are never
//! removed.

use dashmap::DashMap;
use gateway_core::{GatewayError, TenantConfig};
use std::sync::Arc;
use tracing::info;

/// Concurrent map of tenant configurations
#[derive(Debug)]
pub struct TenantRegistry {
    tenants: DashMap<String, Arc<TenantConfig>>,
    template: TenantConfig,
}

impl TenantRegistry {
    /// Create a registry that instantiates unknown tenants from `template`
    #[must_use]
    pub fn new(template: TenantConfig) -> Self {
        Self {
            tenants: DashMap::new(),
            template,
        }
    }

    /// Create a registry pre-populated with configured tenants
    #[must_use]
    pub fn with_tenants(
        template: TenantConfig,
        tenants: impl IntoIterator<Item = TenantConfig>,
    ) -> Self {
        let registry = Self::new(template);
        for tenant in tenants {
            registry.register(tenant);
        }
        registry
    }

    /// Register or replace a tenant
    pub fn register(&self, tenant: TenantConfig) -> Arc<TenantConfig> {
        let tenant = Arc::new(tenant);
        self.tenants.insert(tenant.id.clone(), Arc::clone(&tenant));
        tenant
    }

    /// Look up a tenant without registering it
    #[must_use]
    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantConfig>> {
        self.tenants.get(tenant_id).map(|t| Arc::clone(t.value()))
    }

    /// Look up a tenant, instantiating it from the template when unknown
    pub fn get_or_register(&self, tenant_id: &str) -> Arc<TenantConfig> {
        if let Some(tenant) = self.get(tenant_id) {
            return tenant;
        }

        let entry = self.tenants.entry(tenant_id.to_string()).or_insert_with(|| {
            info!(tenant = %tenant_id, "Registering tenant from default template");
            Arc::new(self.template.instantiate(tenant_id))
        });
        Arc::clone(entry.value())
    }

    /// Resolve a tenant and check the caller's tenant key.
    ///
    /// # Errors
    ///
    /// Returns an authentication error when the tenant has a key configured
    /// and the presented key is missing or different.
    pub fn authenticate(
        &self,
        tenant_id: &str,
        presented_key: Option<&str>,
    ) -> Result<Arc<TenantConfig>, GatewayError> {
        let tenant = self.get_or_register(tenant_id);
        if tenant.accepts_key(presented_key) {
            Ok(tenant)
        } else {
            Err(GatewayError::authentication(format!(
                "invalid tenant key for '{tenant_id}'"
            )))
        }
    }

    /// All known tenants, sorted by ID
    #[must_use]
    pub fn list(&self) -> Vec<Arc<TenantConfig>> {
        let mut tenants: Vec<_> = self.tenants.iter().map(|t| Arc::clone(t.value())).collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        tenants
    }

    /// Number of known tenants
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether no tenant is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Template used for lazy registration
    #[must_use]
    pub fn template(&self) -> &TenantConfig {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{ErrorKind, ModelRoute, ModelTier};

    fn template() -> TenantConfig {
        TenantConfig::new("default")
            .with_tier(ModelTier::Hybrid)
            .with_route(ModelRoute::new("ollama", "llama3.2"))
    }

    #[test]
    fn test_lazy_registration_uses_template() {
        let registry = TenantRegistry::new(template());
        assert!(registry.get("acme").is_none());

        let tenant = registry.get_or_register("acme");
        assert_eq!(tenant.id, "acme");
        assert_eq!(tenant.model_tier, ModelTier::Hybrid);
        assert_eq!(tenant.models.len(), 1);
        assert_eq!(registry.len(), 1);

        let again = registry.get_or_register("acme");
        assert!(Arc::ptr_eq(&tenant, &again));
    }

    #[test]
    fn test_configured_tenant_wins() {
        let registry = TenantRegistry::with_tenants(
            template(),
            [TenantConfig::new("ada").with_tier(ModelTier::LocalSlm)],
        );
        assert_eq!(registry.get_or_register("ada").model_tier, ModelTier::LocalSlm);
    }

    #[test]
    fn test_authenticate_checks_tenant_key() {
        let registry = TenantRegistry::with_tenants(
            template(),
            [TenantConfig::new("locked").with_api_key("s3cret")],
        );

        assert!(registry.authenticate("locked", Some("s3cret")).is_ok());
        let err = registry.authenticate("locked", Some("wrong")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationError);
        assert!(registry.authenticate("locked", None).is_err());

        assert!(registry.authenticate("open", None).is_ok());
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = TenantRegistry::new(template());
        registry.get_or_register("zeta");
        registry.get_or_register("alpha");
        let ids: Vec<_> = registry.list().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_concurrent_lazy_registration_yields_one_config() {
        let registry = Arc::new(TenantRegistry::new(template()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_register("shared"))
            })
            .collect();

        let configs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(configs.iter().all(|c| Arc::ptr_eq(c, &configs[0])));
        assert_eq!(registry.len(), 1);
    }
}
