use crate::MeshCatalog;
use mesh_controller_core::{EndpointError, MeshService, ServiceEndpoint};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No endpoint provider knows about the service.
    #[error("no endpoint provider knows service {0}")]
    NotFound(MeshService),

    #[error("endpoint provider {provider} failed to list endpoints for {service}")]
    Provider {
        provider: String,
        service: MeshService,
        #[source]
        error: EndpointError,
    },
}

// === impl MeshCatalog ===

impl MeshCatalog {
    /// Lists the endpoints backing `service` across all endpoint providers, in
    /// provider order.
    ///
    /// A provider that does not know the service is skipped. The lookup fails
    /// if any provider fails for another reason, or if no provider knows the
    /// service at all. An empty list means that the service is known but has
    /// no endpoints.
    pub fn resolvable_service_endpoints(
        &self,
        service: &MeshService,
    ) -> Result<Vec<ServiceEndpoint>, ResolveError> {
        let mut found = false;
        let mut endpoints = Vec::new();
        for provider in self.endpoint_providers.iter() {
            match provider.list_endpoints(service) {
                Ok(eps) => {
                    tracing::trace!(provider = provider.id(), %service, endpoints = eps.len());
                    found = true;
                    endpoints.extend(eps);
                }
                Err(EndpointError::NotFound(_)) => {
                    tracing::trace!(provider = provider.id(), %service, "Service not found");
                }
                Err(error) => {
                    return Err(ResolveError::Provider {
                        provider: provider.id().to_string(),
                        service: service.clone(),
                        error,
                    });
                }
            }
        }

        if !found {
            return Err(ResolveError::NotFound(service.clone()));
        }
        Ok(endpoints)
    }
}
