use crate::MeshCatalog;
use mesh_controller_core::{MeshService, TrafficTarget};
use std::collections::BTreeSet;

// === impl MeshCatalog ===

impl MeshCatalog {
    /// Lists the services that a proxy for `service` may send traffic to,
    /// sorted by their canonical form.
    ///
    /// In permissive mode every other known service is allowed. Otherwise
    /// only the destinations of traffic targets naming `service` as their
    /// source are allowed.
    pub fn allowed_outbound_services(&self, service: &MeshService) -> Vec<MeshService> {
        let allowed: BTreeSet<MeshService> = if self.config.permissive_traffic_policy_mode {
            self.topology
                .list_services()
                .into_iter()
                .filter(|s| s != service)
                .collect()
        } else {
            self.mesh_spec
                .list_traffic_targets()
                .into_iter()
                .filter(|t| t.source == *service)
                .map(|t| t.destination)
                .collect()
        };
        allowed.into_iter().collect()
    }

    /// Lists the traffic targets that grant access to `service`.
    pub fn inbound_traffic_targets(&self, service: &MeshService) -> Vec<TrafficTarget> {
        let targets: BTreeSet<TrafficTarget> = self
            .mesh_spec
            .list_traffic_targets()
            .into_iter()
            .filter(|t| t.destination == *service)
            .collect();
        targets.into_iter().collect()
    }
}
