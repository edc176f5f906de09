use std::time::Duration;

/// Mesh-wide settings consulted during reconciliation and synthesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshConfig {
    /// When set, all in-mesh traffic is allowed and no access-enforcement
    /// filter is configured on inbound listeners.
    pub permissive_traffic_policy_mode: bool,

    /// Forces a reconciliation at least this often. Zero disables the ticker.
    pub min_refresh_interval: Duration,

    pub cluster_domain: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            permissive_traffic_policy_mode: false,
            min_refresh_interval: Duration::ZERO,
            cluster_domain: "cluster.local".to_string(),
        }
    }
}
