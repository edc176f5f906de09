use crate::AnnouncementStream;

/// Issues and rotates proxy certificates.
///
/// Certificate material is never embedded in discovery resources; instead
/// proxies are told which secrets to fetch from the secret discovery service.
pub trait CertManager: Send + Sync {
    fn announcements(&self) -> AnnouncementStream;

    fn sds_config(&self) -> SdsConfig;
}

/// Names the secrets (and the cluster serving them) that TLS contexts
/// reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdsConfig {
    /// The bootstrap cluster through which proxies reach the secret discovery
    /// service.
    pub cluster_name: String,

    /// The secret holding a proxy's own certificate chain and key.
    pub cert_secret_name: String,

    /// The secret holding the trust roots used to validate peers.
    pub validation_secret_name: String,
}
