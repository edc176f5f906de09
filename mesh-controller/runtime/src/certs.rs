use crate::core::{AnnouncementStream, Announcer, CertManager, SdsConfig};

/// Serves fixed SDS secret names. Certificates are rotated by the SDS server
/// under the same names, so no rotation is ever announced.
#[derive(Debug)]
pub struct StaticCertManager {
    sds: SdsConfig,
    announcer: Announcer,
}

impl StaticCertManager {
    pub fn new(sds: SdsConfig) -> Self {
        Self {
            sds,
            announcer: Announcer::default(),
        }
    }
}

impl CertManager for StaticCertManager {
    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }

    fn sds_config(&self) -> SdsConfig {
        self.sds.clone()
    }
}
