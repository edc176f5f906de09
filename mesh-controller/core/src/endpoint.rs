use crate::{AnnouncementStream, MeshService};
use std::{fmt, net::IpAddr};

/// A network address backing a [`MeshService`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The provider does not know about the service.
    #[error("service {0} not found")]
    NotFound(MeshService),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Resolves services to the endpoints currently backing them.
pub trait EndpointProvider: Send + Sync {
    /// A stable identifier for this provider.
    fn id(&self) -> &str;

    fn announcements(&self) -> AnnouncementStream;

    fn list_endpoints(&self, service: &MeshService) -> Result<Vec<ServiceEndpoint>, EndpointError>;
}

// === impl ServiceEndpoint ===

impl ServiceEndpoint {
    pub fn new(ip: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&std::net::SocketAddr::new(self.ip, self.port), f)
    }
}
