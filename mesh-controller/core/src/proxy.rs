use crate::MeshService;
use std::fmt;

/// A connected sidecar proxy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Proxy {
    /// The common name of the certificate the proxy presented.
    pub common_name: String,

    /// The service the proxy's workload belongs to.
    pub service: MeshService,
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.common_name)
    }
}
