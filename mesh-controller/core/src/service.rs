use std::{fmt, num::NonZeroU16, str::FromStr};

/// Identifies a logical destination in the mesh.
///
/// The canonical form is `<namespace>/<name>[:<port>]`, or `<name>[:<port>]`
/// for a service without a namespace. Names and namespaces are restricted to
/// lowercase DNS label characters, so the canonical form parses back to the
/// same service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshService {
    namespace: String,
    name: String,
    port: Option<NonZeroU16>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidService {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("invalid {field} {value:?}: must consist of at most 63 lowercase alphanumeric characters or '-'")]
    InvalidLabel { field: &'static str, value: String },

    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

const MAX_LABEL_LEN: usize = 63;

// === impl MeshService ===

impl MeshService {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self, InvalidService> {
        let namespace = namespace.into();
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidService::EmptyName);
        }
        validate_label("namespace", &namespace)?;
        validate_label("name", &name)?;
        Ok(Self {
            namespace,
            name,
            port: None,
        })
    }

    pub fn with_port(self, port: NonZeroU16) -> Self {
        Self {
            port: Some(port),
            ..self
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> Option<NonZeroU16> {
        self.port
    }

    /// The server name a client sets as its SNI when connecting to this
    /// service.
    pub fn server_name(&self, cluster_domain: &str) -> String {
        if self.namespace.is_empty() {
            format!("{}.svc.{}", self.name, cluster_domain)
        } else {
            format!("{}.{}.svc.{}", self.name, self.namespace, cluster_domain)
        }
    }
}

fn validate_label(field: &'static str, value: &str) -> Result<(), InvalidService> {
    let valid = value.len() <= MAX_LABEL_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(InvalidService::InvalidLabel {
            field,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for MeshService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        f.write_str(&self.name)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl FromStr for MeshService {
    type Err = InvalidService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, port) = match s.split_once(':') {
            Some((rest, port)) => {
                let port = port
                    .parse::<NonZeroU16>()
                    .map_err(|_| InvalidService::InvalidPort(port.to_string()))?;
                (rest, Some(port))
            }
            None => (s, None),
        };

        let svc = match rest.split_once('/') {
            Some((ns, name)) if !ns.is_empty() => Self::new(ns, name)?,
            Some((ns, _)) => {
                return Err(InvalidService::InvalidLabel {
                    field: "namespace",
                    value: ns.to_string(),
                })
            }
            None => Self::new("", rest)?,
        };

        Ok(Self { port, ..svc })
    }
}
