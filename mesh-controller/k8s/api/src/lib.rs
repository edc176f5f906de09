#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod access;

pub use self::access::TrafficTarget;
pub use k8s_openapi::api::{
    self,
    core::v1::Service,
    discovery::v1::{Endpoint, EndpointConditions, EndpointPort, EndpointSlice},
    networking::v1::Ingress,
};
pub use kube::api::{ObjectMeta, ResourceExt};
