use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Grants the `sources` access to the `destination`.
///
/// Subjects name services; a subject without a namespace refers to the
/// traffic target's own namespace.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "access.smi-spec.io",
    version = "v1alpha3",
    kind = "TrafficTarget",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTargetSpec {
    pub destination: IdentityBindingSubject,

    #[serde(default)]
    pub sources: Vec<IdentityBindingSubject>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<TrafficTargetRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBindingSubject {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

/// References the route group that a traffic target applies to. Routes are
/// not interpreted; any traffic between the subjects is allowed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTargetRule {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
}
