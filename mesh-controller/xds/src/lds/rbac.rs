use super::ListenerBuilder;
use crate::EncodeError;
use envoy_types::pb::envoy::{
    config::{
        listener::v3::Filter,
        rbac::v3::{
            permission, principal, rbac::Action, Permission, Policy, Principal, Rbac as Rules,
        },
    },
    extensions::filters::network::rbac::v3::Rbac,
    r#type::matcher::v3::{string_matcher::MatchPattern, StringMatcher},
};
use mesh_controller_core::MeshService;
use std::collections::{BTreeMap, BTreeSet};

const RBAC_FILTER: &str = "envoy.filters.network.rbac";

impl ListenerBuilder {
    /// Allows connections from the identities of the sources named by the
    /// traffic targets of `service`. One policy is emitted per traffic target.
    ///
    /// With no traffic targets the filter has no policies and every
    /// connection is denied.
    pub(super) fn rbac_filter(&self, service: &MeshService) -> Result<Filter, EncodeError> {
        let cluster_domain = &self.catalog.config().cluster_domain;

        let mut sources = BTreeMap::<String, BTreeSet<String>>::new();
        for target in self.catalog.inbound_traffic_targets(service) {
            sources
                .entry(target.reference.to_string())
                .or_default()
                .insert(target.source.server_name(cluster_domain));
        }

        let policies = sources
            .into_iter()
            .map(|(name, principals)| {
                let policy = Policy {
                    permissions: vec![any_permission()],
                    principals: principals.into_iter().map(authenticated).collect(),
                    ..Default::default()
                };
                (name, policy)
            })
            .collect();

        let rbac = Rbac {
            rules: Some(Rules {
                action: Action::Allow.into(),
                policies,
                ..Default::default()
            }),
            stat_prefix: format!("rbac.{service}"),
            ..Default::default()
        };
        self.network_filter(RBAC_FILTER, &rbac)
    }
}

pub(super) fn any_permission() -> Permission {
    Permission {
        rule: Some(permission::Rule::Any(true)),
    }
}

/// Matches peers whose certificate names `name`.
pub(super) fn authenticated(name: String) -> Principal {
    Principal {
        identifier: Some(principal::Identifier::Authenticated(principal::Authenticated {
            principal_name: Some(StringMatcher {
                match_pattern: Some(MatchPattern::Exact(name)),
                ..Default::default()
            }),
        })),
    }
}
