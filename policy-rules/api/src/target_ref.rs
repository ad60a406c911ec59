use crate::Tags;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds a policy may target, ordered from least to most specific.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
pub enum TargetRefKind {
    #[default]
    Mesh,
    MeshSubset,
    MeshGateway,
    MeshService,
    MeshExternalService,
    MeshMultiZoneService,
    MeshServiceSubset,
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ProxyType {
    Sidecar,
    Gateway,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub kind: TargetRefKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy_types: Vec<ProxyType>,
}

// === impl TargetRefKind ===

impl TargetRefKind {
    /// Kinds that select workloads by their tags rather than naming a
    /// concrete destination resource.
    pub fn is_tag_selector(&self) -> bool {
        matches!(
            self,
            Self::Mesh
                | Self::MeshSubset
                | Self::MeshService
                | Self::MeshServiceSubset
                | Self::MeshGateway
        )
    }
}

impl fmt::Display for TargetRefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh => "Mesh".fmt(f),
            Self::MeshSubset => "MeshSubset".fmt(f),
            Self::MeshGateway => "MeshGateway".fmt(f),
            Self::MeshService => "MeshService".fmt(f),
            Self::MeshExternalService => "MeshExternalService".fmt(f),
            Self::MeshMultiZoneService => "MeshMultiZoneService".fmt(f),
            Self::MeshServiceSubset => "MeshServiceSubset".fmt(f),
            Self::MeshHttpRoute => "MeshHTTPRoute".fmt(f),
        }
    }
}

// === impl TargetRef ===

impl TargetRef {
    fn of_kind(kind: TargetRefKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn mesh() -> Self {
        Self::of_kind(TargetRefKind::Mesh)
    }

    pub fn mesh_subset(tags: Tags) -> Self {
        Self {
            tags: Some(tags),
            ..Self::of_kind(TargetRefKind::MeshSubset)
        }
    }

    pub fn mesh_service(name: impl Into<String>) -> Self {
        Self::of_kind(TargetRefKind::MeshService).with_name(name)
    }

    pub fn mesh_service_subset(name: impl Into<String>, tags: Tags) -> Self {
        Self {
            tags: Some(tags),
            ..Self::of_kind(TargetRefKind::MeshServiceSubset).with_name(name)
        }
    }

    pub fn mesh_gateway(name: impl Into<String>) -> Self {
        Self::of_kind(TargetRefKind::MeshGateway).with_name(name)
    }

    pub fn mesh_external_service(name: impl Into<String>) -> Self {
        Self::of_kind(TargetRefKind::MeshExternalService).with_name(name)
    }

    pub fn mesh_multi_zone_service(name: impl Into<String>) -> Self {
        Self::of_kind(TargetRefKind::MeshMultiZoneService).with_name(name)
    }

    pub fn mesh_http_route(name: impl Into<String>) -> Self {
        Self::of_kind(TargetRefKind::MeshHttpRoute).with_name(name)
    }

    /// Selects every `kind` resource whose labels include `labels`.
    pub fn labelled(kind: TargetRefKind, labels: Tags) -> Self {
        Self {
            labels: Some(labels),
            ..Self::of_kind(kind)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_section_name(mut self, section: impl Into<String>) -> Self {
        self.section_name = Some(section.into());
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_proxy_types(mut self, proxy_types: impl IntoIterator<Item = ProxyType>) -> Self {
        self.proxy_types = proxy_types.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Iterates the target's tags in key order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.tags
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn num_tags(&self) -> usize {
        self.tags.as_ref().map(|t| t.len()).unwrap_or(0)
    }

    /// An empty list of proxy types supports every proxy.
    pub fn supports_proxy(&self, proxy: ProxyType) -> bool {
        self.proxy_types.is_empty() || self.proxy_types.contains(&proxy)
    }
}
