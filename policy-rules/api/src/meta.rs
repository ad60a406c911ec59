use crate::labels::Labels;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DISPLAY_NAME_LABEL: &str = "kuma.io/display-name";
pub const NAMESPACE_LABEL: &str = "k8s.kuma.io/namespace";
pub const ZONE_LABEL: &str = "kuma.io/zone";
pub const ORIGIN_LABEL: &str = "kuma.io/origin";
pub const POLICY_ROLE_LABEL: &str = "kuma.io/policy-role";
pub const EFFECT_LABEL: &str = "kuma.io/effect";

/// The tag carrying a workload's service name.
pub const SERVICE_TAG: &str = "kuma.io/service";

/// Identity and labels shared by every resource kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub name: String,
    #[serde(default)]
    pub mesh: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Where a resource was authored. Zone-authored resources take precedence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceOrigin {
    Global,
    Zone,
}

/// Who a policy is written for. Later roles take precedence.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyRole {
    #[default]
    System,
    Producer,
    Consumer,
    WorkloadOwner,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid label value: {0}")]
pub struct InvalidLabel(String);

// === impl ResourceMeta ===

impl ResourceMeta {
    pub fn new(mesh: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: mesh.into(),
            labels: Labels::default(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels = self.labels.with(key, value);
        self
    }

    /// The user-facing name, which may differ from the stored name when the
    /// store decorates names with a namespace.
    pub fn display_name(&self) -> &str {
        self.labels.get(DISPLAY_NAME_LABEL).unwrap_or(&self.name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.labels.get(NAMESPACE_LABEL)
    }

    pub fn zone(&self) -> Option<&str> {
        self.labels.get(ZONE_LABEL)
    }

    /// Unlabelled or unparseable origins are reported as `None`.
    pub fn origin(&self) -> Option<ResourceOrigin> {
        self.labels.get(ORIGIN_LABEL)?.parse().ok()
    }

    pub fn policy_role(&self) -> PolicyRole {
        self.labels
            .get(POLICY_ROLE_LABEL)
            .and_then(|r| r.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_shadow(&self) -> bool {
        self.labels.get(EFFECT_LABEL) == Some("shadow")
    }

    /// Returns true if this resource was authored in the zone `zone`.
    pub fn is_local_zone(&self, zone: &str) -> bool {
        self.origin() == Some(ResourceOrigin::Zone) && self.zone() == Some(zone)
    }

    /// Identifies the same stored resource as `other`.
    pub fn same_resource(&self, other: &Self) -> bool {
        self.mesh == other.mesh && self.name == other.name
    }

    /// Checks whether `name`, written on this resource, refers to `other`.
    pub fn is_referenced(&self, name: &str, other: &Self) -> bool {
        if self.mesh != other.mesh {
            return false;
        }
        match self.namespace() {
            Some(ns) => other.display_name() == name && other.namespace() == Some(ns),
            None => other.name == name || other.display_name() == name,
        }
    }
}

// === impl ResourceOrigin ===

impl FromStr for ResourceOrigin {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "zone" => Ok(Self::Zone),
            s => Err(InvalidLabel(s.to_string())),
        }
    }
}

impl fmt::Display for ResourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => "global".fmt(f),
            Self::Zone => "zone".fmt(f),
        }
    }
}

// === impl PolicyRole ===

impl FromStr for PolicyRole {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "workload-owner" => Ok(Self::WorkloadOwner),
            s => Err(InvalidLabel(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => "system".fmt(f),
            Self::Producer => "producer".fmt(f),
            Self::Consumer => "consumer".fmt(f),
            Self::WorkloadOwner => "workload-owner".fmt(f),
        }
    }
}
