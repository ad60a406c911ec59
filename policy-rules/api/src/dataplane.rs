use crate::{meta::ResourceMeta, target_ref::ProxyType, Tags};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes one proxy: where it listens and how its workloads are tagged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dataplane {
    pub meta: ResourceMeta,
    pub networking: Networking,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub address: String,
    #[serde(default)]
    pub inbound: Vec<Inbound>,
    #[serde(default)]
    pub gateway: Option<GatewayDescriptor>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    /// Overrides the dataplane address for this inbound.
    #[serde(default)]
    pub address: Option<String>,
    pub port: u32,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub state: InboundState,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum InboundState {
    #[default]
    Ready,
    NotReady,
    Ignored,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDescriptor {
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, rename = "type")]
    pub kind: GatewayType,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum GatewayType {
    #[default]
    Delegated,
    Builtin,
}

// === impl Dataplane ===

impl Dataplane {
    pub fn proxy_type(&self) -> ProxyType {
        if self.networking.gateway.is_some() {
            ProxyType::Gateway
        } else {
            ProxyType::Sidecar
        }
    }

    pub fn is_builtin_gateway(&self) -> bool {
        matches!(
            self.networking.gateway,
            Some(GatewayDescriptor {
                kind: GatewayType::Builtin,
                ..
            })
        )
    }

    pub fn is_delegated_gateway(&self) -> bool {
        matches!(
            self.networking.gateway,
            Some(GatewayDescriptor {
                kind: GatewayType::Delegated,
                ..
            })
        )
    }

    pub fn gateway_tags(&self) -> Option<&Tags> {
        self.networking.gateway.as_ref().map(|gw| &gw.tags)
    }

    pub fn inbound_address<'a>(&'a self, inbound: &'a Inbound) -> &'a str {
        inbound.address.as_deref().unwrap_or(&self.networking.address)
    }
}
