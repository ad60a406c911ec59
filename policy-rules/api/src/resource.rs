use crate::{
    gateway::MeshGatewaySpec, http_route::HttpRouteSpec, meta::ResourceMeta,
    target_ref::TargetRefKind, Tags,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The destination resource kinds a policy may reference directly.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ResourceType {
    Mesh,
    MeshService,
    MeshExternalService,
    MeshMultiZoneService,
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute,
    MeshGateway,
}

/// Identifies a resource independently of how its store names it.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceIdentifier {
    pub mesh: String,
    pub zone: String,
    pub namespace: String,
    pub name: String,
}

/// A resource identifier qualified by its type and, for services, a port
/// section.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypedResourceIdentifier {
    pub resource_type: ResourceType,
    pub id: ResourceIdentifier,
    pub section_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Resource {
    pub meta: ResourceMeta,
    pub spec: ResourceSpec,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub enum ResourceSpec {
    Mesh(MeshSpec),
    MeshService(MeshServiceSpec),
    MeshExternalService(MeshExternalServiceSpec),
    MeshMultiZoneService(MeshMultiZoneServiceSpec),
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute(HttpRouteSpec),
    MeshGateway(MeshGatewaySpec),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MeshSpec {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshServiceSpec {
    #[serde(default)]
    pub selector: Tags,
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshExternalServiceSpec {
    #[serde(rename = "match")]
    pub endpoint: ExternalEndpoint,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEndpoint {
    pub port: u32,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshMultiZoneServiceSpec {
    /// Labels of the zone-local services this service aggregates.
    #[serde(default)]
    pub selector: Tags,
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub port: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub app_protocol: Option<String>,
}

// === impl ResourceType ===

impl ResourceType {
    /// Maps a target-ref kind onto the resource type it names, if any.
    pub fn from_kind(kind: TargetRefKind) -> Option<Self> {
        match kind {
            TargetRefKind::Mesh => Some(Self::Mesh),
            TargetRefKind::MeshService => Some(Self::MeshService),
            TargetRefKind::MeshExternalService => Some(Self::MeshExternalService),
            TargetRefKind::MeshMultiZoneService => Some(Self::MeshMultiZoneService),
            TargetRefKind::MeshHttpRoute => Some(Self::MeshHttpRoute),
            TargetRefKind::MeshGateway => Some(Self::MeshGateway),
            TargetRefKind::MeshSubset | TargetRefKind::MeshServiceSubset => None,
        }
    }

    /// Types whose resources expose ports addressable by section name.
    pub fn is_sectioned(&self) -> bool {
        matches!(self, Self::MeshService | Self::MeshMultiZoneService)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh => "Mesh".fmt(f),
            Self::MeshService => "MeshService".fmt(f),
            Self::MeshExternalService => "MeshExternalService".fmt(f),
            Self::MeshMultiZoneService => "MeshMultiZoneService".fmt(f),
            Self::MeshHttpRoute => "MeshHTTPRoute".fmt(f),
            Self::MeshGateway => "MeshGateway".fmt(f),
        }
    }
}

// === impl ResourceIdentifier ===

impl ResourceIdentifier {
    /// Meshes are identified by name alone.
    pub fn mesh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mesh.is_empty() {
            return self.name.fmt(f);
        }
        write!(
            f,
            "{}/{}/{}/{}",
            self.mesh, self.zone, self.namespace, self.name
        )
    }
}

// === impl TypedResourceIdentifier ===

impl TypedResourceIdentifier {
    pub fn new(resource_type: ResourceType, id: ResourceIdentifier) -> Self {
        Self {
            resource_type,
            id,
            section_name: None,
        }
    }

    pub fn with_section_name(mut self, section: impl Into<String>) -> Self {
        self.section_name = Some(section.into());
        self
    }

    pub fn without_section_name(&self) -> Self {
        Self {
            section_name: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for TypedResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)?;
        if let Some(section) = self.section_name.as_deref() {
            write!(f, ":{}", section)?;
        }
        Ok(())
    }
}

// === impl Resource ===

impl Resource {
    pub fn new(meta: ResourceMeta, spec: ResourceSpec) -> Self {
        Self { meta, spec }
    }

    pub fn mesh(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ResourceMeta::new("", name),
            ResourceSpec::Mesh(MeshSpec::default()),
        )
    }

    pub fn resource_type(&self) -> ResourceType {
        match self.spec {
            ResourceSpec::Mesh(_) => ResourceType::Mesh,
            ResourceSpec::MeshService(_) => ResourceType::MeshService,
            ResourceSpec::MeshExternalService(_) => ResourceType::MeshExternalService,
            ResourceSpec::MeshMultiZoneService(_) => ResourceType::MeshMultiZoneService,
            ResourceSpec::MeshHttpRoute(_) => ResourceType::MeshHttpRoute,
            ResourceSpec::MeshGateway(_) => ResourceType::MeshGateway,
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        if let ResourceSpec::Mesh(_) = self.spec {
            return ResourceIdentifier::mesh(self.meta.name.clone());
        }
        ResourceIdentifier {
            mesh: self.meta.mesh.clone(),
            zone: self.meta.zone().unwrap_or_default().to_string(),
            namespace: self.meta.namespace().unwrap_or_default().to_string(),
            name: self.meta.display_name().to_string(),
        }
    }

    pub fn typed_identifier(&self) -> TypedResourceIdentifier {
        TypedResourceIdentifier::new(self.resource_type(), self.identifier())
    }

    pub fn ports(&self) -> &[Port] {
        match &self.spec {
            ResourceSpec::MeshService(spec) => &spec.ports,
            ResourceSpec::MeshMultiZoneService(spec) => &spec.ports,
            _ => &[],
        }
    }

    /// A section names a port, or its number when the port is unnamed.
    pub fn has_section(&self, section: &str) -> bool {
        self.ports().iter().any(|p| p.matches_section(section))
    }

    pub fn as_http_route(&self) -> Option<&HttpRouteSpec> {
        match &self.spec {
            ResourceSpec::MeshHttpRoute(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_gateway(&self) -> Option<&MeshGatewaySpec> {
        match &self.spec {
            ResourceSpec::MeshGateway(spec) => Some(spec),
            _ => None,
        }
    }
}

// === impl Port ===

impl Port {
    pub fn new(port: u32) -> Self {
        Self {
            port,
            name: None,
            app_protocol: None,
        }
    }

    pub fn named(port: u32, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(port)
        }
    }

    pub fn matches_section(&self, section: &str) -> bool {
        match self.name.as_deref() {
            Some(name) => name == section,
            None => self.port.to_string() == section,
        }
    }
}
