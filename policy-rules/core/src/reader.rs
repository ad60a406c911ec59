use ahash::AHashMap;
use policy_rules_api::{Policy, Resource, ResourceIdentifier, ResourceType};

/// Read-only access to a snapshot of the resource catalog.
///
/// Implementations must not change while a resolution call holds them.
pub trait ResourceReader {
    fn list_or_empty(&self, resource_type: ResourceType) -> &[Resource];

    /// Lists the policies registered under `policy_type`.
    fn policies(&self, policy_type: &str) -> &[Policy];

    fn get(&self, resource_type: ResourceType, id: &ResourceIdentifier) -> Option<&Resource> {
        self.list_or_empty(resource_type)
            .iter()
            .find(|r| r.identifier() == *id)
    }
}

/// An in-memory catalog.
#[derive(Clone, Debug, Default)]
pub struct Resources {
    resources: AHashMap<ResourceType, Vec<Resource>>,
    policies: AHashMap<String, Vec<Policy>>,
}

// === impl Resources ===

impl Resources {
    pub fn add_resource(&mut self, resource: Resource) {
        self.resources
            .entry(resource.resource_type())
            .or_default()
            .push(resource);
    }

    pub fn add_policy(&mut self, policy_type: impl Into<String>, policy: Policy) {
        self.policies
            .entry(policy_type.into())
            .or_default()
            .push(policy);
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.add_resource(resource);
        self
    }

    pub fn with_policy(mut self, policy_type: impl Into<String>, policy: Policy) -> Self {
        self.add_policy(policy_type, policy);
        self
    }
}

impl ResourceReader for Resources {
    fn list_or_empty(&self, resource_type: ResourceType) -> &[Resource] {
        self.resources
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn policies(&self, policy_type: &str) -> &[Policy] {
        self.policies
            .get(policy_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
