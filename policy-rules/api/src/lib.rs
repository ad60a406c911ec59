#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod dataplane;
pub mod gateway;
pub mod http_route;
pub mod labels;
pub mod meta;
pub mod policy;
pub mod resource;
pub mod target_ref;

pub use self::{
    dataplane::{Dataplane, GatewayDescriptor, GatewayType, Inbound, InboundState, Networking},
    gateway::{GatewayListener, GatewaySelector, MeshGatewaySpec},
    http_route::{hash_matches, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, HttpRouteTo},
    labels::{Labels, Selector},
    meta::{PolicyRole, ResourceMeta, ResourceOrigin},
    policy::{Policy, PolicyItem, PolicySpec, RuleItem},
    resource::{
        Port, Resource, ResourceIdentifier, ResourceSpec, ResourceType, TypedResourceIdentifier,
    },
    target_ref::{ProxyType, TargetRef, TargetRefKind},
};

/// Tags are plain string maps; ordering keeps their iteration deterministic.
pub type Tags = std::collections::BTreeMap<String, String>;
