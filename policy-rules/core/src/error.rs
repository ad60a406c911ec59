use policy_rules_api::TargetRefKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target cannot be expressed as a set of tags.
    #[error("can't represent {0} as tags")]
    UnsupportedTargetRefKind(TargetRefKind),

    /// The policy type declared a merge schema that cannot be applied.
    #[error("invalid merge schema: {0}")]
    MergeSchema(String),

    #[error("failed to encode policy configuration: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A configuration value does not have the shape its merge schema
    /// declares.
    #[error("configuration field {path} must be {expected}")]
    MalformedConf { path: String, expected: &'static str },

    /// Intersecting subsets mention more distinct tags than can be
    /// partitioned.
    #[error("{count} intersecting tags exceed the limit of {limit}")]
    TooManyTags { count: usize, limit: usize },

    #[error("can't resolve MeshHTTPRoute {0:?}")]
    UnresolvedHttpRoute(String),
}
