use crate::Tags;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A builtin gateway: the dataplanes it configures and the listeners it
/// exposes on them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshGatewaySpec {
    #[serde(default)]
    pub selectors: Vec<GatewaySelector>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySelector {
    #[serde(rename = "match")]
    pub match_tags: Tags,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    pub port: u32,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

pub const WILDCARD_HOSTNAME: &str = "*";

impl MeshGatewaySpec {
    /// Returns the size of the most specific selector matching `tags`, if
    /// any selector matches.
    pub fn selector_score(&self, tags: &Tags) -> Option<usize> {
        self.selectors
            .iter()
            .filter(|s| s.match_tags.iter().all(|(k, v)| tags.get(k) == Some(v)))
            .map(|s| s.match_tags.len())
            .max()
    }
}

impl GatewayListener {
    pub fn hostname(&self) -> &str {
        match self.hostname.as_deref() {
            None | Some("") => WILDCARD_HOSTNAME,
            Some(h) => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn selector_score() {
        let gw = MeshGatewaySpec {
            selectors: vec![
                GatewaySelector {
                    match_tags: btreemap! {"kuma.io/service".to_string() => "edge".to_string()},
                },
                GatewaySelector {
                    match_tags: btreemap! {
                        "kuma.io/service".to_string() => "edge".to_string(),
                        "zone".to_string() => "east".to_string(),
                    },
                },
            ],
            ..MeshGatewaySpec::default()
        };
        let edge = btreemap! {"kuma.io/service".to_string() => "edge".to_string()};
        let edge_east = btreemap! {
            "kuma.io/service".to_string() => "edge".to_string(),
            "zone".to_string() => "east".to_string(),
        };
        assert_eq!(gw.selector_score(&edge), Some(1));
        assert_eq!(gw.selector_score(&edge_east), Some(2));
        assert_eq!(gw.selector_score(&Tags::new()), None);
    }
}
