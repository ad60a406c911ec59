//! Structural merging of policy configurations.
//!
//! Configurations are merged left to right with JSON merge-patch semantics:
//! later values replace earlier scalars and arrays, and `null` clears a field.
//! A [`MergeSchema`] declares the fields that merge differently.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Post-processes every merged value.
pub type Transform = fn(&mut Value);

/// The merge strategies declared by a policy type, validated once when the
/// type is registered.
#[derive(Clone, Default)]
pub struct MergeSchema {
    fields: Vec<MergeField>,
    fan_out: Option<FieldPath>,
    transform: Option<Transform>,
}

#[derive(Clone, Debug)]
pub struct MergeField {
    path: FieldPath,
    strategy: Strategy,
}

#[derive(Clone, Debug)]
pub enum Strategy {
    /// Later values replace earlier ones.
    Replace,
    /// Arrays are concatenated in input order.
    Append,
    /// Array entries are grouped by `key` and their `default` values merged
    /// with `nested`.
    MergeByKey {
        key: String,
        default: String,
        nested: Box<MergeSchema>,
    },
}

/// A dotted path to an object field, e.g. `http.requestHeaders`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

// === impl MergeSchema ===

impl MergeSchema {
    pub fn new(fields: impl IntoIterator<Item = MergeField>) -> Result<Self> {
        let fields = fields.into_iter().collect::<Vec<_>>();
        for (i, field) in fields.iter().enumerate() {
            field.path.validate()?;
            if fields[..i].iter().any(|f| f.path == field.path) {
                return Err(Error::MergeSchema(format!(
                    "field {} is declared more than once",
                    field.path
                )));
            }
            if let Strategy::MergeByKey { key, default, .. } = &field.strategy {
                if key.is_empty() || default.is_empty() {
                    return Err(Error::MergeSchema(format!(
                        "merge by key field {} must name a key and a default field",
                        field.path
                    )));
                }
                if key == default {
                    return Err(Error::MergeSchema(format!(
                        "merge by key field {} uses {} as both key and default",
                        field.path, key
                    )));
                }
            }
        }

        Ok(Self {
            fields,
            ..Self::default()
        })
    }

    /// Splits inputs by the values of a string-list field; each value is
    /// merged independently and yields its own output.
    pub fn with_fan_out(mut self, path: &str) -> Result<Self> {
        let path = FieldPath::parse(path);
        path.validate()?;
        if let Some(existing) = &self.fan_out {
            return Err(Error::MergeSchema(format!(
                "fan out field {} is already declared",
                existing
            )));
        }
        if self.fields.iter().any(|f| f.path == path) {
            return Err(Error::MergeSchema(format!(
                "fan out field {} also has a merge strategy",
                path
            )));
        }
        self.fan_out = Some(path);
        Ok(self)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    fn concatenated(&self) -> impl Iterator<Item = &FieldPath> + '_ {
        self.fields
            .iter()
            .filter(|f| !matches!(f.strategy, Strategy::Replace))
            .map(|f| &f.path)
    }
}

impl fmt::Debug for MergeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSchema")
            .field("fields", &self.fields)
            .field("fan_out", &self.fan_out)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

// === impl MergeField ===

impl MergeField {
    pub fn replace(path: &str) -> Self {
        Self {
            path: FieldPath::parse(path),
            strategy: Strategy::Replace,
        }
    }

    pub fn append(path: &str) -> Self {
        Self {
            path: FieldPath::parse(path),
            strategy: Strategy::Append,
        }
    }

    pub fn merge_by_key(path: &str, key: &str, default: &str, nested: MergeSchema) -> Self {
        Self {
            path: FieldPath::parse(path),
            strategy: Strategy::MergeByKey {
                key: key.to_string(),
                default: default.to_string(),
                nested: Box::new(nested),
            },
        }
    }
}

// === impl FieldPath ===

impl FieldPath {
    fn parse(path: &str) -> Self {
        Self(path.split('.').map(ToString::to_string).collect())
    }

    fn validate(&self) -> Result<()> {
        if self.0.iter().any(String::is_empty) {
            return Err(Error::MergeSchema(format!("invalid field path {:?}", self.to_string())));
        }
        Ok(())
    }

    fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(value, |v, segment| v.get(segment))
    }

    /// Returns the object holding the last segment, if every parent exists.
    fn parent_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Map<String, Value>> {
        let (_, parents) = self.0.split_last()?;
        parents
            .iter()
            .try_fold(value, |v, segment| v.get_mut(segment))?
            .as_object_mut()
    }

    fn last(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Merges `confs`, ordered from lowest to highest precedence.
///
/// Usually returns a single value. A schema with a fan-out field returns one
/// value per distinct fan-out value, in first-seen order.
pub fn merge_confs(confs: &[Value], schema: &MergeSchema) -> Result<Vec<Value>> {
    if confs.is_empty() {
        return Ok(Vec::new());
    }

    let mut merged = Vec::new();
    for (fan_out, group) in fan_out_groups(confs, schema)? {
        let mut result = group[0].clone();
        for conf in &group[1..] {
            json_patch::merge(&mut result, conf);
        }

        for path in schema.concatenated() {
            concatenate(&mut result, path, &group)?;
        }

        for field in &schema.fields {
            if let Strategy::MergeByKey {
                key,
                default,
                nested,
            } = &field.strategy
            {
                let parent = match field.path.parent_mut(&mut result) {
                    Some(parent) => parent,
                    None => continue,
                };
                let entries = match parent.get(field.path.last()) {
                    Some(Value::Array(entries)) => merge_by_key(entries, key, default, nested)?,
                    _ => continue,
                };
                parent.insert(field.path.last().to_string(), Value::Array(entries));
            }
        }

        if let (Some(path), Some(value)) = (schema.fan_out.as_ref(), fan_out) {
            if let Some(parent) = path.parent_mut(&mut result) {
                parent.insert(
                    path.last().to_string(),
                    Value::Array(vec![Value::String(value)]),
                );
            }
        }

        if let Some(transform) = schema.transform {
            transform(&mut result);
        }

        merged.push(result);
    }

    Ok(merged)
}

fn fan_out_groups<'c>(
    confs: &'c [Value],
    schema: &MergeSchema,
) -> Result<Vec<(Option<String>, Vec<&'c Value>)>> {
    let path = match schema.fan_out.as_ref() {
        Some(path) => path,
        None => return Ok(vec![(None, confs.iter().collect())]),
    };

    let mut groups = Vec::<(Option<String>, Vec<&'c Value>)>::new();
    for conf in confs {
        let values = match path.lookup(conf) {
            None | Some(Value::Null) => vec![None],
            Some(Value::Array(values)) if values.is_empty() => vec![None],
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(Some(s.clone())),
                    _ => Err(malformed(path, "a list of strings")),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(malformed(path, "a list of strings")),
        };

        for value in values {
            match groups.iter_mut().find(|(v, _)| *v == value) {
                Some((_, group)) => group.push(conf),
                None => groups.push((value, vec![conf])),
            }
        }
    }
    Ok(groups)
}

/// Replaces the array at `path` with the concatenation of every input's array.
/// Nothing is written when the parent object is absent from the result.
fn concatenate(result: &mut Value, path: &FieldPath, inputs: &[&Value]) -> Result<()> {
    let parent = match path.parent_mut(result) {
        Some(parent) => parent,
        None => return Ok(()),
    };

    let mut entries = Vec::new();
    for input in inputs {
        match path.lookup(input) {
            None | Some(Value::Null) => {}
            Some(Value::Array(values)) => entries.extend(values.iter().cloned()),
            Some(_) => return Err(malformed(path, "a list")),
        }
    }

    if entries.is_empty() {
        parent.remove(path.last());
    } else {
        parent.insert(path.last().to_string(), Value::Array(entries));
    }
    Ok(())
}

/// Groups entries by their key, merging the defaults of each group. Groups
/// are emitted in the order their key first appears.
fn merge_by_key(
    entries: &[Value],
    key: &str,
    default: &str,
    nested: &MergeSchema,
) -> Result<Vec<Value>> {
    let mut groups = Vec::<(Value, Vec<Value>)>::new();
    for entry in entries {
        let entry = entry.as_object().ok_or_else(|| {
            Error::MergeSchema(format!("entries merged by {} must be objects", key))
        })?;
        let k = entry.get(key).cloned().unwrap_or(Value::Null);
        let d = entry.get(default).cloned().unwrap_or(Value::Null);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, defaults)) => defaults.push(d),
            None => groups.push((k, vec![d])),
        }
    }

    let mut merged = Vec::new();
    for (k, defaults) in groups {
        for d in merge_confs(&defaults, nested)? {
            let mut entry = Map::new();
            entry.insert(key.to_string(), k.clone());
            entry.insert(default.to_string(), d);
            merged.push(Value::Object(entry));
        }
    }
    Ok(merged)
}

fn malformed(path: &FieldPath, expected: &'static str) -> Error {
    Error::MalformedConf {
        path: path.to_string(),
        expected,
    }
}
