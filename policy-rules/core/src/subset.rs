//! Predicates over workload tags.
//!
//! A [`Subset`] is a conjunction of (possibly negated) tag constraints. An
//! empty subset is the universal set. An [`Element`] is the concrete tag map
//! of one listener or workload that subsets are evaluated against.

use std::{collections::BTreeMap, fmt};

/// A single constraint: `key=value`, or `key!=value` when negated.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub not: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Subset(Vec<Tag>);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element(BTreeMap<String, String>);

/// The most tags a [`SubsetIter`] can sign while every state, including the
/// all-negated one, fits in its `u64` counter.
pub const MAX_TAGS: usize = u64::BITS as usize - 1;

/// Enumerates every assignment of signs over a list of tags, yielding the
/// simplified, non-contradictory subsets.
///
/// States are walked as a binary counter where bit `i` negates tag `i`. The
/// first valid state (counting up from all-positive) is yielded last. Only
/// the first [`MAX_TAGS`] tags can be negated.
#[derive(Clone, Debug)]
pub struct SubsetIter {
    tags: Vec<Tag>,
    state: u64,
    start: Option<u64>,
    done: bool,
}

// === impl Tag ===

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            not: false,
        }
    }

    pub fn negated(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            not: true,
            ..Self::new(key, value)
        }
    }

    /// Returns true if every point satisfying `self` also satisfies `other`.
    /// Both tags must constrain the same key.
    fn implies(&self, other: &Tag) -> bool {
        match (other.not, self.not) {
            (false, false) | (true, true) => self.value == other.value,
            // `x=b` implies `x!=a` iff `b != a`.
            (true, false) => self.value != other.value,
            // `x!=b` never implies `x=a`.
            (false, true) => false,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.not {
            write!(f, "{}=!{}", self.key, self.value)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

// === impl Subset ===

impl Subset {
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, tag: Tag) {
        self.0.push(tag);
    }

    /// Returns true if `other` is contained in `self`, i.e. every point
    /// matching `other` also matches `self`.
    pub fn is_subset(&self, other: &Subset) -> bool {
        if self.is_empty() {
            return true;
        }

        self.iter().all(|tag| {
            other
                .iter()
                .filter(|o| o.key == tag.key)
                .any(|o| o.implies(tag))
        })
    }

    /// Returns true if some element matches both subsets. Negations never
    /// prevent an intersection.
    pub fn intersect(&self, other: &Subset) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }

        for t1 in self.iter().filter(|t| !t.not) {
            for t2 in other.iter().filter(|t| !t.not) {
                if t1.key == t2.key && t1.value != t2.value {
                    return false;
                }
            }
        }

        true
    }

    pub fn contains_element(&self, element: &Element) -> bool {
        if self.is_empty() {
            return true;
        }
        if element.is_empty() {
            return false;
        }

        for tag in self.iter() {
            match element.get(&tag.key) {
                Some(value) => {
                    if tag.not == (value == tag.value) {
                        return false;
                    }
                }
                None => {
                    if !tag.not {
                        return false;
                    }
                }
            }
        }

        true
    }

    pub fn num_positive(&self) -> usize {
        self.iter().filter(|t| !t.not).count()
    }

    pub fn index_of_positive(&self) -> Option<usize> {
        self.iter().position(|t| !t.not)
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            tag.fmt(f)?;
        }
        f.write_str("}")
    }
}

impl FromIterator<Tag> for Subset {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Subset {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// === impl Element ===

impl Element {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Element {
    fn from(tags: BTreeMap<String, String>) -> Self {
        Self(tags)
    }
}

impl FromIterator<(String, String)> for Element {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Element {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === impl SubsetIter ===

impl SubsetIter {
    /// Repeated `(key, value)` pairs are collapsed, keeping the first.
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> Self {
        let mut unique = Vec::<Tag>::new();
        for tag in tags {
            if !unique
                .iter()
                .any(|t| t.key == tag.key && t.value == tag.value)
            {
                unique.push(Tag { not: false, ..tag });
            }
        }
        Self {
            tags: unique,
            state: 0,
            start: None,
            done: false,
        }
    }

    fn num_states(&self) -> u64 {
        1u64.checked_shl(self.tags.len() as u32)
            .unwrap_or(u64::MAX)
    }

    /// Applies the signs encoded by `state` and simplifies the result per key,
    /// in the order keys first appear. Returns `None` for contradictory states
    /// that require two different values for one key.
    fn simplify(&self, state: u64) -> Option<Subset> {
        let signed = self
            .tags
            .iter()
            .enumerate()
            .map(|(i, t)| Tag {
                not: state.checked_shr(i as u32).map_or(false, |s| s & 1 != 0),
                ..t.clone()
            })
            .collect::<Vec<_>>();

        let mut keys = Vec::<&str>::new();
        for tag in &signed {
            if !keys.contains(&tag.key.as_str()) {
                keys.push(&tag.key);
            }
        }

        let mut subset = Subset::default();
        for key in keys {
            let mut positive = signed.iter().filter(|t| t.key == key && !t.not);
            match (positive.next(), positive.next()) {
                (Some(_), Some(_)) => return None,
                (Some(tag), None) => subset.push(tag.clone()),
                (None, _) => {
                    for tag in signed.iter().filter(|t| t.key == key) {
                        subset.push(tag.clone());
                    }
                }
            }
        }
        Some(subset)
    }
}

impl Iterator for SubsetIter {
    type Item = Subset;

    fn next(&mut self) -> Option<Subset> {
        if self.done {
            return None;
        }
        if self.tags.is_empty() {
            self.done = true;
            return Some(Subset::default());
        }

        let total = self.num_states();
        let start = match self.start {
            Some(start) => start,
            None => {
                // The all-negated state is always valid, so a start exists.
                let start = (0..total)
                    .find(|s| self.simplify(*s).is_some())
                    .unwrap_or(total - 1);
                self.start = Some(start);
                self.state = start + 1;
                start
            }
        };

        while self.state < total {
            let state = self.state;
            self.state += 1;
            if let Some(subset) = self.simplify(state) {
                return Some(subset);
            }
        }

        self.done = true;
        self.simplify(start)
    }
}
