//! Feature sets and the plan comparator.
//!
//! A feature set maps capability names to comparable entitlement values.
//! Dissimilar subscription sources (individual, group, institutional) are
//! compared on equal footing by comparing their plans' feature sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single comparable entitlement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureValue {
    /// A capability flag; `true` is better than `false`.
    Bool(bool),
    /// A numeric limit; higher is better. Comparison is purely numeric, so
    /// catalogs encode "unlimited" as `i64::MAX`.
    Limit(i64),
    /// A ranked tier; higher rank is better.
    Tier(u32),
}

impl FeatureValue {
    /// Check whether this value grants at least as much as `other`.
    ///
    /// Values of different kinds are never comparable, so a kind mismatch
    /// never counts as better.
    #[must_use]
    pub fn is_equal_or_better(&self, other: &FeatureValue) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => *a || !*b,
            (Self::Limit(a), Self::Limit(b)) => a >= b,
            (Self::Tier(a), Self::Tier(b)) => a >= b,
            _ => false,
        }
    }

    /// The minimum grant of this value's kind: `false`, a zero-or-negative
    /// limit, or tier zero. A plan missing a feature is treated as holding
    /// the minimum.
    #[must_use]
    pub fn is_minimum(&self) -> bool {
        match self {
            Self::Bool(flag) => !flag,
            Self::Limit(limit) => *limit <= 0,
            Self::Tier(rank) => *rank == 0,
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<i64> for FeatureValue {
    fn from(limit: i64) -> Self {
        Self::Limit(limit)
    }
}

/// Mapping from feature name to entitlement value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureSet {
    /// Create an empty feature set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature, returning the set for chaining.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Insert a feature value.
    pub fn insert(&mut self, name: &str, value: impl Into<FeatureValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Get a feature value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    /// Number of features in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the set has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all features.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Create a FeatureSet from a JSON object.
    ///
    /// Booleans become flags and integers become limits; other value types
    /// are ignored.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        let obj = match json.as_object() {
            Some(o) => o,
            None => return Self::default(),
        };

        let mut set = Self::default();
        for (key, value) in obj {
            if let Some(flag) = value.as_bool() {
                set.insert(key, flag);
            } else if let Some(limit) = value.as_i64() {
                set.insert(key, limit);
            }
        }
        set
    }

    /// Check whether this feature set grants at least as much as `other`
    /// for every feature present in either set.
    ///
    /// Features present only in `self` can only help, so it suffices to walk
    /// `other`'s features; a feature missing from `self` passes only when
    /// `other` holds the minimum grant for it.
    #[must_use]
    pub fn is_equal_or_better(&self, other: &FeatureSet) -> bool {
        other.values.iter().all(|(name, required)| {
            match self.values.get(name) {
                Some(granted) => granted.is_equal_or_better(required),
                None => required.is_minimum(),
            }
        })
    }
}

/// Compare two optional feature sets, where `None` is the "no plan yet"
/// sentinel.
///
/// Any concrete feature set is equal-or-better than the sentinel, and the
/// sentinel is never better than a concrete set. This is the shape the
/// resolver needs: its accumulating "current best" starts at no plan.
#[must_use]
pub fn is_feature_set_equal_or_better(a: Option<&FeatureSet>, b: Option<&FeatureSet>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_equal_or_better(b),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}
