//! One-time migration of environment settings into the `values` map.
//!
//! Older agents read a handful of settings from process environment
//! variables. Upgrading copies them into the configuration once; after that
//! the environment is never consulted again.

use std::collections::BTreeMap;

use crate::config::keys;

/// Environment variables older agents read, and the value keys they move to.
pub const MIGRATED_VARIABLES: [(&str, &str); 5] = [
    ("CLUSTER_PROVIDER_TYPE", keys::PROVIDER_TYPE),
    ("CLUSTER_CONTAINER_TYPE", keys::CONTAINER_TYPE),
    ("CLUSTER_LXC_BRIDGE", keys::LXC_BRIDGE),
    ("CLUSTER_STORAGE_DIR", keys::STORAGE_DIR),
    ("CLUSTER_STORAGE_ADDR", keys::STORAGE_ADDR),
];

/// A snapshot of the environment variables migration reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the relevant variables from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_pairs(
            MIGRATED_VARIABLES
                .iter()
                .filter_map(|(name, _)| std::env::var(name).ok().map(|v| (*name, v))),
        )
    }

    /// Build a snapshot from name/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Copy non-empty migrated variables into `values`.
///
/// Variables override existing values; unset or empty variables leave
/// values untouched.
#[must_use]
pub fn migrate_values(
    mut values: BTreeMap<String, String>,
    env: &EnvSnapshot,
) -> BTreeMap<String, String> {
    for (variable, key) in MIGRATED_VARIABLES {
        match env.get(variable) {
            Some(value) if !value.is_empty() => {
                values.insert(key.to_string(), value.to_string());
            }
            _ => {}
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_set_variables() {
        let env = EnvSnapshot::from_pairs([
            ("CLUSTER_PROVIDER_TYPE", "ec2"),
            ("CLUSTER_LXC_BRIDGE", "lxcbr0"),
            ("CLUSTER_STORAGE_DIR", ""),
            ("UNRELATED", "x"),
        ]);
        let values = migrate_values(BTreeMap::new(), &env);

        assert_eq!(values.get("PROVIDER_TYPE").map(String::as_str), Some("ec2"));
        assert_eq!(values.get("LXC_BRIDGE").map(String::as_str), Some("lxcbr0"));
        assert!(!values.contains_key("STORAGE_DIR"));
        assert!(!values.contains_key("UNRELATED"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn keeps_existing_values() {
        let mut existing = BTreeMap::new();
        existing.insert("CONTAINER_TYPE".to_string(), "lxc".to_string());
        existing.insert("OTHER".to_string(), "kept".to_string());

        let values = migrate_values(existing, &EnvSnapshot::default());
        assert_eq!(values.get("CONTAINER_TYPE").map(String::as_str), Some("lxc"));
        assert_eq!(values.get("OTHER").map(String::as_str), Some("kept"));
    }

    #[test]
    fn environment_overrides() {
        let mut existing = BTreeMap::new();
        existing.insert("STORAGE_ADDR".to_string(), "old:8040".to_string());
        let env = EnvSnapshot::from_pairs([("CLUSTER_STORAGE_ADDR", "new:8040")]);

        let values = migrate_values(existing, &env);
        assert_eq!(values.get("STORAGE_ADDR").map(String::as_str), Some("new:8040"));
    }
}
