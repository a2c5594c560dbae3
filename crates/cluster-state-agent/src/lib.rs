//! Versioned on-disk configuration for cluster state agents.
//!
//! Each agent keeps its identity, credentials and connection details in a
//! small directory (see [`format`]). [`upgrade`] brings an older directory
//! forward to the current format exactly once, migrating settings older
//! agents took from the process environment.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod format;
pub mod migrate;

use std::path::Path;

use tracing::info;

pub use config::{AgentConfig, ConnectionDetails};
pub use error::{ConfigError, Result};
pub use format::{read, write, write_commands, Format};
pub use migrate::{migrate_values, EnvSnapshot};

/// Read the configuration in `dir`, upgrading it to the current format.
///
/// A legacy directory has `env` migrated into its values and is rewritten
/// in the current format. A current directory is returned as stored, so the
/// migration runs at most once.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or rewritten.
pub fn upgrade(dir: &Path, env: &EnvSnapshot) -> Result<AgentConfig> {
    let (format, mut config) = read(dir)?;
    if format == Format::V1_16 {
        return Ok(config);
    }

    let values = migrate_values(config.values().clone(), env);
    config.set_values(values);
    write(&config)?;
    info!(
        dir = %dir.display(),
        from = format.line(),
        to = Format::V1_16.line(),
        "upgraded agent config"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LEGACY: &str = "\
tag: unit-wordpress-0
nonce: fake-nonce
cacert: |
  -----BEGIN CERTIFICATE-----
  abc
  -----END CERTIFICATE-----
stateaddresses:
- localhost:37017
statepassword: old
apiaddresses:
- localhost:17070
apipassword: old
";

    fn legacy_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(format::FORMAT_FILE), "format 1.12\n").unwrap();
        fs::write(tmp.path().join(format::CONFIG_FILE), LEGACY).unwrap();
        tmp
    }

    #[test]
    fn legacy_config_is_migrated_and_rewritten() {
        let tmp = legacy_dir();
        let env = EnvSnapshot::from_pairs([
            ("CLUSTER_PROVIDER_TYPE", "local"),
            ("CLUSTER_STORAGE_DIR", "/var/lib/storage"),
        ]);

        let config = upgrade(tmp.path(), &env).unwrap();
        assert_eq!(config.tag().to_string(), "unit-wordpress-0");
        assert_eq!(config.value("PROVIDER_TYPE"), Some("local"));
        assert_eq!(config.value("STORAGE_DIR"), Some("/var/lib/storage"));
        assert!(config.ca_cert().starts_with(b"-----BEGIN CERTIFICATE-----"));
        assert_eq!(config.api().unwrap().addresses, vec!["localhost:17070"]);

        let (format, stored) = read(tmp.path()).unwrap();
        assert_eq!(format, Format::V1_16);
        assert_eq!(stored, config);
    }

    #[test]
    fn current_config_is_not_migrated_again() {
        let tmp = legacy_dir();
        upgrade(
            tmp.path(),
            &EnvSnapshot::from_pairs([("CLUSTER_CONTAINER_TYPE", "lxc")]),
        )
        .unwrap();

        let config = upgrade(
            tmp.path(),
            &EnvSnapshot::from_pairs([("CLUSTER_CONTAINER_TYPE", "kvm")]),
        )
        .unwrap();
        assert_eq!(config.value("CONTAINER_TYPE"), Some("lxc"));
    }

    #[test]
    fn current_record_under_legacy_format_is_not_upgraded() {
        let tmp = legacy_dir();
        upgrade(tmp.path(), &EnvSnapshot::default()).unwrap();
        let format_file = tmp.path().join(format::FORMAT_FILE);
        fs::write(&format_file, "format 1.12\n").unwrap();
        let before = fs::read_to_string(tmp.path().join(format::CONFIG_FILE)).unwrap();

        let err = upgrade(tmp.path(), &EnvSnapshot::default()).unwrap_err();
        assert!(matches!(err, ConfigError::FormatMismatch { .. }));
        assert_eq!(
            fs::read_to_string(tmp.path().join(format::CONFIG_FILE)).unwrap(),
            before
        );
        assert_eq!(fs::read_to_string(format_file).unwrap(), "format 1.12\n");
    }

    #[test]
    fn missing_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(upgrade(tmp.path(), &EnvSnapshot::default())
            .unwrap_err()
            .is_not_found());
    }
}
