//! On-disk formats of the agent configuration directory.
//!
//! A configuration directory holds two files:
//!
//! ```text
//! <dir>/format      "format 1.16\n"
//! <dir>/agent.conf  YAML record, mode 0600
//! ```
//!
//! Format 1.16 is the only format written. Format 1.12 records are still
//! read so that [`crate::upgrade`] can move them forward.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AgentConfig, ConnectionDetails};
use crate::error::{ConfigError, Result};

/// Name of the file holding the format line.
pub const FORMAT_FILE: &str = "format";

/// Name of the file holding the configuration record.
pub const CONFIG_FILE: &str = "agent.conf";

/// A known configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Legacy record without a `values` map; certificates stored as text.
    V1_12,
    /// Current record.
    V1_16,
}

impl Format {
    /// The line stored in the format file.
    #[must_use]
    pub const fn line(self) -> &'static str {
        match self {
            Self::V1_12 => "format 1.12",
            Self::V1_16 => "format 1.16",
        }
    }

    fn parse(line: &str) -> Result<Self> {
        match line.trim() {
            "format 1.12" => Ok(Self::V1_12),
            "format 1.16" => Ok(Self::V1_16),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Record {
    tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    nonce: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    cacert: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stateaddresses: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    statepassword: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    apiaddresses: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    apipassword: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    oldpassword: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    stateservercert: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    stateserverkey: String,
    #[serde(skip_serializing_if = "is_zero")]
    apiport: u16,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(port: &u16) -> bool {
    *port == 0
}

fn connection(addresses: Vec<String>, password: String) -> Option<ConnectionDetails> {
    if addresses.is_empty() {
        None
    } else {
        Some(ConnectionDetails {
            addresses,
            password,
        })
    }
}

fn decode_base64(field: &'static str, text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|source| ConfigError::Base64 { field, source })
}

/// Whether `text` is base64 for PEM data rather than PEM text itself.
fn is_encoded_pem(text: &str) -> bool {
    !text.contains("-----")
        && STANDARD
            .decode(text.trim())
            .is_ok_and(|bytes| bytes.starts_with(b"-----BEGIN"))
}

impl Record {
    fn from_config(config: &AgentConfig) -> Self {
        let (stateaddresses, statepassword) = config
            .state()
            .map(|c| (c.addresses.clone(), c.password.clone()))
            .unwrap_or_default();
        let (apiaddresses, apipassword) = config
            .api()
            .map(|c| (c.addresses.clone(), c.password.clone()))
            .unwrap_or_default();
        Self {
            tag: config.tag().to_string(),
            nonce: config.nonce().to_string(),
            cacert: STANDARD.encode(config.ca_cert()),
            stateaddresses,
            statepassword,
            apiaddresses,
            apipassword,
            oldpassword: config.old_password().to_string(),
            values: config.values().clone(),
            stateservercert: STANDARD.encode(config.state_server_cert()),
            stateserverkey: STANDARD.encode(config.state_server_key()),
            apiport: config.api_port(),
        }
    }

    /// Reject a newer record sitting under a legacy format line.
    fn check_legacy(&self) -> Result<()> {
        let mismatch = |reason| ConfigError::FormatMismatch {
            format: Format::V1_12.line(),
            reason,
        };
        if !self.values.is_empty() {
            return Err(mismatch("legacy records carry no values"));
        }
        let encoded = [&self.cacert, &self.stateservercert, &self.stateserverkey]
            .into_iter()
            .any(|text| is_encoded_pem(text));
        if encoded {
            return Err(mismatch("certificates are base64 encoded"));
        }
        Ok(())
    }

    fn into_config(self, dir: &Path, format: Format) -> Result<AgentConfig> {
        if self.tag.is_empty() {
            return Err(ConfigError::MissingField("tag"));
        }
        if format == Format::V1_12 {
            self.check_legacy()?;
        }
        let tag = self.tag.parse()?;

        let (ca_cert, cert, key) = match format {
            Format::V1_16 => (
                decode_base64("cacert", &self.cacert)?,
                decode_base64("stateservercert", &self.stateservercert)?,
                decode_base64("stateserverkey", &self.stateserverkey)?,
            ),
            Format::V1_12 => (
                self.cacert.into_bytes(),
                self.stateservercert.into_bytes(),
                self.stateserverkey.into_bytes(),
            ),
        };

        let mut config = AgentConfig::new(dir, tag, self.nonce)
            .with_ca_cert(ca_cert)
            .with_old_password(self.oldpassword);
        if let Some(state) = connection(self.stateaddresses, self.statepassword) {
            config = config.with_state(state);
        }
        if let Some(api) = connection(self.apiaddresses, self.apipassword) {
            config = config.with_api(api);
        }
        config.set_state_server(cert, key, self.apiport);
        if format == Format::V1_16 {
            config.set_values(self.values);
        }
        Ok(config)
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
}

/// Read the format line of the configuration in `dir`.
///
/// # Errors
///
/// Returns an error if the format file is missing or names an unknown format.
pub fn read_format(dir: &Path) -> Result<Format> {
    Format::parse(&read_file(&dir.join(FORMAT_FILE))?)
}

/// Read the configuration in `dir`, whichever format it is stored in.
///
/// # Errors
///
/// Returns an error if either file is missing or malformed.
pub fn read(dir: &Path) -> Result<(Format, AgentConfig)> {
    let format = read_format(dir)?;
    let data = read_file(&dir.join(CONFIG_FILE))?;
    let record: Record = serde_yaml::from_str(&data)?;
    let config = record.into_config(dir, format)?;
    debug!(dir = %dir.display(), format = format.line(), "read agent config");
    Ok((format, config))
}

/// Render the configuration as a format 1.16 record.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn render(config: &AgentConfig) -> Result<String> {
    Ok(serde_yaml::to_string(&Record::from_config(config))?)
}

/// Write `contents` to `path` by way of a sibling `-new` file and a rename.
fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push("-new");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&tmp).map_err(|e| ConfigError::io(&tmp, e))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| ConfigError::io(&tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| ConfigError::io(path, e))
}

/// Write the configuration to its directory in format 1.16.
///
/// The format line goes first, then the record. A crash in between leaves
/// a 1.16 line next to a legacy record, which the 1.16 reader rejects
/// since PEM text does not decode as base64.
///
/// # Errors
///
/// Returns an error if the directory or either file cannot be written.
pub fn write(config: &AgentConfig) -> Result<()> {
    let dir = config.dir();
    fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;
    let data = render(config)?;
    write_atomic(
        &dir.join(FORMAT_FILE),
        format!("{}\n", Format::V1_16.line()).as_bytes(),
        0o644,
    )?;
    write_atomic(&dir.join(CONFIG_FILE), data.as_bytes(), 0o600)?;
    debug!(dir = %dir.display(), tag = %config.tag(), "wrote agent config");
    Ok(())
}

/// Quote `s` for a POSIX shell.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

fn write_file_commands(path: &Path, contents: &str, mode: u32) -> [String; 2] {
    let quoted = sh_quote(&path.display().to_string());
    [
        format!("install -m {mode:o} /dev/null {quoted}"),
        format!("printf '%s\\n' {} > {quoted}", sh_quote(contents)),
    ]
}

/// Shell commands that recreate the configuration directory on another host.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized.
pub fn write_commands(config: &AgentConfig) -> Result<Vec<String>> {
    let dir = config.dir();
    let data = render(config)?;
    let mut commands = vec![format!("mkdir -p {}", sh_quote(&dir.display().to_string()))];
    commands.extend(write_file_commands(
        &dir.join(FORMAT_FILE),
        Format::V1_16.line(),
        0o644,
    ));
    commands.extend(write_file_commands(
        &dir.join(CONFIG_FILE),
        data.trim_end(),
        0o600,
    ));
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_state_core::{MachineId, Tag};
    use tempfile::TempDir;

    fn sample(dir: &Path) -> AgentConfig {
        let mut config = AgentConfig::new(dir, Tag::from(MachineId::new(0)), "nonce-1")
            .with_ca_cert(b"ca cert".to_vec())
            .with_state(ConnectionDetails {
                addresses: vec!["localhost:37017".to_string()],
                password: "sekrit".to_string(),
            })
            .with_api(ConnectionDetails {
                addresses: vec!["localhost:17070".to_string()],
                password: "sekrit".to_string(),
            })
            .with_state_server(b"server cert".to_vec(), b"server key".to_vec(), 17070);
        config.set_value("PROVIDER_TYPE", "dummy");
        config
    }

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("agents/machine-0");
        let config = sample(&dir);

        write(&config).unwrap();
        let (format, read_back) = read(&dir).unwrap();

        assert_eq!(format, Format::V1_16);
        assert_eq!(read_back, config);
        assert!(!dir.join("agent.conf-new").exists());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(&sample(tmp.path())).unwrap();
        let mode = fs::metadata(tmp.path().join(CONFIG_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn empty_fields_are_omitted() {
        let config = AgentConfig::new("/var/lib/agent", Tag::from(MachineId::new(3)), "");
        let data = render(&config).unwrap();
        assert_eq!(data.trim(), "tag: machine-3");
    }

    #[test]
    fn certificates_are_base64() {
        let data = render(&sample(Path::new("/tmp/x"))).unwrap();
        assert!(data.contains(&format!("cacert: {}", STANDARD.encode("ca cert"))));
        assert!(data.contains("apiport: 17070"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 2.0\n").unwrap();
        let err = read(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormat(ref f) if f == "format 2.0"));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = read(&tmp.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn bad_base64_names_the_field() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 1.16\n").unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "tag: machine-0\ncacert: '***'\n",
        )
        .unwrap();
        let err = read(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Base64 { field: "cacert", .. }));
    }

    #[test]
    fn missing_tag_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 1.16\n").unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "nonce: x\n").unwrap();
        assert!(matches!(
            read(tmp.path()).unwrap_err(),
            ConfigError::MissingField("tag")
        ));
    }

    #[test]
    fn current_record_under_legacy_format_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(&sample(tmp.path())).unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 1.12\n").unwrap();

        let err = read(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::FormatMismatch {
                format: "format 1.12",
                ..
            }
        ));
    }

    #[test]
    fn encoded_certificates_under_legacy_format_are_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 1.12\n").unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            format!(
                "tag: machine-0\ncacert: {}\n",
                STANDARD.encode("-----BEGIN CERTIFICATE-----\nabc\n")
            ),
        )
        .unwrap();

        let err = read(tmp.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "agent config is not in format 1.12: certificates are base64 encoded"
        );
    }

    #[test]
    fn legacy_certificates_are_read_as_text() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(FORMAT_FILE), "format 1.12\n").unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "tag: machine-0\ncacert: |\n  -----BEGIN CERTIFICATE-----\n  abc\n",
        )
        .unwrap();

        let (format, config) = read(tmp.path()).unwrap();
        assert_eq!(format, Format::V1_12);
        assert_eq!(config.ca_cert(), b"-----BEGIN CERTIFICATE-----\nabc\n");
    }

    #[test]
    fn shell_quoting() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn commands_recreate_both_files() {
        let config = sample(Path::new("/var/lib/agents/machine-0"));
        let commands = write_commands(&config).unwrap();

        assert_eq!(commands[0], "mkdir -p '/var/lib/agents/machine-0'");
        assert_eq!(
            commands[1],
            "install -m 644 /dev/null '/var/lib/agents/machine-0/format'"
        );
        assert_eq!(
            commands[2],
            "printf '%s\\n' 'format 1.16' > '/var/lib/agents/machine-0/format'"
        );
        assert_eq!(
            commands[3],
            "install -m 600 /dev/null '/var/lib/agents/machine-0/agent.conf'"
        );
        assert!(commands[4].contains("tag: machine-0"));
        assert!(commands[4].ends_with("> '/var/lib/agents/machine-0/agent.conf'"));
        assert_eq!(commands.len(), 5);
    }
}
