//! Wire parameters and results of API calls.

use cluster_state::ProxySettings;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// An error as reported over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, possibly empty.
    #[serde(default)]
    pub code: String,
}

/// One entity, by tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entity {
    /// The entity's tag, e.g. `unit-wordpress-0`.
    pub tag: String,
}

/// A bulk request naming several entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entities {
    /// The entities.
    pub entities: Vec<Entity>,
}

impl Entities {
    /// A request for a single entity.
    #[must_use]
    pub fn one(tag: impl Into<String>) -> Self {
        Self {
            entities: vec![Entity { tag: tag.into() }],
        }
    }
}

/// Result of a call that returns nothing but may fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorResult {
    /// The failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

/// The result of starting a notify watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotifyWatchResult {
    /// Id to pass to the `NotifyWatcher` facade.
    #[serde(default)]
    pub notify_watcher_id: String,
    /// The failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

/// Bulk notify watcher results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotifyWatchResults {
    /// One result per requested entity.
    pub results: Vec<NotifyWatchResult>,
}

/// Proxy settings on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// HTTP proxy.
    #[serde(rename = "HTTP", default)]
    pub http: String,
    /// HTTPS proxy.
    #[serde(rename = "HTTPS", default)]
    pub https: String,
    /// FTP proxy.
    #[serde(rename = "FTP", default)]
    pub ftp: String,
    /// Hosts that bypass the proxy.
    #[serde(rename = "NoProxy", default)]
    pub no_proxy: String,
}

impl From<&ProxySettings> for ProxyConfig {
    fn from(s: &ProxySettings) -> Self {
        Self {
            http: s.http.clone(),
            https: s.https.clone(),
            ftp: s.ftp.clone(),
            no_proxy: s.noproxy.clone(),
        }
    }
}

impl From<ProxyConfig> for ProxySettings {
    fn from(c: ProxyConfig) -> Self {
        Self {
            http: c.http,
            https: c.https,
            ftp: c.ftp,
            noproxy: c.no_proxy,
        }
    }
}

/// Proxy settings for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfigResult {
    /// Settings for general traffic.
    #[serde(rename = "ProxySettings", default)]
    pub proxy_settings: ProxyConfig,
    /// Settings for the package manager.
    #[serde(rename = "APTProxySettings", default)]
    pub apt_proxy_settings: ProxyConfig,
    /// The failure, if any.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

/// Bulk proxy settings results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyConfigResults {
    /// One result per requested entity.
    pub results: Vec<ProxyConfigResult>,
}

/// Take the single result of a bulk call.
pub(crate) fn single<T>(results: Vec<T>) -> Result<T> {
    let got = results.len();
    let mut results = results.into_iter();
    match (results.next(), got) {
        (Some(result), 1) => Ok(result),
        _ => Err(ApiError::ResultCount { expected: 1, got }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names() {
        let result = ProxyConfigResult {
            proxy_settings: ProxyConfig {
                http: "http".to_string(),
                no_proxy: "localhost".to_string(),
                ..ProxyConfig::default()
            },
            ..ProxyConfigResult::default()
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ProxySettings"]["HTTP"], "http");
        assert_eq!(value["ProxySettings"]["NoProxy"], "localhost");
        assert!(value["APTProxySettings"].is_object());
        assert!(value.get("Error").is_none());

        let watch: NotifyWatchResults = serde_json::from_value(json!({
            "Results": [{"NotifyWatcherId": "1"}]
        }))
        .unwrap();
        assert_eq!(watch.results[0].notify_watcher_id, "1");
        assert_eq!(watch.results[0].error, None);
    }

    #[test]
    fn single_result() {
        assert_eq!(single(vec![7]).unwrap(), 7);
        assert!(matches!(
            single::<u8>(vec![]),
            Err(ApiError::ResultCount { expected: 1, got: 0 })
        ));
        assert!(matches!(
            single(vec![1, 2]),
            Err(ApiError::ResultCount { expected: 1, got: 2 })
        ));
    }
}
