//! Charms.

use cluster_state_core::CharmUrl;
use cluster_state_store::{collection, DocId, DocStore};

use crate::docs::{CharmDoc, CharmMeta};
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::state::State;
use crate::watcher::Scope;

/// A stored charm. Charms never change once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charm {
    doc: CharmDoc,
}

impl Charm {
    /// The charm URL, including its revision.
    #[must_use]
    pub const fn url(&self) -> &CharmUrl {
        &self.doc.url
    }

    /// Charm metadata.
    #[must_use]
    pub const fn meta(&self) -> &CharmMeta {
        &self.doc.meta
    }

    /// Where the packaged bundle can be fetched from.
    #[must_use]
    pub fn bundle_url(&self) -> &str {
        &self.doc.bundleurl
    }

    /// SHA-256 digest of the bundle.
    #[must_use]
    pub fn bundle_sha256(&self) -> &str {
        &self.doc.bundlesha256
    }
}

fn doc_id(url: &CharmUrl) -> DocId {
    DocId::from(url.to_string())
}

impl<S: DocStore> State<S> {
    /// Store a charm.
    ///
    /// Adding a charm that is already stored with the same digest returns
    /// the stored record.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidCharm` if the URL has no revision and
    /// `ErrorKind::Conflict` if the charm is stored with a different digest.
    pub fn add_charm(
        &self,
        meta: CharmMeta,
        url: &CharmUrl,
        bundle_url: &str,
        bundle_sha256: &str,
    ) -> Result<Charm> {
        let doc = CharmDoc {
            url: url.clone(),
            meta,
            bundleurl: bundle_url.to_string(),
            bundlesha256: bundle_sha256.to_string(),
        };
        self.check_open()
            .and_then(|()| self.retry().run("add charm", || self.try_add_charm(&doc)))
            .context(|| format!("can't add charm \"{url}\""))
    }

    fn try_add_charm(&self, doc: &CharmDoc) -> OpResult<Charm> {
        if doc.url.revision().is_none() {
            return Err(ErrorKind::InvalidCharm("charm URL has no revision".to_string()));
        }
        match self.insert(collection::CHARMS, doc) {
            Ok(()) => {
                tracing::info!(charm = %doc.url, "Added charm");
                self.publish(&[Scope::Charms]);
                Ok(Charm { doc: doc.clone() })
            }
            Err(ErrorKind::AlreadyExists) => {
                let Some(raw) = self.find(collection::CHARMS, &doc_id(&doc.url))? else {
                    // Gone again between insert and read.
                    return Err(ErrorKind::ConditionFailed);
                };
                let stored: CharmDoc = crate::docs::decode(raw)?;
                if stored.bundlesha256 == doc.bundlesha256 {
                    Ok(Charm { doc: stored })
                } else {
                    Err(ErrorKind::Conflict(format!(
                        "already stored with digest {}",
                        stored.bundlesha256
                    )))
                }
            }
            Err(kind) => Err(kind),
        }
    }

    /// Look up a charm by URL.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the charm is not stored.
    pub fn charm(&self, url: &CharmUrl) -> Result<Charm> {
        self.check_open()
            .and_then(|()| self.get(collection::CHARMS, &doc_id(url)))
            .map(|doc| Charm { doc })
            .context(|| format!("can't get charm \"{url}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_state_store::MemoryDocStore;
    use std::sync::Arc;

    fn dummy_meta() -> CharmMeta {
        CharmMeta {
            name: "dummy".to_string(),
            summary: "That's a dummy charm.".to_string(),
            description: String::new(),
            revision: 1,
        }
    }

    fn url() -> CharmUrl {
        "local:series/dummy-1".parse().unwrap()
    }

    #[test]
    fn add_and_get() {
        let state = State::with_defaults(Arc::new(MemoryDocStore::new()));
        let added = state
            .add_charm(dummy_meta(), &url(), "http://bundles.example.com/dummy-1", "abc")
            .unwrap();
        let fetched = state.charm(&url()).unwrap();
        assert_eq!(added, fetched);
        assert_eq!(fetched.url().to_string(), "local:series/dummy-1");
        assert_eq!(fetched.meta().name, "dummy");
        assert_eq!(fetched.bundle_url(), "http://bundles.example.com/dummy-1");
        assert_eq!(fetched.bundle_sha256(), "abc");
    }

    #[test]
    fn re_adding_is_idempotent() {
        let store = Arc::new(MemoryDocStore::new());
        let state = State::with_defaults(Arc::clone(&store));
        state.add_charm(dummy_meta(), &url(), "bundle", "abc").unwrap();
        let again = state.add_charm(dummy_meta(), &url(), "bundle", "abc").unwrap();
        assert_eq!(again.bundle_sha256(), "abc");
        assert_eq!(store.len(collection::CHARMS), 1);
    }

    #[test]
    fn different_digest_conflicts() {
        let state = State::with_defaults(Arc::new(MemoryDocStore::new()));
        state.add_charm(dummy_meta(), &url(), "bundle", "abc").unwrap();
        let err = state
            .add_charm(dummy_meta(), &url(), "bundle", "def")
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Conflict(_)));
        assert!(err.to_string().starts_with("can't add charm \"local:series/dummy-1\""));
    }

    #[test]
    fn url_needs_revision() {
        let state = State::with_defaults(Arc::new(MemoryDocStore::new()));
        let unrevisioned: CharmUrl = "cs:precise/mysql".parse().unwrap();
        let err = state
            .add_charm(dummy_meta(), &unrevisioned, "bundle", "abc")
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidCharm(_)));
    }

    #[test]
    fn missing_charm_is_not_found() {
        let state = State::with_defaults(Arc::new(MemoryDocStore::new()));
        assert!(state.charm(&url()).unwrap_err().is_not_found());
    }
}
