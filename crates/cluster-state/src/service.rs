//! Services.
//!
//! A service lists its units in `units`. Removing a service with units
//! only marks it `Dying`; the removal of its last unit finishes the job.

use cluster_state_core::{CharmUrl, ServiceName, Tag, UnitName};
use cluster_state_store::{collection, DocId, DocStore, Fields};

use crate::charm::Charm;
use crate::docs::{self, field, members, Life, ServiceDoc};
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::lifecycle;
use crate::state::State;
use crate::watcher::Scope;

/// A service as last read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    doc: ServiceDoc,
}

impl Service {
    /// The service name.
    #[must_use]
    pub const fn name(&self) -> &ServiceName {
        &self.doc.name
    }

    /// The charm the service runs.
    #[must_use]
    pub const fn charm_url(&self) -> &CharmUrl {
        &self.doc.charmurl
    }

    /// Lifecycle state when the service was read.
    #[must_use]
    pub const fn life(&self) -> Life {
        self.doc.life
    }

    /// Units not yet removed when the service was read.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.doc.units.len()
    }

    /// Names of those units.
    #[must_use]
    pub fn unit_names(&self) -> &[UnitName] {
        &self.doc.units
    }

    /// The service's entity tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Service(self.doc.name.clone())
    }
}

pub(crate) fn scopes(name: &ServiceName) -> [Scope; 2] {
    [Scope::Services, Scope::Service(name.clone())]
}

pub(crate) fn doc_id(name: &ServiceName) -> DocId {
    DocId::from(name.as_str())
}

impl<S: DocStore> State<S> {
    /// Add a service running `charm`.
    ///
    /// The charm is checked to exist when the service is created; nothing
    /// keeps it from going away afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidId` for a malformed name,
    /// `ErrorKind::InvalidCharm` if the charm is not stored and
    /// `ErrorKind::AlreadyExists` if the name is taken.
    pub fn add_service(&self, name: &str, charm: &Charm) -> Result<Service> {
        self.check_open()
            .and_then(|()| self.try_add_service(name, charm.url()))
            .context(|| format!("can't add service \"{name}\""))
    }

    fn try_add_service(&self, name: &str, url: &CharmUrl) -> OpResult<Service> {
        let name = ServiceName::new(name)?;
        if self
            .find(collection::CHARMS, &DocId::from(url.to_string()))?
            .is_none()
        {
            return Err(ErrorKind::InvalidCharm(format!("charm {url} not found")));
        }

        let doc = ServiceDoc {
            name,
            charmurl: url.clone(),
            life: Life::Alive,
            unitseq: 0,
            units: Vec::new(),
        };
        self.insert(collection::SERVICES, &doc)?;

        tracing::info!(service = %doc.name, charm = %url, "Added service");
        self.publish(&scopes(&doc.name));
        Ok(Service { doc })
    }

    /// Look up a service by name.
    ///
    /// Dying and dead services are still returned.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if no such service exists.
    pub fn service(&self, name: &str) -> Result<Service> {
        self.check_open()
            .and_then(|()| {
                let name = ServiceName::new(name)?;
                self.get(collection::SERVICES, &doc_id(&name))
            })
            .map(|doc| Service { doc })
            .context(|| format!("can't get service \"{name}\""))
    }

    /// All alive services, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn all_services(&self) -> Result<Vec<Service>> {
        self.check_open()
            .and_then(|()| {
                self.store()
                    .find_all(
                        collection::SERVICES,
                        &Fields::new().with(field::LIFE, Life::Alive),
                    )
                    .map_err(ErrorKind::from)
            })
            .and_then(|found| {
                found
                    .into_iter()
                    .map(|doc| docs::decode(doc).map(|doc| Service { doc }))
                    .collect()
            })
            .context(|| "can't get all services".to_string())
    }

    /// Remove a service.
    ///
    /// Without units the service is deleted. With units it becomes
    /// `Dying` and is deleted once its last unit is removed. Removing a
    /// dying service again changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the service no longer exists.
    pub fn remove_service(&self, service: &Service) -> Result<()> {
        let name = service.name();
        self.check_open()
            .and_then(|()| self.retry().run("remove service", || self.try_remove_service(name)))
            .context(|| format!("can't remove service \"{name}\""))
    }

    fn try_remove_service(&self, name: &ServiceName) -> OpResult<()> {
        let id = doc_id(name);
        let raw = self
            .find(collection::SERVICES, &id)?
            .ok_or(ErrorKind::NotFound)?;
        let (units, units_raw) = members(&raw, field::UNITS)?;
        let units = units.len();
        let service: ServiceDoc = docs::decode(raw)?;
        let guard = Fields::new().with(field::UNITS, units_raw);

        match service.life {
            Life::Alive if units > 0 => {
                lifecycle::advance(
                    self.store().as_ref(),
                    collection::SERVICES,
                    &id,
                    Life::Alive,
                    Life::Dying,
                    &guard,
                )?;
                tracing::info!(service = %name, units, "Service is dying");
                self.publish(&scopes(name));
                Ok(())
            }
            Life::Dying if units > 0 => Ok(()),
            Life::Alive | Life::Dying => {
                lifecycle::advance(
                    self.store().as_ref(),
                    collection::SERVICES,
                    &id,
                    service.life,
                    Life::Dead,
                    &guard,
                )?;
                self.publish(&scopes(name));
                self.delete_dead_service(name)
            }
            Life::Dead => self.delete_dead_service(name),
        }
    }

    fn delete_dead_service(&self, name: &ServiceName) -> OpResult<()> {
        lifecycle::remove_dead(self.store().as_ref(), collection::SERVICES, &doc_id(name))?;
        tracing::info!(service = %name, "Removed service");
        self.publish(&scopes(name));
        Ok(())
    }

    /// Give back the slot `unit` holds on its service.
    ///
    /// Once a dying service has no units left it is removed, also when an
    /// earlier call released the slot but did not get that far.
    pub(crate) fn release_service_slot(&self, name: &ServiceName, unit: &UnitName) -> OpResult<()> {
        let id = doc_id(name);
        let Some(remaining) = self.release_slot(collection::SERVICES, &id, unit)? else {
            return Ok(());
        };
        self.publish(&scopes(name));

        if remaining == (Life::Dying, 0) {
            match self.retry().run("finish service removal", || self.try_remove_service(name)) {
                // Someone else finished it first.
                Ok(()) | Err(ErrorKind::NotFound | ErrorKind::AlreadyRemoved) => {}
                Err(kind) => return Err(kind),
            }
        }
        Ok(())
    }
}
