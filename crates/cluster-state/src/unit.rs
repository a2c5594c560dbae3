//! Units and their placement on machines.
//!
//! A unit holds one slot on its service and, once assigned, one slot on its
//! machine: its name in the parent's `units` list. Slots are taken with a
//! conditional write on the parent before the unit document changes. On
//! removal the unit goes `Dead` first and its document is only deleted
//! once both slots are back, so a parent listing no units has no unit
//! referring to it and an interrupted removal can simply be repeated.

use cluster_state_core::{MachineId, ServiceName, Tag, UnitName};
use cluster_state_store::{collection, DocId, DocStore, Fields};
use serde_json::Value;

use crate::docs::{self, counter, field, members, Life, UnitDoc};
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::lifecycle;
use crate::service::{self, Service};
use crate::state::State;
use crate::watcher::Scope;

/// A unit as last read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    doc: UnitDoc,
}

impl Unit {
    /// The unit name, `<service>/<ordinal>`.
    #[must_use]
    pub const fn name(&self) -> &UnitName {
        &self.doc.name
    }

    /// The owning service.
    #[must_use]
    pub const fn service_name(&self) -> &ServiceName {
        &self.doc.service
    }

    /// Lifecycle state when the unit was read.
    #[must_use]
    pub const fn life(&self) -> Life {
        self.doc.life
    }

    /// The machine the unit was assigned to when read.
    #[must_use]
    pub const fn machine_id(&self) -> Option<MachineId> {
        self.doc.machineid
    }

    /// The unit's entity tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Unit(self.doc.name.clone())
    }
}

fn scopes(name: &UnitName) -> [Scope; 2] {
    [
        Scope::Units(name.service().clone()),
        Scope::Unit(name.clone()),
    ]
}

fn doc_id(name: &UnitName) -> DocId {
    DocId::from(name.to_string())
}

fn machine_scopes(id: MachineId) -> [Scope; 2] {
    [Scope::Machines, Scope::Machine(id)]
}

fn machine_id_value(id: Option<MachineId>) -> Value {
    id.map_or(Value::Null, |id| Value::from(id.get()))
}

impl<S: DocStore> State<S> {
    /// Add a unit to an alive service.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the service is gone and
    /// `ErrorKind::NotAlive` if it is dying.
    pub fn add_unit(&self, service: &Service) -> Result<Unit> {
        let name = service.name();
        self.check_open()
            .and_then(|()| self.try_add_unit(name))
            .context(|| format!("can't add unit to service \"{name}\""))
    }

    fn try_add_unit(&self, service: &ServiceName) -> OpResult<Unit> {
        let name = self.retry().run("reserve unit", || self.reserve_unit(service))?;
        let doc = UnitDoc {
            name,
            service: service.clone(),
            life: Life::Alive,
            machineid: None,
        };

        if let Err(kind) = self.insert(collection::UNITS, &doc) {
            tracing::warn!(unit = %doc.name, error = %kind, "Unit insert failed, releasing slot");
            if let Err(release) = self.release_service_slot(service, &doc.name) {
                tracing::warn!(service = %service, error = %release, "Could not release unit slot");
            }
            return Err(kind);
        }

        tracing::info!(unit = %doc.name, "Added unit");
        self.publish(&scopes(&doc.name));
        self.publish(&service::scopes(service));
        Ok(Unit { doc })
    }

    /// Take the next ordinal and a unit slot on an alive service.
    fn reserve_unit(&self, service: &ServiceName) -> OpResult<UnitName> {
        let id = service::doc_id(service);
        let raw = self
            .find(collection::SERVICES, &id)?
            .ok_or(ErrorKind::NotFound)?;
        let (seq, seq_raw) = counter(&raw, field::UNIT_SEQ);
        let (mut units, units_raw) = members(&raw, field::UNITS)?;
        if docs::life(&raw)? != Life::Alive {
            return Err(ErrorKind::NotAlive);
        }

        let name = UnitName::new(service, seq);
        units.push(name.clone());
        self.store()
            .conditional_update(
                collection::SERVICES,
                &id,
                &Fields::new()
                    .with(field::LIFE, Life::Alive)
                    .with(field::UNIT_SEQ, seq_raw)
                    .with(field::UNITS, units_raw),
                &Fields::new()
                    .with(field::UNIT_SEQ, seq + 1)
                    .with(field::UNITS, serde_json::to_value(&units)?),
            )
            .map_err(ErrorKind::from)?;
        Ok(name)
    }

    /// Look up a unit by name.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if no such unit exists.
    pub fn unit(&self, name: &str) -> Result<Unit> {
        self.check_open()
            .and_then(|()| {
                let name: UnitName = name.parse()?;
                self.get(collection::UNITS, &doc_id(&name))
            })
            .map(|doc| Unit { doc })
            .context(|| format!("can't get unit \"{name}\""))
    }

    /// All alive units of a service, ordered by ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn all_units(&self, service: &Service) -> Result<Vec<Unit>> {
        let name = service.name();
        self.check_open()
            .and_then(|()| {
                let filter = Fields::new()
                    .with(field::SERVICE, name.as_str())
                    .with(field::LIFE, Life::Alive);
                let found = self
                    .store()
                    .find_all(collection::UNITS, &filter)
                    .map_err(ErrorKind::from)?;
                let mut units = found
                    .into_iter()
                    .map(|doc| docs::decode(doc).map(|doc| Unit { doc }))
                    .collect::<OpResult<Vec<_>>>()?;
                // Names sort as strings; "wp/10" would come before "wp/2".
                units.sort_by_key(|u| u.name().ordinal());
                Ok(units)
            })
            .context(|| format!("can't get units of service \"{name}\""))
    }

    /// Assign an alive, unassigned unit to an alive machine.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the unit or machine is gone,
    /// `ErrorKind::NotAlive` if either is not alive and
    /// `ErrorKind::Conflict` if the unit is already assigned.
    pub fn assign_to_machine(&self, unit: &Unit, machine: MachineId) -> Result<Unit> {
        let name = unit.name();
        self.check_open()
            .and_then(|()| self.try_assign(name, machine))
            .context(|| format!("can't assign unit \"{name}\" to machine {machine}"))
    }

    fn try_assign(&self, name: &UnitName, machine: MachineId) -> OpResult<Unit> {
        self.retry()
            .run("reserve machine slot", || self.reserve_machine_slot(machine, name))?;

        let assigned = self.store().conditional_update(
            collection::UNITS,
            &doc_id(name),
            &Fields::new()
                .with(field::LIFE, Life::Alive)
                .with(field::MACHINE_ID, Value::Null),
            &Fields::new().with(field::MACHINE_ID, machine.get()),
        );
        if let Err(err) = assigned {
            let outcome = match ErrorKind::from(err) {
                ErrorKind::ConditionFailed => self.assignment_failure(name, machine),
                kind => Err(kind),
            };
            if let Err(kind) = outcome {
                // After an unreachable store the assignment may have landed;
                // the slot stays so a repeated call can finish.
                if !kind.is_retryable() {
                    if let Err(release) = self.release_machine_slot(machine, name) {
                        tracing::warn!(machine_id = %machine, error = %release, "Could not release machine slot");
                    }
                }
                return Err(kind);
            }
        }

        tracing::info!(unit = %name, machine_id = %machine, "Assigned unit to machine");
        self.publish(&scopes(name));
        self.publish(&machine_scopes(machine));
        self.get(collection::UNITS, &doc_id(name))
            .map(|doc| Unit { doc })
    }

    /// Explain why the unit could not be assigned.
    ///
    /// A unit already on `machine` is not a failure: an earlier attempt got
    /// that far before the store became unreachable.
    fn assignment_failure(&self, name: &UnitName, machine: MachineId) -> OpResult<()> {
        let doc: UnitDoc = self.get(collection::UNITS, &doc_id(name))?;
        match doc.machineid {
            Some(current) if current == machine => Ok(()),
            Some(current) => Err(ErrorKind::Conflict(format!(
                "already assigned to machine {current}"
            ))),
            None if doc.life != Life::Alive => Err(ErrorKind::NotAlive),
            None => Err(ErrorKind::ConditionFailed),
        }
    }

    /// Add the unit to an alive machine's unit list. A slot the unit holds
    /// already is kept.
    fn reserve_machine_slot(&self, machine: MachineId, unit: &UnitName) -> OpResult<()> {
        let id = DocId::from(machine.get());
        let raw = self
            .find(collection::MACHINES, &id)?
            .ok_or(ErrorKind::NotFound)?;
        let (mut units, units_raw) = members(&raw, field::UNITS)?;
        if docs::life(&raw)? != Life::Alive {
            return Err(ErrorKind::NotAlive);
        }
        if units.contains(unit) {
            return Ok(());
        }
        units.push(unit.clone());
        self.store()
            .conditional_update(
                collection::MACHINES,
                &id,
                &Fields::new()
                    .with(field::LIFE, Life::Alive)
                    .with(field::UNITS, units_raw),
                &Fields::new().with(field::UNITS, serde_json::to_value(&units)?),
            )
            .map_err(ErrorKind::from)
    }

    fn release_machine_slot(&self, machine: MachineId, unit: &UnitName) -> OpResult<()> {
        let id = DocId::from(machine.get());
        if self.release_slot(collection::MACHINES, &id, unit)?.is_some() {
            self.publish(&machine_scopes(machine));
        }
        Ok(())
    }

    /// Drop `unit` from the unit list of a parent document.
    ///
    /// Returns the parent's life and the number of units it still lists,
    /// or `None` if the parent is gone. A unit holding no slot changes
    /// nothing, so releasing twice is harmless.
    pub(crate) fn release_slot(
        &self,
        collection: &str,
        id: &DocId,
        unit: &UnitName,
    ) -> OpResult<Option<(Life, usize)>> {
        self.retry().run("release unit slot", || {
            let Some(raw) = self.find(collection, id)? else {
                return Ok(None);
            };
            let (mut units, units_raw) = members(&raw, field::UNITS)?;
            let life = docs::life(&raw)?;
            let held = units.len();
            units.retain(|u| u != unit);
            if units.len() < held {
                self.store()
                    .conditional_update(
                        collection,
                        id,
                        &Fields::new().with(field::UNITS, units_raw),
                        &Fields::new().with(field::UNITS, serde_json::to_value(&units)?),
                    )
                    .map_err(ErrorKind::from)?;
            }
            Ok(Some((life, units.len())))
        })
    }

    /// Remove a unit.
    ///
    /// The unit goes to `Dead`, its slots on the machine and service are
    /// given back and then its document is deleted. Removing the last unit
    /// of a dying service removes the service too. A call that failed with
    /// a retryable error can be repeated and picks up where it stopped.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the unit no longer exists.
    pub fn remove_unit(&self, unit: &Unit) -> Result<()> {
        let name = unit.name();
        self.check_open()
            .and_then(|()| self.try_remove_unit(name))
            .context(|| format!("can't remove unit \"{name}\""))
    }

    fn try_remove_unit(&self, name: &UnitName) -> OpResult<()> {
        let id = doc_id(name);
        let doc = self.retry().run("kill unit", || {
            let doc: UnitDoc = self.get(collection::UNITS, &id)?;
            if doc.life != Life::Dead {
                // Pin the assignment so the slot released below is the right one.
                lifecycle::advance(
                    self.store().as_ref(),
                    collection::UNITS,
                    &id,
                    doc.life,
                    Life::Dead,
                    &Fields::new().with(field::MACHINE_ID, machine_id_value(doc.machineid)),
                )?;
                self.publish(&scopes(name));
            }
            Ok(doc)
        })?;

        if let Some(machine) = doc.machineid {
            self.release_machine_slot(machine, name)?;
        }
        self.release_service_slot(&doc.service, name)?;

        lifecycle::remove_dead(self.store().as_ref(), collection::UNITS, &id)?;
        tracing::info!(unit = %name, "Removed unit");
        self.publish(&scopes(name));
        Ok(())
    }
}
