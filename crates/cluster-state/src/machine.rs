//! Machines.

use std::fmt;

use cluster_state_core::{MachineId, Tag, UnitName};
use cluster_state_store::{collection, DocId, DocStore, Fields};

use crate::docs::{self, counter, field, members, Life, MachineDoc, SequenceDoc};
use crate::error::{ErrorKind, OpResult, Result, ResultExt};
use crate::lifecycle;
use crate::state::State;
use crate::watcher::Scope;

const MACHINE_SEQUENCE: &str = "machine";

/// A machine as last read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    doc: MachineDoc,
}

impl Machine {
    /// The machine id.
    #[must_use]
    pub const fn id(&self) -> MachineId {
        self.doc.id
    }

    /// Lifecycle state when the machine was read.
    #[must_use]
    pub const fn life(&self) -> Life {
        self.doc.life
    }

    /// Number of units assigned when the machine was read.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.doc.units.len()
    }

    /// Names of those units.
    #[must_use]
    pub fn unit_names(&self) -> &[UnitName] {
        &self.doc.units
    }

    /// The machine's entity tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        Tag::Machine(self.doc.id)
    }
}

/// Formats as `machine-0000000001`.
impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.doc.id.tag_string())
    }
}

fn scopes(id: MachineId) -> [Scope; 2] {
    [Scope::Machines, Scope::Machine(id)]
}

impl<S: DocStore> State<S> {
    /// Add a new machine with the next sequential id.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Unavailable` if the store cannot be reached and
    /// `ErrorKind::Conflict` if id allocation kept losing races.
    pub fn add_machine(&self) -> Result<Machine> {
        self.check_open()
            .and_then(|()| {
                self.retry().run("allocate machine id", || {
                    let id = MachineId::new(self.next_machine_id()?);
                    let doc = MachineDoc {
                        id,
                        life: Life::Alive,
                        units: Vec::new(),
                    };
                    match self.insert(collection::MACHINES, &doc) {
                        Ok(()) => Ok(doc),
                        // A document with this id was written behind the
                        // sequence's back; take the next one.
                        Err(ErrorKind::AlreadyExists) => Err(ErrorKind::ConditionFailed),
                        Err(kind) => Err(kind),
                    }
                })
            })
            .map(|doc| {
                tracing::info!(machine_id = %doc.id, "Added machine");
                self.publish(&scopes(doc.id));
                Machine { doc }
            })
            .context(|| "can't add a new machine".to_string())
    }

    /// Look up a machine by id.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if no such machine exists.
    pub fn machine(&self, id: MachineId) -> Result<Machine> {
        self.check_open()
            .and_then(|()| self.get(collection::MACHINES, &DocId::from(id.get())))
            .map(|doc| Machine { doc })
            .context(|| format!("can't get machine {id}"))
    }

    /// All alive machines, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn all_machines(&self) -> Result<Vec<Machine>> {
        self.check_open()
            .and_then(|()| {
                self.store()
                    .find_all(
                        collection::MACHINES,
                        &Fields::new().with(field::LIFE, Life::Alive),
                    )
                    .map_err(ErrorKind::from)
            })
            .and_then(|found| {
                found
                    .into_iter()
                    .map(|doc| docs::decode(doc).map(|doc| Machine { doc }))
                    .collect()
            })
            .context(|| "can't get all machines".to_string())
    }

    /// Remove a machine.
    ///
    /// The machine goes to `Dead` and its document is deleted.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if the machine does not exist (or was
    /// removed already) and `ErrorKind::InUse` if units are assigned to it.
    pub fn remove_machine(&self, id: MachineId) -> Result<()> {
        self.check_open()
            .and_then(|()| self.retry().run("remove machine", || self.try_remove_machine(id)))
            .context(|| format!("can't remove machine {id}"))
    }

    fn try_remove_machine(&self, id: MachineId) -> OpResult<()> {
        let doc_id = DocId::from(id.get());
        let raw = self
            .find(collection::MACHINES, &doc_id)?
            .ok_or(ErrorKind::NotFound)?;
        let (units, units_raw) = members(&raw, field::UNITS)?;
        let machine: MachineDoc = docs::decode(raw)?;

        if machine.life != Life::Dead {
            if !units.is_empty() {
                return Err(ErrorKind::InUse(format!("{} units assigned", units.len())));
            }
            lifecycle::advance(
                self.store().as_ref(),
                collection::MACHINES,
                &doc_id,
                machine.life,
                Life::Dead,
                &Fields::new().with(field::UNITS, units_raw),
            )?;
            self.publish(&scopes(id));
        }

        lifecycle::remove_dead(self.store().as_ref(), collection::MACHINES, &doc_id)?;
        tracing::info!(machine_id = %id, "Removed machine");
        self.publish(&scopes(id));
        Ok(())
    }

    /// Hand out the next machine id.
    ///
    /// The sequence is seeded from the highest stored machine id so ids are
    /// never reused, even for machines written without it.
    fn next_machine_id(&self) -> OpResult<u64> {
        let seq_id = DocId::from(MACHINE_SEQUENCE);
        match self.find(collection::SEQUENCES, &seq_id)? {
            Some(raw) => {
                let (next, next_raw) = counter(&raw, field::COUNTER);
                self.store()
                    .conditional_update(
                        collection::SEQUENCES,
                        &seq_id,
                        &Fields::new().with(field::COUNTER, next_raw),
                        &Fields::new().with(field::COUNTER, next + 1),
                    )
                    .map_err(ErrorKind::from)?;
                Ok(next)
            }
            None => {
                let seed = self
                    .store()
                    .find_all(collection::MACHINES, &Fields::new())
                    .map_err(ErrorKind::from)?
                    .iter()
                    .filter_map(|doc| match doc.id() {
                        Ok(DocId::Int(n)) => Some(n + 1),
                        _ => None,
                    })
                    .max()
                    .unwrap_or(0);
                let sequence = SequenceDoc {
                    name: MACHINE_SEQUENCE.to_string(),
                    counter: seed + 1,
                };
                match self.insert(collection::SEQUENCES, &sequence) {
                    Ok(()) => Ok(seed),
                    Err(ErrorKind::AlreadyExists) => Err(ErrorKind::ConditionFailed),
                    Err(kind) => Err(kind),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_state_store::{Document, MemoryDocStore};
    use serde_json::json;
    use std::sync::Arc;

    fn new_state() -> (State<MemoryDocStore>, Arc<MemoryDocStore>) {
        let store = Arc::new(MemoryDocStore::new());
        (State::with_defaults(Arc::clone(&store)), store)
    }

    #[test]
    fn ids_are_sequential() {
        let (state, _) = new_state();
        let ids: Vec<u64> = (0..3)
            .map(|_| state.add_machine().unwrap().id().get())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let (state, _) = new_state();
        let m0 = state.add_machine().unwrap();
        let m1 = state.add_machine().unwrap();
        state.remove_machine(m1.id()).unwrap();
        state.remove_machine(m0.id()).unwrap();
        assert_eq!(state.add_machine().unwrap().id().get(), 2);
    }

    #[test]
    fn sequence_skips_existing_documents() {
        let (state, store) = new_state();
        for id in [0u64, 1, 5] {
            store
                .insert(
                    collection::MACHINES,
                    Document::from_record(&json!({"_id": id, "life": "alive"})).unwrap(),
                )
                .unwrap();
        }
        assert_eq!(state.add_machine().unwrap().id().get(), 6);
    }

    #[test]
    fn remove_twice_is_not_found() {
        let (state, _) = new_state();
        let m0 = state.add_machine().unwrap();
        state.remove_machine(m0.id()).unwrap();

        let err = state.remove_machine(m0.id()).unwrap_err();
        assert_eq!(err.to_string(), "can't remove machine 0: not found");
        let err = state.machine(m0.id()).unwrap_err();
        assert_eq!(err.to_string(), "can't get machine 0: not found");
    }

    #[test]
    fn remove_finishes_dead_machine() {
        let (state, store) = new_state();
        store
            .insert(
                collection::MACHINES,
                Document::from_record(&json!({"_id": 7, "life": "dead"})).unwrap(),
            )
            .unwrap();
        state.remove_machine(MachineId::new(7)).unwrap();
        assert_eq!(store.len(collection::MACHINES), 0);
    }

    #[test]
    fn display_is_padded_tag() {
        let (state, _) = new_state();
        state.add_machine().unwrap();
        let m1 = state.add_machine().unwrap();
        assert_eq!(m1.to_string(), "machine-0000000001");
        assert_eq!(m1.tag().to_string(), "machine-1");
    }
}
