//! Entity lifecycle state machine.
//!
//! ```text
//!   Alive ──(dependents remain)──▶ Dying
//!     │                              │
//!     │ (no dependents)              │ (last dependent gone)
//!     ▼                              ▼
//!   Dead ◀───────────────────────────┘
//!     │
//!     ▼
//!  (removed)
//! ```
//!
//! Every transition is a conditional write expecting the current life, so
//! two agents racing on the same entity cannot both succeed. Physical
//! deletion is only ever done from `Dead`.

use cluster_state_store::{DocId, DocStore, Fields, StoreError};

use crate::docs::{field, Life};
use crate::error::ErrorKind;

/// Validates a transition and returns the target life if it is allowed.
///
/// # Errors
///
/// Returns `ErrorKind::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(from: Life, to: Life) -> Result<Life, ErrorKind> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ErrorKind::InvalidTransition { from, to })
    }
}

/// Check if a transition is allowed by the state machine.
#[must_use]
pub const fn is_valid_transition(from: Life, to: Life) -> bool {
    use Life::{Alive, Dead, Dying};

    matches!((from, to), (Alive, Dying | Dead) | (Dying, Dead))
}

/// Returns the lives reachable from `life` in one step.
#[must_use]
pub fn valid_transitions_from(life: Life) -> Vec<Life> {
    match life {
        Life::Alive => vec![Life::Dying, Life::Dead],
        Life::Dying => vec![Life::Dead],
        Life::Dead => vec![],
    }
}

/// Returns true if the entity may be physically deleted.
#[must_use]
pub const fn is_removable(life: Life) -> bool {
    matches!(life, Life::Dead)
}

/// Move a document from `from` to `to`.
///
/// The write only applies if the document is still at `from` and also
/// matches `guard`, which callers use to pin dependent counts they checked.
///
/// # Errors
///
/// Returns `ErrorKind::InvalidTransition` for a disallowed transition,
/// `ErrorKind::NotFound` if the document is gone and
/// `ErrorKind::ConditionFailed` if it changed since it was read.
pub fn advance<S: DocStore + ?Sized>(
    store: &S,
    collection: &str,
    id: &DocId,
    from: Life,
    to: Life,
    guard: &Fields,
) -> Result<(), ErrorKind> {
    validate_transition(from, to)?;

    let mut expected = guard.clone();
    expected.set(field::LIFE, from);
    store
        .conditional_update(collection, id, &expected, &Fields::new().with(field::LIFE, to))
        .map_err(ErrorKind::from)?;

    tracing::debug!(collection, id = %id, %from, %to, "Lifecycle transition");
    Ok(())
}

/// Physically delete a `Dead` document.
///
/// # Errors
///
/// Returns `ErrorKind::AlreadyRemoved` if the document no longer exists and
/// `ErrorKind::ConditionFailed` if it exists but is not dead.
pub fn remove_dead<S: DocStore + ?Sized>(
    store: &S,
    collection: &str,
    id: &DocId,
) -> Result<(), ErrorKind> {
    match store.remove(collection, id, &Fields::new().with(field::LIFE, Life::Dead)) {
        Ok(()) => {
            tracing::debug!(collection, id = %id, "Removed dead document");
            Ok(())
        }
        Err(StoreError::NotFound) => Err(ErrorKind::AlreadyRemoved),
        Err(err) => Err(err.into()),
    }
}
