//! Entity state for a cluster-orchestration control plane.
//!
//! This crate is the single source of truth for the topology of a managed
//! deployment: machines, services, their units, and the charms services run.
//! Many agent processes read and change it concurrently. The only atomic
//! primitive underneath is the single-document conditional write of
//! [`cluster_state_store::DocStore`], so every multi-step change is a
//! read-check-write loop with a bounded number of attempts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         State                               │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐    │
//! │  │ Machines │ │ Services │ │  Units   │ │   Charms     │    │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────────┘    │
//! │        │  lifecycle (Alive → Dying → Dead → removed)        │
//! │        │  retry (bounded conditional-write loops)           │
//! │        ▼                                                    │
//! │  watcher hub ──▶ Watcher (coalesced change signals)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                 ┌──────────────────────────┐
//!                 │  DocStore (Rocks/Memory) │
//!                 └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use cluster_state::{CharmMeta, State};
//! use cluster_state_store::MemoryDocStore;
//!
//! let state = State::with_defaults(Arc::new(MemoryDocStore::new()));
//!
//! let m0 = state.add_machine().unwrap();
//! assert_eq!(m0.id().get(), 0);
//!
//! let url = "local:series/dummy-1".parse().unwrap();
//! let charm = state.add_charm(CharmMeta::default(), &url, "bundle-url", "sha").unwrap();
//! let wordpress = state.add_service("wordpress", &charm).unwrap();
//! assert_eq!(wordpress.charm_url(), &url);
//!
//! state.close();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod charm;
pub mod docs;
pub mod error;
pub mod lifecycle;
pub mod machine;
pub mod retry;
pub mod service;
mod settings;
pub mod state;
pub mod unit;
pub mod watcher;

pub use charm::Charm;
pub use docs::{CharmMeta, EnvironSettings, Life, ProxySettings};
pub use error::{ErrorKind, Result, StateError};
pub use machine::Machine;
pub use retry::RetryPolicy;
pub use service::Service;
pub use state::{State, StateConfig};
pub use unit::Unit;
pub use watcher::{Scope, StopHandle, Watcher};
