//! RPC facades over the cluster state layer.
//!
//! Agents do not read the document store themselves. They call named
//! facades through an [`ApiCaller`]; the server side of each facade checks
//! that the caller acts for the entity it names, reads the state, and hands
//! out watchers by id:
//!
//! ```text
//! ProxyUpdaterClient --call--> ApiCaller --> ProxyUpdaterFacade --> State
//! RemoteNotifyWatcher --Next/Stop--> NotifyWatcherFacade --> Resources --> Watcher
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod caller;
pub mod error;
pub mod local;
pub mod notify;
pub mod params;
pub mod proxyupdater;
pub mod resources;

pub use caller::ApiCaller;
pub use error::{ApiError, Result};
pub use local::LocalCaller;
pub use notify::{NotifyWatcherFacade, RemoteNotifyWatcher};
pub use proxyupdater::{ProxyUpdaterClient, ProxyUpdaterFacade};
pub use resources::Resources;

/// Version of every facade served by this crate.
pub const FACADE_VERSION: u32 = 1;
