//! Core identity types for the cluster state layer.
//!
//! This crate provides the strongly-typed identities shared by every other
//! crate in the workspace:
//!
//! - **Machines**: sequential numeric ids ([`MachineId`])
//! - **Services**: validated human-readable names ([`ServiceName`])
//! - **Units**: `<service>/<ordinal>` names ([`UnitName`])
//! - **Charms**: structured charm URLs ([`CharmUrl`])
//! - **Tags**: the entity tags agents authenticate and address entities with ([`Tag`])
//!
//! # Example
//!
//! ```
//! use cluster_state_core::{CharmUrl, ServiceName, Tag, UnitName};
//!
//! let url: CharmUrl = "local:series/dummy-1".parse().unwrap();
//! assert_eq!(url.name(), "dummy");
//!
//! let service = ServiceName::new("wordpress").unwrap();
//! let unit = UnitName::new(&service, 0);
//! assert_eq!(unit.to_string(), "wordpress/0");
//! assert_eq!(Tag::Unit(unit).to_string(), "unit-wordpress-0");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod charm;
pub mod ids;
pub mod tag;

pub use charm::CharmUrl;
pub use ids::{IdError, MachineId, ServiceName, UnitName};
pub use tag::Tag;
