//! Collection definitions.
//!
//! Each collection maps to one `RocksDB` column family.

/// Collection names.
pub mod collection {
    /// Machine documents, keyed by numeric machine id.
    pub const MACHINES: &str = "machines";

    /// Service documents, keyed by service name.
    pub const SERVICES: &str = "services";

    /// Unit documents, keyed by `<service>/<ordinal>`.
    pub const UNITS: &str = "units";

    /// Charm documents, keyed by charm URL.
    pub const CHARMS: &str = "charms";

    /// Id allocation counters, keyed by sequence name.
    pub const SEQUENCES: &str = "sequences";

    /// Environment-wide settings documents, keyed by setting name.
    pub const SETTINGS: &str = "settings";
}

/// Returns all collection names for database initialization.
#[must_use]
pub fn all_collections() -> Vec<&'static str> {
    vec![
        collection::MACHINES,
        collection::SERVICES,
        collection::UNITS,
        collection::CHARMS,
        collection::SEQUENCES,
        collection::SETTINGS,
    ]
}
