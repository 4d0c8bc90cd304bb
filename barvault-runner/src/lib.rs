//! Barvault Runner — ingestion orchestration.
//!
//! This crate builds on `barvault-core` to provide:
//! - Bundle registry (name → ingest routine + calendar)
//! - Ingestion coordinator with the all-or-nothing commit path
//! - As-of snapshot loading for downstream consumers
//! - Retention cleanup driver
//! - Built-in `csvdir` and `synthetic` bundles
//! - Vault configuration (explicit root + environment, no globals)

pub mod bundles;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;

pub use bundles::register_builtins;
pub use config::VaultConfig;
pub use coordinator::{IngestContext, IngestionCoordinator};
pub use error::IngestError;
pub use registry::{Bundle, BundleRegistry, IngestRoutine};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn orchestration_types_are_send_sync() {
        assert_send::<VaultConfig>();
        assert_sync::<VaultConfig>();
        assert_send::<IngestionCoordinator>();
        assert_sync::<IngestionCoordinator>();
        assert_send::<BundleRegistry>();
        assert_sync::<BundleRegistry>();
    }
}
