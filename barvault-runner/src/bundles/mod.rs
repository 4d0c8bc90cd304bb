//! Built-in ingest routines.
//!
//! Two reference bundles ship with the vault: `csvdir` ingests a directory
//! of per-symbol CSV files, `synthetic` generates deterministic random-walk
//! data for development and tests. Provider-specific network bundles are
//! registered by their own crates.

pub mod csvdir;
pub mod synthetic;

use crate::registry::BundleRegistry;

/// Register every built-in bundle.
pub fn register_builtins(registry: &mut BundleRegistry) {
    csvdir::register(registry);
    synthetic::register(registry);
}
