//! Bundle registry: maps a bundle name to its ingest routine and calendar.

use crate::coordinator::IngestContext;
use crate::error::IngestError;
use barvault_core::calendar::TradingCalendar;
use std::collections::BTreeMap;
use tracing::warn;

/// Provider-specific procedure that produces records and feeds them to the
/// sinks in its [`IngestContext`]. Failures of any kind abort the run.
pub type IngestRoutine = Box<dyn Fn(IngestContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A registered, named source of market data.
pub struct Bundle {
    name: String,
    calendar: TradingCalendar,
    routine: IngestRoutine,
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.name)
            .field("calendar", &self.calendar)
            .finish_non_exhaustive()
    }
}

impl Bundle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn run(&self, ctx: IngestContext<'_>) -> anyhow::Result<()> {
        (self.routine)(ctx)
    }
}

/// Process-wide mapping of bundle names to bundles. Plain owned state — the
/// caller decides where it lives and how long.
#[derive(Default)]
pub struct BundleRegistry {
    bundles: BTreeMap<String, Bundle>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bundle. Re-registration under the same name replaces the
    /// existing mapping.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        calendar: TradingCalendar,
        routine: IngestRoutine,
    ) {
        let name = name.into();
        if self.bundles.contains_key(&name) {
            warn!(bundle = %name, "overwriting existing bundle registration");
        }
        self.bundles.insert(
            name.clone(),
            Bundle {
                name,
                calendar,
                routine,
            },
        );
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), IngestError> {
        self.bundles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IngestError::UnknownBundle {
                name: name.to_string(),
            })
    }

    pub fn resolve(&self, name: &str) -> Result<&Bundle, IngestError> {
        self.bundles
            .get(name)
            .ok_or_else(|| IngestError::UnknownBundle {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.bundles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_routine() -> IngestRoutine {
        Box::new(|_ctx: IngestContext<'_>| Ok(()))
    }

    #[test]
    fn resolve_unknown_name_fails() {
        let registry = BundleRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, IngestError::UnknownBundle { .. }));
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = BundleRegistry::new();
        registry.register("quotes", TradingCalendar::nyse(), noop_routine());

        let bundle = registry.resolve("quotes").unwrap();
        assert_eq!(bundle.name(), "quotes");
        assert_eq!(bundle.calendar().name(), "NYSE");
        assert_eq!(registry.names(), vec!["quotes"]);
    }

    #[test]
    fn reregistration_replaces_the_mapping() {
        let mut registry = BundleRegistry::new();
        registry.register("quotes", TradingCalendar::nyse(), noop_routine());
        registry.register("quotes", TradingCalendar::around_the_clock(), noop_routine());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("quotes").unwrap().calendar().name(), "24x7");
    }

    #[test]
    fn unregister_removes_and_errors_on_miss() {
        let mut registry = BundleRegistry::new();
        registry.register("quotes", TradingCalendar::nyse(), noop_routine());

        registry.unregister("quotes").unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.unregister("quotes"),
            Err(IngestError::UnknownBundle { .. })
        ));
    }
}
