use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;

/// An MS function: a named acquisition function together with its MS level.
///
/// The level is either a positive integer or unknown. Zero and negative
/// levels never occur in a constructed value; see [`MsFunction::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MsFunction {
    name: Option<String>,
    ms_level: Option<u32>,
}

impl MsFunction {
    pub fn new(name: Option<String>, ms_level: Option<u32>) -> Self {
        let ms_level = match ms_level {
            Some(0) => {
                warn!("Discarding MS level 0, treating it as unknown");
                None
            }
            other => other,
        };
        Self { name, ms_level }
    }

    pub fn with_ms_level(ms_level: u32) -> Self {
        Self::new(None, Some(ms_level))
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ms_level(&self) -> Option<u32> {
        self.ms_level
    }
}

/// Interns [`MsFunction`] values for one import run so that every scan with
/// the same (name, level) combination shares a single allocation. Built
/// incrementally while records stream and discarded with the run.
#[derive(Debug, Default)]
pub struct MsFunctionTable {
    functions: IndexMap<(Option<String>, Option<u32>), Arc<MsFunction>>,
}

impl MsFunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, function: MsFunction) -> Arc<MsFunction> {
        let key = (function.name.clone(), function.ms_level);
        self.functions
            .entry(key)
            .or_insert_with(|| Arc::new(function))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The distinct functions seen so far, in first-observation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MsFunction>> {
        self.functions.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interning_shares_instances() {
        let mut table = MsFunctionTable::new();
        let a = table.intern(MsFunction::with_ms_level(1));
        let b = table.intern(MsFunction::with_ms_level(1));
        let c = table.intern(MsFunction::with_ms_level(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_zero_level_becomes_unknown() {
        let f = MsFunction::new(None, Some(0));
        assert_eq!(f.ms_level(), None);

        let mut table = MsFunctionTable::new();
        let a = table.intern(MsFunction::new(None, Some(0)));
        let b = table.intern(MsFunction::unknown());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
