//! Process-wide active-filter slot
//!
//! Exactly one [`PathFilter`] is live at a time. The controlling process
//! installs a new one whenever the profiling scope changes; sample events read
//! it concurrently at high frequency. Replacement is a whole-object `Arc`
//! swap under a short-lived mutex, so a reader sees either the prior
//! fully-formed filter or the new one, never a mix of their fields. Once a
//! snapshot `Arc` is cloned out, using it needs no further synchronization.

use crate::filter::{FilterError, PathFilter};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// The slot contents: the live filter together with the install counter, so
/// a single lock acquisition always reads a consistent pairing.
struct ActiveSlot {
    filter: Option<Arc<PathFilter>>,
    /// Bumped on every install; diagnostics only
    generation: u64,
}

/// The one live filter. The mutex guards only the pointer swap/read, never
/// filter use.
static ACTIVE: Mutex<ActiveSlot> = Mutex::new(ActiveSlot {
    filter: None,
    generation: 0,
});

/// Install `filter` as the process-wide active filter, dropping any prior
/// one. Returns the new generation number.
pub fn install(filter: PathFilter) -> u64 {
    let fragment_count = filter.fragments().len();
    let generation = {
        let mut slot = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        slot.filter = Some(Arc::new(filter));
        slot.generation
    };
    debug!(generation, fragment_count, "installed path filter");
    generation
}

/// Snapshot the active filter, if any. The returned `Arc` stays valid even
/// if another thread replaces the filter immediately afterwards.
pub fn current() -> Option<Arc<PathFilter>> {
    ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .filter
        .clone()
}

/// Generation of the most recent install; 0 when none has ever happened.
pub fn generation() -> u64 {
    ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .generation
}

/// Remove the active filter. Profiling is effectively disabled until the
/// next install.
pub fn clear() {
    let mut slot = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
    slot.filter = None;
}

/// Construct and atomically install a filter from the controlling process's
/// scope description. On error nothing is replaced: the previously installed
/// filter (if any) remains active.
pub fn install_filter(
    fragments: Vec<String>,
    base_path: String,
    profile_all: bool,
) -> Result<u64, FilterError> {
    let filter = PathFilter::new(fragments, base_path, profile_all)?;
    Ok(install(filter))
}

/// Operator-facing description of the active filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub profile_all: bool,
    pub fragments: Vec<String>,
    pub base_path: String,
    pub generation: u64,
}

/// Describe the active filter for debugging. Logs the configuration at
/// `info` level; no-op returning `None` when no filter is installed.
pub fn describe_filter() -> Option<FilterSnapshot> {
    // One lock acquisition: the generation always belongs to the filter it
    // is reported with, even under concurrent reinstalls.
    let (filter, generation) = {
        let slot = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
        (slot.filter.clone()?, slot.generation)
    };
    let snapshot = FilterSnapshot {
        profile_all: filter.profile_all(),
        fragments: filter.fragments().to_vec(),
        base_path: filter.base_path().to_string(),
        generation,
    };
    info!(
        profile_all = snapshot.profile_all,
        fragments = ?snapshot.fragments,
        base_path = %snapshot.base_path,
        generation = snapshot.generation,
        "active path filter"
    );
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_install_replaces_whole_filter() {
        install_filter(vec!["alpha".into()], "/home/u/a".into(), false).unwrap();
        install_filter(vec!["beta".into()], "/home/u/b".into(), true).unwrap();

        let active = current().unwrap();
        assert_eq!(active.fragments(), ["beta"]);
        assert_eq!(active.base_path(), "/home/u/b");
        assert!(active.profile_all());
        clear();
    }

    #[test]
    #[serial]
    fn test_failed_install_keeps_prior_filter() {
        install_filter(vec!["alpha".into()], "/home/u/a".into(), false).unwrap();
        let before = generation();

        let err = install_filter(vec!["bäd".into()], "/home/u/b".into(), false).unwrap_err();
        assert!(!err.is_fatal());

        assert_eq!(generation(), before);
        let active = current().unwrap();
        assert_eq!(active.fragments(), ["alpha"]);
        clear();
    }

    #[test]
    #[serial]
    fn test_snapshot_outlives_replacement() {
        install_filter(vec!["alpha".into()], "/home/u/a".into(), false).unwrap();
        let snapshot = current().unwrap();

        install_filter(vec!["beta".into()], "/home/u/b".into(), false).unwrap();

        // The old snapshot stays fully usable after the swap.
        assert_eq!(snapshot.fragments(), ["alpha"]);
        assert_eq!(current().unwrap().fragments(), ["beta"]);
        clear();
    }

    #[test]
    #[serial]
    fn test_generation_increases_per_install() {
        let start = generation();
        install_filter(vec![], "/home/u/a".into(), false).unwrap();
        install_filter(vec![], "/home/u/b".into(), false).unwrap();
        assert_eq!(generation(), start + 2);
        clear();
    }

    #[test]
    #[serial]
    fn test_describe_pairs_generation_with_its_filter() {
        let g1 = install_filter(vec![], "/home/u/one".into(), false).unwrap();
        let s1 = describe_filter().unwrap();
        assert_eq!((s1.generation, s1.base_path.as_str()), (g1, "/home/u/one"));

        let g2 = install_filter(vec![], "/home/u/two".into(), false).unwrap();
        let s2 = describe_filter().unwrap();
        assert_eq!((s2.generation, s2.base_path.as_str()), (g2, "/home/u/two"));
        clear();
    }

    #[test]
    #[serial]
    fn test_describe_filter_none_when_empty() {
        clear();
        assert!(describe_filter().is_none());
    }

    #[test]
    #[serial]
    fn test_describe_filter_reports_configuration() {
        install_filter(vec!["app".into()], "/home/u/project".into(), true).unwrap();
        let snapshot = describe_filter().unwrap();
        assert!(snapshot.profile_all);
        assert_eq!(snapshot.fragments, ["app"]);
        assert_eq!(snapshot.base_path, "/home/u/project");
        assert_eq!(snapshot.generation, generation());
        clear();
    }

    #[test]
    #[serial]
    fn test_snapshot_serializes() {
        install_filter(vec!["app".into()], "/home/u/project".into(), false).unwrap();
        let snapshot = describe_filter().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: FilterSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        clear();
    }
}
