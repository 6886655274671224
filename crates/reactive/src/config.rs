//! Manager configuration.

/// How `live_array` re-synchronizes an existing live array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LiveSync {
    /// Skip the scan when nothing is pending and the kind's entity count
    /// equals the array length. An add and a remove of equal count between
    /// two requests can be missed until the next flush.
    #[default]
    CountHeuristic,
    /// Always scan the kind.
    Exact,
}

impl LiveSync {
    /// Returns true if an unchanged-looking array may skip its scan.
    #[inline]
    pub fn allows_shortcut(self) -> bool {
        matches!(self, LiveSync::CountHeuristic)
    }
}

/// Configuration for a `RecordArrayManager`.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Re-synchronization strategy for existing live arrays.
    pub live_sync: LiveSync,
    /// Emit a debug event summarizing every flush.
    pub trace_flushes: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            live_sync: LiveSync::CountHeuristic,
            trace_flushes: true,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live_sync(mut self, live_sync: LiveSync) -> Self {
        self.live_sync = live_sync;
        self
    }

    pub fn with_trace_flushes(mut self, trace_flushes: bool) -> Self {
        self.trace_flushes = trace_flushes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.live_sync, LiveSync::CountHeuristic);
        assert!(config.trace_flushes);
    }

    #[test]
    fn test_config_builder() {
        let config = ManagerConfig::new()
            .with_live_sync(LiveSync::Exact)
            .with_trace_flushes(false);
        assert_eq!(config.live_sync, LiveSync::Exact);
        assert!(!config.trace_flushes);
        assert!(!config.live_sync.allows_shortcut());
    }
}
