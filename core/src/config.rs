//! Reconciler configuration.

/// Tuning knobs for a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    time_slicing: bool,
    nested_update_limit: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            time_slicing: true,
            nested_update_limit: 50,
        }
    }

    /// Controls whether non-synchronous renders yield to the scheduler between fibers.
    #[must_use]
    pub const fn time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    /// Sets how many times one synchronous flush may re-render the same root.
    #[must_use]
    pub const fn nested_update_limit(mut self, limit: usize) -> Self {
        self.nested_update_limit = limit;
        self
    }

    /// Whether time slicing is enabled.
    #[must_use]
    pub const fn is_time_slicing(&self) -> bool {
        self.time_slicing
    }

    /// The nested update limit.
    #[must_use]
    pub const fn max_nested_updates(&self) -> usize {
        self.nested_update_limit
    }
}
