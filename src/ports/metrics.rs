//! MetricsClient port - counters emitted by command decorators.

/// Minimal counter sink.
///
/// Keys are dotted names such as `commands.use_points_as_discount.success`.
pub trait MetricsClient: Send + Sync {
    /// Add `value` to the counter named `key`.
    fn inc(&self, key: &str, value: u64);
}
