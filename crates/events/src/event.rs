/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **self-contained** (carry enough data to re-derive state without lookups)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "account.opened").
    fn event_type(&self) -> &'static str;
}
