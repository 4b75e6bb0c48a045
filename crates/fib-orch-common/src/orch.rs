//! Base trait for orchestration modules.

use async_trait::async_trait;

/// An orchestration module driven by the daemon loop.
///
/// The daemon dispatches modules in priority order (lower first) whenever
/// they report pending work. `do_task` must be cooperative: it drains its
/// consumers, processes what it can, and leaves unresolved entries pending
/// rather than blocking.
#[async_trait]
pub trait Orch: Send {
    fn name(&self) -> &str;

    /// Process pending entries from this module's consumers.
    async fn do_task(&mut self);

    /// Lower runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    fn has_pending_tasks(&self) -> bool {
        false
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }

    /// Called once when a warm restart finishes reconciling.
    fn on_warm_boot_end(&mut self) {}
}
