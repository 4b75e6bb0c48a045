//! Warm-restart helper contract.
//!
//! The helper owns reconciliation timing and the persisted route view; the
//! synchronizer drives it through these hooks.

use fib_orch_common::FieldValue;

pub trait WarmRestartHelper: Send {
    fn enabled(&self) -> bool;

    /// Arm the reconciliation timer at startup.
    fn start_timer(&mut self);

    /// The route view persisted before restart, `(key, fields)` per route.
    fn restore_routes(&mut self) -> Vec<(String, Vec<FieldValue>)>;

    /// Record that a restored route has been confirmed offloaded.
    fn report_offloaded(&mut self, key: &str);
}

/// Helper used when warm restart is not configured.
#[derive(Default)]
pub struct DisabledWarmRestart;

impl WarmRestartHelper for DisabledWarmRestart {
    fn enabled(&self) -> bool {
        false
    }

    fn start_timer(&mut self) {}

    fn restore_routes(&mut self) -> Vec<(String, Vec<FieldValue>)> {
        vec![]
    }

    fn report_offloaded(&mut self, _key: &str) {}
}
