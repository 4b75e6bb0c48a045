//! OrchDaemon: the single-threaded cooperative event loop.
//!
//! Modules register with a priority; each tick dispatches pending work in
//! priority order. All orchestration work happens on one thread, so handlers
//! observe a consistent snapshot of every table between suspension points.

use fib_orch_common::Orch;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct OrchDaemonConfig {
    /// Idle sleep between ticks in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for OrchDaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
        }
    }
}

pub struct OrchDaemon {
    config: OrchDaemonConfig,
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    running: bool,
}

impl OrchDaemon {
    pub fn new(config: OrchDaemonConfig) -> Self {
        Self {
            config,
            orchs: BTreeMap::new(),
            running: false,
        }
    }

    /// Register a module; lower priority runs earlier in the tick.
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        info!(name = orch.name(), priority, "registering orch");
        self.orchs.entry(priority).or_default().push(orch);
    }

    pub fn orch_count(&self) -> usize {
        self.orchs.values().map(|v| v.len()).sum()
    }

    /// Dispatch one pass over every module with pending work.
    pub async fn tick(&mut self) {
        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                if orch.has_pending_tasks() {
                    debug!(name = orch.name(), "dispatching");
                    orch.do_task().await;
                }
            }
        }
    }

    /// Run until [`stop`](Self::stop) is called. At shutdown, in-flight work
    /// finishes the current tick; nothing is removed from the ASIC, warm
    /// restart reconciles on the next start.
    pub async fn run(&mut self) {
        info!("starting orchestration event loop");
        self.running = true;

        while self.running {
            self.tick().await;
            tokio::time::sleep(std::time::Duration::from_millis(
                self.config.heartbeat_interval_ms,
            ))
            .await;
        }

        info!("orchestration event loop stopped");
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("OrchDaemon running: {}", self.running)];
        for (priority, orchs) in &self.orchs {
            for orch in orchs {
                lines.push(format!(
                    "  [{:3}] {} - {} pending",
                    priority,
                    orch.name(),
                    orch.dump_pending_tasks().len()
                ));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct TestOrch {
        name: String,
        priority: i32,
        ticks: usize,
    }

    #[async_trait]
    impl Orch for TestOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            self.ticks += 1;
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn has_pending_tasks(&self) -> bool {
            self.ticks == 0
        }
    }

    #[tokio::test]
    async fn test_priority_ordering_and_dispatch() {
        let mut daemon = OrchDaemon::new(OrchDaemonConfig::default());
        daemon.register_orch(Box::new(TestOrch {
            name: "low".into(),
            priority: 30,
            ticks: 0,
        }));
        daemon.register_orch(Box::new(TestOrch {
            name: "high".into(),
            priority: 10,
            ticks: 0,
        }));
        assert_eq!(daemon.orch_count(), 2);

        let priorities: Vec<i32> = daemon.orchs.keys().copied().collect();
        assert_eq!(priorities, vec![10, 30]);

        daemon.tick().await;
        let lines = daemon.dump();
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_breaks_run() {
        let mut daemon = OrchDaemon::new(OrchDaemonConfig {
            heartbeat_interval_ms: 1,
        });
        daemon.running = true;
        daemon.stop();
        assert!(!daemon.running);
    }
}
