//! Orchestration daemon entry point.
//!
//! Wires the group and SRv6 orchestrators to the ASIC surface and runs the
//! event loop. Without a hardware driver attached this runs against the
//! simulated ASIC, which is enough for the control-plane pipeline to be
//! exercised end to end.

use async_trait::async_trait;
use clap::Parser;
use fib_asic::SimAsic;
use fib_orch_common::Orch;
use orchagent::daemon::{OrchDaemon, OrchDaemonConfig};
use orchagent::nhg::{NhgOrch, NhgOrchConfig, NhgServices, StaticRouteGroups};
use orchagent::srv6::{SharedSrv6, Srv6Orch, Srv6OrchConfig, Srv6Services};
use orchagent::{CrmCounters, InterfaceRegistry, NeighborRegistry, VrfRegistry};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Lets the SRv6 orchestrator sit behind the shared handle the group
/// orchestrator uses while still being driven by the daemon loop.
struct SharedSrv6Orch(SharedSrv6);

#[async_trait]
impl Orch for SharedSrv6Orch {
    fn name(&self) -> &str {
        "Srv6Orch"
    }

    async fn do_task(&mut self) {
        if let Ok(mut orch) = self.0 .0.lock() {
            orch.drain_tasks();
        }
    }

    fn priority(&self) -> i32 {
        25
    }

    fn has_pending_tasks(&self) -> bool {
        self.0
             .0
            .lock()
            .map(|orch| orch.has_pending_tasks())
            .unwrap_or(false)
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.0
             .0
            .lock()
            .map(|orch| orch.dump_pending_tasks())
            .unwrap_or_default()
    }
}

/// Switch orchestration agent
#[derive(Parser, Debug)]
#[command(name = "orchagent", version, about, long_about = None)]
struct Args {
    /// ASIC group quota shared with the route orchestrator
    #[arg(long, default_value = "512")]
    max_nhg_count: u32,

    /// Bulk size for group-member programming
    #[arg(short = 'b', long, default_value = "64")]
    max_bulk_size: usize,

    /// Heartbeat interval in milliseconds
    #[arg(long, default_value = "1000")]
    heartbeat_interval: u64,

    /// Log filter (e.g. info, orchagent=debug)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    info!("starting orchagent");
    info!(max_nhg_count = args.max_nhg_count, max_bulk_size = args.max_bulk_size, "configuration");

    // Platform integration replaces these with driver-backed services; the
    // simulated ASIC keeps the pipeline runnable everywhere else.
    let asic = Arc::new(SimAsic::new());
    let neigh = Arc::new(NeighborRegistry::new());
    let intfs = Arc::new(InterfaceRegistry::new());
    let vrfs = Arc::new(VrfRegistry::new(0x1));
    let crm = Arc::new(CrmCounters::new());
    let route_groups = Arc::new(StaticRouteGroups::new(0));

    let srv6_orch = Srv6Orch::new(
        Srv6OrchConfig {
            default_vr_id: 0x1,
            underlay_rif_id: 0x2,
        },
        Srv6Services {
            tunnel: asic.clone(),
            srv6: asic.clone(),
            next_hop: asic.clone(),
            neigh: neigh.clone(),
            vrfs: vrfs.clone(),
            crm: crm.clone(),
        },
    );
    let srv6_shared = SharedSrv6(Arc::new(Mutex::new(srv6_orch)));

    let nhg_orch = NhgOrch::new(
        NhgOrchConfig {
            max_nhg_count: args.max_nhg_count,
            max_bulk_size: args.max_bulk_size,
        },
        NhgServices {
            asic: asic.clone(),
            neigh: neigh.clone(),
            intfs: intfs.clone(),
            crm: crm.clone(),
            srv6: Arc::new(srv6_shared.clone()),
            route_groups,
        },
    );

    let mut daemon = OrchDaemon::new(OrchDaemonConfig {
        heartbeat_interval_ms: args.heartbeat_interval,
    });
    daemon.register_orch(Box::new(nhg_orch));
    daemon.register_orch(Box::new(SharedSrv6Orch(srv6_shared)));

    info!(orchs = daemon.orch_count(), "orchestrators registered");

    // Dropping the loop future finishes the current tick and exits without
    // issuing removes; warm restart reconciles on the next start.
    tokio::select! {
        _ = daemon.run() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("received interrupt, draining and exiting");
        }
    }

    info!("orchagent shutdown complete");
    ExitCode::SUCCESS
}
