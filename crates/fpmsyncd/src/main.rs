//! Route synchronizer entry point.
//!
//! The FPM transport and netlink decoding are provided by the platform
//! integration layer, which feeds parsed messages into [`RouteSync`].

use clap::Parser;
use fpmsyncd::protocol::{ProtocolDb, DEFAULT_RT_PROTOS_PATH};
use fpmsyncd::routesync::{RouteSync, RouteSyncTables, StaticLinkResolver};
use fpmsyncd::warm_restart::DisabledWarmRestart;
use fib_orch_common::MemTable;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// FPM route synchronizer
#[derive(Parser, Debug)]
#[command(name = "fpmsyncd", version, about, long_about = None)]
struct Args {
    /// Withhold route acknowledgements until the ASIC confirms offload
    #[arg(short = 's', long)]
    suppression: bool,

    /// Protocol name database path
    #[arg(long, default_value = DEFAULT_RT_PROTOS_PATH)]
    rt_protos: PathBuf,

    /// Log filter (e.g. info, fpmsyncd=debug)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    info!("starting fpmsyncd");
    let protocol_db = ProtocolDb::load(&args.rt_protos);

    let tables = RouteSyncTables {
        route: Box::new(MemTable::new("ROUTE")),
        label_route: Box::new(MemTable::new("LABEL_ROUTE")),
        srv6_sid_list: Box::new(MemTable::new("SRV6_SID_LIST")),
        srv6_my_sid: Box::new(MemTable::new("SRV6_MY_SID")),
        nexthop_group: Box::new(MemTable::new("NEXTHOP_GROUP")),
    };

    let mut sync = RouteSync::new(
        tables,
        Box::new(StaticLinkResolver::new()),
        protocol_db,
        Box::new(DisabledWarmRestart),
    );
    sync.set_suppression_enabled(args.suppression);
    sync.on_startup();

    info!("awaiting FPM connection from the platform transport layer");

    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("received interrupt, shutting down"),
        Err(e) => warn!(error = %e, "failed to listen for interrupt"),
    }

    info!("fpmsyncd shutdown complete");
    ExitCode::SUCCESS
}
