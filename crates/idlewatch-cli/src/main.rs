//! idlewatch — finds cluster resources receiving no traffic.
//!
//! One `scan` runs two quiescence detectors concurrently — workloads
//! (namespace/pod) and routes (namespace/ingress/host/path) — then
//! resolves the survivors against the cluster directory and logs what
//! their reservations hold.
//!
//! # Usage
//!
//! ```text
//! idlewatch scan --prom-uri http://localhost:9091 --period 6
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use idle_core::LabelSchema;
use idlewatch_cluster::{ClusterConfig, DirectoryClient};
use idlewatch_detect::Detector;
use idlewatch_prom::PromClient;
use idlewatch_report::{route_report, workload_report};

mod debug_server;

/// Zero network transmit over the rolling window, grouped by the
/// workload key components.
const DEFAULT_POD_QUERY: &str = "sum(rate(container_network_transmit_packets_total{pod!=\"\"}[1h])) by (namespace, pod) == 0";

/// Zero ingress requests over the rolling window, grouped by the route
/// key components.
const DEFAULT_ROUTE_QUERY: &str = "sum(rate(nginx_ingress_controller_request_size_count[1h])) by (exported_namespace, ingress, host, path) == 0";

#[derive(Parser)]
#[command(
    name = "idlewatch",
    about = "Finds cluster resources with no observed traffic",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one detection pass over workloads and routes.
    Scan {
        /// Metrics query API endpoint (e.g. http://localhost:9091).
        #[arg(long)]
        prom_uri: String,

        /// Observation period in hours (the step budget).
        #[arg(long, default_value = "6")]
        period: u32,

        /// Per-query timeout in seconds.
        #[arg(long, default_value = "60")]
        query_timeout: u64,

        /// Use out-of-cluster credentials instead of the in-cluster
        /// service-account mount.
        #[arg(long)]
        run_outside_cluster: bool,

        /// API server for out-of-cluster mode (or KUBE_API_SERVER).
        #[arg(long)]
        kube_server: Option<String>,

        /// Bearer token file for out-of-cluster mode (or KUBE_API_TOKEN).
        #[arg(long)]
        kube_token_file: Option<PathBuf>,

        /// PromQL predicate for idle workloads, grouped by namespace and
        /// pod.
        #[arg(long, default_value = DEFAULT_POD_QUERY)]
        pod_query: String,

        /// PromQL predicate for idle routes, grouped by namespace,
        /// ingress, host and path.
        #[arg(long, default_value = DEFAULT_ROUTE_QUERY)]
        route_query: String,

        /// Serve the debug endpoint while scanning.
        #[arg(long)]
        profile: bool,

        /// Debug endpoint bind address.
        #[arg(long, default_value = "0.0.0.0:6060")]
        debug_addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().unwrap()),
        )
        .init();

    match cli.command {
        Command::Scan {
            prom_uri,
            period,
            query_timeout,
            run_outside_cluster,
            kube_server,
            kube_token_file,
            pod_query,
            route_query,
            profile,
            debug_addr,
        } => {
            scan(ScanArgs {
                prom_uri,
                period,
                query_timeout,
                run_outside_cluster,
                kube_server,
                kube_token_file,
                pod_query,
                route_query,
                profile,
                debug_addr,
            })
            .await
        }
    }
}

struct ScanArgs {
    prom_uri: String,
    period: u32,
    query_timeout: u64,
    run_outside_cluster: bool,
    kube_server: Option<String>,
    kube_token_file: Option<PathBuf>,
    pod_query: String,
    route_query: String,
    profile: bool,
    debug_addr: SocketAddr,
}

async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    info!("idlewatch starting");

    // Fatal on a malformed endpoint before anything else runs.
    let prom = PromClient::new(&args.prom_uri, Duration::from_secs(args.query_timeout))?;

    let cluster_config = if args.run_outside_cluster {
        ClusterConfig::out_of_cluster(
            args.kube_server.as_deref(),
            args.kube_token_file.as_deref(),
        )?
    } else {
        ClusterConfig::in_cluster()?
    };
    let directory = DirectoryClient::connect(&cluster_config).await?;
    info!(server = %cluster_config.server, "cluster directory connected");

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let debug_handle = args.profile.then(|| {
        info!(addr = %args.debug_addr, "profiling enabled");
        let addr = args.debug_addr;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = debug_server::serve(addr, shutdown).await {
                warn!(error = %e, "debug endpoint failed");
            }
        })
    });

    // ── Detection ──────────────────────────────────────────────
    // The two detectors touch disjoint state and run concurrently;
    // internally each steps strictly backward, one query at a time.
    let pod_source = prom.source(&args.pod_query);
    let route_source = prom.source(&args.route_query);

    let workload_detector = Detector::new(LabelSchema::workload(), args.period)
        .with_shutdown(shutdown_rx.clone());
    let route_detector =
        Detector::new(LabelSchema::route(), args.period).with_shutdown(shutdown_rx.clone());

    let (workloads, routes) = tokio::join!(
        workload_detector.detect(&pod_source),
        route_detector.detect(&route_source),
    );

    // ── Reports ────────────────────────────────────────────────
    let mut failed_runs = 0;

    match workloads {
        Ok(detection) => {
            let summary = workload_report(&directory, &detection, args.period).await;
            info!(
                requested_hours = summary.requested_hours,
                observed_hours = summary.observed_hours,
                idle_pods = summary.idle_pods,
                namespaces = summary.namespaces,
                skipped = summary.skipped,
                "workload scan complete"
            );
            info!(
                cpu_cores = summary.cpu_milli / 1000,
                memory_mb = summary.memory_bytes / 1024 / 1024,
                "reserved capacity held by idle pods"
            );
        }
        Err(e) => {
            warn!(error = %e, "workload detection failed; category is unknown, not unused");
            failed_runs += 1;
        }
    }

    match routes {
        Ok(detection) => {
            let summary = route_report(&directory, &detection, args.period).await;
            info!(
                requested_hours = summary.requested_hours,
                observed_hours = summary.observed_hours,
                idle_routes = summary.idle_routes,
                namespaces = summary.namespaces,
                resolved_backends = summary.resolved_backends,
                "route scan complete"
            );
            for finding in &summary.findings {
                debug!(
                    namespace = %finding.namespace,
                    ingress = %finding.ingress,
                    host = %finding.host,
                    path = %finding.path,
                    backend = finding
                        .backend
                        .as_ref()
                        .map(|b| b.service_name.as_str())
                        .unwrap_or("<unresolved>"),
                    backing_pods = finding.backing_pods,
                    "idle route"
                );
            }
        }
        Err(e) => {
            warn!(error = %e, "route detection failed; category is unknown, not unused");
            failed_runs += 1;
        }
    }

    if failed_runs == 2 {
        anyhow::bail!("both detection categories failed");
    }

    if let Some(handle) = debug_handle {
        info!("debug endpoint still serving; press Ctrl-C to exit");
        let mut shutdown = shutdown_rx;
        let _ = shutdown.wait_for(|stop| *stop).await;
        handle.abort();
    }

    info!("idlewatch done");
    Ok(())
}
