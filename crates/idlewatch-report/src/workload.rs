//! Idle-workload resolution and capacity totals.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use idlewatch_cluster::{Directory, OwnerRef, PodRequests};
use idlewatch_detect::Detection;

/// One idle pod with its resolved reservation and owner.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadFinding {
    pub namespace: String,
    pub pod: String,
    pub requests: PodRequests,
    /// Owning controller, when one could be resolved.
    pub owner: Option<OwnerRef>,
}

/// Aggregated idle-workload report.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadSummary {
    pub requested_hours: u32,
    pub observed_hours: u32,
    /// Pods idle across the observed period that still resolved.
    pub idle_pods: u32,
    /// Distinct namespaces among the findings.
    pub namespaces: u32,
    /// Candidates that failed resolution (deleted meanwhile, etc.).
    pub skipped: u32,
    /// Total reserved CPU across findings, milli-units.
    pub cpu_milli: i64,
    /// Total reserved memory across findings, bytes.
    pub memory_bytes: i64,
    pub findings: Vec<WorkloadFinding>,
}

/// Resolve every surviving depth-2 candidate and total its requests.
pub async fn workload_report<D: Directory>(
    directory: &D,
    detection: &Detection,
    requested_hours: u32,
) -> WorkloadSummary {
    let mut summary = WorkloadSummary {
        requested_hours,
        observed_hours: detection.observed_hours,
        idle_pods: 0,
        namespaces: 0,
        skipped: 0,
        cpu_milli: 0,
        memory_bytes: 0,
        findings: Vec::new(),
    };

    for key in detection.candidates.iter() {
        let (Some(namespace), Some(pod)) = (key.component(0), key.component(1)) else {
            continue;
        };

        let requests = match directory.pod_requests(namespace, pod).await {
            Ok(requests) => requests,
            Err(e) if e.is_skippable() => {
                debug!(%namespace, %pod, error = %e, "idle pod vanished before resolution");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(%namespace, %pod, error = %e, "pod resolution failed");
                summary.skipped += 1;
                continue;
            }
        };

        // Owner resolution is best-effort context, never a skip reason.
        let owner = match directory.pod_owner(namespace, pod).await {
            Ok(owner) => owner,
            Err(e) => {
                debug!(%namespace, %pod, error = %e, "owner resolution failed");
                None
            }
        };

        debug!(
            %namespace,
            %pod,
            cpu_milli = requests.cpu_milli,
            memory_bytes = requests.memory_bytes,
            "idle pod resolved"
        );

        summary.idle_pods += 1;
        summary.cpu_milli += requests.cpu_milli;
        summary.memory_bytes += requests.memory_bytes;
        summary.findings.push(WorkloadFinding {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            requests,
            owner,
        });
    }

    summary.namespaces = summary
        .findings
        .iter()
        .map(|f| f.namespace.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u32;
    summary
}
