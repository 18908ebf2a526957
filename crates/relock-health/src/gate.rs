use std::time::Duration;

use tracing::{debug, warn};

use relock_core::{Environment, EnvironmentHealthReport, ProbeResult, ProbeStatus};

use crate::probe::{ProbePlan, Prober};

/// Probe a target environment's critical endpoints and aggregate.
///
/// The gateway goes first: if the entry point itself is unreachable,
/// per-service results would be misleading, so the remaining targets are
/// reported `Unknown` and never probed. Otherwise every service target is
/// probed independently; overall UP iff all probed targets are UP.
///
/// No internal retries. The caller supplies the per-probe timeout and
/// decides whether to re-run the whole gate; a timeout is a DOWN.
pub fn check(
    environment: Environment,
    plan: &ProbePlan,
    prober: &dyn Prober,
    timeout: Duration,
) -> EnvironmentHealthReport {
    let mut targets = Vec::with_capacity(1 + plan.services.len());

    let gateway_status = prober.probe(&plan.gateway, timeout);
    if let ProbeStatus::Down { detail } = &gateway_status {
        warn!(
            environment = environment.as_str(),
            detail = detail.as_str(),
            "gateway probe failed; skipping service probes"
        );
        targets.push(ProbeResult { target: plan.gateway.name.clone(), status: gateway_status });
        for t in &plan.services {
            targets.push(ProbeResult { target: t.name.clone(), status: ProbeStatus::Unknown });
        }
        return EnvironmentHealthReport { environment, checked_at_unix: now_unix(), targets };
    }
    targets.push(ProbeResult { target: plan.gateway.name.clone(), status: gateway_status });

    for t in &plan.services {
        let status = prober.probe(t, timeout);
        match &status {
            ProbeStatus::Up => debug!(target = t.name.as_str(), "probe up"),
            ProbeStatus::Down { detail } => {
                warn!(target = t.name.as_str(), detail = detail.as_str(), "probe down")
            }
            ProbeStatus::Unknown => {}
        }
        targets.push(ProbeResult { target: t.name.clone(), status });
    }

    EnvironmentHealthReport { environment, checked_at_unix: now_unix(), targets }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
