use std::time::Duration;

use serde::{Deserialize, Serialize};

use relock_core::ProbeStatus;

/// Health endpoint shape exposed by a service family.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStyle {
    /// `GET {base}/actuator/health` (gateway and typed-service family).
    Actuator,
    /// `GET {base}/api/{service}/health`.
    ApiHealth,
    /// `GET {base}/api/{service}/healthz` (auth family).
    ApiHealthz,
}

impl ProbeStyle {
    pub fn url_for(&self, base_url: &str, service: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            ProbeStyle::Actuator => format!("{base}/actuator/health"),
            ProbeStyle::ApiHealth => format!("{base}/api/{service}/health"),
            ProbeStyle::ApiHealthz => format!("{base}/api/{service}/healthz"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub name: String,
    pub url: String,
}

/// Gateway plus per-service targets. The gateway is probed first and
/// short-circuits the rest; the service targets have no ordering
/// dependency among themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbePlan {
    pub gateway: ProbeTarget,
    pub services: Vec<ProbeTarget>,
}

#[derive(Clone, Debug)]
pub struct ServiceProbe {
    pub name: String,
    pub base_url: String,
    pub style: ProbeStyle,
}

pub fn build_plan(gateway_url: &str, services: &[ServiceProbe]) -> ProbePlan {
    ProbePlan {
        gateway: ProbeTarget {
            name: "gateway".to_string(),
            url: ProbeStyle::Actuator.url_for(gateway_url, "gateway"),
        },
        services: services
            .iter()
            .map(|s| ProbeTarget {
                name: s.name.clone(),
                url: s.style.url_for(&s.base_url, &s.name),
            })
            .collect(),
    }
}

/// Injected probing capability so the gate is testable with fakes.
pub trait Prober: Send + Sync {
    fn probe(&self, target: &ProbeTarget, timeout: Duration) -> ProbeStatus;
}

/// Real prober over HTTP. Any 2xx is UP; a non-success status or a
/// transport error (timeouts included) is DOWN with the detail captured.
pub struct HttpProber {
    client: reqwest::blocking::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self { client: reqwest::blocking::Client::new() }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for HttpProber {
    fn probe(&self, target: &ProbeTarget, timeout: Duration) -> ProbeStatus {
        match self.client.get(&target.url).timeout(timeout).send() {
            Ok(resp) if resp.status().is_success() => ProbeStatus::Up,
            Ok(resp) => ProbeStatus::Down { detail: format!("HTTP {}", resp.status().as_u16()) },
            Err(e) => ProbeStatus::Down { detail: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_shapes_per_family() {
        assert_eq!(
            ProbeStyle::Actuator.url_for("http://staging.example.com/", "gateway"),
            "http://staging.example.com/actuator/health"
        );
        assert_eq!(
            ProbeStyle::ApiHealth.url_for("http://staging.example.com", "orders"),
            "http://staging.example.com/api/orders/health"
        );
        assert_eq!(
            ProbeStyle::ApiHealthz.url_for("http://staging.example.com", "auth"),
            "http://staging.example.com/api/auth/healthz"
        );
    }

    #[test]
    fn plan_puts_gateway_first_and_keeps_service_order() {
        let plan = build_plan(
            "http://s.example.com",
            &[
                ServiceProbe {
                    name: "catalog".into(),
                    base_url: "http://s.example.com".into(),
                    style: ProbeStyle::ApiHealth,
                },
                ServiceProbe {
                    name: "auth".into(),
                    base_url: "http://s.example.com".into(),
                    style: ProbeStyle::ApiHealthz,
                },
            ],
        );
        assert_eq!(plan.gateway.name, "gateway");
        assert_eq!(plan.services[0].url, "http://s.example.com/api/catalog/health");
        assert_eq!(plan.services[1].url, "http://s.example.com/api/auth/healthz");
    }
}
