use std::{fmt, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Deserialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::state::HealthState;
use crate::telemetry::HealthcheckMetrics;

pub mod raknet;
pub mod tcp;

pub use raknet::RaknetProbe;
pub use tcp::TcpProbe;

/// Transport used to decide whether the server is up.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// Bedrock offline ping over UDP.
    #[default]
    Raknet,
    /// Plain TCP connect.
    Tcp,
}

impl ProbeProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raknet => "raknet",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub target: Target,
    pub reachable: bool,
    pub timestamp: DateTime<Utc>,
}

/// Concrete probe selected from configuration.
pub enum Prober {
    Raknet(RaknetProbe),
    Tcp(TcpProbe),
}

impl Prober {
    pub fn new(protocol: ProbeProtocol) -> Self {
        match protocol {
            ProbeProtocol::Raknet => Self::Raknet(RaknetProbe::new()),
            ProbeProtocol::Tcp => Self::Tcp(TcpProbe),
        }
    }

    async fn probe(&self, target: &Target, timeout: Duration) -> Result<()> {
        match self {
            Self::Raknet(p) => p.probe(target, timeout).await,
            Self::Tcp(p) => p.probe(target, timeout).await,
        }
    }

    /// Single attempt, no retries. Every failure is reported as `false`.
    pub async fn check_reachability(&self, target: &Target, timeout: Duration) -> bool {
        match self.probe(target, timeout).await {
            Ok(()) => true,
            Err(e) => {
                error!("Healthcheck of {} failed: {:#}", target, e);
                false
            }
        }
    }
}

/// One-shot convenience over [`Prober::check_reachability`].
pub async fn check_reachability(protocol: ProbeProtocol, target: &Target, timeout: Duration) -> bool {
    Prober::new(protocol)
        .check_reachability(target, timeout)
        .await
}

pub struct ProbeLoop {
    pub prober: Prober,
    pub target: Target,
    pub interval: Duration,
    pub timeout: Duration,
    pub state: Arc<HealthState>,
    pub metrics: HealthcheckMetrics,
}

impl ProbeLoop {
    /// Runs one probe per tick until `shutdown` fires. Ticks are measured
    /// start-to-start and a cycle never overlaps the one before it.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_once() => {
                    if result.reachable {
                        info!("Healthcheck succeeded");
                    }
                }
            }
        }

        info!("Probe loop stopped");
    }

    pub async fn run_once(&self) -> ProbeResult {
        info!("Attempting healthcheck {}", self.target);
        self.metrics.mark_attempt();

        let reachable = self
            .prober
            .check_reachability(&self.target, self.timeout)
            .await;

        let result = ProbeResult {
            target: self.target.clone(),
            reachable,
            timestamp: Utc::now(),
        };
        self.state.record(&result);
        result
    }
}
