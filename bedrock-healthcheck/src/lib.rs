pub mod probes;
pub mod server;
pub mod settings;
pub mod state;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::probes::{ProbeLoop, Prober};
use crate::server::MetricsServer;
use crate::settings::Settings;
use crate::state::HealthState;
use crate::telemetry::Telemetry;

pub struct HealthcheckEngine {
    settings: Settings,
    state: Arc<HealthState>,
    telemetry: Arc<Telemetry>,
    server: MetricsServer,
}

impl HealthcheckEngine {
    /// Builds the metric pipeline and binds the scrape listener. Failing to
    /// bind is fatal; nothing is served in that case.
    pub async fn bind(settings: Settings) -> Result<Self> {
        let target = settings.target();
        let state = Arc::new(HealthState::default());
        let telemetry = Arc::new(Telemetry::new(&target, settings.probe_protocol, state.clone())?);
        let server = MetricsServer::bind(
            &settings.prometheus_host,
            settings.prometheus_port,
            telemetry.clone(),
        )
        .await?;

        Ok(Self {
            settings,
            state,
            telemetry,
            server,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Latest result as recorded by the check loop.
    pub fn state(&self) -> Arc<HealthState> {
        self.state.clone()
    }

    /// Runs the probe loop and the scrape server until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let probe_loop = ProbeLoop {
            prober: Prober::new(self.settings.probe_protocol),
            target: self.settings.target(),
            interval: self.settings.probe_interval(),
            timeout: self.settings.probe_timeout(),
            state: self.state.clone(),
            metrics: self.telemetry.metrics(),
        };

        info!(
            "Checking {} over {} every {:?} (timeout {:?})",
            probe_loop.target, self.settings.probe_protocol, probe_loop.interval, probe_loop.timeout
        );

        let server = tokio::spawn(self.server.serve(shutdown.clone()));
        let prober = tokio::spawn(probe_loop.run(shutdown.clone()));

        shutdown.cancelled().await;

        info!("Shutting down metrics server...");
        server.await.context("Metrics server task panicked")?;

        info!("Shutting down healthcheck loop...");
        prober.await.context("Healthcheck task panicked")?;

        self.telemetry.shutdown();
        Ok(())
    }
}
