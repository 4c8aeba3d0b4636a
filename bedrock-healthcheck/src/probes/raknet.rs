use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use bedrock_healthcheck_common::{MAX_PONG_LEN, is_unconnected_pong, unconnected_ping};
use log::debug;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

use super::Target;

/// Sends a RakNet unconnected ping and waits for the pong.
///
/// Bedrock servers answer offline pings without a session, so a pong is
/// the cheapest proof that the game server itself (not just the host) is
/// up. The socket is connected to the target, which lets the kernel
/// surface ICMP port-unreachable as a refused error instead of a timeout.
pub struct RaknetProbe {
    started: Instant,
    client_guid: u64,
}

impl Default for RaknetProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl RaknetProbe {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            client_guid: rand::random(),
        }
    }

    pub async fn probe(&self, target: &Target, probe_timeout: Duration) -> Result<()> {
        match timeout(probe_timeout, self.ping(target)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(anyhow!(
                "no pong from {} within {:?}",
                target,
                probe_timeout
            )),
        }
    }

    async fn ping(&self, target: &Target) -> Result<()> {
        let addr = resolve(target).await?;

        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)
            .await
            .context("Failed to bind probe socket")?;
        socket
            .connect(addr)
            .await
            .with_context(|| format!("Failed to connect probe socket to {}", addr))?;

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let frame = unconnected_ping(elapsed_ms, self.client_guid);
        socket
            .send(&frame)
            .await
            .with_context(|| format!("Failed to send ping to {}", addr))?;

        let mut buf = [0u8; MAX_PONG_LEN];
        let n = socket
            .recv(&mut buf)
            .await
            .with_context(|| format!("Failed to receive pong from {}", addr))?;

        let reply = &buf[..n];
        if !is_unconnected_pong(reply) {
            match reply.first() {
                Some(id) => bail!(
                    "unexpected reply from {} (packet id {:#04x}, {} bytes)",
                    addr,
                    id,
                    n
                ),
                None => bail!("empty reply from {}", addr),
            }
        }

        debug!("pong from {} ({} bytes)", addr, n);
        Ok(())
    }
}

async fn resolve(target: &Target) -> Result<SocketAddr> {
    lookup_host((target.host.as_str(), target.port))
        .await
        .with_context(|| format!("Failed to resolve {}", target))?
        .next()
        .ok_or_else(|| anyhow!("{} resolved to no addresses", target))
}
