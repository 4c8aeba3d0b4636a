use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::Target;

/// Reachable means the three-way handshake completed.
pub struct TcpProbe;

impl TcpProbe {
    pub async fn probe(&self, target: &Target, probe_timeout: Duration) -> Result<()> {
        let connect = TcpStream::connect((target.host.as_str(), target.port));

        match timeout(probe_timeout, connect).await {
            Ok(Ok(stream)) => {
                debug!(
                    "tcp connect to {} OK (peer {:?})",
                    target,
                    stream.peer_addr().ok()
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e).with_context(|| format!("tcp connect to {} failed", target)),
            Err(_elapsed) => Err(anyhow!(
                "tcp connect to {} timed out after {:?}",
                target,
                probe_timeout
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = TcpProbe
            .probe(&Target::new("127.0.0.1", port), Duration::from_secs(2))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_closed_port_fails_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe_timeout = Duration::from_secs(2);
        let started = Instant::now();
        let result = TcpProbe
            .probe(&Target::new("127.0.0.1", port), probe_timeout)
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < probe_timeout + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let result = TcpProbe
            .probe(
                &Target::new("does-not-exist.invalid", 19132),
                Duration::from_secs(2),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_blackholed_address_times_out() {
        // TEST-NET-3, normally unrouted; needs a network that drops rather than rejects.
        let probe_timeout = Duration::from_millis(300);
        let started = Instant::now();
        let result = TcpProbe
            .probe(&Target::new("203.0.113.1", 19132), probe_timeout)
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < probe_timeout + Duration::from_millis(200));
    }
}
