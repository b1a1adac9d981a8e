use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::PORT_CHECK_INTERVAL_MS;

/// Check if something is listening on a local TCP port by attempting a
/// connection with a short timeout.
pub async fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    matches!(
        timeout(Duration::from_millis(250), TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Check if an HTTP service on the port answers a GET with a success status.
pub async fn check_http_health(client: &reqwest::Client, port: u16, path: &str) -> bool {
    let url = format!("http://127.0.0.1:{}{}", port, path);
    match client.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Wait for a port to become free (nothing listening).
pub async fn wait_for_port_free(port: u16, timeout_secs: u64) -> bool {
    let deadline = Duration::from_secs(timeout_secs);
    let interval = Duration::from_millis(PORT_CHECK_INTERVAL_MS);

    let result = timeout(deadline, async {
        loop {
            if !is_port_in_use(port).await {
                debug!("port {} is now free", port);
                return true;
            }
            sleep(interval).await;
        }
    })
    .await;

    result.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_unused_port_reports_free() {
        // Bind then drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!is_port_in_use(port).await);
    }

    #[tokio::test]
    async fn test_bound_port_reports_in_use() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use(port).await);
    }

    #[tokio::test]
    async fn test_wait_for_port_free_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(wait_for_port_free(port, 1).await);
    }

    #[tokio::test]
    async fn test_wait_for_port_free_times_out_while_bound() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!wait_for_port_free(port, 1).await);
        drop(listener);
    }
}
