//! Loopback port discovery.
//!
//! The bridge probes the preferred port and walks forward until a listen
//! succeeds; the chosen port lands in `<root>/.dashboard-port` so a
//! co-located UI can find the API without configuration.

use std::io;
use std::net::IpAddr;

use tokio::net::TcpListener;

/// How many ports past the preferred one are probed.
pub const PROBE_SPAN: u16 = 100;

/// Bind the first free port at or after `preferred` on `host`.
pub async fn bind_walking(host: IpAddr, preferred: u16) -> io::Result<(TcpListener, u16)> {
    let mut last_error = None;
    for offset in 0..=PROBE_SPAN {
        let Some(port) = preferred.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                if offset > 0 {
                    tracing::info!(preferred, port = bound, "preferred port busy; walked forward");
                }
                return Ok((listener, bound));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::other("no port available")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn walks_forward_when_preferred_is_busy() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let (first, port) = bind_walking(host, 0).await.unwrap();
        // Port 0 asks the OS for an ephemeral port; probe that exact port
        // again and expect the walk to land one after it.
        let actual = first.local_addr().unwrap().port();
        assert_eq!(port, actual);

        let (_second, second_port) = bind_walking(host, actual).await.unwrap();
        assert!(second_port > actual);
    }
}
