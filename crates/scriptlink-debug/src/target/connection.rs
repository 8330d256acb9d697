//! Connection Management
//!
//! Free-port probing, runtime spawning, TCP connection with retry, and
//! socket tuning.

use super::config::LaunchConfig;
use crate::{Error, Result};
use scriptlink_config::{ConnectionConfig, LOCALHOST_IPV4};
use socket2::{SockRef, TcpKeepalive};
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, trace, warn};

/// How long a single port probe may take before the port counts as busy
const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Resolve the configured host to an IPv4 address
///
/// "localhost" is pinned to 127.0.0.1 so it never resolves to `::1`.
pub fn resolve_host(host: &str) -> Ipv4Addr {
    if host == "localhost" {
        return LOCALHOST_IPV4;
    }
    match host.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid host '{}': {}. Falling back to 127.0.0.1", host, e);
            LOCALHOST_IPV4
        }
    }
}

/// Pick the first port in the range nothing is listening on.
///
/// A port is free when a connection attempt is refused.
pub async fn find_free_port(host: Ipv4Addr, start: u16, end: u16) -> Result<u16> {
    for port in start..=end {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                debug!(port, "Selected free debug port");
                return Ok(port);
            }
            Ok(Ok(_)) => trace!(port, "Port in use"),
            Ok(Err(e)) => trace!(port, "Port probe failed: {}", e),
            Err(_) => trace!(port, "Port probe timed out"),
        }
    }
    Err(Error::Launch(format!(
        "No free debug port in range {}-{}",
        start, end
    )))
}

/// Spawn the runtime with its output piped for console relaying
pub fn spawn_runtime(launch: &LaunchConfig, port: u16) -> Result<Child> {
    info!("Launching runtime: {}", launch.command_line(port));

    let mut cmd = Command::new(&launch.command);
    cmd.args(launch.substitute_port(port))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &launch.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &launch.env {
        cmd.env(key, value);
    }

    cmd.spawn()
        .map_err(|e| Error::Launch(format!("Failed to spawn '{}': {}", launch.command, e)))
}

/// Connect to the runtime's debug port with bounded retries
///
/// Uses exponential backoff with jitter:
/// - Starts with configured retry_interval_ms
/// - Doubles interval on each retry (up to max_retry_interval_ms)
/// - Adds random jitter (0..retry_jitter_ms)
///
/// Gives up early when the runtime process has already exited.
pub async fn connect_with_retry(
    host: Ipv4Addr,
    port: u16,
    config: &ConnectionConfig,
    child: &mut Child,
) -> Result<TcpStream> {
    use rand::Rng;

    let address = format!("{}:{}", host, port);
    let mut retry_interval_ms = config.retry_interval_ms;
    let mut attempt = 0u32;

    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!(attempt = attempt + 1, "Connected to runtime at {}", address);
                return Ok(stream);
            }
            Err(e) => {
                attempt += 1;

                if let Ok(Some(status)) = child.try_wait() {
                    return Err(Error::Launch(format!(
                        "Runtime exited ({}) before accepting a debug connection on {}",
                        status, address
                    )));
                }

                if attempt >= config.connect_attempts {
                    return Err(Error::Launch(format!(
                        "Could not connect to {} after {} attempts: {}",
                        address, attempt, e
                    )));
                }

                let jitter_ms = if config.retry_jitter_ms > 0 {
                    rand::rng().random_range(0..config.retry_jitter_ms)
                } else {
                    0
                };
                let wait_ms = retry_interval_ms.saturating_add(jitter_ms);

                trace!(
                    "Connection attempt {} failed, retrying in {}ms (backoff: {}ms + jitter: {}ms)",
                    attempt,
                    wait_ms,
                    retry_interval_ms,
                    jitter_ms
                );

                tokio::time::sleep(Duration::from_millis(wait_ms)).await;

                retry_interval_ms = retry_interval_ms
                    .saturating_mul(2)
                    .min(config.max_retry_interval_ms);
            }
        }
    }
}

/// Disable Nagle and enable keep-alive on the debug connection
pub fn configure_tcp(stream: &TcpStream, keepalive_secs: u64) {
    let socket = SockRef::from(stream);

    if let Err(e) = socket.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    if keepalive_secs == 0 {
        return;
    }
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(keepalive_secs))
        .with_interval(Duration::from_secs(keepalive_secs));

    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keep-alive: {}", e);
    } else {
        debug!("TCP keep-alive configured");
    }
}
