//! Pod network lifecycle.
//!
//! [`NetworkLifecycleManager`] owns the "External" host network: on every
//! node start it sweeps away stale networks left by a previous boot,
//! idempotently (re)creates the pod network for the configured backend,
//! and waits for the host to assign the management IP that later routing
//! steps depend on.
//!
//! Every loop in here is bounded by the shared startup deadline, never by
//! an internal retry counter.

use std::net::{IpAddr, UdpSocket};

use tokio::process::Command;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{NetworkBackend, NodeConfig};
use crate::constants::{
    CREATE_RETRY_INTERVAL, EXTERNAL_GATEWAY, EXTERNAL_NETWORK_NAME, EXTERNAL_SUBNET,
    HOST_COMMAND_TIMEOUT, MANAGEMENT_IP_POLL_INTERVAL, NAT_NETWORK_NAME, ROUTING_SERVICE_NAME,
};
use crate::error::{Error, Result};
use crate::hns::{HostNetwork, NetworkKind, NetworkStore};

/// Idempotent provisioning state machine for the pod-traffic network.
pub struct NetworkLifecycleManager<'a> {
    store: &'a dyn NetworkStore,
}

impl<'a> NetworkLifecycleManager<'a> {
    pub fn new(store: &'a dyn NetworkStore) -> Self {
        Self { store }
    }

    /// Ensures exactly one "External" network exists and returns its
    /// management IP.
    ///
    /// Invoked once per node (re)start. Stale-network cleanup failures are
    /// logged and skipped; failure to create the network or to observe a
    /// management IP before `deadline` is fatal.
    pub async fn ensure_external_network(
        &self,
        cfg: &NodeConfig,
        deadline: Instant,
    ) -> Result<String> {
        if cfg.backend.owns_exclusive_network() {
            self.sweep_stale_networks().await?;
        }

        if !host_has_usable_interface() {
            // Precondition warning only: the caller may choose to delay,
            // the bootstrap itself proceeds.
            warn!("no non-loopback, non-link-local IPv4 interface found on the host");
        }

        self.ensure_created(cfg, deadline).await?;
        let management_ip = self
            .wait_for_management_ip(deadline, cfg.startup_timeout)
            .await?;

        if cfg.backend == NetworkBackend::WindowsBgp {
            // BGP routes are distributed by the host routing service, which
            // only picks up the new network after a restart.
            if let Err(e) = restart_routing_service().await {
                warn!("failed to restart {}: {}", ROUTING_SERVICE_NAME, e);
            }
        }

        info!(
            "network '{}' ready, management IP {}",
            EXTERNAL_NETWORK_NAME, management_ip
        );
        Ok(management_ip)
    }

    /// Deletes every network except the platform-reserved "nat".
    ///
    /// State left over from a previous boot is untrustworthy and rebuilt
    /// fresh. Deletions are best-effort: one failure is logged and the
    /// sweep continues with its siblings.
    async fn sweep_stale_networks(&self) -> Result<()> {
        let networks = self.store.list_networks().await?;
        for network in networks {
            if network.name == NAT_NETWORK_NAME {
                continue;
            }
            match self.store.delete_network(&network.name).await {
                Ok(()) => debug!("deleted stale network '{}'", network.name),
                Err(e) => warn!("leaving stale network '{}' behind: {}", network.name, e),
            }
        }
        Ok(())
    }

    /// Creates the network if absent, retrying with a fixed backoff until
    /// it exists or the deadline expires.
    ///
    /// Creation is attempted at most once per iteration; the loop is only
    /// re-entered while the network still does not exist.
    async fn ensure_created(&self, cfg: &NodeConfig, deadline: Instant) -> Result<()> {
        loop {
            if self.store.get_network(EXTERNAL_NETWORK_NAME).await?.is_some() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    operation: format!("creating network '{}'", EXTERNAL_NETWORK_NAME),
                    duration: cfg.startup_timeout,
                });
            }

            let descriptor = external_network_descriptor(cfg);
            match self.store.create_network(&descriptor).await {
                Ok(created) => {
                    info!(
                        "created {} network '{}'",
                        created.kind.as_str(),
                        created.name
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!("network creation attempt failed: {}", e);
                    sleep(CREATE_RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Polls until the host populates the network's management IP.
    async fn wait_for_management_ip(
        &self,
        deadline: Instant,
        budget: std::time::Duration,
    ) -> Result<String> {
        loop {
            match self.store.get_network(EXTERNAL_NETWORK_NAME).await {
                Ok(Some(network)) => {
                    if let Some(ip) = network.management_ip {
                        return Ok(ip);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("management IP poll failed: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    operation: format!(
                        "waiting for management IP on '{}'",
                        EXTERNAL_NETWORK_NAME
                    ),
                    duration: budget,
                });
            }
            sleep(MANAGEMENT_IP_POLL_INTERVAL).await;
        }
    }
}

/// Builds the "External" descriptor for the configured backend.
///
/// Overlay backends get a VXLAN network with a segment-id policy tag;
/// bridged backends get an L2 bridge over the same fixed /30.
pub fn external_network_descriptor(cfg: &NodeConfig) -> HostNetwork {
    if cfg.backend.is_vxlan() {
        HostNetwork::new(
            EXTERNAL_NETWORK_NAME,
            NetworkKind::Overlay,
            EXTERNAL_SUBNET,
            EXTERNAL_GATEWAY,
        )
        .with_vsid(cfg.felix.vxlan_vni)
    } else {
        HostNetwork::new(
            EXTERNAL_NETWORK_NAME,
            NetworkKind::L2Bridge,
            EXTERNAL_SUBNET,
            EXTERNAL_GATEWAY,
        )
    }
}

/// Checks for at least one non-loopback, non-link-local IPv4 interface.
///
/// Uses the local address a UDP socket would pick for an outbound flow; no
/// packet is sent. Returns false on sockets errors too, the caller only
/// logs the result.
pub fn host_has_usable_interface() -> bool {
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(s) => s,
        Err(_) => return false,
    };
    if socket.connect("8.8.8.8:53").is_err() {
        return false;
    }
    match socket.local_addr() {
        Ok(addr) => match addr.ip() {
            IpAddr::V4(ip) => {
                !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified()
            }
            IpAddr::V6(_) => false,
        },
        Err(_) => false,
    }
}

/// Restarts the host routing service (BGP backend only).
async fn restart_routing_service() -> Result<()> {
    let script = format!("Restart-Service -Name {} -Force", ROUTING_SERVICE_NAME);
    debug!("powershell: {}", script);

    let mut cmd = Command::new("powershell.exe");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::piped());

    let output = timeout(HOST_COMMAND_TIMEOUT, cmd.output())
        .await
        .map_err(|_| Error::HostApi {
            command: script.clone(),
            message: format!("timed out after {:?}", HOST_COMMAND_TIMEOUT),
        })?
        .map_err(|e| Error::HostApi {
            command: script.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::HostApi {
            command: script,
            message: stderr.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkBackend;

    fn overlay_config() -> NodeConfig {
        let mut cfg = NodeConfig::load();
        cfg.backend = NetworkBackend::Overlay;
        cfg.felix.vxlan_vni = 9999;
        cfg
    }

    #[test]
    fn test_overlay_descriptor_carries_vsid() {
        let net = external_network_descriptor(&overlay_config());
        assert_eq!(net.kind, NetworkKind::Overlay);
        assert_eq!(net.vsid, Some(9999));
        assert_eq!(net.subnet, EXTERNAL_SUBNET);
        assert_eq!(net.gateway, EXTERNAL_GATEWAY);
    }

    #[test]
    fn test_bridge_descriptor_is_plain_l2() {
        let mut cfg = overlay_config();
        cfg.backend = NetworkBackend::Bridge;
        let net = external_network_descriptor(&cfg);
        assert_eq!(net.kind, NetworkKind::L2Bridge);
        assert_eq!(net.vsid, None);
    }

    #[test]
    fn test_bgp_descriptor_is_bridge_kind() {
        let mut cfg = overlay_config();
        cfg.backend = NetworkBackend::WindowsBgp;
        let net = external_network_descriptor(&cfg);
        assert_eq!(net.kind, NetworkKind::L2Bridge);
    }
}
