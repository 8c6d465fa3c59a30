//! Host network store.
//!
//! [`NetworkStore`] is the narrow capability interface over the host's
//! virtual-network subsystem (HNS on Windows): list, get, create, delete,
//! and management-IP queries. The orchestrator's control flow only ever
//! talks to this trait, so it can be exercised against an in-memory fake.
//!
//! [`HnsStore`] is the production implementation. It drives HNS through
//! PowerShell, the same way the rest of the host collaborators are invoked:
//! one bounded shell command per operation, output parsed as JSON. On
//! non-Windows hosts the store reports itself unavailable instead of
//! failing at construction, so the binary can still print a clear error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::constants::{HOST_COMMAND_TIMEOUT, MAX_HOST_OUTPUT_SIZE};
use crate::error::{Error, Result};
use crate::firewall;

// =============================================================================
// HostNetwork
// =============================================================================

/// Kind of host virtual network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    /// VXLAN overlay network.
    Overlay,
    /// L2 bridge network.
    L2Bridge,
}

impl NetworkKind {
    /// HNS type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overlay => "Overlay",
            Self::L2Bridge => "L2Bridge",
        }
    }
}

/// One virtual switch on the host.
///
/// Created or destroyed as a unit; the management IP is assigned by the
/// host networking subsystem after creation, never by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNetwork {
    /// Network name, unique on the host.
    pub name: String,
    /// Network kind.
    pub kind: NetworkKind,
    /// Subnet prefix, e.g. "192.168.255.0/30".
    pub subnet: String,
    /// Gateway address within the subnet.
    pub gateway: String,
    /// VXLAN segment id, overlay networks only.
    pub vsid: Option<u32>,
    /// Management IP assigned by the host after creation.
    pub management_ip: Option<String>,
}

impl HostNetwork {
    /// Builds the descriptor for a pod-traffic network.
    pub fn new(
        name: impl Into<String>,
        kind: NetworkKind,
        subnet: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            subnet: subnet.into(),
            gateway: gateway.into(),
            vsid: None,
            management_ip: None,
        }
    }

    /// Sets the VXLAN segment id policy tag.
    pub fn with_vsid(mut self, vsid: u32) -> Self {
        self.vsid = Some(vsid);
        self
    }
}

// =============================================================================
// NetworkStore Trait
// =============================================================================

/// Capability interface over the host virtual-network subsystem.
///
/// All operations are fallible and idempotence is the caller's concern:
/// repeated creates are guarded by an existence check, not relied upon to
/// be no-ops at this layer.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Lists every network on the host.
    async fn list_networks(&self) -> Result<Vec<HostNetwork>>;

    /// Looks up a network by name, `Ok(None)` if absent.
    ///
    /// A trailing `*` in the name matches any network with the prefix
    /// before it (managed-network lookups use this).
    async fn get_network(&self, name: &str) -> Result<Option<HostNetwork>>;

    /// Creates a network from the descriptor, returning the created state.
    async fn create_network(&self, network: &HostNetwork) -> Result<HostNetwork>;

    /// Deletes a network by name.
    async fn delete_network(&self, name: &str) -> Result<()>;
}

/// Matches a network name against a lookup pattern.
///
/// Plain names compare exactly; a trailing `*` matches on the prefix.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

// =============================================================================
// HnsStore (production implementation)
// =============================================================================

/// HNS-backed network store, driven through PowerShell.
pub struct HnsStore {
    available: bool,
    reason: Option<String>,
}

/// Shape of `Get-HnsNetwork | ConvertTo-Json` output, one entry per network.
#[derive(Debug, Deserialize)]
struct HnsNetworkRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Subnets", default)]
    subnets: Vec<HnsSubnetRecord>,
    #[serde(rename = "ManagementIP", default)]
    management_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HnsSubnetRecord {
    #[serde(rename = "AddressPrefix", default)]
    address_prefix: String,
    #[serde(rename = "GatewayAddress", default)]
    gateway_address: String,
}

impl HnsNetworkRecord {
    fn into_host_network(self) -> HostNetwork {
        let kind = if self.kind.eq_ignore_ascii_case("overlay") {
            NetworkKind::Overlay
        } else {
            NetworkKind::L2Bridge
        };
        let (subnet, gateway) = self
            .subnets
            .into_iter()
            .next()
            .map(|s| (s.address_prefix, s.gateway_address))
            .unwrap_or_default();
        HostNetwork {
            name: self.name,
            kind,
            subnet,
            gateway,
            vsid: None,
            management_ip: self.management_ip.filter(|ip| !ip.is_empty()),
        }
    }
}

impl HnsStore {
    /// Creates the store, probing HNS availability.
    #[cfg(target_os = "windows")]
    pub fn new() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    /// Creates the store (unavailable stub on non-Windows).
    #[cfg(not(target_os = "windows"))]
    pub fn new() -> Self {
        Self {
            available: false,
            reason: Some("HNS is only available on Windows".to_string()),
        }
    }

    /// Returns the reason the store is unavailable, if any.
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::HostApi {
                command: "hns".to_string(),
                message: self
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unavailable".to_string()),
            })
        }
    }

    /// Runs a PowerShell script with a bounded timeout, capturing stdout.
    async fn ps_command(&self, script: &str) -> Result<Vec<u8>> {
        debug!("powershell: {}", script);

        let mut cmd = Command::new("powershell.exe");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", script]);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let output = timeout(HOST_COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::HostApi {
                command: script.to_string(),
                message: format!("timed out after {:?}", HOST_COMMAND_TIMEOUT),
            })?
            .map_err(|e| Error::HostApi {
                command: script.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::HostApi {
                command: script.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        let mut stdout = output.stdout;
        if stdout.len() > MAX_HOST_OUTPUT_SIZE {
            stdout.truncate(MAX_HOST_OUTPUT_SIZE);
            warn!("powershell output truncated to {} bytes", MAX_HOST_OUTPUT_SIZE);
        }
        Ok(stdout)
    }

    fn parse_networks(raw: &[u8]) -> Result<Vec<HostNetwork>> {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        // ConvertTo-Json emits a bare object for a single result and an
        // array otherwise.
        let records: Vec<HnsNetworkRecord> = if text.starts_with('[') {
            serde_json::from_str(text)?
        } else {
            vec![serde_json::from_str(text)?]
        };
        Ok(records
            .into_iter()
            .map(HnsNetworkRecord::into_host_network)
            .collect())
    }
}

impl Default for HnsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkStore for HnsStore {
    async fn list_networks(&self) -> Result<Vec<HostNetwork>> {
        self.ensure_available()?;
        let out = self
            .ps_command("Get-HnsNetwork | ConvertTo-Json -Depth 8")
            .await?;
        Self::parse_networks(&out)
    }

    async fn get_network(&self, name: &str) -> Result<Option<HostNetwork>> {
        let networks = self.list_networks().await?;
        Ok(networks.into_iter().find(|n| name_matches(name, &n.name)))
    }

    async fn create_network(&self, network: &HostNetwork) -> Result<HostNetwork> {
        self.ensure_available()?;

        // The VXLAN data path is unusable until its UDP port is open, so
        // the firewall rule is part of the creation path.
        if network.kind == NetworkKind::Overlay {
            firewall::ensure_vxlan_rule().await?;
        }

        let mut policies = String::new();
        if let Some(vsid) = network.vsid {
            policies = format!(
                ", \"Policies\": [{{ \"Type\": \"VSID\", \"VSID\": {} }}]",
                vsid
            );
        }
        let payload = format!(
            "{{ \"Name\": \"{}\", \"Type\": \"{}\", \"Subnets\": [{{ \"AddressPrefix\": \"{}\", \"GatewayAddress\": \"{}\"{} }}] }}",
            network.name,
            network.kind.as_str(),
            network.subnet,
            network.gateway,
            policies
        );
        let script = format!(
            "New-HnsNetwork -JsonString '{}' | ConvertTo-Json -Depth 8",
            payload
        );

        let out = self.ps_command(&script).await.map_err(|e| {
            Error::NetworkCreateFailed {
                network: network.name.clone(),
                reason: e.to_string(),
            }
        })?;

        Self::parse_networks(&out)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NetworkCreateFailed {
                network: network.name.clone(),
                reason: "HNS returned no network record".to_string(),
            })
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        self.ensure_available()?;
        let script = format!(
            "Get-HnsNetwork | Where-Object Name -EQ '{}' | Remove-HnsNetwork",
            name
        );
        self.ps_command(&script).await.map_err(|e| Error::CleanupFailed {
            network: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
