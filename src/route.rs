//! Metadata-service routing.
//!
//! On EC2 and GCE the agents and pods must reach the link-local instance
//! metadata address; without an explicit host route that traffic silently
//! breaks once the pod network exists. Patching the route is therefore a
//! hard dependency of bootstrap on those platforms, not best-effort.
//!
//! The host route table is a side-effecting, externally-owned API, so it
//! sits behind the narrow [`RouteTable`] capability trait.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::constants::{HOST_COMMAND_TIMEOUT, METADATA_ADDRESS};
use crate::error::{Error, Result};

// =============================================================================
// RouteTable
// =============================================================================

/// Outbound route resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Interface index the flow would leave through.
    pub interface_index: u32,
    /// Next-hop gateway address ("0.0.0.0" for on-link).
    pub next_hop: String,
    /// Preferred source address on that interface.
    pub preferred_source: String,
}

/// Capability interface over the host route table.
#[async_trait]
pub trait RouteTable: Send + Sync {
    /// Resolves the route the host would use to reach `destination`.
    async fn resolve_outbound(&self, destination: &str) -> Result<ResolvedRoute>;

    /// Installs a host route (/32) for `destination` through `route`.
    async fn add_host_route(&self, destination: &str, route: &ResolvedRoute) -> Result<()>;
}

// =============================================================================
// RouteConfigurator
// =============================================================================

/// Forces instance-metadata traffic through the interface the host
/// currently uses to reach it.
///
/// `management_ip` is the address the pod network's management interface
/// was assigned; a value that does not parse means the network step handed
/// us garbage and is rejected up front.
pub async fn patch_metadata_route(table: &dyn RouteTable, management_ip: &str) -> Result<()> {
    let parsed: IpAddr = management_ip
        .parse()
        .map_err(|_| Error::InvalidAddress(management_ip.to_string()))?;
    debug!("patching metadata route, management IP {}", parsed);

    let route = table.resolve_outbound(METADATA_ADDRESS).await?;
    table.add_host_route(METADATA_ADDRESS, &route).await?;

    info!(
        "metadata route installed: {} via if{} gw {}",
        METADATA_ADDRESS, route.interface_index, route.next_hop
    );
    Ok(())
}

// =============================================================================
// NetshRouteTable (production implementation)
// =============================================================================

/// Route table driven through PowerShell / `route.exe`.
pub struct NetshRouteTable;

/// Shape of `Find-NetRoute | ConvertTo-Json` output (route half).
#[derive(Debug, Deserialize)]
struct NetRouteRecord {
    #[serde(rename = "InterfaceIndex", default)]
    interface_index: u32,
    #[serde(rename = "NextHop", default)]
    next_hop: String,
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl NetshRouteTable {
    async fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        debug!("{} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let output = timeout(HOST_COMMAND_TIMEOUT, cmd.output())
            .await
            .map_err(|_| Error::HostApi {
                command: program.to_string(),
                message: format!("timed out after {:?}", HOST_COMMAND_TIMEOUT),
            })?
            .map_err(|e| Error::HostApi {
                command: program.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::HostApi {
                command: program.to_string(),
                message: stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl RouteTable for NetshRouteTable {
    async fn resolve_outbound(&self, destination: &str) -> Result<ResolvedRoute> {
        let script = format!(
            "Find-NetRoute -RemoteIPAddress {} | ConvertTo-Json -Depth 4",
            destination
        );
        let out = self
            .run(
                "powershell.exe",
                &[
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    script,
                ],
            )
            .await
            .map_err(|e| Error::RouteResolutionFailed(e.to_string()))?;

        parse_find_net_route(&out)
    }

    async fn add_host_route(&self, destination: &str, route: &ResolvedRoute) -> Result<()> {
        let args = vec![
            "add".to_string(),
            destination.to_string(),
            "mask".to_string(),
            "255.255.255.255".to_string(),
            route.next_hop.clone(),
            "if".to_string(),
            route.interface_index.to_string(),
        ];
        self.run("route", &args)
            .await
            .map(|_| ())
            .map_err(|e| Error::RouteInstallFailed(e.to_string()))
    }
}

/// Parses Find-NetRoute output. The cmdlet emits an address object and a
/// route object; the route carries the interface index and next hop, the
/// address carries the preferred source.
fn parse_find_net_route(raw: &[u8]) -> Result<ResolvedRoute> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let records: Vec<NetRouteRecord> = if text.starts_with('[') {
        serde_json::from_str(text).map_err(|e| Error::RouteResolutionFailed(e.to_string()))?
    } else if text.is_empty() {
        Vec::new()
    } else {
        vec![serde_json::from_str(text)
            .map_err(|e| Error::RouteResolutionFailed(e.to_string()))?]
    };

    let interface_index = records
        .iter()
        .map(|r| r.interface_index)
        .find(|&idx| idx != 0)
        .ok_or_else(|| {
            Error::RouteResolutionFailed("no route record with an interface index".to_string())
        })?;
    let next_hop = records
        .iter()
        .map(|r| r.next_hop.as_str())
        .find(|nh| !nh.is_empty())
        .unwrap_or("0.0.0.0")
        .to_string();
    let preferred_source = records
        .iter()
        .map(|r| r.ip_address.as_str())
        .find(|ip| !ip.is_empty())
        .unwrap_or_default()
        .to_string();

    Ok(ResolvedRoute {
        interface_index,
        next_hop,
        preferred_source,
    })
}
