//! Host firewall rule for VXLAN traffic.
//!
//! Overlay pod traffic rides UDP 4789; the rule opening that port is
//! installed as part of network creation. One `netsh advfirewall`
//! invocation, success/failure only, no payload.

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::constants::{HOST_COMMAND_TIMEOUT, VXLAN_FIREWALL_RULE, VXLAN_UDP_PORT};
use crate::error::{Error, Result};

/// Arguments for the rule-creation invocation.
///
/// Split out so the command shape is testable without touching the host.
pub fn vxlan_rule_args() -> Vec<String> {
    vec![
        "advfirewall".to_string(),
        "firewall".to_string(),
        "add".to_string(),
        "rule".to_string(),
        format!("name={}", VXLAN_FIREWALL_RULE),
        "dir=in".to_string(),
        "action=allow".to_string(),
        "protocol=UDP".to_string(),
        format!("localport={}", VXLAN_UDP_PORT),
    ]
}

/// Installs the VXLAN UDP rule. Idempotent from the caller's perspective:
/// re-adding an existing rule is accepted by the firewall.
pub async fn ensure_vxlan_rule() -> Result<()> {
    let args = vxlan_rule_args();
    debug!("netsh {}", args.join(" "));

    let mut cmd = Command::new("netsh");
    cmd.args(&args);
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::piped());

    let output = timeout(HOST_COMMAND_TIMEOUT, cmd.output())
        .await
        .map_err(|_| Error::HostApi {
            command: "netsh advfirewall".to_string(),
            message: format!("timed out after {:?}", HOST_COMMAND_TIMEOUT),
        })?
        .map_err(|e| Error::HostApi {
            command: "netsh advfirewall".to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::HostApi {
            command: "netsh advfirewall".to_string(),
            message: stderr.trim().to_string(),
        });
    }
    Ok(())
}
