//! Node configuration.
//!
//! [`NodeConfig`] is an immutable snapshot of node identity and desired
//! behavior, built exactly once at process start and passed read-only to
//! every component. There is no ambient global state: anything a component
//! needs, it receives explicitly.

use std::env;
use std::process::Command;
use std::time::Duration;

use serde::Serialize;

use crate::constants::{
    DEFAULT_AGENT_BINARY, DEFAULT_CNI_CONF_FILENAME, DEFAULT_IPAM_TYPE, DEFAULT_MAC_PREFIX,
    DEFAULT_STARTUP_TIMEOUT, DEFAULT_VXLAN_VNI,
};
use crate::error::{Error, Result};

// =============================================================================
// Networking Backend
// =============================================================================

/// Networking backend for pod traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkBackend {
    /// VXLAN overlay: pod traffic encapsulated in UDP tunnels.
    Overlay,
    /// Plain host-level L2 bridge, routes distributed externally.
    Bridge,
    /// L2 bridge with BGP route distribution via the host routing service.
    WindowsBgp,
}

impl NetworkBackend {
    /// Returns the wire name used in the CNI config and agent environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Bridge => "bridge",
            Self::WindowsBgp => "windows-bgp",
        }
    }

    /// Parses a backend name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "overlay" | "vxlan" => Some(Self::Overlay),
            "bridge" | "l2bridge" => Some(Self::Bridge),
            "windows-bgp" => Some(Self::WindowsBgp),
            _ => None,
        }
    }

    /// Returns true if this backend owns the exclusive pod network.
    ///
    /// Owning backends rebuild host network state from scratch on every
    /// node start; leftovers from a previous boot are untrustworthy.
    pub fn owns_exclusive_network(&self) -> bool {
        matches!(self, Self::Overlay | Self::WindowsBgp)
    }

    /// Returns true if pod traffic is VXLAN-encapsulated.
    pub fn is_vxlan(&self) -> bool {
        matches!(self, Self::Overlay)
    }
}

impl std::fmt::Display for NetworkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Config Sections
// =============================================================================

/// CNI plugin paths and IPAM selection.
#[derive(Debug, Clone, Serialize)]
pub struct CniSettings {
    /// Directory holding CNI plugin binaries.
    pub bin_dir: String,
    /// Directory the rendered config is written to. Empty disables the
    /// config render entirely.
    pub conf_dir: String,
    /// File name of the rendered config.
    pub conf_file_name: String,
    /// IPAM plugin selected by name.
    pub ipam_type: String,
}

/// Settings consumed by the policy-agent (felix) role.
#[derive(Debug, Clone, Serialize)]
pub struct FelixSettings {
    /// Metadata address handed to felix, or "none".
    pub metadata_addr: String,
    /// VXLAN segment id.
    pub vxlan_vni: u32,
    /// MAC prefix for generated endpoint MACs.
    pub mac_prefix: String,
}

// =============================================================================
// NodeConfig
// =============================================================================

/// Immutable snapshot of node identity and desired bootstrap behavior.
#[derive(Debug, Clone, Serialize)]
pub struct NodeConfig {
    /// Node hostname, also used as the Kubernetes node reference.
    pub hostname: String,
    /// Pod networking backend.
    pub backend: NetworkBackend,
    /// Kubernetes service CIDR.
    pub service_cidr: String,
    /// Comma-separated DNS nameservers for pods.
    pub dns_servers: String,
    /// DNS search domain for pods.
    pub dns_search: String,
    /// Datastore type ("kubernetes" or "etcdv3").
    pub datastore_type: String,
    /// Path to the kubeconfig used by the agents.
    pub kube_config: String,
    /// File the node agent writes its node name to.
    pub node_name_file: String,
    /// etcd connection details, empty for the kubernetes datastore.
    pub etcd_endpoints: String,
    pub etcd_key_file: String,
    pub etcd_cert_file: String,
    pub etcd_ca_cert_file: String,
    /// Directory for agent log files.
    pub log_dir: String,
    /// Log level handed to the CNI plugin ("info" unless overridden).
    pub log_level: String,
    /// Agent binary invoked for both supervised roles.
    pub agent_binary: String,
    /// CNI plugin settings.
    pub cni: CniSettings,
    /// Policy-agent settings.
    pub felix: FelixSettings,
    /// Shared deadline for the whole bootstrap. Must be non-zero.
    #[serde(skip)]
    pub startup_timeout: Duration,
}

impl NodeConfig {
    /// Builds the configuration from defaults plus environment overrides.
    ///
    /// Called once at process start; the result is shared read-only.
    pub fn load() -> Self {
        let hostname = detect_hostname();
        let backend = env::var("CALICO_NETWORKING_BACKEND")
            .ok()
            .and_then(|s| NetworkBackend::parse(&s))
            .unwrap_or(NetworkBackend::Overlay);

        let vxlan_vni = env::var("FELIX_VXLANVNI")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VXLAN_VNI);

        let startup_timeout = env::var("CALINIT_STARTUP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT);

        Self {
            hostname: hostname.clone(),
            backend,
            service_cidr: env_or("K8S_SERVICE_CIDR", "10.43.0.0/16"),
            dns_servers: env_or("DNS_NAME_SERVERS", "10.43.0.10"),
            dns_search: env_or("DNS_SEARCH", "svc.cluster.local"),
            datastore_type: env_or("CALICO_DATASTORE_TYPE", "kubernetes"),
            kube_config: env_or("KUBECONFIG", "c:\\etc\\kubernetes\\kubeconfig"),
            node_name_file: env_or("CALICO_NODENAME_FILE", "c:\\var\\lib\\calico\\nodename"),
            etcd_endpoints: env_or("ETCD_ENDPOINTS", ""),
            etcd_key_file: env_or("ETCD_KEY_FILE", ""),
            etcd_cert_file: env_or("ETCD_CERT_FILE", ""),
            etcd_ca_cert_file: env_or("ETCD_CA_CERT_FILE", ""),
            log_dir: env_or("CALICO_LOG_DIR", "c:\\var\\log\\calico"),
            log_level: env_or("CALICO_LOG_LEVEL", "info"),
            agent_binary: env_or("CALICO_NODE_BINARY", DEFAULT_AGENT_BINARY),
            cni: CniSettings {
                bin_dir: env_or("CNI_BIN_DIR", "c:\\opt\\cni\\bin"),
                conf_dir: env_or("CNI_CONF_DIR", "c:\\etc\\cni\\net.d"),
                conf_file_name: env_or("CNI_CONF_FILENAME", DEFAULT_CNI_CONF_FILENAME),
                ipam_type: env_or("CNI_IPAM_TYPE", DEFAULT_IPAM_TYPE),
            },
            felix: FelixSettings {
                metadata_addr: env_or("FELIX_METADATAADDR", "none"),
                vxlan_vni,
                mac_prefix: env_or("FELIX_MACPREFIX", DEFAULT_MAC_PREFIX),
            },
            startup_timeout,
        }
    }

    /// Validates that every field required before network or process
    /// operations is populated.
    ///
    /// An unbounded (zero) startup timeout is rejected: the creation retry
    /// and management-IP polling loops are bounded by it and nothing else.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(invalid("hostname", "could not be determined"));
        }
        if self.service_cidr.is_empty() {
            return Err(invalid("service_cidr", "must not be empty"));
        }
        if self.startup_timeout.is_zero() {
            return Err(invalid(
                "startup_timeout",
                "must be non-zero; retry loops are bounded by this deadline",
            ));
        }
        if self.agent_binary.is_empty() {
            return Err(invalid("agent_binary", "must not be empty"));
        }
        if self.cni.ipam_type.is_empty() {
            return Err(invalid("cni.ipam_type", "must not be empty"));
        }
        if self.datastore_type == "etcdv3" && self.etcd_endpoints.is_empty() {
            return Err(invalid(
                "etcd_endpoints",
                "required for the etcdv3 datastore",
            ));
        }
        Ok(())
    }

    /// Returns true if the selected IPAM derives pod addresses from the
    /// node's pod CIDR.
    pub fn use_pod_cidr(&self) -> bool {
        self.cni.ipam_type == crate::constants::HOST_LOCAL_IPAM
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::ConfigInvalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Determines the node hostname.
///
/// Prefers the `COMPUTERNAME` environment variable (always set on Windows),
/// then falls back to the `hostname` command.
fn detect_hostname() -> String {
    if let Ok(name) = env::var("COMPUTERNAME") {
        if !name.is_empty() {
            return name.to_lowercase();
        }
    }
    if let Ok(name) = env::var("HOSTNAME") {
        if !name.is_empty() {
            return name.to_lowercase();
        }
    }
    Command::new("hostname")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default()
}
