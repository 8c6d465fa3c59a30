//! # Bootstrap Constants
//!
//! Defines the timeouts, fixed network parameters, and environment-variable
//! names used across the bootstrap sequence. These constants are the
//! **single source of truth** for every bound in the codebase.
//!
//! ## Cross-References
//!
//! - [`crate::platform`]: Uses probe endpoints and `PROBE_TIMEOUT`
//! - [`crate::network`]: Uses the External network parameters and retry bounds
//! - [`crate::route`]: Uses `METADATA_ADDRESS`
//! - [`crate::supervisor`]: Uses the environment-variable contract

use std::time::Duration;

// =============================================================================
// Network Identity
// =============================================================================

/// Name of the host virtual network that carries pod traffic.
///
/// At most one network with this name may exist; the lifecycle manager
/// rebuilds it on every node start.
pub const EXTERNAL_NETWORK_NAME: &str = "External";

/// The platform-reserved default network that must never be deleted.
pub const NAT_NETWORK_NAME: &str = "nat";

/// Cluster network name handed to the node agents via `KUBE_NETWORK`.
pub const CLUSTER_NETWORK_NAME: &str = "Calico";

/// Fixed subnet for the External network.
///
/// A /30 is deliberate: the network only needs its management interface,
/// pod subnets are allocated by IPAM downstream.
pub const EXTERNAL_SUBNET: &str = "192.168.255.0/30";

/// Gateway address inside [`EXTERNAL_SUBNET`].
pub const EXTERNAL_GATEWAY: &str = "192.168.255.1";

/// UDP port carrying VXLAN-encapsulated pod traffic.
pub const VXLAN_UDP_PORT: u16 = 4789;

/// Firewall rule name opening [`VXLAN_UDP_PORT`].
pub const VXLAN_FIREWALL_RULE: &str = "OverlayTraffic4789UDP";

// =============================================================================
// Metadata Endpoints
// =============================================================================

/// Link-local instance-metadata service address (EC2 and GCE).
pub const METADATA_ADDRESS: &str = "169.254.169.254";

/// EC2 metadata probe URL.
pub const EC2_METADATA_URL: &str = "http://169.254.169.254/latest/meta-data/local-hostname";

/// GCE metadata probe URL. Requires the `Metadata-Flavor: Google` header.
pub const GCE_METADATA_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/hostname";

/// Header identifying the caller to the GCE metadata service.
pub const GCE_METADATA_HEADER: (&str, &str) = ("Metadata-Flavor", "Google");

/// Managed-network name present on AKS nodes.
pub const AKS_NETWORK_NAME: &str = "azure";

/// Managed-network name pattern present on EKS nodes.
pub const EKS_NETWORK_NAME: &str = "vpcbr*";

// =============================================================================
// Timeouts and Retry Bounds
// =============================================================================
//
// Probe timeouts are short so a slow or absent cloud endpoint cannot stall
// detection; everything else is bounded by the shared startup deadline.
// =============================================================================

/// Per-probe timeout for metadata HTTP requests.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Backoff between network-creation attempts.
pub const CREATE_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between management-IP polls.
pub const MANAGEMENT_IP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Overall startup deadline shared by every bootstrap step and both
/// supervised agents. Overridable via config.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period between asking a supervised process to terminate and
/// reporting it killed.
pub const TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// Timeout for individual host shell invocations (HNS queries, netsh,
/// route table mutations, service restarts).
pub const HOST_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum captured output from a host shell invocation (1 MiB).
pub const MAX_HOST_OUTPUT_SIZE: usize = 1024 * 1024;

// =============================================================================
// Agent Environment Contract
// =============================================================================
//
// The node-agent and policy-agent processes are two invocations of the same
// binary, configured entirely through these variables plus a role flag.
// =============================================================================

pub const ENV_KUBE_NETWORK: &str = "KUBE_NETWORK";
pub const ENV_KUBECONFIG: &str = "KUBECONFIG";
pub const ENV_SERVICE_CIDR: &str = "K8S_SERVICE_CIDR";
pub const ENV_NETWORKING_BACKEND: &str = "CALICO_NETWORKING_BACKEND";
pub const ENV_DATASTORE_TYPE: &str = "CALICO_DATASTORE_TYPE";
pub const ENV_NODE_REF: &str = "CALICO_K8S_NODE_REF";
pub const ENV_LOG_DIR: &str = "CALICO_LOG_DIR";
pub const ENV_DNS_NAME_SERVERS: &str = "DNS_NAME_SERVERS";
pub const ENV_DNS_SEARCH: &str = "DNS_SEARCH";
pub const ENV_CNI_BIN_DIR: &str = "CNI_BIN_DIR";
pub const ENV_CNI_CONF_DIR: &str = "CNI_CONF_DIR";
pub const ENV_CNI_CONF_FILENAME: &str = "CNI_CONF_FILENAME";
pub const ENV_CNI_IPAM_TYPE: &str = "CNI_IPAM_TYPE";
pub const ENV_USE_POD_CIDR: &str = "USE_POD_CIDR";
pub const ENV_ETCD_ENDPOINTS: &str = "ETCD_ENDPOINTS";

/// Node-agent role only.
pub const ENV_NODENAME_FILE: &str = "CALICO_NODENAME_FILE";

/// Policy-agent role only.
pub const ENV_FELIX_HOSTNAME: &str = "FELIX_FELIXHOSTNAME";
pub const ENV_FELIX_VXLAN_VNI: &str = "FELIX_VXLANVNI";
pub const ENV_FELIX_METADATA_ADDR: &str = "FELIX_METADATAADDR";

// =============================================================================
// Defaults
// =============================================================================

/// IPAM type that implies pod-CIDR derived addressing.
pub const HOST_LOCAL_IPAM: &str = "host-local";

/// Default IPAM plugin.
pub const DEFAULT_IPAM_TYPE: &str = "calico-ipam";

/// Default VXLAN segment id.
pub const DEFAULT_VXLAN_VNI: u32 = 4096;

/// Default MAC prefix for VXLAN-generated endpoint MACs.
pub const DEFAULT_MAC_PREFIX: &str = "0E-2A";

/// Default agent binary invoked for both roles.
pub const DEFAULT_AGENT_BINARY: &str = "calico-node.exe";

/// Default rendered CNI configuration file name.
pub const DEFAULT_CNI_CONF_FILENAME: &str = "10-calico.conf";

/// Host routing service restarted for the BGP backend.
pub const ROUTING_SERVICE_NAME: &str = "RemoteAccess";
