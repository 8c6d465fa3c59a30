//! Platform detection.
//!
//! Classifies the hosting environment so the bootstrap can decide whether
//! the node sits behind an instance-metadata service. Detection is a pure
//! query: the only side effects are best-effort network probes, each with
//! its own short timeout, and every probe failure means "not this
//! platform" rather than an error. Worst case the answer is bare metal.
//!
//! The probe order matters. Managed-network lookups are fast local calls
//! and run first; the metadata HTTP probes can stall up to their timeout
//! and run last.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::constants::{
    AKS_NETWORK_NAME, EC2_METADATA_URL, EKS_NETWORK_NAME, GCE_METADATA_HEADER, GCE_METADATA_URL,
    PROBE_TIMEOUT,
};
use crate::hns::NetworkStore;

// =============================================================================
// PlatformKind
// =============================================================================

/// Detected hosting platform.
///
/// Derived, never stored persistently; recomputed on each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    /// Azure Kubernetes Service.
    Aks,
    /// Amazon Elastic Kubernetes Service.
    Eks,
    /// Plain EC2 instance.
    Ec2,
    /// Google Compute Engine instance.
    Gce,
    /// No cloud environment detected.
    BareMetal,
}

impl PlatformKind {
    /// Returns true if the platform exposes the link-local instance
    /// metadata service that pod traffic must be routed to.
    pub fn has_metadata_service(&self) -> bool {
        matches!(self, Self::Ec2 | Self::Gce)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aks => "aks",
            Self::Eks => "eks",
            Self::Ec2 => "ec2",
            Self::Gce => "gce",
            Self::BareMetal => "bare-metal",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// MetadataProbe
// =============================================================================

/// Capability interface for metadata-endpoint probes.
///
/// Returns `true` when the endpoint answered at all; status semantics are
/// irrelevant, reachability is the classification signal.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Issues one GET, optionally with an identifying header.
    async fn reachable(&self, url: &str, header: Option<(&str, &str)>) -> bool;
}

/// HTTP probe bounded by [`PROBE_TIMEOUT`] per request.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        // Client construction only fails on TLS backend misconfiguration;
        // with no TLS features enabled the default build cannot fail.
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProbe for HttpProbe {
    async fn reachable(&self, url: &str, header: Option<(&str, &str)>) -> bool {
        let mut req = self.client.get(url);
        if let Some((name, value)) = header {
            req = req.header(name, value);
        }
        match req.send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("metadata probe {} failed: {}", url, e);
                false
            }
        }
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Classifies the hosting platform. Never fails; probes that error or time
/// out are treated as "not this platform".
pub async fn detect(store: &dyn NetworkStore, probe: &dyn MetadataProbe) -> PlatformKind {
    // Managed offerings leave a well-known network on the host.
    if managed_network_present(store, AKS_NETWORK_NAME).await {
        return PlatformKind::Aks;
    }
    if managed_network_present(store, EKS_NETWORK_NAME).await {
        return PlatformKind::Eks;
    }

    if probe.reachable(EC2_METADATA_URL, None).await {
        return PlatformKind::Ec2;
    }
    if probe.reachable(GCE_METADATA_URL, Some(GCE_METADATA_HEADER)).await {
        return PlatformKind::Gce;
    }

    PlatformKind::BareMetal
}

async fn managed_network_present(store: &dyn NetworkStore, name: &str) -> bool {
    match store.get_network(name).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            debug!("managed-network lookup '{}' failed: {}", name, e);
            false
        }
    }
}
