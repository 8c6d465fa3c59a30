//! CNI configuration rendering.
//!
//! Pure templating: sixteen placeholder sites in a fixed JSON document,
//! each substituted exactly and unconditionally from [`NodeConfig`]. The
//! artifact is consumed by the CNI runtime; leaving any `__...__` marker
//! unresolved is a correctness bug the tests guard against.
//!
//! The write is atomic (temp file in the target directory, then rename) so
//! the CNI runtime never observes a half-written config.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::Result;

/// Fixed CNI conflist template.
///
/// The IPAM subnet is the literal `usePodCidr`: it is resolved by the CNI
/// plugin at ADD time, not by this renderer.
const CNI_CONF_TEMPLATE: &str = r#"{
  "name": "Calico",
  "windows_use_single_network": true,

  "cniVersion": "0.3.1",
  "type": "calico",
  "mode": "__MODE__",

  "vxlan_mac_prefix": "__MAC_PREFIX__",
  "vxlan_vni": __VNI__,

  "policy": {
    "type": "k8s"
  },

  "log_level": "__LOG_LEVEL__",

  "capabilities": {"dns": true},

  "DNS": {
    "Nameservers": [__DNS_NAME_SERVERS__],
    "Search": [
      "__DNS_SEARCH__"
    ]
  },

  "nodename_file": "__NODENAME_FILE__",

  "datastore_type": "__DATASTORE_TYPE__",

  "etcd_endpoints": "__ETCD_ENDPOINTS__",
  "etcd_key_file": "__ETCD_KEY_FILE__",
  "etcd_cert_file": "__ETCD_CERT_FILE__",
  "etcd_ca_cert_file": "__ETCD_CA_CERT_FILE__",

  "kubernetes": {
    "kubeconfig": "__KUBECONFIG__"
  },

  "ipam": {
    "type": "__IPAM_TYPE__",
    "subnet": "usePodCidr"
  },

  "policies": [
    {
      "Name": "EndpointPolicy",
      "Value": {
        "Type": "OutBoundNAT",
        "ExceptionList": [
          "__K8S_SERVICE_CIDR__"
        ]
      }
    },
    {
      "Name": "EndpointPolicy",
      "Value": {
        "Type": "SDNROUTE",
        "DestinationPrefix": "__K8S_SERVICE_CIDR__",
        "NeedEncap": true
      }
    }
  ]
}
"#;

/// Renders the CNI document for this node. Pure; no filesystem access.
///
/// Every placeholder occurrence is substituted (the service CIDR appears
/// twice, in the NAT exception list and the encap route policy).
pub fn render(cfg: &NodeConfig) -> String {
    let dns_servers = cfg
        .dns_servers
        .split(',')
        .map(|s| format!("\"{}\"", s.trim()))
        .collect::<Vec<_>>()
        .join(", ");

    CNI_CONF_TEMPLATE
        .replace("__MODE__", cfg.backend.as_str())
        .replace("__LOG_LEVEL__", &cfg.log_level)
        .replace("__MAC_PREFIX__", &cfg.felix.mac_prefix)
        .replace("__VNI__", &cfg.felix.vxlan_vni.to_string())
        .replace("__DNS_NAME_SERVERS__", &dns_servers)
        .replace("__DNS_SEARCH__", &cfg.dns_search)
        .replace("__NODENAME_FILE__", &escape(&cfg.node_name_file))
        .replace("__DATASTORE_TYPE__", &cfg.datastore_type)
        .replace("__ETCD_ENDPOINTS__", &cfg.etcd_endpoints)
        .replace("__ETCD_KEY_FILE__", &escape(&cfg.etcd_key_file))
        .replace("__ETCD_CERT_FILE__", &escape(&cfg.etcd_cert_file))
        .replace("__ETCD_CA_CERT_FILE__", &escape(&cfg.etcd_ca_cert_file))
        .replace("__KUBECONFIG__", &escape(&cfg.kube_config))
        .replace("__IPAM_TYPE__", &cfg.cni.ipam_type)
        .replace("__K8S_SERVICE_CIDR__", &cfg.service_cidr)
}

/// Writes the rendered config atomically into the configured directory.
///
/// Returns `Ok(None)` without touching the filesystem when no output
/// directory is configured; rendering is optional glue, not a bootstrap
/// precondition.
pub fn write_config(cfg: &NodeConfig) -> Result<Option<PathBuf>> {
    if cfg.cni.conf_dir.is_empty() {
        debug!("no CNI conf directory configured, skipping render");
        return Ok(None);
    }

    let rendered = render(cfg);
    let dir = PathBuf::from(&cfg.cni.conf_dir);
    fs::create_dir_all(&dir)?;

    let path = dir.join(&cfg.cni.conf_file_name);
    let temp_path = dir.join(format!("{}.tmp", cfg.cni.conf_file_name));

    // Temp file and target are on the same filesystem, so the rename is
    // atomic; a failed write never clobbers an existing config.
    fs::write(&temp_path, rendered.as_bytes())?;
    if let Err(e) = fs::rename(&temp_path, &path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    info!("wrote CNI config to {}", path.display());
    Ok(Some(path))
}

/// Escapes Windows path backslashes for embedding in JSON.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_has_sixteen_placeholder_sites() {
        let count = CNI_CONF_TEMPLATE.matches("__").count();
        // Each site is wrapped in a leading and trailing marker.
        assert_eq!(count / 2, 16);
    }

    #[test]
    fn test_rendered_document_is_valid_json() {
        let cfg = NodeConfig::load();
        let rendered = render(&cfg);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["name"], "Calico");
        assert_eq!(parsed["ipam"]["subnet"], "usePodCidr");
    }

    #[test]
    fn test_multiple_dns_servers_are_quoted() {
        let mut cfg = NodeConfig::load();
        cfg.dns_servers = "10.43.0.10,10.43.0.11".to_string();
        let rendered = render(&cfg);
        assert!(rendered.contains("\"10.43.0.10\", \"10.43.0.11\""));
    }
}
