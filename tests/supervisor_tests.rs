//! Tests for agent process supervision.
//!
//! Environment assembly is pure and tested everywhere; the process
//! lifecycle tests use real child processes and are unix-gated (the
//! supervised commands are stand-ins for the agent binary).

use std::time::Duration;

use tokio::time::Instant;

use calinit::supervisor::{build_environment, supervise_command, ProcessRole, ProcessStatus};
use calinit::{Error, NodeConfig, ProcessReport, ProcessSupervisor};

fn config() -> NodeConfig {
    let mut cfg = NodeConfig::load();
    cfg.hostname = "node-1".to_string();
    cfg.etcd_endpoints = String::new();
    cfg.cni.ipam_type = "calico-ipam".to_string();
    cfg
}

fn env_get<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
    env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

// =============================================================================
// Environment Assembly
// =============================================================================

#[test]
fn test_use_pod_cidr_follows_ipam_type() {
    let mut cfg = config();
    let env = build_environment(&cfg, ProcessRole::NodeAgent);
    assert_eq!(env_get(&env, "USE_POD_CIDR"), Some("false"));

    cfg.cni.ipam_type = "host-local".to_string();
    let env = build_environment(&cfg, ProcessRole::NodeAgent);
    assert_eq!(env_get(&env, "USE_POD_CIDR"), Some("true"));
}

#[test]
fn test_node_agent_environment_is_role_specific() {
    let cfg = config();
    let env = build_environment(&cfg, ProcessRole::NodeAgent);

    assert!(env_get(&env, "CALICO_NODENAME_FILE").is_some());
    assert_eq!(env_get(&env, "CALICO_K8S_NODE_REF"), Some("node-1"));
    assert!(env_get(&env, "FELIX_FELIXHOSTNAME").is_none());
    assert!(env_get(&env, "FELIX_VXLANVNI").is_none());
}

#[test]
fn test_policy_agent_environment_is_role_specific() {
    let cfg = config();
    let env = build_environment(&cfg, ProcessRole::PolicyAgent);

    assert_eq!(env_get(&env, "FELIX_FELIXHOSTNAME"), Some("node-1"));
    assert_eq!(
        env_get(&env, "FELIX_VXLANVNI"),
        Some(cfg.felix.vxlan_vni.to_string().as_str())
    );
    assert!(env_get(&env, "FELIX_METADATAADDR").is_some());
    assert!(env_get(&env, "CALICO_NODENAME_FILE").is_none());
}

#[test]
fn test_etcd_endpoints_only_present_when_configured() {
    let mut cfg = config();
    let env = build_environment(&cfg, ProcessRole::NodeAgent);
    assert!(env_get(&env, "ETCD_ENDPOINTS").is_none());

    cfg.etcd_endpoints = "https://etcd:2379".to_string();
    let env = build_environment(&cfg, ProcessRole::NodeAgent);
    assert_eq!(env_get(&env, "ETCD_ENDPOINTS"), Some("https://etcd:2379"));
}

#[test]
fn test_shared_base_environment_present_for_both_roles() {
    let cfg = config();
    for role in [ProcessRole::NodeAgent, ProcessRole::PolicyAgent] {
        let env = build_environment(&cfg, role);
        for key in [
            "KUBE_NETWORK",
            "KUBECONFIG",
            "K8S_SERVICE_CIDR",
            "CALICO_NETWORKING_BACKEND",
            "CALICO_DATASTORE_TYPE",
            "CALICO_LOG_DIR",
            "DNS_NAME_SERVERS",
            "DNS_SEARCH",
            "CNI_BIN_DIR",
            "CNI_CONF_DIR",
            "CNI_CONF_FILENAME",
            "CNI_IPAM_TYPE",
        ] {
            assert!(env_get(&env, key).is_some(), "{} missing for {}", key, role);
        }
        assert_eq!(env_get(&env, "KUBE_NETWORK"), Some("Calico"));
    }
}

// =============================================================================
// Process Lifecycle (unix stand-ins for the agent binary)
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_clean_exit_is_reported() {
    let cmd = tokio::process::Command::new("true");
    let deadline = Instant::now() + Duration::from_secs(30);
    let status = supervise_command(cmd, ProcessRole::NodeAgent, deadline).await;
    assert_eq!(status, ProcessStatus::Exited(0));
}

#[cfg(unix)]
#[tokio::test]
async fn test_nonzero_exit_code_is_preserved() {
    let cmd = tokio::process::Command::new("false");
    let deadline = Instant::now() + Duration::from_secs(30);
    let status = supervise_command(cmd, ProcessRole::NodeAgent, deadline).await;
    assert_eq!(status, ProcessStatus::Exited(1));
}

#[cfg(unix)]
#[tokio::test]
async fn test_deadline_kills_long_running_process() {
    let mut cmd = tokio::process::Command::new("sleep");
    cmd.arg("10");

    let started = Instant::now();
    let deadline = started + Duration::from_millis(100);
    let status = supervise_command(cmd, ProcessRole::PolicyAgent, deadline).await;

    assert_eq!(status, ProcessStatus::Killed);
    // Kill plus grace, nowhere near the sleep's own duration.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_binary_is_a_launch_failure() {
    let cmd = tokio::process::Command::new("/nonexistent/agent-binary");
    let deadline = Instant::now() + Duration::from_secs(30);
    let status = supervise_command(cmd, ProcessRole::NodeAgent, deadline).await;
    assert!(matches!(status, ProcessStatus::LaunchFailed(_)));
}

#[test]
fn test_killed_role_surfaces_as_deadline_exceeded() {
    let cfg = config();
    let supervisor = ProcessSupervisor::new(&cfg);
    let reports = vec![
        ProcessReport {
            role: ProcessRole::NodeAgent,
            status: ProcessStatus::Exited(0),
        },
        ProcessReport {
            role: ProcessRole::PolicyAgent,
            status: ProcessStatus::Killed,
        },
    ];
    let err = supervisor.fatal_outcome(&reports).unwrap();
    assert!(matches!(err, Error::DeadlineExceeded { .. }));
}

#[test]
fn test_clean_exits_have_no_fatal_outcome() {
    let cfg = config();
    let supervisor = ProcessSupervisor::new(&cfg);
    let reports = vec![
        ProcessReport {
            role: ProcessRole::NodeAgent,
            status: ProcessStatus::Exited(0),
        },
        ProcessReport {
            role: ProcessRole::PolicyAgent,
            status: ProcessStatus::Exited(0),
        },
    ];
    assert!(supervisor.fatal_outcome(&reports).is_none());
}

#[tokio::test]
async fn test_expired_deadline_prevents_launch() {
    let cmd = tokio::process::Command::new("/nonexistent/agent-binary");
    let deadline = Instant::now() - Duration::from_millis(1);
    let status = supervise_command(cmd, ProcessRole::NodeAgent, deadline).await;
    assert_eq!(status, ProcessStatus::Killed);
}
