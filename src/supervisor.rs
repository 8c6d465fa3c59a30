//! Node-agent process supervision.
//!
//! Launches the two agent roles (node agent and policy agent) as
//! concurrent tasks under one shared cancellation deadline. The roles are
//! siblings, not a pipeline: both require the pod network to exist (the
//! orchestrator sequences that), but neither waits for the other.
//!
//! State machine per process:
//!
//! ```text
//! Pending -> EnvironmentPrepared -> Running -> Exited(code)
//!                    |                  \-> Killed        (deadline fired)
//!                    \-> LaunchFailed
//! ```
//!
//! There is no restart policy here. A process that exits stays exited;
//! restart/backoff belongs to the external process manager.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::constants::{
    CLUSTER_NETWORK_NAME, ENV_CNI_BIN_DIR, ENV_CNI_CONF_DIR, ENV_CNI_CONF_FILENAME,
    ENV_CNI_IPAM_TYPE, ENV_DATASTORE_TYPE, ENV_DNS_NAME_SERVERS, ENV_DNS_SEARCH,
    ENV_ETCD_ENDPOINTS, ENV_FELIX_HOSTNAME, ENV_FELIX_METADATA_ADDR, ENV_FELIX_VXLAN_VNI,
    ENV_KUBECONFIG, ENV_KUBE_NETWORK, ENV_LOG_DIR, ENV_NETWORKING_BACKEND, ENV_NODENAME_FILE,
    ENV_NODE_REF, ENV_SERVICE_CIDR, ENV_USE_POD_CIDR, TERMINATION_GRACE,
};
use crate::error::{Error, Result};

// =============================================================================
// Roles
// =============================================================================

/// Supervised agent role. Both roles invoke the same binary with a
/// different positional flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// One-shot/startup side of the agent (`-startup`).
    NodeAgent,
    /// Long-running policy daemon (`-felix`).
    PolicyAgent,
}

impl ProcessRole {
    /// Positional role flag passed to the agent binary.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::NodeAgent => "-startup",
            Self::PolicyAgent => "-felix",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAgent => "node-agent",
            Self::PolicyAgent => "policy-agent",
        }
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Process State
// =============================================================================

/// Terminal and intermediate states of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Not yet prepared.
    Pending,
    /// Environment assembled, not yet spawned.
    EnvironmentPrepared,
    /// Spawned and running.
    Running,
    /// Exited on its own with the given code.
    Exited(i32),
    /// Terminated because the shared deadline elapsed.
    Killed,
    /// Could not be spawned.
    LaunchFailed(String),
}

impl ProcessStatus {
    /// Returns true for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Killed | Self::LaunchFailed(_))
    }
}

/// Terminal outcome reported by each role's task.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub role: ProcessRole,
    pub status: ProcessStatus,
}

// =============================================================================
// Environment Assembly
// =============================================================================

/// Builds the environment for a role: the shared base set plus the role's
/// own overrides.
///
/// The pod-CIDR flag is derived, not configured: `host-local` IPAM means
/// addresses come from the node's pod CIDR.
pub fn build_environment(cfg: &NodeConfig, role: ProcessRole) -> Vec<(String, String)> {
    let mut env = vec![
        (ENV_KUBE_NETWORK.to_string(), CLUSTER_NETWORK_NAME.to_string()),
        (ENV_KUBECONFIG.to_string(), cfg.kube_config.clone()),
        (ENV_SERVICE_CIDR.to_string(), cfg.service_cidr.clone()),
        (
            ENV_NETWORKING_BACKEND.to_string(),
            cfg.backend.as_str().to_string(),
        ),
        (ENV_DATASTORE_TYPE.to_string(), cfg.datastore_type.clone()),
        (ENV_NODE_REF.to_string(), cfg.hostname.clone()),
        (ENV_LOG_DIR.to_string(), cfg.log_dir.clone()),
        (ENV_DNS_NAME_SERVERS.to_string(), cfg.dns_servers.clone()),
        (ENV_DNS_SEARCH.to_string(), cfg.dns_search.clone()),
        (ENV_CNI_BIN_DIR.to_string(), cfg.cni.bin_dir.clone()),
        (ENV_CNI_CONF_DIR.to_string(), cfg.cni.conf_dir.clone()),
        (
            ENV_CNI_CONF_FILENAME.to_string(),
            cfg.cni.conf_file_name.clone(),
        ),
        (ENV_CNI_IPAM_TYPE.to_string(), cfg.cni.ipam_type.clone()),
        (
            ENV_USE_POD_CIDR.to_string(),
            cfg.use_pod_cidr().to_string(),
        ),
    ];

    if !cfg.etcd_endpoints.is_empty() {
        env.push((ENV_ETCD_ENDPOINTS.to_string(), cfg.etcd_endpoints.clone()));
    }

    match role {
        ProcessRole::NodeAgent => {
            env.push((ENV_NODENAME_FILE.to_string(), cfg.node_name_file.clone()));
        }
        ProcessRole::PolicyAgent => {
            env.push((ENV_FELIX_HOSTNAME.to_string(), cfg.hostname.clone()));
            env.push((
                ENV_FELIX_VXLAN_VNI.to_string(),
                cfg.felix.vxlan_vni.to_string(),
            ));
            env.push((
                ENV_FELIX_METADATA_ADDR.to_string(),
                cfg.felix.metadata_addr.clone(),
            ));
        }
    }

    env
}

// =============================================================================
// Supervision
// =============================================================================

/// Runs a prepared command to completion under the shared deadline.
///
/// When the deadline fires, the child receives a termination signal and
/// must be reaped within [`TERMINATION_GRACE`]; either way the status is
/// `Killed`. Spawn failures never leave a process behind.
pub async fn supervise_command(
    mut cmd: Command,
    role: ProcessRole,
    deadline: Instant,
) -> ProcessStatus {
    // A deadline already in the past must abort before spawning.
    if Instant::now() >= deadline {
        warn!("{}: deadline elapsed before launch", role);
        return ProcessStatus::Killed;
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("{}: launch failed: {}", role, e);
            return ProcessStatus::LaunchFailed(e.to_string());
        }
    };
    debug!("{}: running (pid {:?})", role, child.id());

    tokio::select! {
        result = child.wait() => match result {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                info!("{}: exited with code {}", role, code);
                ProcessStatus::Exited(code)
            }
            Err(e) => {
                warn!("{}: wait failed: {}", role, e);
                ProcessStatus::LaunchFailed(e.to_string())
            }
        },
        _ = sleep_until(deadline) => {
            warn!("{}: deadline elapsed, terminating", role);
            if let Err(e) = child.start_kill() {
                warn!("{}: termination signal failed: {}", role, e);
            }
            match timeout(TERMINATION_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => warn!("{}: still running after termination grace", role),
            }
            ProcessStatus::Killed
        }
    }
}

/// Launches and supervises both agent roles concurrently.
pub struct ProcessSupervisor<'a> {
    cfg: &'a NodeConfig,
}

impl<'a> ProcessSupervisor<'a> {
    pub fn new(cfg: &'a NodeConfig) -> Self {
        Self { cfg }
    }

    /// Runs both roles to their terminal states, bounded by `deadline`.
    ///
    /// Returns one report per role. A launch failure in one role does not
    /// stop the other; only the shared deadline terminates a healthy role.
    pub async fn run(&self, deadline: Instant) -> Result<Vec<ProcessReport>> {
        let (tx, mut rx) = mpsc::channel::<ProcessReport>(2);

        for role in [ProcessRole::NodeAgent, ProcessRole::PolicyAgent] {
            let tx = tx.clone();
            let cfg = self.cfg.clone();
            tokio::spawn(async move {
                let status = run_role(&cfg, role, deadline).await;
                // Receiver only drops if the orchestrator is torn down.
                let _ = tx.send(ProcessReport { role, status }).await;
            });
        }
        drop(tx);

        let mut reports = Vec::with_capacity(2);
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Maps terminal reports to the orchestrator's error, if any.
    ///
    /// Deadline kills dominate; otherwise the first launch failure is
    /// surfaced for its role alone.
    pub fn fatal_outcome(&self, reports: &[ProcessReport]) -> Option<Error> {
        if reports.iter().any(|r| r.status == ProcessStatus::Killed) {
            return Some(Error::DeadlineExceeded {
                operation: "supervising node agents".to_string(),
                duration: self.cfg.startup_timeout,
            });
        }
        reports.iter().find_map(|r| match &r.status {
            ProcessStatus::LaunchFailed(reason) => Some(Error::LaunchFailed {
                role: r.role.to_string(),
                reason: reason.clone(),
            }),
            _ => None,
        })
    }
}

/// Prepares the environment and log files for a role, then supervises it.
async fn run_role(cfg: &NodeConfig, role: ProcessRole, deadline: Instant) -> ProcessStatus {
    let env = build_environment(cfg, role);
    debug!("{}: environment prepared ({} vars)", role, env.len());

    let mut cmd = Command::new(&cfg.agent_binary);
    cmd.arg(role.flag());
    cmd.envs(env);
    cmd.kill_on_drop(true);

    match open_log_files(&cfg.log_dir, role) {
        Ok((out, err)) => {
            cmd.stdout(Stdio::from(out));
            cmd.stderr(Stdio::from(err));
        }
        Err(e) => {
            // The agent writes its own logs too; losing ours is not worth
            // failing the role over.
            warn!("{}: could not open log files: {}", role, e);
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
    }

    supervise_command(cmd, role, deadline).await
}

fn open_log_files(log_dir: &str, role: ProcessRole) -> std::io::Result<(File, File)> {
    let dir = Path::new(log_dir);
    std::fs::create_dir_all(dir)?;
    let out = File::create(dir.join(format!("{}.log", role.as_str())))?;
    let err = File::create(dir.join(format!("{}.err.log", role.as_str())))?;
    Ok((out, err))
}
