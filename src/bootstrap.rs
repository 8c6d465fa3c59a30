//! Bootstrap orchestration.
//!
//! The single entry point tying the components together, in a fixed order:
//!
//! ```text
//! validate config
//!   -> compute shared deadline
//!   -> detect platform
//!   -> ensure pod network (idempotent)
//!   -> patch metadata route        (EC2/GCE only)
//!   -> render CNI config           (skipped when unconfigured)
//!   -> supervise both agent roles
//! ```
//!
//! The ordering is load-bearing: the agents must not start before the pod
//! network exists, and the metadata route can only be derived from the
//! management IP the network step produced. Every bounded wait below shares
//! one deadline computed here.

use tokio::time::Instant;
use tracing::{info, warn};

use crate::cni;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::hns::NetworkStore;
use crate::network::NetworkLifecycleManager;
use crate::platform::{self, MetadataProbe};
use crate::route::{self, RouteTable};
use crate::supervisor::ProcessSupervisor;

/// Runs the full node network bootstrap.
///
/// Returns on the first fatal error, or after both supervised agents reach
/// a terminal state. Cleanup-class failures inside the steps are logged by
/// the steps themselves and do not surface here.
pub async fn run(
    cfg: &NodeConfig,
    store: &dyn NetworkStore,
    probe: &dyn MetadataProbe,
    routes: &dyn RouteTable,
) -> Result<()> {
    cfg.validate()?;
    let deadline = Instant::now() + cfg.startup_timeout;
    info!(
        "bootstrapping node '{}' ({} backend, {:?} budget)",
        cfg.hostname, cfg.backend, cfg.startup_timeout
    );

    let platform = platform::detect(store, probe).await;
    info!("platform: {}", platform);

    let manager = NetworkLifecycleManager::new(store);
    let management_ip = manager.ensure_external_network(cfg, deadline).await?;

    if platform.has_metadata_service() {
        route::patch_metadata_route(routes, &management_ip).await?;
    }

    match cni::write_config(cfg)? {
        Some(path) => info!("CNI config at {}", path.display()),
        None => warn!("CNI config rendering disabled"),
    }

    let supervisor = ProcessSupervisor::new(cfg);
    let reports = supervisor.run(deadline).await?;
    if let Some(err) = supervisor.fatal_outcome(&reports) {
        return Err(err);
    }

    info!("bootstrap complete, all agents exited");
    Ok(())
}
