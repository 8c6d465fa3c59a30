//! # calinit - Windows Node Network Bootstrap
//!
//! One-shot binary run once per node (re)start, before the kubelet admits
//! any pod. It provisions the host virtual network for pod traffic, patches
//! the instance-metadata route on cloud platforms, renders the CNI config,
//! and then supervises the two networking agents until they exit or the
//! startup deadline fires.
//!
//! ## Usage
//!
//! ```sh
//! calinit [--backend overlay|bridge|windows-bgp] [--timeout <secs>] [--quiet]
//! ```
//!
//! All other settings come from the environment (`K8S_SERVICE_CIDR`,
//! `KUBECONFIG`, `CNI_CONF_DIR`, ...); flags override the corresponding
//! environment values.

use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use calinit::{bootstrap, HnsStore, HttpProbe, NetshRouteTable, NetworkBackend, NodeConfig};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
struct CliArgs {
    backend: Option<NetworkBackend>,
    timeout: Option<Duration>,
    quiet: bool,
    help: bool,
    version: bool,
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = CliArgs {
        backend: None,
        timeout: None,
        quiet: false,
        help: false,
        version: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--backend" | "-b" => {
                if i + 1 >= args.len() {
                    return Err("--backend requires a value".to_string());
                }
                parsed.backend = Some(
                    NetworkBackend::parse(&args[i + 1])
                        .ok_or_else(|| format!("unknown backend '{}'", args[i + 1]))?,
                );
                i += 2;
            }
            "--timeout" | "-t" => {
                if i + 1 >= args.len() {
                    return Err("--timeout requires seconds".to_string());
                }
                let secs: u64 = args[i + 1]
                    .parse()
                    .map_err(|_| format!("invalid timeout '{}'", args[i + 1]))?;
                parsed.timeout = Some(Duration::from_secs(secs));
                i += 2;
            }
            "--quiet" | "-q" => {
                parsed.quiet = true;
                i += 1;
            }
            "--help" | "-h" => {
                parsed.help = true;
                i += 1;
            }
            "--version" | "-V" => {
                parsed.version = true;
                i += 1;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(parsed)
}

fn print_help() {
    println!("calinit {} - Windows node network bootstrap", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    calinit [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -b, --backend <NAME>    networking backend: overlay, bridge, windows-bgp");
    println!("    -t, --timeout <SECS>    startup deadline in seconds");
    println!("    -q, --quiet             warnings and errors only");
    println!("    -h, --help              print this help");
    println!("    -V, --version           print the version");
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("try 'calinit --help'");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        println!("calinit {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let level = if args.quiet { Level::WARN } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to set tracing subscriber");
        return ExitCode::FAILURE;
    }

    let mut cfg = NodeConfig::load();
    if let Some(backend) = args.backend {
        cfg.backend = backend;
    }
    if let Some(timeout) = args.timeout {
        cfg.startup_timeout = timeout;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %cfg.hostname,
        backend = %cfg.backend,
        "calinit starting"
    );

    let store = HnsStore::new();
    if let Some(reason) = store.unavailable_reason() {
        error!("host network store unavailable: {}", reason);
        return ExitCode::FAILURE;
    }
    let probe = HttpProbe::new();

    match bootstrap::run(&cfg, &store, &probe, &NetshRouteTable).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bootstrap failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
