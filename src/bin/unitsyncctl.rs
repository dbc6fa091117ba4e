//! unitsyncctl - synchronize and control package service units
//!
//! Reads a JSON manifest (the serialized form of a `PackageServices` list)
//! and drives reconciliation and lifecycle operations against the local
//! systemd. This host has no user-session agent, so user-scoped services in
//! the manifest are skipped with a warning.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use unitsync::control::{SystemctlManager, UnavailableSessions};
use unitsync::manager::{
    EnsureOptions, RestartServicesOptions, ScopeOptions, ServiceScope, StartServicesOptions,
    StopServicesOptions, UnitChange,
};
use unitsync::units::{DaemonScope, PackageServices, ServiceDescriptor, StopReason};
use unitsync::ServiceManager;

#[derive(Parser)]
#[command(name = "unitsyncctl")]
#[command(about = "Synchronize and control package service units")]
struct Args {
    /// Path to the JSON service manifest
    #[arg(short, long)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write or refresh the unit files for all packages in the manifest
    Sync {
        /// Preseeding mode: write unit files but skip daemon reloads
        #[arg(long)]
        preseeding: bool,

        /// Generated units depend on the base tooling mount
        #[arg(long)]
        require_mounted_tooling: bool,

        /// Only process this service (pkg.svc); can be repeated
        #[arg(long = "service")]
        services: Vec<String>,
    },

    /// Start the manifest's services
    Start {
        /// Also enable the services for boot start
        #[arg(long)]
        enable: bool,
    },

    /// Stop the manifest's services
    Stop {
        /// Also disable the services
        #[arg(long)]
        disable: bool,
    },

    /// Restart the manifest's active services
    Restart {
        /// Reload service definitions where supported instead of restarting
        #[arg(long)]
        reload: bool,

        /// Also restart services that are enabled but inactive
        #[arg(long)]
        all_enabled: bool,
    },

    /// List services that are currently disabled
    Disabled,

    /// Disable and remove the unit files of one package
    Remove {
        /// Package instance name
        package: String,
    },
}

fn system_scope() -> ScopeOptions {
    ScopeOptions {
        scope: ServiceScope::System,
        users: vec![],
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(&args.manifest)?;
    let mut manifest: Vec<PackageServices> = serde_json::from_str(&raw)?;

    // no session agent here to relay user-scope operations
    for entry in &mut manifest {
        let before = entry.package.services.len();
        entry
            .package
            .services
            .retain(|svc| svc.scope == DaemonScope::System);
        let dropped = before - entry.package.services.len();
        if dropped > 0 {
            log::warn!(
                "skipping {} user service(s) of package {}",
                dropped,
                entry.package.instance_name
            );
        }
    }

    let services: Vec<ServiceDescriptor> = manifest
        .iter()
        .flat_map(|entry| entry.package.services.iter().cloned())
        .collect();

    let manager = ServiceManager::new(
        SystemctlManager::system(),
        SystemctlManager::user_global(),
        UnavailableSessions,
    );

    match args.command {
        Command::Sync {
            preseeding,
            require_mounted_tooling,
            services: include_services,
        } => {
            let opts = EnsureOptions {
                preseeding,
                require_mounted_tooling,
                include_services,
            };
            let mut changed = 0usize;
            manager
                .ensure_services(&manifest, &opts, Some(&mut |_: &UnitChange| changed += 1))
                .await?;
            println!("Synchronized {} unit file(s)", changed);
        }

        Command::Start { enable } => {
            let disabled = manager.query_disabled_services(&services).await?;
            let opts = StartServicesOptions {
                enable,
                scope: system_scope(),
            };
            manager
                .start_services(&services, Some(&disabled), &opts)
                .await?;
            println!("Started {} service(s)", services.len());
        }

        Command::Stop { disable } => {
            let opts = StopServicesOptions {
                disable,
                scope: system_scope(),
            };
            manager
                .stop_services(&services, StopReason::Other, &opts)
                .await?;
            println!("Stopped {} service(s)", services.len());
        }

        Command::Restart {
            reload,
            all_enabled,
        } => {
            let opts = RestartServicesOptions {
                reload,
                also_enabled_non_active: all_enabled,
                scope: system_scope(),
            };
            manager.restart_services(&services, &[], &opts).await?;
            println!("Restarted active service(s)");
        }

        Command::Disabled => {
            let disabled = manager.query_disabled_services(&services).await?;
            if disabled.system.is_empty() {
                println!("No disabled services");
            } else {
                for name in &disabled.system {
                    println!("{}", name);
                }
            }
        }

        Command::Remove { package } => {
            let entry = manifest
                .iter()
                .find(|e| e.package.instance_name == package)
                .ok_or_else(|| format!("package {:?} not in manifest", package))?;
            manager.remove_services(&entry.package).await?;
            println!("Removed services of {}", package);
        }
    }

    Ok(())
}
