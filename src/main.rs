use berth::configuration::{Command, CommandLine, Config, StorageBackend};
use berth::container_management::{DockerRuntime, LifecycleReconciler, PortAllocator};
use berth::storage::{ContainerStore, DatabaseStorage, MemoryStorage, NewUser};
use berth::web_interface::WebServer;
use berth::ContainerService;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;

fn exit_with(message: &str) -> ! {
    error!("{}, exiting...", message);
    std::process::exit(1);
}

async fn open_store(config: &Config) -> Arc<dyn ContainerStore> {
    let store: Arc<dyn ContainerStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            match DatabaseStorage::connect(&config.storage.database_path).await {
                Ok(storage) => Arc::new(storage),
                Err(e) => exit_with(&format!("Unable to open the database: {}", e)),
            }
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; records are lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };
    store
}

#[tokio::main]
async fn main() {
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    let args = CommandLine::parse();

    info!("Importing configuration from {}", args.config_file.display());
    let config = match Config::from_file(&args.config_file) {
        Ok(c) => c,
        Err(e) => exit_with(&format!("Unable to import configuration from file: {}", e)),
    };
    info!("Configuration imported successfully");

    let store = open_store(&config).await;

    if let Some(Command::AddUser {
        username,
        email,
        password_hash,
    }) = args.command
    {
        let user = NewUser {
            username,
            email,
            password_hash,
        };
        match store.ensure_user(user).await {
            Ok(user) => info!("User {} has id {}", user.username, user.id),
            Err(e) => exit_with(&format!("Unable to create user: {}", e)),
        }
        return;
    }

    let runtime = match DockerRuntime::connect(&config.runtime) {
        Ok(r) => Arc::new(r),
        Err(e) => exit_with(&format!("Unable to set up the Docker client: {}", e)),
    };
    let reconciler = match LifecycleReconciler::connect(runtime, (&config.runtime).into()).await {
        Ok(r) => Arc::new(r),
        Err(e) => exit_with(&format!("Container runtime unavailable: {}", e)),
    };

    let service = Arc::new(ContainerService::new(
        store,
        reconciler,
        PortAllocator::new(config.ports),
        config.server.public_host.clone(),
    ));
    if let Err(e) = service.reclaim_reservations().await {
        exit_with(&format!("Unable to reclaim stale reservations: {}", e));
    }

    let server = match WebServer::new(service, &config.server) {
        Ok(s) => s,
        Err(e) => exit_with(&format!("Unable to configure the web server: {}", e)),
    };

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                exit_with(&format!("Web server stopped: {}", e));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }
}
