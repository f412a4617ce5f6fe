//! beeftext daemon
//!
//! Grabs the keyboards and expands combos as they are typed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use beeftext_config::{paths, LogLevel, PreferencesStore};
use beeftext_daemon::clipboard::SystemClipboard;
use beeftext_daemon::combo_manager::ComboManager;
use beeftext_daemon::context::DaemonContext;
use beeftext_daemon::engine::Engine;
use beeftext_daemon::injector::{create_shared_virtual_device, VIRTUAL_DEVICE_NAME};
use beeftext_daemon::instance::InstanceLock;
use beeftext_daemon::ipc::{default_socket_path, handle_ipc_connection, runtime_path, IpcServer, LOCK_NAME};
use beeftext_daemon::{control, device, hook, logging};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
#[command(name = "beeftextd")]
#[command(about = "Text expansion daemon")]
#[command(version)]
struct Args {
    /// Path to the preferences file
    #[arg(short, long)]
    preferences: Option<String>,

    /// Log level, overriding the preferences
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Control socket path
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let prefs_path = match &args.preferences {
        Some(path) => paths::expand(path),
        None => paths::default_preferences_path(),
    };

    let mut store = match PreferencesStore::open(&prefs_path) {
        Ok(store) => store,
        Err(e) => {
            logging::setup_console_logging(args.log_level.unwrap_or_default());
            return Err(e).with_context(|| format!("Failed to read {}", prefs_path.display()));
        }
    };

    let level = args
        .log_level
        .unwrap_or(store.get().application.log_level);
    // Held until exit so buffered log lines are written
    let _log_guard = match logging::setup_logging(&paths::log_dir(), level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::setup_console_logging(level);
            tracing::warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    let _instance = InstanceLock::acquire(&runtime_path(LOCK_NAME))?;
    tracing::info!("beeftextd {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Preferences: {}", prefs_path.display());

    prepare_data_folder(&mut store)?;

    let prefs = store.get();
    let mut combos = ComboManager::from_preferences(&prefs);
    if let Err(e) = combos.load() {
        tracing::error!("Starting without combos: {}", e);
    }

    let ctx = Arc::new(DaemonContext::new(store, combos));
    let _hook = start_substitution(&ctx, &prefs.input.keyboards).await;

    let server = IpcServer::bind(args.socket.unwrap_or_else(default_socket_path))?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        let result = handle_ipc_connection(stream, |request| {
                            control::handle_request(&ctx, request)
                        })
                        .await;
                        if let Err(e) = result {
                            tracing::warn!("IPC connection failed: {:#}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("{:#}", e),
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate.recv() => break,
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}

/// Make sure the combo list folder exists, handle the pending file deletion
/// and first launch bookkeeping.
fn prepare_data_folder(store: &mut PreferencesStore) -> Result<()> {
    let folder = store.get().combo_list.folder.clone();
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create data folder {}", folder.display()))?;

    match store.take_file_marked_for_deletion() {
        Ok(Some(path)) => remove_marked_file(&path),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not clear the file marked for deletion: {}", e),
    }

    if !store.get().application.already_launched {
        tracing::info!(
            "First launch, combos are kept in {}",
            store.get().combo_list_path().display()
        );
        if let Err(e) = store.set_already_launched() {
            tracing::warn!("Could not record first launch: {}", e);
        }
    }
    Ok(())
}

fn remove_marked_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("File marked for deletion is already gone: {}", path.display())
        }
        Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Create the virtual keyboard, start the engine and grab the keyboards.
/// A failure leaves the daemon running with substitution disabled.
async fn start_substitution(ctx: &Arc<DaemonContext>, wanted: &[String]) -> Option<hook::HookHandle> {
    let synth = match create_shared_virtual_device(VIRTUAL_DEVICE_NAME) {
        Ok(synth) => synth,
        Err(e) => {
            ctx.set_hook_failed(&e);
            return None;
        }
    };

    let (engine, events) = Engine::new(
        synth,
        Arc::new(SystemClipboard::new()),
        ctx.subscribe_combos(),
        ctx.subscribe_preferences(),
        ctx.enabled_flag(),
        ctx.stats(),
    );
    tokio::spawn(engine.run());

    let installed = match device::find_keyboards(wanted) {
        Ok(keyboards) => hook::install(keyboards, events).await,
        Err(e) => Err(e),
    };
    match installed {
        Ok(handle) => {
            let names = handle.devices().iter().map(|d| d.name.clone()).collect();
            ctx.set_hook_installed(names);
            Some(handle)
        }
        Err(e) => {
            ctx.set_hook_failed(&e);
            None
        }
    }
}
