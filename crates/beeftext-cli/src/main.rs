//! beeftext CLI
//!
//! Checks the preferences and combo list, and steers the running daemon.

use std::path::{Path, PathBuf};

use beeftext_config::{
    generate_preferences, load_combo_list, parse_combo_list, parse_preferences, paths,
    save_combo_list, PreferencesStore, PREFERENCE_KEYS,
};
use beeftext_daemon::device::enumerate_devices;
use beeftext_daemon::ipc::{default_socket_path, send_request, DaemonStatus, IpcRequest, IpcResponse};
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(name = "beeftext")]
#[command(about = "Text expansion: combo list and daemon control")]
#[command(version)]
struct Cli {
    /// Path to the preferences file
    #[arg(short, long, global = true)]
    preferences: Option<String>,

    /// Daemon control socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the preferences file and the combo list
    Validate,

    /// List available input devices
    Devices,

    /// Show current daemon status
    Status,

    /// Turn substitution on
    Enable,

    /// Turn substitution off
    Disable,

    /// Make the daemon reload preferences and combos
    Reload,

    /// List the combos known to the daemon
    Combos,

    /// Enable or disable a combo
    Combo {
        #[command(subcommand)]
        action: Toggle,
    },

    /// Enable or disable a group of combos
    Group {
        #[command(subcommand)]
        action: Toggle,
    },

    /// Show or edit preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Write a copy of the combo list
    Export {
        /// Destination (defaults to the last export location)
        path: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum Toggle {
    Enable { id: String },
    Disable { id: String },
}

impl Toggle {
    fn into_parts(self) -> (String, bool) {
        match self {
            Toggle::Enable { id } => (id, true),
            Toggle::Disable { id } => (id, false),
        }
    }
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
    /// Print the preferences as KDL
    Show,
    /// Set one preference, e.g. `substitution.use-clipboard false`
    Set { key: String, value: String },
    /// Restore the defaults
    Reset,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let prefs_path = match &cli.preferences {
        Some(path) => paths::expand(path),
        None => paths::default_preferences_path(),
    };
    let socket = cli.socket.unwrap_or_else(default_socket_path);

    match cli.command {
        Commands::Validate => cmd_validate(&prefs_path),
        Commands::Devices => cmd_devices(),
        Commands::Status => cmd_status(&socket).await,
        Commands::Enable => cmd_simple(&socket, IpcRequest::Enable).await,
        Commands::Disable => cmd_simple(&socket, IpcRequest::Disable).await,
        Commands::Reload => cmd_simple(&socket, IpcRequest::Reload).await,
        Commands::Combos => cmd_combos(&socket).await,
        Commands::Combo { action } => {
            let (id, enabled) = action.into_parts();
            cmd_simple(&socket, IpcRequest::SetComboEnabled { id, enabled }).await
        }
        Commands::Group { action } => {
            let (id, enabled) = action.into_parts();
            cmd_simple(&socket, IpcRequest::SetGroupEnabled { id, enabled }).await
        }
        Commands::Prefs { action } => cmd_prefs(&prefs_path, action),
        Commands::Export { path } => cmd_export(&prefs_path, path),
    }
}

fn cmd_validate(prefs_path: &Path) -> miette::Result<()> {
    println!("Validating preferences: {}", prefs_path.display());
    let prefs = parse_preferences(prefs_path)?;
    println!("Preferences are valid!");
    println!(
        "  Substitution: {}, {}",
        if prefs.substitution.automatic { "automatic" } else { "on shortcut only" },
        if prefs.substitution.use_clipboard { "pasted" } else { "typed" }
    );
    println!("  Trigger shortcut: {}", prefs.substitution.trigger_shortcut);

    let list_path = prefs.combo_list_path();
    println!("\nValidating combo list: {}", list_path.display());
    match std::fs::read_to_string(&list_path) {
        Ok(content) => {
            let list = parse_combo_list(&content, &list_path)?;
            println!("Combo list is valid!");
            println!("  Groups: {}", list.groups.len());
            println!(
                "  Combos: {} ({} active)",
                list.combos.len(),
                list.active_combos().count()
            );
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No combo list yet; the daemon creates an empty one on start.");
        }
        Err(e) => return Err(e).into_diagnostic(),
    }
    Ok(())
}

fn cmd_devices() -> miette::Result<()> {
    println!("Available input devices:\n");

    for device in enumerate_devices().into_diagnostic()? {
        let device_type = if device.keyboard { "keyboard" } else { "other" };
        println!("  {} [{}]", device.name, device_type);
        println!("    Path: {}", device.path.display());
        println!("    ID: {}", device.vendor_product());
        println!();
    }

    Ok(())
}

async fn request(socket: &Path, request: IpcRequest) -> miette::Result<IpcResponse> {
    let response = send_request(socket, &request)
        .await
        .map_err(|e| miette::miette!("{:#}", e))?;
    match response {
        IpcResponse::Error { message } => Err(miette::miette!("{}", message)),
        other => Ok(other),
    }
}

async fn cmd_simple(socket: &Path, req: IpcRequest) -> miette::Result<()> {
    match request(socket, req).await? {
        IpcResponse::Success { message } => {
            println!("{}", message.unwrap_or_else(|| "Done".to_string()));
            Ok(())
        }
        other => Err(miette::miette!("Unexpected response: {:?}", other)),
    }
}

fn print_status(status: &DaemonStatus) {
    println!(
        "Substitution: {}",
        if status.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  Mode: {}, {}",
        if status.automatic { "automatic" } else { "on shortcut only" },
        if status.use_clipboard { "pasted" } else { "typed" }
    );
    println!("  Trigger shortcut: {}", status.trigger_shortcut);
    println!(
        "Combos: {} active of {} ({})",
        status.active_combos,
        status.total_combos,
        status.combo_list.display()
    );
    match &status.hook_error {
        Some(error) => println!("Keyboards: not hooked ({})", error),
        None => println!("Keyboards: {}", status.keyboards.join(", ")),
    }
    println!(
        "Substitutions: {} ({} failed fragments){}",
        status.substitutions,
        status.failed_fragments,
        if status.substituting { ", one in progress" } else { "" }
    );
    println!("Uptime: {}s", status.uptime_secs);
}

async fn cmd_status(socket: &Path) -> miette::Result<()> {
    match request(socket, IpcRequest::Status).await? {
        IpcResponse::Status(status) => {
            print_status(&status);
            Ok(())
        }
        other => Err(miette::miette!("Unexpected response: {:?}", other)),
    }
}

async fn cmd_combos(socket: &Path) -> miette::Result<()> {
    let IpcResponse::Combos { combos } = request(socket, IpcRequest::ListCombos).await? else {
        return Err(miette::miette!("Unexpected response"));
    };

    if combos.is_empty() {
        println!("No combos");
        return Ok(());
    }
    for combo in combos {
        let state = match (combo.enabled, combo.active) {
            (true, true) => "on",
            (true, false) => "group off",
            (false, _) => "off",
        };
        print!("  {:<20} {:<12} [{}]", combo.keyword, combo.id, state);
        if let Some(name) = &combo.name {
            print!(" {}", name);
        }
        if let Some(group) = &combo.group {
            print!(" (group {})", group);
        }
        println!();
    }
    Ok(())
}

fn cmd_prefs(prefs_path: &Path, action: PrefsAction) -> miette::Result<()> {
    let mut store = PreferencesStore::open(prefs_path)?;
    match action {
        PrefsAction::Show => {
            print!("{}", generate_preferences(&store.get()));
        }
        PrefsAction::Set { key, value } => {
            if let Err(e) = store.set_field(&key, &value) {
                eprintln!("Known keys: {}", PREFERENCE_KEYS.join(", "));
                return Err(e.into());
            }
            println!("Set {} = {}", key, value);
            println!("Run `beeftext reload` for a running daemon to pick it up.");
        }
        PrefsAction::Reset => {
            store.reset()?;
            println!("Preferences reset to defaults: {}", prefs_path.display());
        }
    }
    Ok(())
}

fn cmd_export(prefs_path: &Path, target: Option<String>) -> miette::Result<()> {
    let mut store = PreferencesStore::open(prefs_path)?;
    let prefs = store.get();
    let target = match target {
        Some(path) => paths::expand(&path),
        None => prefs.combo_list.last_import_export_path.clone(),
    };

    let list = load_combo_list(&prefs.combo_list_path())?;
    save_combo_list(&list, &target)?;
    store.update(|p| p.combo_list.last_import_export_path = target.clone())?;

    println!("Exported {} combos to {}", list.combos.len(), target.display());
    Ok(())
}
