mod backends;
mod catalog;
mod client_factory;
mod config;
mod config_persistence;
mod console;
mod error;
mod favorites;
mod feed_manager;
mod feed_state;
mod identity;
mod media_client;
mod models;
mod pagination;
mod protocol;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::config_persistence::{default_config_path, load_config_file, persist_config_file};
use crate::console::{
    parse_command, render_libraries, render_snapshot, revised_field, ConsoleCommand, HELP_TEXT,
};
use crate::feed_manager::FeedManager;
use crate::feed_state::FeedSnapshot;
use crate::identity::ClientIdentity;
use crate::media_client::MediaClient;
use crate::models::ImageKind;
use crate::protocol::{FeedMessage, Message};

const LOG_ENV_VAR: &str = "EMBYTOK_LOG";
const PASSWORD_ENV_VAR: &str = "EMBYTOK_PASSWORD";
const BUS_CAPACITY: usize = 1024;

/// How a signed-in session ended.
enum SessionEnd {
    Logout,
    Quit,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn prompt(label: &str) -> Option<String> {
    print!("{label}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// Fills missing server fields interactively and persists them.
fn complete_server_profile(config: &mut Config, config_path: &Path) -> Option<()> {
    let mut changed = false;
    if config.server.url.trim().is_empty() {
        config.server.url = models::normalize_server_url(&prompt("Server URL: ")?);
        changed = true;
    }
    if config.server.username.trim().is_empty() {
        config.server.username = prompt("Username: ")?.trim().to_string();
        changed = true;
    }
    if changed {
        persist_config_file(config, config_path);
    }
    Some(())
}

/// Re-prompts server fields after a failed sign-in. Blank answers keep the current values.
fn revise_server_profile(config: &mut Config, config_path: &Path) -> Option<()> {
    let url_input = prompt(&format!("Server URL [{}]: ", config.server.url))?;
    let url = models::normalize_server_url(&revised_field(&config.server.url, &url_input));
    let username_input = prompt(&format!("Username [{}]: ", config.server.username))?;
    let username = revised_field(&config.server.username, &username_input);
    if url != config.server.url || username != config.server.username {
        config.server.url = url;
        config.server.username = username;
        persist_config_file(config, config_path);
    }
    Some(())
}

fn read_password(from_env: &Option<String>) -> Option<String> {
    match from_env {
        Some(password) => Some(password.clone()),
        None => prompt("Password: "),
    }
}

/// Prints bus notifications and persists the hidden-library set.
fn spawn_printer(
    bus_receiver: broadcast::Receiver<Message>,
    latest_snapshot: Arc<Mutex<Option<FeedSnapshot>>>,
    mut config: Config,
    config_path: PathBuf,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console-printer".to_string())
        .spawn(move || {
            let mut bus_receiver = bus_receiver;
            let mut last_version = 0;
            loop {
                match bus_receiver.blocking_recv() {
                    Ok(Message::Feed(FeedMessage::FeedSnapshotUpdated(update))) => {
                        if update.version <= last_version {
                            continue;
                        }
                        last_version = update.version;
                        if !update.feed.loading {
                            println!("{}", render_snapshot(&update.feed));
                        }
                        *lock_or_recover(&latest_snapshot) = Some(update.feed);
                    }
                    Ok(Message::Feed(FeedMessage::LibrariesUpdated(libraries))) => {
                        println!("{}", render_libraries(&libraries));
                    }
                    Ok(Message::Feed(FeedMessage::HiddenLibrariesChanged(hidden))) => {
                        config.libraries.hidden = hidden;
                        persist_config_file(&config, &config_path);
                    }
                    Ok(Message::Feed(FeedMessage::OperationFailed { action, error })) => {
                        println!("{action} failed: {error}");
                    }
                    Ok(Message::Feed(FeedMessage::Shutdown)) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Console printer lagged, skipped {} message(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
}

fn print_urls(client: &dyn MediaClient, snapshot: Option<&FeedSnapshot>, index: usize) {
    let Some(item) = snapshot.and_then(|snapshot| snapshot.items.get(index)) else {
        println!("no item at index {index}");
        return;
    };
    println!("{}", item.name);
    if let Some(overview) = item.overview.as_deref() {
        println!("{overview}");
    }
    println!("stream:   {}", client.stream_url(item));
    for kind in [ImageKind::Primary, ImageKind::Backdrop] {
        match client.image_url(item, kind) {
            Some(url) => println!("{:<9} {}", format!("{}:", kind.as_str().to_lowercase()), url),
            None => println!("{:<9} (none)", format!("{}:", kind.as_str().to_lowercase())),
        }
    }
}

/// Runs the feed for one authenticated session until logout or quit.
fn run_session(
    client: Arc<dyn MediaClient>,
    config: &Config,
    config_path: &Path,
) -> io::Result<SessionEnd> {
    let (bus_sender, _) = broadcast::channel(BUS_CAPACITY);
    let latest_snapshot: Arc<Mutex<Option<FeedSnapshot>>> = Arc::new(Mutex::new(None));

    let manager_receiver = bus_sender.subscribe();
    let manager_sender = bus_sender.clone();
    let manager_client = Arc::clone(&client);
    let feed_config = config.feed.clone();
    let hidden_libraries = config.libraries.hidden.clone();
    let manager_handle = thread::Builder::new()
        .name("feed-manager".to_string())
        .spawn(move || {
            let mut feed_manager = FeedManager::new(
                manager_receiver,
                manager_sender,
                manager_client,
                &feed_config,
                &hidden_libraries,
            );
            feed_manager.run();
        })?;

    let printer_handle = spawn_printer(
        bus_sender.subscribe(),
        Arc::clone(&latest_snapshot),
        config.clone(),
        config_path.to_path_buf(),
    )?;

    let send = |message: FeedMessage| {
        if bus_sender.send(Message::Feed(message)).is_err() {
            error!("Feed bus has no listeners");
        }
    };
    send(FeedMessage::RequestLibraries);
    send(FeedMessage::Refresh);
    println!("type `help` for commands");

    let stdin = io::stdin();
    let mut end = SessionEnd::Quit;
    for line in stdin.lock().lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        debug!("Console command: {:?}", command);
        if let Some(message) = command.bus_message() {
            send(message);
            continue;
        }
        match command {
            ConsoleCommand::ToggleFavorite(index) => {
                let item_id = lock_or_recover(&latest_snapshot)
                    .as_ref()
                    .and_then(|snapshot| snapshot.items.get(index))
                    .map(|item| item.id.clone());
                match item_id {
                    Some(item_id) => send(FeedMessage::ToggleFavorite { item_id }),
                    None => println!("no item at index {index}"),
                }
            }
            ConsoleCommand::Urls(index) => {
                let snapshot = lock_or_recover(&latest_snapshot).clone();
                print_urls(client.as_ref(), snapshot.as_ref(), index);
            }
            ConsoleCommand::Help => println!("{HELP_TEXT}"),
            ConsoleCommand::Logout => {
                end = SessionEnd::Logout;
                break;
            }
            ConsoleCommand::Quit => break,
            _ => {}
        }
    }

    send(FeedMessage::Shutdown);
    if manager_handle.join().is_err() {
        error!("Feed manager thread panicked");
    }
    if printer_handle.join().is_err() {
        error!("Console printer thread panicked");
    }
    Ok(end)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    if let Ok(filters) = std::env::var(LOG_ENV_VAR) {
        clog.parse_filters(&filters);
    }
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let mut config = load_config_file(&config_path);
    info!("Using config {}", config_path.display());

    let identity = ClientIdentity::for_process(&config.client.device_name);
    debug!("Client device id {}", identity.device_id);
    let env_password = std::env::var(PASSWORD_ENV_VAR).ok();

    loop {
        if complete_server_profile(&mut config, &config_path).is_none() {
            break;
        }
        let Some(password) = read_password(&env_password) else {
            break;
        };
        let client = match client_factory::connect(&config, &identity, &password) {
            Ok(client) => client,
            Err(err) => {
                println!("{err}");
                if env_password.is_some() || !err.is_auth() {
                    return Err(err.into());
                }
                if revise_server_profile(&mut config, &config_path).is_none() {
                    break;
                }
                continue;
            }
        };
        println!("Signed in as {}", client.session().username);

        match run_session(client, &config, &config_path)? {
            SessionEnd::Logout => {
                info!("Signed out");
                config = load_config_file(&config_path);
                if env_password.is_some() {
                    break;
                }
            }
            SessionEnd::Quit => break,
        }
    }

    info!("Application exiting");
    Ok(())
}
