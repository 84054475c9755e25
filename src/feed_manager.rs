//! Feed runtime coordinator.
//!
//! This manager is the bus-owned holder of [`FeedState`]. Network calls run on
//! short-lived worker threads that post their results back onto the bus; the
//! manager applies them one message at a time.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::FeedConfig;
use crate::error::ClientError;
use crate::feed_state::{FeedState, ResetPlan, ToggleIntent};
use crate::media_client::MediaClient;
use crate::models::{FeedType, LibraryHandle};
use crate::protocol::{FeedMessage, FeedSnapshotUpdate, Message};

/// Coordinates feed state and snapshot fan-out over the event bus.
pub struct FeedManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    client: Arc<dyn MediaClient>,
    state: FeedState,
    libraries: Vec<LibraryHandle>,
    hidden_libraries: BTreeSet<String>,
    snapshot_version: u64,
}

impl FeedManager {
    /// Creates a manager bound to bus channels and an authenticated client.
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        client: Arc<dyn MediaClient>,
        feed: &FeedConfig,
        hidden_libraries: &[String],
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            client,
            state: FeedState::new(
                feed.default_feed_type,
                feed.page_size,
                &feed.favorites_scope_name,
            ),
            libraries: Vec::new(),
            hidden_libraries: hidden_libraries.iter().cloned().collect(),
            snapshot_version: 0,
        }
    }

    fn send(&self, message: FeedMessage) {
        let _ = self.bus_producer.send(Message::Feed(message));
    }

    fn emit_snapshot(&mut self) {
        self.snapshot_version = self.snapshot_version.saturating_add(1);
        self.send(FeedMessage::FeedSnapshotUpdated(FeedSnapshotUpdate {
            version: self.snapshot_version,
            feed: self.state.snapshot(),
        }));
    }

    fn emit_operation_failed(&self, action: &str, error: String) {
        self.send(FeedMessage::OperationFailed {
            action: action.to_string(),
            error,
        });
    }

    fn visible_libraries(&self) -> Vec<LibraryHandle> {
        self.libraries
            .iter()
            .filter(|library| !self.hidden_libraries.contains(&library.id))
            .cloned()
            .collect()
    }

    fn emit_libraries(&self) {
        self.send(FeedMessage::LibrariesUpdated(self.visible_libraries()));
    }

    /// Runs `job` against the client on a named worker thread and posts its result.
    fn spawn_worker<F>(&self, name: &str, job: F) -> io::Result<()>
    where
        F: FnOnce(&dyn MediaClient) -> Vec<FeedMessage> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let bus_producer = self.bus_producer.clone();
        thread::Builder::new()
            .name(format!("feed-{name}"))
            .spawn(move || {
                for message in job(client.as_ref()) {
                    let _ = bus_producer.send(Message::Feed(message));
                }
            })
            .map(|_| ())
    }

    fn request_libraries(&mut self) {
        let spawned = self.spawn_worker("libraries", |client| {
            vec![FeedMessage::LibrariesLoaded(client.get_libraries())]
        });
        if let Err(err) = spawned {
            error!("FeedManager: failed to spawn library worker: {}", err);
            self.emit_operation_failed("libraries", err.to_string());
        }
    }

    fn run_reset(&mut self, plan: ResetPlan) {
        self.emit_snapshot();
        let ResetPlan { favorites, page } = plan;
        let page_ticket = page.clone();
        let spawned = self.spawn_worker("reset", move |client| {
            let favorites_result = client.get_favorites(&favorites.library_name);
            let page_result = client.get_vertical_videos(&page.query);
            vec![
                FeedMessage::FavoritesLoaded {
                    ticket: favorites,
                    result: favorites_result,
                },
                FeedMessage::PageLoaded {
                    ticket: page,
                    result: page_result,
                },
            ]
        });
        if let Err(err) = spawned {
            error!("FeedManager: failed to spawn reset worker: {}", err);
            self.state
                .apply_page(&page_ticket, Err(ClientError::Fetch(err.to_string())));
            self.emit_snapshot();
        }
    }

    fn select_library(&mut self, library_id: Option<String>) {
        let library = match library_id {
            None => None,
            Some(library_id) => {
                match self
                    .libraries
                    .iter()
                    .find(|library| library.id == library_id)
                {
                    Some(library) => Some(library.clone()),
                    None => {
                        warn!("FeedManager: unknown library {}", library_id);
                        self.emit_operation_failed(
                            "select library",
                            format!("unknown library: {library_id}"),
                        );
                        return;
                    }
                }
            }
        };
        info!(
            "FeedManager: selecting {}",
            library
                .as_ref()
                .map(|library| library.name.as_str())
                .unwrap_or("all libraries")
        );
        let plan = self.state.select_library(library);
        self.run_reset(plan);
    }

    fn set_feed_type(&mut self, feed_type: FeedType) {
        let Some(plan) = self.state.set_feed_type(feed_type) else {
            return;
        };
        info!("FeedManager: switched feed to {}", feed_type);
        self.run_reset(plan);
    }

    fn refresh(&mut self) {
        let plan = self.state.reset();
        self.run_reset(plan);
    }

    fn load_more(&mut self) {
        let Some(ticket) = self.state.begin_load_more() else {
            return;
        };
        self.emit_snapshot();
        let worker_ticket = ticket.clone();
        let spawned = self.spawn_worker("page", move |client| {
            let result = client.get_vertical_videos(&worker_ticket.query);
            vec![FeedMessage::PageLoaded {
                ticket: worker_ticket,
                result,
            }]
        });
        if let Err(err) = spawned {
            error!("FeedManager: failed to spawn page worker: {}", err);
            self.state.apply_page(
                &ticket,
                Err(ClientError::Fetch(err.to_string())),
            );
            self.emit_snapshot();
        }
    }

    fn toggle_favorite(&mut self, item_id: &str) {
        let intent = self.state.toggle_favorite(item_id);
        debug!(
            "FeedManager: {} {} in {}",
            if intent.was_favorite { "unfavoriting" } else { "favoriting" },
            intent.item_id,
            intent.library_name
        );
        self.emit_snapshot();
        let worker_intent = intent.clone();
        let spawned = self.spawn_worker("favorite", move |client| {
            let result = client.toggle_favorite(
                &worker_intent.item_id,
                worker_intent.was_favorite,
                &worker_intent.library_name,
            );
            vec![FeedMessage::ToggleCompleted {
                intent: worker_intent,
                result,
            }]
        });
        if let Err(err) = spawned {
            error!("FeedManager: failed to spawn favorite worker: {}", err);
            self.complete_toggle(
                intent,
                Err(ClientError::Fetch(err.to_string())),
            );
        }
    }

    fn complete_toggle(
        &mut self,
        intent: ToggleIntent,
        result: Result<(), ClientError>,
    ) {
        let failure = result.as_ref().err().map(ToString::to_string);
        if self.state.complete_toggle(&intent, result) {
            self.emit_snapshot();
        }
        if let Some(failure) = failure {
            self.emit_operation_failed("toggle favorite", failure);
        }
    }

    /// Unsticks the feed after the bus dropped messages and refetches favorites.
    fn recover_from_lag(&mut self, skipped: u64) {
        warn!(
            "FeedManager lagged on control bus, skipped {} message(s); resyncing",
            skipped
        );
        let ticket = self.state.recover_after_lag();
        self.emit_snapshot();
        let spawned = self.spawn_worker("favorites", move |client| {
            let result = client.get_favorites(&ticket.library_name);
            vec![FeedMessage::FavoritesLoaded { ticket, result }]
        });
        if let Err(err) = spawned {
            error!("FeedManager: failed to spawn favorites worker: {}", err);
        }
    }

    fn toggle_library_hidden(&mut self, library_id: &str) {
        if !self.hidden_libraries.remove(library_id) {
            self.hidden_libraries.insert(library_id.to_string());
        }
        self.send(FeedMessage::HiddenLibrariesChanged(
            self.hidden_libraries.iter().cloned().collect(),
        ));
        self.emit_libraries();
    }

    /// Applies one feed message. Returns `false` once the manager should stop.
    pub fn handle_message(&mut self, message: FeedMessage) -> bool {
        match message {
            FeedMessage::RequestLibraries => self.request_libraries(),
            FeedMessage::SelectLibrary { library_id } => self.select_library(library_id),
            FeedMessage::SetFeedType(feed_type) => self.set_feed_type(feed_type),
            FeedMessage::Refresh => self.refresh(),
            FeedMessage::LoadMore => self.load_more(),
            FeedMessage::ToggleFavorite { item_id } => self.toggle_favorite(&item_id),
            FeedMessage::ToggleLibraryHidden { library_id } => {
                self.toggle_library_hidden(&library_id)
            }
            FeedMessage::RequestSnapshot => {
                self.emit_snapshot();
                self.emit_libraries();
            }
            FeedMessage::Shutdown => {
                info!("FeedManager: shutting down");
                return false;
            }
            FeedMessage::LibrariesLoaded(Ok(libraries)) => {
                debug!("FeedManager: {} libraries loaded", libraries.len());
                self.libraries = libraries;
                self.emit_libraries();
            }
            FeedMessage::LibrariesLoaded(Err(err)) => {
                warn!("FeedManager: library listing failed: {}", err);
                self.emit_operation_failed("libraries", err.to_string());
            }
            FeedMessage::FavoritesLoaded { ticket, result } => {
                if self.state.apply_favorites(&ticket, result) {
                    self.emit_snapshot();
                }
            }
            FeedMessage::PageLoaded { ticket, result } => {
                let failure = result.as_ref().err().map(ToString::to_string);
                if self.state.apply_page(&ticket, result) {
                    self.emit_snapshot();
                    if let Some(failure) = failure {
                        self.emit_operation_failed("load page", failure);
                    }
                }
            }
            FeedMessage::ToggleCompleted { intent, result } => {
                self.complete_toggle(intent, result);
            }
            FeedMessage::FeedSnapshotUpdated(_)
            | FeedMessage::LibrariesUpdated(_)
            | FeedMessage::HiddenLibrariesChanged(_)
            | FeedMessage::OperationFailed { .. } => {}
        }
        true
    }

    /// Starts the blocking event loop for feed coordination.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Feed(message)) => {
                    if !self.handle_message(message) {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    self.recover_from_lag(skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
