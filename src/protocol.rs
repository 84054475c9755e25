//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the message payloads exchanged between the front end,
//! the feed coordinator, and the network workers it spawns.

use std::collections::HashSet;

use crate::error::ClientError;
use crate::feed_state::{FavoritesTicket, FeedSnapshot, PageTicket, ToggleIntent};
use crate::models::{FeedPage, FeedType, LibraryHandle};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Feed(FeedMessage),
}

/// Versioned feed snapshot published after every state change.
#[derive(Debug, Clone)]
pub struct FeedSnapshotUpdate {
    /// Monotonically increasing per coordinator.
    pub version: u64,
    pub feed: FeedSnapshot,
}

/// Feed-domain commands, worker results, and notifications.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    // Commands from the front end
    RequestLibraries,
    /// `None` selects every library.
    SelectLibrary {
        library_id: Option<String>,
    },
    SetFeedType(FeedType),
    Refresh,
    LoadMore,
    ToggleFavorite {
        item_id: String,
    },
    ToggleLibraryHidden {
        library_id: String,
    },
    RequestSnapshot,
    Shutdown,

    // Results posted by network workers
    LibrariesLoaded(Result<Vec<LibraryHandle>, ClientError>),
    FavoritesLoaded {
        ticket: FavoritesTicket,
        result: Result<HashSet<String>, ClientError>,
    },
    PageLoaded {
        ticket: PageTicket,
        result: Result<FeedPage, ClientError>,
    },
    ToggleCompleted {
        intent: ToggleIntent,
        result: Result<(), ClientError>,
    },

    // Notifications from the coordinator
    FeedSnapshotUpdated(FeedSnapshotUpdate),
    /// Libraries that are not hidden, in server order.
    LibrariesUpdated(Vec<LibraryHandle>),
    /// Full hidden-library id set, sorted, for persistence.
    HiddenLibrariesChanged(Vec<String>),
    OperationFailed {
        action: String,
        error: String,
    },
}
