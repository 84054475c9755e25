//! Feed state owned by the coordinator: items, cursor, and favorite set.
//!
//! Every network round trip is split into a ticket issued here and a result
//! applied here. Tickets carry the generation they were issued under; any
//! reset bumps the generation so late results from a superseded query are
//! dropped instead of merged.

use std::collections::HashSet;

use log::{debug, warn};

use crate::error::ClientError;
use crate::models::{CatalogItem, FeedPage, FeedQuery, FeedType, LibraryHandle, PageCursor};

/// Page fetch issued for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub generation: u64,
    pub query: FeedQuery,
    /// First page after a reset rather than a load-more.
    pub reset: bool,
}

/// Favorite-set fetch issued for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesTicket {
    pub generation: u64,
    pub library_name: String,
}

/// Work requested by a reset: favorites first, then the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPlan {
    pub favorites: FavoritesTicket,
    pub page: PageTicket,
}

/// An optimistic favorite flip, with the set as it was before the flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleIntent {
    pub generation: u64,
    pub item_id: String,
    /// Membership before the flip; decides add versus remove.
    pub was_favorite: bool,
    pub library_name: String,
    snapshot: HashSet<String>,
}

/// Immutable view of the feed handed to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub generation: u64,
    pub library: Option<LibraryHandle>,
    pub feed_type: FeedType,
    pub items: Vec<CatalogItem>,
    pub favorites: HashSet<String>,
    pub has_more: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedState {
    generation: u64,
    library: Option<LibraryHandle>,
    feed_type: FeedType,
    page_size: usize,
    favorites_scope: String,
    items: Vec<CatalogItem>,
    cursor: PageCursor,
    has_more: bool,
    loading: bool,
    favorites: HashSet<String>,
    last_error: Option<String>,
}

impl FeedState {
    pub fn new(feed_type: FeedType, page_size: usize, favorites_scope: &str) -> Self {
        let page_size = page_size.max(1);
        Self {
            generation: 0,
            library: None,
            feed_type,
            page_size,
            favorites_scope: favorites_scope.to_string(),
            items: Vec::new(),
            cursor: PageCursor::start(page_size),
            has_more: false,
            loading: false,
            favorites: HashSet::new(),
            last_error: None,
        }
    }

    #[cfg(test)]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    #[cfg(test)]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[cfg(test)]
    pub fn favorites(&self) -> &HashSet<String> {
        &self.favorites
    }

    /// Library name the favorite set is scoped to.
    pub fn favorites_scope_name(&self) -> &str {
        self.library
            .as_ref()
            .map(|library| library.name.as_str())
            .unwrap_or(&self.favorites_scope)
    }

    fn current_query(&self) -> FeedQuery {
        FeedQuery {
            library: self.library.clone(),
            feed_type: self.feed_type,
            cursor: self.cursor,
        }
    }

    /// Discards items and cursor and starts a new generation.
    pub fn reset(&mut self) -> ResetPlan {
        self.generation += 1;
        self.items.clear();
        self.cursor = PageCursor::start(self.page_size);
        self.has_more = true;
        self.loading = true;
        self.last_error = None;
        debug!(
            "FeedState: reset to generation {} ({} in {})",
            self.generation,
            self.feed_type,
            self.favorites_scope_name()
        );
        ResetPlan {
            favorites: FavoritesTicket {
                generation: self.generation,
                library_name: self.favorites_scope_name().to_string(),
            },
            page: PageTicket {
                generation: self.generation,
                query: self.current_query(),
                reset: true,
            },
        }
    }

    pub fn select_library(&mut self, library: Option<LibraryHandle>) -> ResetPlan {
        self.library = library;
        self.reset()
    }

    /// Switches the feed regime. Re-selecting the active type keeps the loaded feed.
    pub fn set_feed_type(&mut self, feed_type: FeedType) -> Option<ResetPlan> {
        if feed_type == self.feed_type {
            debug!("FeedState: feed already {}, keeping loaded items", feed_type);
            return None;
        }
        self.feed_type = feed_type;
        Some(self.reset())
    }

    /// Next-page ticket, or `None` while a fetch is outstanding or the feed is exhausted.
    pub fn begin_load_more(&mut self) -> Option<PageTicket> {
        if self.loading || !self.has_more {
            debug!(
                "FeedState: load-more dropped (loading={}, has_more={})",
                self.loading, self.has_more
            );
            return None;
        }
        self.loading = true;
        Some(PageTicket {
            generation: self.generation,
            query: self.current_query(),
            reset: false,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Applies a page result. Returns `false` when the ticket is stale.
    pub fn apply_page(&mut self, ticket: &PageTicket, result: Result<FeedPage, ClientError>) -> bool {
        if !self.is_current(ticket.generation) || ticket.query.cursor.skip != self.cursor.skip {
            debug!(
                "FeedState: discarding stale page (generation {} skip {}, current {} skip {})",
                ticket.generation, ticket.query.cursor.skip, self.generation, self.cursor.skip
            );
            return false;
        }
        self.loading = false;
        match result {
            Ok(page) => {
                self.cursor = self.cursor.advanced_by(&page);
                self.has_more = page.has_more;
                if ticket.reset {
                    self.items = page.items;
                } else {
                    self.items.extend(page.items);
                }
                self.last_error = None;
            }
            Err(err) => {
                warn!(
                    "FeedState: {} fetch failed, stopping feed: {}",
                    if ticket.reset { "first page" } else { "load-more" },
                    err
                );
                if ticket.reset {
                    self.items.clear();
                }
                self.has_more = false;
                self.last_error = Some(err.to_string());
            }
        }
        true
    }

    /// Replaces the favorite set. Failures degrade to an empty set.
    pub fn apply_favorites(
        &mut self,
        ticket: &FavoritesTicket,
        result: Result<HashSet<String>, ClientError>,
    ) -> bool {
        if !self.is_current(ticket.generation) {
            debug!(
                "FeedState: discarding stale favorites for {} (generation {})",
                ticket.library_name, ticket.generation
            );
            return false;
        }
        self.favorites = match result {
            Ok(favorites) => favorites,
            Err(err) => {
                warn!(
                    "FeedState: favorites for {} unavailable, showing none: {}",
                    ticket.library_name, err
                );
                HashSet::new()
            }
        };
        true
    }

    /// Flips membership locally and returns the intent to send to the server.
    pub fn toggle_favorite(&mut self, item_id: &str) -> ToggleIntent {
        let snapshot = self.favorites.clone();
        let was_favorite = snapshot.contains(item_id);
        if was_favorite {
            self.favorites.remove(item_id);
        } else {
            self.favorites.insert(item_id.to_string());
        }
        ToggleIntent {
            generation: self.generation,
            item_id: item_id.to_string(),
            was_favorite,
            library_name: self.favorites_scope_name().to_string(),
            snapshot,
        }
    }

    /// Settles a toggle. A failure restores the whole pre-toggle set unless a
    /// reset has since replaced it.
    pub fn complete_toggle(&mut self, intent: &ToggleIntent, result: Result<(), ClientError>) -> bool {
        let Err(err) = result else {
            return false;
        };
        if !self.is_current(intent.generation) {
            warn!(
                "FeedState: toggle of {} failed after reset, keeping refreshed favorites: {}",
                intent.item_id, err
            );
            return false;
        }
        warn!(
            "FeedState: toggle of {} failed, rolling back favorites: {}",
            intent.item_id, err
        );
        self.favorites = intent.snapshot.clone();
        self.last_error = Some(err.to_string());
        true
    }

    /// Recovers after bus messages were lost.
    ///
    /// A dropped page result would leave `loading` set forever, so it is
    /// cleared; a late result for the same skip is still accepted once. A
    /// dropped toggle result may have skipped a rollback, so the returned
    /// ticket refetches favorites for the current generation.
    pub fn recover_after_lag(&mut self) -> FavoritesTicket {
        self.loading = false;
        FavoritesTicket {
            generation: self.generation,
            library_name: self.favorites_scope_name().to_string(),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            generation: self.generation,
            library: self.library.clone(),
            feed_type: self.feed_type,
            items: self.items.clone(),
            favorites: self.favorites.clone(),
            has_more: self.has_more,
            loading: self.loading,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FeedState;
    use crate::backends::fake::vertical_item;
    use crate::error::ClientError;
    use crate::models::{CatalogItem, FeedPage, FeedType, LibraryHandle};
    use std::collections::HashSet;

    fn library(id: &str) -> LibraryHandle {
        LibraryHandle {
            id: id.to_string(),
            name: format!("Library {id}"),
        }
    }

    fn page(ids: &[&str], next_cursor: usize, has_more: bool) -> FeedPage {
        FeedPage {
            items: ids.iter().map(|id| vertical_item(id)).collect(),
            next_cursor,
            total_count: 1000,
            has_more,
        }
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn item_ids(items: &[CatalogItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    fn loaded_state(favorites: &[&str]) -> FeedState {
        let mut state = FeedState::new(FeedType::Latest, 15, "Favorites");
        let plan = state.select_library(Some(library("L1")));
        assert!(state.apply_favorites(&plan.favorites, Ok(set(favorites))));
        assert!(state.apply_page(&plan.page, Ok(page(&["a", "b"], 100, true))));
        state
    }

    #[test]
    fn test_reset_clears_items_and_restarts_cursor() {
        let mut state = loaded_state(&[]);
        let more = state.begin_load_more().expect("load-more should be issued");
        assert_eq!(more.query.cursor.skip, 100);
        assert!(state.apply_page(&more, Ok(page(&["c"], 200, true))));

        let plan = state
            .set_feed_type(FeedType::Random)
            .expect("a new feed type should reset");
        assert!(state.items().is_empty());
        assert!(state.has_more());
        assert!(state.is_loading());
        assert_eq!(plan.page.query.cursor.skip, 0);
        assert_eq!(plan.page.query.feed_type, FeedType::Random);
        assert!(plan.page.reset);
        assert_eq!(plan.favorites.library_name, "Library L1");
    }

    #[test]
    fn test_load_more_appends_and_advances() {
        let mut state = loaded_state(&[]);
        let ticket = state.begin_load_more().expect("load-more should be issued");
        assert!(state.apply_page(&ticket, Ok(page(&["c", "d"], 200, false))));
        assert_eq!(item_ids(state.items()), vec!["a", "b", "c", "d"]);
        assert!(!state.has_more());
        assert!(state.begin_load_more().is_none());
    }

    #[test]
    fn test_reselecting_active_feed_type_keeps_items() {
        let mut state = loaded_state(&["a"]);
        let before = state.snapshot();

        assert!(state.set_feed_type(FeedType::Latest).is_none());
        assert_eq!(state.snapshot(), before);
        assert_eq!(item_ids(state.items()), vec!["a", "b"]);
        assert!(state.begin_load_more().is_some());
    }

    #[test]
    fn test_lag_recovery_unblocks_load_more() {
        let mut state = loaded_state(&["a"]);
        let lost = state.begin_load_more().expect("load-more should be issued");
        assert!(state.begin_load_more().is_none());

        let ticket = state.recover_after_lag();
        assert!(!state.is_loading());
        assert_eq!(ticket.library_name, "Library L1");

        let retry = state.begin_load_more().expect("load-more should be issued again");
        assert_eq!(retry.query.cursor.skip, lost.query.cursor.skip);
        assert!(state.apply_page(&retry, Ok(page(&["c"], 200, true))));
        assert!(!state.apply_page(&lost, Ok(page(&["c"], 200, true))));
        assert_eq!(item_ids(state.items()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_load_more_is_single_flight() {
        let mut state = loaded_state(&[]);
        assert!(state.begin_load_more().is_some());
        assert!(state.begin_load_more().is_none());
    }

    #[test]
    fn test_no_load_more_before_first_reset() {
        let mut state = FeedState::new(FeedType::Latest, 15, "Favorites");
        assert!(state.begin_load_more().is_none());
    }

    #[test]
    fn test_stale_page_after_library_switch_is_discarded() {
        let mut state = FeedState::new(FeedType::Latest, 15, "Favorites");
        let l1 = state.select_library(Some(library("L1")));
        let l2 = state.select_library(Some(library("L2")));

        assert!(!state.apply_page(&l1.page, Ok(page(&["from-l1"], 100, true))));
        assert!(state.items().is_empty());
        assert!(state.is_loading());

        assert!(state.apply_page(&l2.page, Ok(page(&["from-l2"], 100, true))));
        assert_eq!(item_ids(state.items()), vec!["from-l2"]);
    }

    #[test]
    fn test_stale_favorites_are_discarded() {
        let mut state = FeedState::new(FeedType::Latest, 15, "Favorites");
        let first = state.select_library(Some(library("L1")));
        let second = state.select_library(Some(library("L2")));
        assert!(!state.apply_favorites(&first.favorites, Ok(set(&["x"]))));
        assert!(state.apply_favorites(&second.favorites, Ok(set(&["y"]))));
        assert_eq!(state.favorites(), &set(&["y"]));
    }

    #[test]
    fn test_reset_failure_empties_feed() {
        let mut state = loaded_state(&[]);
        let plan = state.select_library(Some(library("L2")));
        assert!(state.apply_page(
            &plan.page,
            Err(ClientError::Fetch("items returned HTTP status 500".to_string()))
        ));
        assert!(state.items().is_empty());
        assert!(!state.has_more());
        assert!(!state.is_loading());
        assert!(state.snapshot().last_error.is_some());
    }

    #[test]
    fn test_load_more_failure_keeps_items_and_stops() {
        let mut state = loaded_state(&[]);
        let ticket = state.begin_load_more().expect("load-more should be issued");
        assert!(state.apply_page(&ticket, Err(ClientError::Fetch("timeout".to_string()))));
        assert_eq!(item_ids(state.items()), vec!["a", "b"]);
        assert!(!state.has_more());
        assert!(state.begin_load_more().is_none());
    }

    #[test]
    fn test_favorites_failure_degrades_to_empty() {
        let mut state = loaded_state(&["a"]);
        let plan = state.reset();
        assert!(state.apply_favorites(
            &plan.favorites,
            Err(ClientError::Fetch("playlist items failed".to_string()))
        ));
        assert!(state.favorites().is_empty());
        assert!(state.apply_page(&plan.page, Ok(page(&["a"], 100, true))));
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn test_failed_toggle_rolls_back_whole_set() {
        let mut state = loaded_state(&["A", "B"]);
        let intent = state.toggle_favorite("C");
        assert!(!intent.was_favorite);
        assert_eq!(state.favorites(), &set(&["A", "B", "C"]));

        assert!(state.complete_toggle(&intent, Err(ClientError::Fetch("add failed".to_string()))));
        assert_eq!(state.favorites(), &set(&["A", "B"]));
    }

    #[test]
    fn test_toggle_then_untoggle_restores_set() {
        let mut state = loaded_state(&["A"]);
        let add = state.toggle_favorite("C");
        let remove = state.toggle_favorite("C");
        assert!(!add.was_favorite);
        assert!(remove.was_favorite);
        assert_eq!(state.favorites(), &set(&["A"]));

        assert!(!state.complete_toggle(&add, Ok(())));
        assert!(!state.complete_toggle(&remove, Ok(())));
        assert_eq!(state.favorites(), &set(&["A"]));
    }

    #[test]
    fn test_rollback_after_reset_keeps_refreshed_set() {
        let mut state = loaded_state(&["A"]);
        let intent = state.toggle_favorite("B");
        let plan = state
            .set_feed_type(FeedType::Favorites)
            .expect("a new feed type should reset");
        assert!(state.apply_favorites(&plan.favorites, Ok(set(&["A", "Z"]))));

        assert!(!state.complete_toggle(&intent, Err(ClientError::Fetch("add failed".to_string()))));
        assert_eq!(state.favorites(), &set(&["A", "Z"]));
    }

    #[test]
    fn test_global_scope_uses_configured_name() {
        let mut state = FeedState::new(FeedType::Favorites, 15, "收藏");
        let plan = state.select_library(None);
        assert_eq!(plan.favorites.library_name, "收藏");
        assert_eq!(state.toggle_favorite("a").library_name, "收藏");
    }
}
