//! Page shaping for catalog and favorites feeds.
//!
//! Catalog cursors count raw server items. The vertical filter runs after the
//! fetch, so pages may hold fewer items than requested, but no server item is
//! ever skipped or fetched twice. Favorites are fetched whole and sliced in
//! memory, newest favorite first.

use log::debug;

use crate::backends::{ItemSort, MediaBackendAdapter};
use crate::catalog::CatalogQueryBuilder;
use crate::error::ClientError;
use crate::favorites::FavoritesEmulator;
use crate::models::{CatalogBatch, CatalogItem, FeedPage, FeedQuery, FeedType, ServerSession};

/// Shapes one raw catalog batch fetched at offset `skip`.
pub fn paginate_catalog(skip: usize, batch: CatalogBatch) -> FeedPage {
    let raw_len = batch.raw_items.len();
    let next_cursor = skip.saturating_add(raw_len);
    let items = batch
        .raw_items
        .into_iter()
        .filter(CatalogItem::is_vertical)
        .collect();
    FeedPage {
        items,
        next_cursor,
        total_count: batch.total_count,
        // An empty batch means the server has nothing past `skip`, whatever its total says.
        has_more: raw_len > 0 && next_cursor < batch.total_count,
    }
}

/// Filters, reverses, then slices `[skip, skip + limit)` of the favorites list.
pub fn paginate_favorites(members: Vec<CatalogItem>, skip: usize, limit: usize) -> FeedPage {
    let mut filtered: Vec<CatalogItem> = members
        .into_iter()
        .filter(CatalogItem::is_vertical)
        .collect();
    filtered.reverse();
    let total_count = filtered.len();
    let next_cursor = skip.saturating_add(limit);
    let items = filtered.into_iter().skip(skip).take(limit).collect();
    FeedPage {
        items,
        next_cursor,
        total_count,
        has_more: next_cursor < total_count,
    }
}

/// Runs one page fetch for a feed query.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    catalog: CatalogQueryBuilder,
}

impl Paginator {
    pub fn new(catalog: CatalogQueryBuilder) -> Self {
        Self { catalog }
    }

    /// Fetches the page at `query.cursor`.
    ///
    /// Favorites pages need the scope's library name, which is `favorites_scope`
    /// when the query has no library.
    pub fn page(
        &self,
        adapter: &dyn MediaBackendAdapter,
        favorites: &FavoritesEmulator,
        session: &ServerSession,
        query: &FeedQuery,
        favorites_scope: &str,
    ) -> Result<FeedPage, ClientError> {
        let skip = query.cursor.skip;
        let page = match query.feed_type {
            FeedType::Favorites => {
                let library_name = query
                    .library
                    .as_ref()
                    .map(|library| library.name.as_str())
                    .unwrap_or(favorites_scope);
                let members = favorites.list_members(adapter, session, library_name)?;
                paginate_favorites(members, skip, query.cursor.limit)
            }
            FeedType::Latest | FeedType::Random => {
                let batch = self.catalog.list_items(
                    adapter,
                    session,
                    query.library_id(),
                    ItemSort::for_feed(query.feed_type),
                    skip,
                )?;
                paginate_catalog(skip, batch)
            }
        };
        debug!(
            "Paginator: {} skip={} -> {} items, next={} total={} more={}",
            query.feed_type,
            skip,
            page.items.len(),
            page.next_cursor,
            page.total_count,
            page.has_more
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::{paginate_catalog, paginate_favorites, Paginator};
    use crate::backends::fake::{
        landscape_item, sized_item, test_session, vertical_item, FakeAdapter,
    };
    use crate::catalog::CatalogQueryBuilder;
    use crate::favorites::FavoritesEmulator;
    use crate::models::{
        CatalogBatch, CatalogItem, FeedQuery, FeedType, LibraryHandle, PageCursor,
    };

    fn mixed_catalog(count: usize) -> Vec<CatalogItem> {
        (0..count)
            .map(|index| {
                let id = format!("item-{index:03}");
                if index % 3 == 1 {
                    landscape_item(&id)
                } else {
                    vertical_item(&id)
                }
            })
            .collect()
    }

    fn ids(items: &[CatalogItem]) -> Vec<String> {
        items.iter().map(|item| item.id.clone()).collect()
    }

    #[test]
    fn test_cursor_advances_by_raw_count() {
        let mut raw_items: Vec<CatalogItem> = (0..30)
            .map(|index| vertical_item(&format!("v{index}")))
            .collect();
        raw_items.extend((0..20).map(|index| landscape_item(&format!("h{index}"))));

        let page = paginate_catalog(
            100,
            CatalogBatch {
                raw_items,
                total_count: 1000,
            },
        );

        assert_eq!(page.items.len(), 30);
        assert_eq!(page.next_cursor, 150);
        assert!(page.has_more);
    }

    #[test]
    fn test_has_more_false_at_total() {
        let page = paginate_catalog(
            90,
            CatalogBatch {
                raw_items: (0..10).map(|index| landscape_item(&index.to_string())).collect(),
                total_count: 100,
            },
        );
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor, 100);
        assert!(!page.has_more);
    }

    #[test]
    fn test_empty_batch_stops_paging_even_with_stale_total() {
        let page = paginate_catalog(
            40,
            CatalogBatch {
                raw_items: Vec::new(),
                total_count: 500,
            },
        );
        assert_eq!(page.next_cursor, 40);
        assert!(!page.has_more);
    }

    #[test]
    fn test_filter_boundary_applies_to_catalog_pages() {
        let page = paginate_catalog(
            0,
            CatalogBatch {
                raw_items: vec![
                    sized_item("keep", 100, 80),
                    sized_item("drop", 100, 79),
                    sized_item("zero", 0, 500),
                ],
                total_count: 3,
            },
        );
        assert_eq!(ids(&page.items), vec!["keep".to_string()]);
    }

    #[test]
    fn test_favorites_are_filtered_reversed_and_sliced() {
        let members = vec![
            vertical_item("first"),
            landscape_item("wide"),
            vertical_item("second"),
            vertical_item("third"),
        ];

        let page = paginate_favorites(members.clone(), 0, 2);
        assert_eq!(ids(&page.items), vec!["third".to_string(), "second".to_string()]);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.next_cursor, 2);
        assert!(page.has_more);

        let rest = paginate_favorites(members, 2, 2);
        assert_eq!(ids(&rest.items), vec!["first".to_string()]);
        assert_eq!(rest.next_cursor, 4);
        assert!(!rest.has_more);
    }

    #[test]
    fn test_favorites_slice_past_end_is_empty() {
        let page = paginate_favorites(vec![vertical_item("a")], 15, 15);
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_load_more_sequence_has_no_skips_or_duplicates() {
        let catalog = mixed_catalog(237);
        let expected: Vec<String> = catalog
            .iter()
            .filter(|item| item.is_vertical())
            .map(|item| item.id.clone())
            .collect();
        let adapter = FakeAdapter::new().with_library("lib-1", "Clips", catalog);
        let favorites = FavoritesEmulator::new();
        let paginator = Paginator::new(CatalogQueryBuilder::new(50));
        let session = test_session();

        let mut query = FeedQuery {
            library: Some(LibraryHandle {
                id: "lib-1".to_string(),
                name: "Clips".to_string(),
            }),
            feed_type: FeedType::Latest,
            cursor: PageCursor::start(15),
        };
        let mut collected = Vec::new();
        let mut fetches = 0;
        loop {
            let page = paginator
                .page(&adapter, &favorites, &session, &query, "Favorites")
                .expect("page should load");
            fetches += 1;
            collected.extend(ids(&page.items));
            if !page.has_more {
                break;
            }
            query.cursor = query.cursor.advanced_by(&page);
        }

        assert_eq!(collected, expected);
        assert_eq!(fetches, 5);
        let starts: Vec<usize> = adapter
            .item_requests()
            .iter()
            .map(|request| request.start_index)
            .collect();
        assert_eq!(starts, vec![0, 50, 100, 150, 200]);
    }

    #[test]
    fn test_favorites_feed_uses_scope_name_without_library() {
        let adapter = FakeAdapter::new().with_global_items(vec![
            vertical_item("a"),
            vertical_item("b"),
        ]);
        adapter.seed_playlist("Tok-收藏", &["a", "b"]);
        let favorites = FavoritesEmulator::new();
        let paginator = Paginator::new(CatalogQueryBuilder::new(100));

        let page = paginator
            .page(
                &adapter,
                &favorites,
                &test_session(),
                &FeedQuery {
                    library: None,
                    feed_type: FeedType::Favorites,
                    cursor: PageCursor::start(15),
                },
                "收藏",
            )
            .expect("favorites page should load");

        assert_eq!(ids(&page.items), vec!["b".to_string(), "a".to_string()]);
        assert!(adapter.item_requests().is_empty());
    }
}
