use client::Resource;
use client::resource_cache::{CacheKey, EntryStatus, Scope};
use payloads::{ClientError, EntityId, FilterQuery};
use test_helpers::mock::Operation;
use test_helpers::spawn_console;

fn rooms() -> Resource {
    Resource::new("room").base_path("admin/room")
}

fn active_rooms() -> FilterQuery {
    FilterQuery {
        status: Some("1".into()),
        ..FilterQuery::default()
    }
}

#[tokio::test]
async fn concurrent_identical_queries_share_one_request()
-> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    let filter = active_rooms();
    app.backend.pause_searches();

    let (first, second, ()) = tokio::join!(
        cache.query(&rooms, &filter),
        cache.query(&rooms, &filter),
        async {
            app.backend.wait_for_held(1).await;
            app.backend.release_all();
        },
    );

    assert_eq!(app.backend.search_calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.meta.map(|m| m.total), Some(6));
    assert!(!first.is_pending);

    Ok(())
}

#[tokio::test]
async fn pending_entry_is_visible_to_peek() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    let filter = FilterQuery::default();
    app.backend.pause_searches();

    let (state, ()) = tokio::join!(cache.query(&rooms, &filter), async {
        app.backend.wait_for_held(1).await;
        assert!(cache.peek(&rooms, &filter).is_pending);
        assert_eq!(
            cache.status(&CacheKey::list("room", &filter)),
            Some(EntryStatus::Pending)
        );
        app.backend.release_all();
    });

    assert!(state.error.is_none());
    assert_eq!(cache.peek(&rooms, &filter), state);

    Ok(())
}

#[tokio::test]
async fn successful_entries_are_served_from_cache() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();

    let first = cache.query(&rooms, &active_rooms()).await;
    let again = cache.query(&rooms, &active_rooms()).await;
    assert_eq!(first, again);
    assert_eq!(app.backend.search_calls(), 1);

    // a different filter is a different entry
    cache.query(&rooms, &FilterQuery::default()).await;
    assert_eq!(app.backend.search_calls(), 2);

    Ok(())
}

#[tokio::test]
async fn invalidation_forces_the_next_read_to_fetch() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    cache.query(&rooms, &active_rooms()).await;
    cache.query(&rooms, &FilterQuery::default()).await;
    cache.by_id(&rooms, EntityId(3)).await;

    assert_eq!(cache.invalidate("user", Scope::All), 0);
    assert_eq!(cache.invalidate("room", Scope::List(active_rooms())), 1);
    assert_eq!(
        cache.status(&CacheKey::list("room", &FilterQuery::default())),
        Some(EntryStatus::Success)
    );

    cache.query(&rooms, &active_rooms()).await;
    assert_eq!(app.backend.search_calls(), 3);

    assert_eq!(cache.invalidate("room", Scope::All), 3);

    Ok(())
}

#[tokio::test]
async fn errors_are_delivered_and_retried() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    app.backend.fail_next(
        Operation::Search,
        ClientError::ServerError(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "maintenance".into(),
        ),
    );

    let failed = cache.query(&rooms, &active_rooms()).await;
    assert!(failed.data.is_none());
    assert!(matches!(failed.error, Some(ClientError::ServerError(..))));
    assert_eq!(
        cache.status(&CacheKey::list("room", &active_rooms())),
        Some(EntryStatus::Error)
    );

    let retried = cache.query(&rooms, &active_rooms()).await;
    assert!(retried.error.is_none());
    assert_eq!(app.backend.search_calls(), 2);

    Ok(())
}

#[tokio::test]
async fn fetch_invalidated_in_flight_is_not_stored() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    let filter = FilterQuery::default();
    app.backend.pause_searches();

    let (state, ()) = tokio::join!(cache.query(&rooms, &filter), async {
        app.backend.wait_for_held(1).await;
        assert_eq!(cache.invalidate("room", Scope::Lists), 1);
        app.backend.release_all();
    });

    // the waiter still gets its answer
    assert!(state.data.is_some());
    assert_eq!(cache.status(&CacheKey::list("room", &filter)), None);

    Ok(())
}

#[tokio::test]
async fn by_id_and_dropdown_are_cached() -> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();

    let room = cache.by_id(&rooms, EntityId(4)).await;
    assert_eq!(
        room.data.as_ref().map(|r| r["name"].clone()),
        Some("Room 4".into())
    );
    assert!(room.meta.is_none());
    cache.by_id(&rooms, EntityId(4)).await;

    let missing = cache.by_id(&rooms, EntityId(99)).await;
    assert!(matches!(missing.error, Some(ClientError::NotFound(_))));

    let options = cache.dropdown(&rooms).await;
    assert_eq!(
        options.data.map(|o| o.as_array().map(Vec::len)),
        Some(Some(12))
    );
    cache.dropdown(&rooms).await;

    assert_eq!(app.backend.network_calls(), 3);

    Ok(())
}

#[tokio::test]
async fn after_write_invalidates_lists_and_the_edited_entity()
-> anyhow::Result<()> {
    let app = spawn_console();
    let rooms = rooms();
    let cache = app.console.cache();
    cache.query(&rooms, &active_rooms()).await;
    cache.dropdown(&rooms).await;
    cache.by_id(&rooms, EntityId(1)).await;
    cache.by_id(&rooms, EntityId(2)).await;

    cache.after_write("room", Some(EntityId(1)));

    assert_eq!(cache.status(&CacheKey::list("room", &active_rooms())), None);
    assert_eq!(cache.status(&CacheKey::dropdown("room")), None);
    assert_eq!(cache.status(&CacheKey::item("room", EntityId(1))), None);
    assert_eq!(
        cache.status(&CacheKey::item("room", EntityId(2))),
        Some(EntryStatus::Success)
    );

    cache.clear();
    assert_eq!(cache.status(&CacheKey::item("room", EntityId(2))), None);

    Ok(())
}
