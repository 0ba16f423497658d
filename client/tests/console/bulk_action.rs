use client::resource_cache::{CacheKey, EntryStatus};
use client::{BulkActionCoordinator, BulkOperation, Resource, Selection};
use payloads::{ClientError, EntityId, FilterQuery};
use test_helpers::mock::{Call, Operation};
use test_helpers::{TestConsole, assert_client_error, spawn_console};

fn rooms() -> Resource {
    Resource::new("room")
}

fn page(page: u32) -> FilterQuery {
    FilterQuery {
        page,
        ..FilterQuery::default()
    }
}

fn coordinator(app: &TestConsole) -> BulkActionCoordinator {
    BulkActionCoordinator::new(app.backend.clone(), app.console.cache().clone())
}

fn ids(ids: &[i64]) -> Vec<EntityId> {
    ids.iter().copied().map(EntityId).collect()
}

#[tokio::test]
async fn bulk_delete_invalidates_lists_and_rows() -> anyhow::Result<()> {
    let app = spawn_console();
    let cache = app.console.cache();
    cache.query(&rooms(), &page(1)).await;
    for id in [4, 5, 7] {
        cache.by_id(&rooms(), EntityId(id)).await;
    }
    let selection = Selection::new();
    selection.set(ids(&[4, 7]));

    coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::delete(ids(&[4, 7])),
            &selection,
            &page(1),
        )
        .await?;

    assert_eq!(cache.status(&CacheKey::list("room", &page(1))), None);
    assert_eq!(cache.status(&CacheKey::item("room", EntityId(4))), None);
    assert_eq!(cache.status(&CacheKey::item("room", EntityId(7))), None);
    assert_eq!(
        cache.status(&CacheKey::item("room", EntityId(5))),
        Some(EntryStatus::Success)
    );
    assert!(selection.is_empty());
    assert!(app.backend.calls().contains(&Call::DeleteMany {
        resource: "room".into(),
        ids: ids(&[4, 7]),
    }));
    assert_eq!(app.backend.rows("room").len(), 10);

    Ok(())
}

#[tokio::test]
async fn bulk_status_update_uses_one_request() -> anyhow::Result<()> {
    let app = spawn_console();
    let selection = Selection::new();
    selection.set(ids(&[1, 2, 3]));
    let before = app.backend.network_calls();

    coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::update_status(ids(&[1, 2, 3]), 0),
            &selection,
            &page(1),
        )
        .await?;

    assert_eq!(app.backend.network_calls(), before + 1);
    let rows = app.backend.rows("room");
    assert!(rows[..3].iter().all(|row| row["status"] == 0));
    assert!(selection.is_empty());

    Ok(())
}

#[tokio::test]
async fn empty_selection_is_rejected_locally() -> anyhow::Result<()> {
    let app = spawn_console();
    let selection = Selection::new();

    let result = coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::delete(ids(&[])),
            &selection,
            &page(1),
        )
        .await;

    assert!(matches!(result, Err(ClientError::InvalidInput(_))));
    assert_eq!(app.backend.network_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn failure_leaves_cache_and_selection_alone() -> anyhow::Result<()> {
    let app = spawn_console();
    let cache = app.console.cache();
    cache.query(&rooms(), &page(1)).await;
    let selection = Selection::new();
    selection.set(ids(&[4, 7]));
    app.backend.fail_next(
        Operation::DeleteMany,
        ClientError::Forbidden("not allowed to delete rooms".into()),
    );

    let result = coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::delete(ids(&[4, 7])),
            &selection,
            &page(1),
        )
        .await;

    assert_client_error(
        result,
        ClientError::Forbidden("not allowed to delete rooms".into()),
    );
    assert_eq!(selection.ids(), ids(&[4, 7]));
    assert_eq!(
        cache.status(&CacheKey::list("room", &page(1))),
        Some(EntryStatus::Success)
    );
    assert_eq!(app.backend.rows("room").len(), 12);

    Ok(())
}

#[tokio::test]
async fn row_status_change_invalidates_only_its_page_and_row()
-> anyhow::Result<()> {
    let app = spawn_console();
    let cache = app.console.cache();
    cache.query(&rooms(), &page(1)).await;
    cache.query(&rooms(), &page(2)).await;
    cache.by_id(&rooms(), EntityId(3)).await;
    cache.by_id(&rooms(), EntityId(4)).await;

    coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::row_status(EntityId(3), 0),
            &Selection::new(),
            &page(1),
        )
        .await?;

    assert!(app.backend.calls().contains(&Call::UpdateStatus {
        resource: "room".into(),
        id: EntityId(3),
        status: 0,
    }));
    assert_eq!(cache.status(&CacheKey::list("room", &page(1))), None);
    assert_eq!(cache.status(&CacheKey::item("room", EntityId(3))), None);
    assert_eq!(
        cache.status(&CacheKey::list("room", &page(2))),
        Some(EntryStatus::Success)
    );
    assert_eq!(
        cache.status(&CacheKey::item("room", EntityId(4))),
        Some(EntryStatus::Success)
    );

    Ok(())
}

#[tokio::test]
async fn row_delete_invalidates_every_list_page() -> anyhow::Result<()> {
    let app = spawn_console();
    let cache = app.console.cache();
    cache.query(&rooms(), &page(1)).await;
    cache.query(&rooms(), &page(2)).await;

    coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::row_delete(EntityId(12)),
            &Selection::new(),
            &page(1),
        )
        .await?;

    assert!(app.backend.calls().contains(&Call::Delete {
        resource: "room".into(),
        id: EntityId(12),
    }));
    assert_eq!(cache.status(&CacheKey::list("room", &page(1))), None);
    assert_eq!(cache.status(&CacheKey::list("room", &page(2))), None);

    Ok(())
}

#[tokio::test]
async fn single_selected_row_still_uses_the_batch_endpoint()
-> anyhow::Result<()> {
    let app = spawn_console();
    let cache = app.console.cache();
    cache.query(&rooms(), &page(2)).await;
    let selection = Selection::new();
    selection.set(ids(&[4]));

    coordinator(&app)
        .run(
            &rooms(),
            &BulkOperation::update_status(ids(&[4]), 0),
            &selection,
            &page(1),
        )
        .await?;

    assert_eq!(
        app.backend.calls().pop(),
        Some(Call::UpdateStatusMany {
            resource: "room".into(),
            ids: ids(&[4]),
            status: 0,
        })
    );
    assert_eq!(
        app.backend
            .count(|call| matches!(call, Call::UpdateStatus { .. })),
        0
    );
    // a selection change may move rows between pages
    assert_eq!(cache.status(&CacheKey::list("room", &page(2))), None);
    assert!(selection.is_empty());

    Ok(())
}

#[tokio::test]
async fn row_action_on_several_rows_is_rejected() -> anyhow::Result<()> {
    let app = spawn_console();
    let mut operation = BulkOperation::row_delete(EntityId(1));
    operation.ids.push(EntityId(2));

    let result = coordinator(&app)
        .run(&rooms(), &operation, &Selection::new(), &page(1))
        .await;

    assert!(matches!(result, Err(ClientError::InvalidInput(_))));
    assert_eq!(app.backend.network_calls(), 0);

    Ok(())
}
