use client::{BulkOperation, FilterUpdate, Resource};
use jiff::Span;
use payloads::{ClientError, EntityId};
use serde::Deserialize;
use std::time::Duration;
use test_helpers::mock::{Call, Operation};
use test_helpers::spawn_console;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Room {
    id: EntityId,
    name: String,
    status: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Booking {
    id: EntityId,
    room_id: i64,
}

fn rooms() -> Resource {
    Resource::new("room").base_path("admin/room")
}

fn ids(rows: &[Room]) -> Vec<i64> {
    rows.iter().map(|room| room.id.0).collect()
}

#[tokio::test]
async fn first_page_loads_with_defaults() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");

    list.refresh().await;

    let view = list.snapshot();
    assert_eq!(view.query.page, 1);
    assert_eq!(view.query.page_size, 10);
    assert_eq!(view.rows.len(), 10);
    assert_eq!(view.rows[0].name, "Room 1");
    assert_eq!((view.meta.total, view.meta.page_count), (12, 2));
    assert!(!view.is_pending);
    assert_eq!(view.error, None);

    Ok(())
}

#[tokio::test]
async fn filter_change_returns_to_first_page() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");

    assert_eq!(list.update(FilterUpdate::new().page(3)).await.page, 3);
    let query = list.update(FilterUpdate::new().status("2")).await;

    assert_eq!(query.page, 1);
    assert_eq!(query.status.as_deref(), Some("2"));
    assert_eq!(list.committed(), query);
    let last = app.backend.calls().pop();
    assert_eq!(
        last,
        Some(Call::Search {
            resource: "room".into(),
            filter: query
        })
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn text_search_waits_for_typing_to_stop() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;
    let searches = app.backend.search_calls();

    let shown = list.update(FilterUpdate::new().text_search("Room 1")).await;
    assert_eq!(shown.text_search.as_deref(), Some("Room 1"));
    assert_eq!(list.query().text_search.as_deref(), Some("Room 1"));
    assert_eq!(list.committed().text_search, None);

    tokio::time::advance(Duration::from_millis(300)).await;
    list.update(FilterUpdate::new().text_search("Room 11")).await;
    tokio::time::advance(Duration::from_millis(699)).await;
    assert!(!list.tick().await);
    assert_eq!(app.backend.search_calls(), searches);

    list.settle().await;

    assert_eq!(app.backend.search_calls(), searches + 1);
    let view = list.snapshot();
    assert_eq!(view.query.text_search.as_deref(), Some("Room 11"));
    assert_eq!(ids(&view.rows), [11]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_change_flushes_pending_text() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");

    list.update(FilterUpdate::new().text_search("Room 1")).await;
    list.update(FilterUpdate::new().status("0")).await;

    assert_eq!(app.backend.search_calls(), 1);
    let view = list.snapshot();
    assert_eq!(view.query.text_search.as_deref(), Some("Room 1"));
    assert_eq!(ids(&view.rows), [10, 12]);

    Ok(())
}

#[tokio::test]
async fn superseded_response_is_discarded() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    app.backend.pause_searches();

    let active = tokio::spawn({
        let list = list.clone();
        async move { list.update(FilterUpdate::new().status("1")).await }
    });
    app.backend.wait_for_held(1).await;
    let inactive = tokio::spawn({
        let list = list.clone();
        async move { list.update(FilterUpdate::new().status("0")).await }
    });
    app.backend.wait_for_held(2).await;
    assert!(list.snapshot().is_pending);

    // the newer request answers first
    app.backend.release_search(1);
    inactive.await?;
    let view = list.snapshot();
    assert!(view.rows.iter().all(|room| room.status == 0));
    assert!(!view.is_pending);

    app.backend.release_search(0);
    active.await?;
    assert_eq!(list.snapshot().rows, view.rows);
    assert_eq!(list.committed().status.as_deref(), Some("0"));

    Ok(())
}

#[tokio::test]
async fn bulk_delete_refetches_and_clears_selection() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;
    list.selection().toggle(EntityId(1));
    list.selection().toggle(EntityId(3));

    let selected = list.selection().ids();
    list.run_bulk(&BulkOperation::delete(selected)).await?;

    let view = list.snapshot();
    assert!(list.selection().is_empty());
    assert_eq!(view.rows[0].id, EntityId(2));
    assert_eq!(view.meta.total, 10);
    assert_eq!(app.backend.search_calls(), 2);

    Ok(())
}

#[tokio::test]
async fn one_selected_row_is_deleted_through_the_batch_endpoint()
-> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;
    list.selection().set([EntityId(4)]);

    list.run_bulk(&BulkOperation::delete(list.selection().ids()))
        .await?;

    let calls = app.backend.calls();
    assert!(calls.contains(&Call::DeleteMany {
        resource: "room".into(),
        ids: vec![EntityId(4)],
    }));
    assert!(!calls.iter().any(|call| matches!(call, Call::Delete { .. })));
    assert!(list.selection().is_empty());
    assert!(!ids(&list.snapshot().rows).contains(&4));

    Ok(())
}

#[tokio::test]
async fn emptying_the_last_page_steps_back() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.update(FilterUpdate::new().page(2)).await;
    assert_eq!(ids(&list.snapshot().rows), [11, 12]);

    list.run_bulk(&BulkOperation::delete(vec![EntityId(11), EntityId(12)]))
        .await?;

    let view = list.snapshot();
    assert_eq!(view.query.page, 1);
    assert_eq!(view.meta.page_count, 1);
    assert_eq!(view.rows.len(), 10);

    Ok(())
}

#[tokio::test]
async fn row_actions_use_row_endpoints() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;

    list.update_row_status(EntityId(2), 1).await?;
    assert_eq!(list.snapshot().rows[1].status, 1);

    list.delete_row(EntityId(2)).await?;
    assert_eq!(ids(&list.snapshot().rows)[..2], [1, 3]);

    let calls = app.backend.calls();
    assert!(calls.contains(&Call::UpdateStatus {
        resource: "room".into(),
        id: EntityId(2),
        status: 1
    }));
    assert!(calls.contains(&Call::Delete {
        resource: "room".into(),
        id: EntityId(2)
    }));

    Ok(())
}

#[tokio::test]
async fn unauthorized_fetch_ends_the_session() -> anyhow::Result<()> {
    let app = spawn_console();
    app.sign_in_expiring_in(Span::new().hours(8));
    let list = app.console.list::<Room>(rooms(), "/room");
    app.backend.fail_next(Operation::Search, ClientError::AuthExpired);

    list.refresh().await;

    assert_eq!(list.snapshot().error, Some(ClientError::AuthExpired));
    assert_eq!(
        app.navigator.last_url().as_deref(),
        Some("/auth/login?message=must_be_logged_in&redirect=/room")
    );
    assert_eq!(app.console.tokens().access_token(), None);

    Ok(())
}

#[tokio::test]
async fn unauthorized_bulk_action_ends_the_session() -> anyhow::Result<()> {
    let app = spawn_console();
    app.sign_in_expiring_in(Span::new().hours(8));
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;
    list.selection().set([EntityId(1), EntityId(2)]);
    app.backend
        .fail_next(Operation::UpdateStatusMany, ClientError::AuthExpired);

    let result = list
        .run_bulk(&BulkOperation::update_status(list.selection().ids(), 0))
        .await;

    assert_eq!(result, Err(ClientError::AuthExpired));
    assert_eq!(list.selection().len(), 2);
    assert_eq!(app.console.tokens().refresh_token(), None);
    assert_eq!(app.navigator.redirects().len(), 1);

    Ok(())
}

#[tokio::test]
async fn inline_errors_stay_local_and_clear_on_success() -> anyhow::Result<()> {
    let app = spawn_console();
    app.sign_in_expiring_in(Span::new().hours(8));
    let list = app.console.list::<Room>(rooms(), "/room");
    app.backend.fail_next(
        Operation::Search,
        ClientError::Forbidden("admins only".into()),
    );

    list.refresh().await;
    assert_eq!(
        list.snapshot().error,
        Some(ClientError::Forbidden("admins only".into()))
    );
    assert!(app.navigator.redirects().is_empty());
    assert!(app.console.tokens().access_token().is_some());

    list.refresh().await;
    let view = list.snapshot();
    assert_eq!(view.error, None);
    assert_eq!(view.rows.len(), 10);

    Ok(())
}

#[tokio::test]
async fn only_declared_filter_keys_reach_the_backend() -> anyhow::Result<()> {
    let app = spawn_console();
    let bookings = Resource::new("booking_list")
        .base_path("admin/booking_list")
        .filter_key("room_id");
    let list = app.console.list::<Booking>(bookings, "/booking_list");

    let query = list
        .update(
            FilterUpdate::new()
                .filter("room_id", "2")
                .filter("role_id", "3"),
        )
        .await;

    assert_eq!(query.get("room_id"), Some("2"));
    assert_eq!(query.get("role_id"), None);
    let view = list.snapshot();
    assert_eq!(view.rows.len(), 3);
    assert!(view.rows.iter().all(|booking| booking.room_id == 2));
    assert_eq!(
        view.rows.iter().map(|b| b.id).collect::<Vec<_>>(),
        [EntityId(2), EntityId(5), EntityId(8)]
    );

    Ok(())
}

#[tokio::test]
async fn invalidating_the_shown_page_clears_selection() -> anyhow::Result<()> {
    let app = spawn_console();
    let list = app.console.list::<Room>(rooms(), "/room");
    list.refresh().await;
    list.selection().set([EntityId(5)]);

    // a cached reload keeps it
    list.refresh().await;
    assert!(list.selection().contains(EntityId(5)));

    app.console.cache().after_write("room", None);
    list.refresh().await;
    assert!(list.selection().is_empty());
    assert_eq!(app.backend.search_calls(), 2);

    Ok(())
}
