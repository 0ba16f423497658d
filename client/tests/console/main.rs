mod bulk_action;
mod list_controller;
mod resource_cache;
mod token_store;

use client::Access;
use jiff::Span;
use test_helpers::spawn_console;

#[tokio::test]
async fn valid_session_enters_without_network() -> anyhow::Result<()> {
    let app = spawn_console();
    app.sign_in_expiring_in(Span::new().hours(8));

    assert_eq!(app.console.enter("/room").await, Access::Granted);
    assert_eq!(app.backend.network_calls(), 0);
    assert!(app.navigator.redirects().is_empty());

    Ok(())
}
