use client::storage::{FileStorage, Storage, StorageError};
use client::token_store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TokenStore};
use jiff::Span;
use secrecy::SecretBox;
use std::sync::Arc;
use test_helpers::spawn_console;

#[tokio::test]
async fn token_survives_reload_encrypted() -> anyhow::Result<()> {
    let app = spawn_console();
    let pair = app.sign_in_expiring_in(Span::new().hours(8));

    let at_rest = app.storage.raw(ACCESS_TOKEN_KEY).expect("stored");
    assert!(!at_rest.contains(&pair.access_token));

    let reloaded = app.reload();
    assert_eq!(
        reloaded.console.tokens().access_token(),
        Some(pair.access_token)
    );
    assert_eq!(
        reloaded.console.tokens().refresh_token(),
        Some(pair.refresh_token)
    );
    assert!(reloaded.console.enter("/room").await.is_granted());

    Ok(())
}

#[tokio::test]
async fn file_storage_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("console.json");
    let key = || SecretBox::new(Box::new("file-key".to_string()));

    let first =
        TokenStore::new(Arc::new(FileStorage::new(path.clone())), &key());
    first.set(ACCESS_TOKEN_KEY, "header.payload.signature");

    let second =
        TokenStore::new(Arc::new(FileStorage::new(path.clone())), &key());
    assert_eq!(
        second.get(ACCESS_TOKEN_KEY).as_deref(),
        Some("header.payload.signature")
    );

    second.clear();
    let third = TokenStore::new(Arc::new(FileStorage::new(path)), &key());
    assert_eq!(third.get(ACCESS_TOKEN_KEY), None);

    Ok(())
}

#[tokio::test]
async fn tampered_or_foreign_values_read_as_no_token() -> anyhow::Result<()> {
    let app = spawn_console();
    app.sign_in_expiring_in(Span::new().hours(8));

    app.storage.set(REFRESH_TOKEN_KEY, "plaintext-refresh-token")?;
    assert_eq!(app.console.tokens().refresh_token(), None);

    let other_key = TokenStore::new(
        app.storage.clone(),
        &SecretBox::new(Box::new("another-key".to_string())),
    );
    assert_eq!(other_key.access_token(), None);

    Ok(())
}

struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".into()))
    }
}

#[tokio::test]
async fn unavailable_storage_never_fails() -> anyhow::Result<()> {
    let tokens = TokenStore::new(
        Arc::new(UnavailableStorage),
        &SecretBox::new(Box::new("key".to_string())),
    );

    tokens.set(ACCESS_TOKEN_KEY, "value");
    assert_eq!(tokens.access_token(), None);
    tokens.clear();

    Ok(())
}
