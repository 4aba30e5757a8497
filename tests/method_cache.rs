//! Method cache population and lookup.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_runtime::context::Resolved;
use relay_runtime::protocol::RpcError;
use relay_runtime::registry::{
    CallContext, MethodCache, MethodOptions, MethodSource, MethodTable, RegistryError,
};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn ok(
    _params: Value,
    _call: CallContext,
    _context: Resolved,
    _event: Arc<Value>,
) -> Result<Value, RpcError> {
    Ok(json!("ok"))
}

fn table() -> MethodTable {
    MethodTable::new()
        .method("users.get", ok, MethodOptions::new())
        .unwrap()
        .method(
            "users.create",
            ok,
            MethodOptions::new().param("name", "string.required"),
        )
        .unwrap()
}

#[tokio::test]
async fn test_enumerator_called_once_under_concurrency() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let cache = Arc::new(MethodCache::new(table(), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, RegistryError>(MethodSource::Names(vec![
                "users.get".to_string(),
                "users.create".to_string(),
            ]))
        }
    })
    .with_prefix(""));

    let lookups = (0..8).map(|i| {
        let cache = cache.clone();
        tokio::spawn(async move {
            let name = if i % 2 == 0 { "users.get" } else { "users.create" };
            cache.resolve(name).await.map(|d| d.is_not_found())
        })
    });

    for lookup in futures::future::join_all(lookups).await {
        assert!(!lookup.unwrap().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let first = cache.resolve("users.create").await.unwrap();
    let second = cache.resolve("users.create").await.unwrap();
    assert_eq!(first.options(), second.options());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_population_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let cache = MethodCache::new(table(), move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(RegistryError::Enumerate("listing timed out".to_string()))
            } else {
                Ok(MethodSource::Names(vec!["users.get".to_string()]))
            }
        }
    })
    .with_prefix("");

    let err = cache.resolve("users.get").await.unwrap_err();
    assert!(matches!(err, RegistryError::Enumerate(_)));
    assert!(!cache.is_populated());

    assert!(!cache.resolve("users.get").await.unwrap().is_not_found());
    assert!(cache.resolve("users.create").await.unwrap().is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_manifest_overrides_linked_options() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("_users.create.toml"),
        r#"
description = "Create a user"
auth = true

[validation]
name = "string.min(3).required"
age = "number.integer.min(18)"
"#,
    )
    .unwrap();
    fs::write(dir.path().join("_users.get.toml"), "").unwrap();
    fs::write(dir.path().join("README.md"), "not a method").unwrap();

    let cache = MethodCache::new(table(), MethodSource::Directory(dir.path().to_path_buf()));

    let create = cache.resolve("users.create").await.unwrap();
    assert!(create.options().auth);
    assert_eq!(create.options().description.as_deref(), Some("Create a user"));
    assert_eq!(create.options().validation.len(), 2);

    let err = create
        .validate(Some(&json!({"name": "Al", "age": 12})))
        .unwrap_err();
    assert_eq!(
        err.details().unwrap(),
        &[
            "\"name\" length must be at least 3 characters long".to_string(),
            "\"age\" must be greater than or equal to 18".to_string(),
        ]
    );

    // an empty manifest resets the linked options
    let get = cache.resolve("users.get").await.unwrap();
    assert!(!get.is_not_found());
    assert!(get.options().validation.is_empty());

    assert_eq!(cache.methods().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_manifest_key_fails_population() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("_users.get.toml"), "timeout = 3\n").unwrap();

    let cache = MethodCache::new(table(), MethodSource::Directory(dir.path().to_path_buf()));
    let err = cache.resolve("users.get").await.unwrap_err();

    assert!(matches!(err, RegistryError::Manifest { .. }));
    assert_eq!(RpcError::from(err).status_code(), 500);
}
