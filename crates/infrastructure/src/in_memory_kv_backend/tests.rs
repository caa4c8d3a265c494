use std::time::Duration;

use datatag_application::{AtomicScript, KvBackend, KvValue};
use datatag_core::AppError;

use super::{InMemoryKvBackend, KvFault};

#[tokio::test(start_paused = true)]
async fn set_if_absent_is_exclusive_until_expiry() {
    let backend = InMemoryKvBackend::new();

    let first = backend
        .set_if_absent("job:1", "node-a", Duration::from_secs(1))
        .await;
    let second = backend
        .set_if_absent("job:1", "node-b", Duration::from_secs(1))
        .await;
    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));

    tokio::time::sleep(Duration::from_millis(1_001)).await;

    let after_expiry = backend
        .set_if_absent("job:1", "node-b", Duration::from_secs(1))
        .await;
    assert!(matches!(after_expiry, Ok(true)));
    assert!(matches!(backend.get("job:1").await, Ok(Some(ref value)) if value == "node-b"));
}

#[tokio::test(start_paused = true)]
async fn overflowing_ttl_keeps_the_key_held() {
    let backend = InMemoryKvBackend::new();

    let first = backend.set_if_absent("job:1", "node-a", Duration::MAX).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = backend
        .set_if_absent("job:1", "node-b", Duration::from_secs(1))
        .await;

    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));
    assert!(matches!(backend.get("job:1").await, Ok(Some(ref value)) if value == "node-a"));

    let _ = backend.set("flag", "1", Duration::MAX).await;
    assert!(matches!(
        backend.set_expiry("flag", Duration::MAX).await,
        Ok(true)
    ));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(matches!(backend.get("flag").await, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn key_is_still_live_at_its_exact_expiry_instant() {
    let backend = InMemoryKvBackend::new();
    let _ = backend.set("flag", "1", Duration::from_secs(1)).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(matches!(backend.get("flag").await, Ok(Some(_))));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(matches!(backend.get("flag").await, Ok(None)));
}

#[tokio::test(start_paused = true)]
async fn set_replaces_value_and_ttl() {
    let backend = InMemoryKvBackend::new();
    let _ = backend.set("flag", "1", Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(800)).await;
    let _ = backend.set("flag", "1", Duration::from_secs(1)).await;

    tokio::time::sleep(Duration::from_millis(800)).await;

    assert!(matches!(backend.get("flag").await, Ok(Some(_))));
    assert_eq!(backend.ttl("flag").await, Some(Duration::from_millis(200)));
}

#[tokio::test]
async fn compare_and_delete_only_removes_own_value() {
    let backend = InMemoryKvBackend::new();
    let _ = backend
        .set_if_absent("job:1", "node-a", Duration::from_secs(5))
        .await;

    let foreign = backend
        .eval_script(AtomicScript::CompareAndDelete, &["job:1"], &["node-b"])
        .await;
    assert!(matches!(foreign, Ok(KvValue::Int(0))));
    assert!(matches!(backend.get("job:1").await, Ok(Some(_))));

    let own = backend
        .eval_script(AtomicScript::CompareAndDelete, &["job:1"], &["node-a"])
        .await;
    assert!(matches!(own, Ok(KvValue::Int(1))));
    assert!(matches!(backend.get("job:1").await, Ok(None)));
}

#[tokio::test(start_paused = true)]
async fn compare_and_expire_only_extends_own_value() {
    let backend = InMemoryKvBackend::new();
    let _ = backend
        .set_if_absent("job:1", "node-a", Duration::from_secs(5))
        .await;

    let foreign = backend
        .eval_script(
            AtomicScript::CompareAndExpire,
            &["job:1"],
            &["node-b", "60000"],
        )
        .await;
    assert!(matches!(foreign, Ok(KvValue::Int(0))));
    assert_eq!(backend.ttl("job:1").await, Some(Duration::from_secs(5)));

    let own = backend
        .eval_script(
            AtomicScript::CompareAndExpire,
            &["job:1"],
            &["node-a", "60000"],
        )
        .await;
    assert!(matches!(own, Ok(KvValue::Int(1))));
    assert_eq!(backend.ttl("job:1").await, Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn compare_and_expire_rejects_non_numeric_ttl() {
    let backend = InMemoryKvBackend::new();
    let _ = backend
        .set_if_absent("job:1", "node-a", Duration::from_secs(5))
        .await;

    let result = backend
        .eval_script(AtomicScript::CompareAndExpire, &["job:1"], &["node-a", "soon"])
        .await;

    assert!(matches!(result, Err(AppError::Backend(_))));
}

#[tokio::test(start_paused = true)]
async fn expired_keys_do_not_count_for_delete_or_expiry() {
    let backend = InMemoryKvBackend::new();
    let _ = backend.set("flag", "1", Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(matches!(
        backend.set_expiry("flag", Duration::from_secs(5)).await,
        Ok(false)
    ));
    assert!(matches!(backend.delete("flag").await, Ok(0)));
}

#[tokio::test]
async fn injected_script_fault_leaves_plain_commands_working() {
    let backend = InMemoryKvBackend::new();
    backend.inject_fault(KvFault::Scripts);

    let acquired = backend
        .set_if_absent("job:1", "node-a", Duration::from_secs(5))
        .await;
    let renewed = backend
        .eval_script(
            AtomicScript::CompareAndExpire,
            &["job:1"],
            &["node-a", "5000"],
        )
        .await;

    assert!(matches!(acquired, Ok(true)));
    assert!(matches!(renewed, Err(AppError::Backend(_))));

    backend.inject_fault(KvFault::All);
    assert!(matches!(backend.get("job:1").await, Err(AppError::Backend(_))));

    backend.inject_fault(KvFault::None);
    assert!(matches!(backend.get("job:1").await, Ok(Some(_))));
}
