//! Redis-backed key/value port used for locks and recent-write flags.

use std::time::Duration;

use async_trait::async_trait;
use datatag_application::{AtomicScript, KvBackend, KvValue, ttl_millis};
use datatag_core::{AppError, AppResult};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script, Value};

const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const COMPARE_AND_EXPIRE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of the key/value port.
#[derive(Clone)]
pub struct RedisKvBackend {
    client: redis::Client,
}

impl RedisKvBackend {
    /// Creates one backend adapter.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Opens a client for `redis_url` and wraps it.
    pub fn open(redis_url: &str) -> AppResult<Self> {
        redis::Client::open(redis_url)
            .map(Self::new)
            .map_err(|error| AppError::Validation(format!("invalid redis url: {error}")))
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Backend(format!("failed to connect to redis: {error}")))
    }
}

fn script_source(script: AtomicScript) -> &'static str {
    match script {
        AtomicScript::CompareAndDelete => COMPARE_AND_DELETE_SCRIPT,
        AtomicScript::CompareAndExpire => COMPARE_AND_EXPIRE_SCRIPT,
    }
}

fn to_kv_value(value: Value) -> KvValue {
    match value {
        Value::Nil => KvValue::Nil,
        Value::Int(number) => KvValue::Int(number),
        Value::BulkString(bytes) => KvValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(text) => KvValue::Text(text),
        Value::Okay => KvValue::Text("OK".to_owned()),
        other => KvValue::Other(format!("{other:?}")),
    }
}

#[async_trait]
impl KvBackend for RedisKvBackend {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Backend(format!("failed to set '{key}' if absent: {error}"))
            })?;

        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection().await?;

        connection
            .pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|error| AppError::Backend(format!("failed to set '{key}': {error}")))
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;

        connection
            .get(key)
            .await
            .map_err(|error| AppError::Backend(format!("failed to read '{key}': {error}")))
    }

    async fn delete(&self, key: &str) -> AppResult<u64> {
        let mut connection = self.connection().await?;

        connection
            .del(key)
            .await
            .map_err(|error| AppError::Backend(format!("failed to delete '{key}': {error}")))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let ttl_ms = i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX);
        let mut connection = self.connection().await?;

        connection
            .pexpire(key, ttl_ms)
            .await
            .map_err(|error| AppError::Backend(format!("failed to expire '{key}': {error}")))
    }

    async fn eval_script(
        &self,
        script: AtomicScript,
        keys: &[&str],
        args: &[&str],
    ) -> AppResult<KvValue> {
        let source = Script::new(script_source(script));
        let mut invocation = source.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(*arg);
        }

        let mut connection = self.connection().await?;
        let reply: Value = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Backend(format!("failed to run {} script: {error}", script.name()))
            })?;

        Ok(to_kv_value(reply))
    }
}
