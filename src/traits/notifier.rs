use async_trait::async_trait;
use serde_json::Value;

/// Side-channel told about every value a service produces outside the cache.
///
/// Called from a spawned task once the run has recorded the node, so a slow
/// notifier never delays scheduling.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, service: &str, value: &Value, config: &Value);
}
