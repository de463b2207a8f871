use serde_json::Value;

use crate::engine::Executable;
use crate::errors::ServiceError;

/// The body and dependency list that apply to one service for one configuration.
#[derive(Debug, Clone)]
pub struct Variant {
    pub executable: Executable,
    pub dependencies: Vec<String>,
}

/// Picks the variant of a service that applies to a run-time configuration.
///
/// The engine only ever asks for a variant by configuration; how rules are
/// registered and matched is up to the implementation.
pub trait VariantSelector: Send + Sync {
    /// Select the variant for `config`, or fail with `ServiceError::NotFound`.
    fn select(&self, service: &str, config: &Value) -> Result<Variant, ServiceError>;

    /// Dependency names for `config` without consuming anything.
    ///
    /// Used for introspection; implementations with one-shot rules must not
    /// spend them here.
    fn inspect(&self, service: &str, config: &Value) -> Result<Vec<String>, ServiceError> {
        self.select(service, config).map(|variant| variant.dependencies)
    }
}
