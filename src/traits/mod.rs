pub mod notifier;
pub mod selector;

pub use notifier::Notifier;
pub use selector::{Variant, VariantSelector};
