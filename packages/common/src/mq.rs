use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Core trait for all MQ messages
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    /// Identifier consumers deduplicate on.
    fn message_id(&self) -> &str;
}
