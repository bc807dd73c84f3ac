//! Registry of named domain types decodable from JSON payloads

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

type Decoder = Box<dyn Fn(Value) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync>;

/// Maps declared object type names to `serde` decoders
#[derive(Default)]
pub struct TypeRegistry {
    decoders: HashMap<String, Decoder>,
}

impl TypeRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `type_name`, replacing any previous decoder
    pub fn register<T>(&mut self, type_name: impl Into<String>) -> &mut Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.decoders.insert(
            type_name.into(),
            Box::new(|value| {
                let decoded: T = serde_json::from_value(value)?;
                Ok(Arc::new(decoded) as Arc<dyn Any + Send + Sync>)
            }),
        );
        self
    }

    /// Whether a decoder is registered for `type_name`
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Decode `payload` as the type registered under `type_name`
    ///
    /// # Errors
    ///
    /// Returns error if the type is unknown or the payload does not match it
    pub fn decode(&self, type_name: &str, payload: Value) -> Result<Arc<dyn Any + Send + Sync>> {
        let decoder = self
            .decoders
            .get(type_name)
            .ok_or_else(|| Error::Decode(format!("unknown type: {type_name}")))?;
        decoder(payload).map_err(|e| Error::Decode(format!("{type_name}: {e}")))
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
