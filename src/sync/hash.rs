use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Turns the JSON form of a call's inputs into its identity key.
///
/// Two calls with equal keys are treated as the same logical call.
#[derive(Clone)]
pub struct KeyFn(Arc<dyn Fn(&Value) -> String + Send + Sync>);

impl KeyFn {
    /// Derive keys with `f` instead of [`stringify`].
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Serialize `input` and derive its key.
    pub fn key<S: Serialize + ?Sized>(&self, input: &S) -> Result<String> {
        let value = serde_json::to_value(input)?;
        Ok((self.0)(&value))
    }
}

/// Structural stringification: the compact JSON text of the value with
/// object keys sorted at every depth.
///
/// Keys are sorted explicitly rather than relying on how `serde_json::Map`
/// orders them, so structurally equal inputs give the same key even when
/// `serde_json/preserve_order` is enabled somewhere in the build.
pub fn stringify(value: &Value) -> String {
    canonical(value).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonical(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl Default for KeyFn {
    fn default() -> Self {
        Self::new(stringify)
    }
}

impl fmt::Debug for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyFn")
    }
}
