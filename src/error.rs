use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by plugins, remotes and storage backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by canister.
///
/// Every source sits behind an `Arc` so one settled failure can be handed to
/// every caller that was deduplicated onto the same in-flight call.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("plugin `{name}` failed: {source}")]
    Plugin {
        name: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("plugin kept deferring after {limit} rounds")]
    DeferralLimit { limit: usize },

    #[error("remote {op} failed: {source}")]
    Remote {
        op: &'static str,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("storage error: {0}")]
    Storage(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),
}

impl Error {
    /// Wrap a plugin construction failure.
    pub fn plugin(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Plugin {
            name: name.into(),
            source: Arc::from(source.into()),
        }
    }

    /// Wrap a failure of a user-supplied push, pull or delete.
    pub fn remote(op: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Remote {
            op,
            source: Arc::from(source.into()),
        }
    }

    /// Wrap a storage backend failure.
    pub fn storage(source: impl Into<BoxError>) -> Self {
        Self::Storage(Arc::from(source.into()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
