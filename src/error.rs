use thiserror::Error;

use crate::config::ConfigError;
use crate::interaction::InteractionError;
use crate::loader::LoadError;
use crate::platform::PlatformError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Load error: {0}")]
    Load(#[from] LoadError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    // remote platform
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Interaction error: {0}")]
    Interaction(#[from] InteractionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
