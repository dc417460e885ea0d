use thiserror::Error;

use crate::commands::RegistrationError;

/// Failures that stop the bot before it starts serving interactions.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot open the gateway session: {0}")]
    Connection(#[from] serenity::Error),
    #[error("the gateway session closed before the bot was ready")]
    ConnectionLost,
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
impl StartupError {
    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config(format!("{err:#}"))
    }
}
