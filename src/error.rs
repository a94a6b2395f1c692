use thiserror::Error;

/// Failures of a core operation, by how they reach the acting user.
#[derive(Debug, Error)]
pub enum BotError {
    /// Input failed a field constraint; the same step is asked again.
    #[error("{0}")]
    Validation(String),

    /// The relation the operation needs does not exist. Nothing was written.
    #[error("{0}")]
    NotFound(&'static str),

    #[error("record store: {0}")]
    Store(#[from] sqlx::Error),

    #[error("media store: {0:#}")]
    Media(anyhow::Error),

    #[error("messaging endpoint: {0:#}")]
    Transport(anyhow::Error),
}

pub const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again later.";

impl BotError {
    /// Text shown to the user the failure belongs to.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(msg) => (*msg).to_owned(),
            Self::Store(_) | Self::Media(_) | Self::Transport(_) => GENERIC_FAILURE.to_owned(),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Media(_) | Self::Transport(_))
    }
}
