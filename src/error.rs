use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid {key} value: {reason}")]
    Config { key: String, reason: String },

    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Admin(#[from] crate::admin::AdminError),

    #[error("{0}")]
    Vote(#[from] crate::vote::VoteFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
