use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Saving {resource} failed, local changes were reverted: {source}")]
    RolledBack {
        resource: String,
        #[source]
        source: RemoteError,
    },
}

impl MutationError {
    /// The remote failure that caused the rollback.
    pub fn remote(&self) -> &RemoteError {
        match self {
            MutationError::RolledBack { source, .. } => source,
        }
    }
}
