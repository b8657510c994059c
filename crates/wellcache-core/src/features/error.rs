use thiserror::Error;

use crate::mutation::MutationError;
use crate::remote::RemoteError;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("No plan loaded")]
    NoPlan,

    #[error("Plan has no day {0}")]
    UnknownDay(u32),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}
