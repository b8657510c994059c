//! The signed-in user. Cache keys are scoped by the user id held here.

pub mod session;

pub use session::{Session, SessionData};
