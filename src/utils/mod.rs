//! The `utils` module provides the pieces shared by every other module of
//! `chatbus`: the error types and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{EnvelopeError, ServerError, SessionError};
