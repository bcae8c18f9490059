//! Library surface of the ringknn CLI, exposed for integration tests and
//! doctests.

pub mod cli;
pub mod logging;
pub mod verify;
