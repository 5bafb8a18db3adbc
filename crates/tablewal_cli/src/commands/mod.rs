//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod source;
pub mod verify;
