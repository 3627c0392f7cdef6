/// Ordered map with stable positions.
pub mod rb_map;

pub use rb_map::RbMap;

use std::error::Error;
use std::fmt;

/// Error returned by container operations that check their arguments.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContainerError {
    /// Bounds-checked lookup found no entry for the key.
    KeyNotFound,
    /// The position is `end()`, belongs to another container, refers to an entry that
    /// has been removed, or stepping from it would leave the container.
    InvalidPosition,
}

impl Error for ContainerError {}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::KeyNotFound => f.write_str("no entry found for key"),
            ContainerError::InvalidPosition => f.write_str("invalid position"),
        }
    }
}
