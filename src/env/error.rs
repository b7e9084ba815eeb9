use std::{error::Error, fmt::Display};

/// A build-time failure from the [`super::Environment`] builder: a
/// duplicate variable declaration or a colliding/duplicate function
/// overload. This is the first of the four error strata (spec §7);
/// unlike check issues and evaluation errors it is surfaced synchronously,
/// not collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub message: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> BuildError {
        BuildError {
            message: message.into(),
        }
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for BuildError {}
