//! Names, tags and command lines.

use uuid::Uuid;

use crate::error::{RespawnError, Result};

/// Tag applied to every image built or committed for an instance.
pub const IMAGE_TAG: &str = "latest";

/// Checks that `name` can be used for an image and container pair.
///
/// Accepted names match the engine's container name pattern
/// `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
///
/// # Errors
///
/// Returns `InvalidName` if the name is empty, contains whitespace, or
/// uses any other character outside that pattern.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(RespawnError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Returns the image reference for an instance name.
#[must_use]
pub fn image_tag(name: &str) -> String {
    format!("{name}:{IMAGE_TAG}")
}

/// Generates a unique name for a disposable replacement container.
#[must_use]
pub fn disposable_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..12])
}

/// Splits a command line into arguments using shell word rules.
///
/// # Errors
///
/// Returns `InvalidCommand` if quoting is unbalanced or there are no words.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    match shlex::split(command) {
        Some(args) if !args.is_empty() => Ok(args),
        _ => Err(RespawnError::InvalidCommand(command.to_string())),
    }
}
