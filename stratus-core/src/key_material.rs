//! SSH public key resolution
//!
//! A key source is either a path to a public-key file or the key itself.
//! Paths may reference environment variables (`$HOME/.ssh/id_rsa.pub`).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while resolving key material
#[derive(Debug, Error)]
pub enum KeyResolutionError {
    /// The path exists but could not be read
    #[error("Failed to read public key {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The resolved key is empty
    #[error("Public key from {origin} is empty")]
    Empty { origin: String },
}

/// Where the key material came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    Inline,
}

/// Resolved SSH public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub source: KeySource,
    pub public_key: String,
}

/// Resolve a key source into key material
///
/// If the source (after environment variable expansion) names an existing
/// path, the last line of that file is the key. Otherwise the source itself
/// is the key.
pub fn resolve(key_source: &str) -> Result<KeyMaterial, KeyResolutionError> {
    resolve_with(key_source, |name| std::env::var(name).ok())
}

/// [`resolve`] with variables looked up through `lookup`
pub fn resolve_with<F>(key_source: &str, lookup: F) -> Result<KeyMaterial, KeyResolutionError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_vars_with(key_source, lookup);
    let path = Path::new(&expanded);

    if path.exists() {
        let content = fs::read_to_string(path).map_err(|e| KeyResolutionError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        // Strictly the last line, even when an earlier line holds a key
        let public_key = content.lines().next_back().unwrap_or("").trim();
        if public_key.is_empty() {
            return Err(KeyResolutionError::Empty {
                origin: path.display().to_string(),
            });
        }
        log::debug!("Resolved public key from {}", path.display());
        return Ok(KeyMaterial {
            source: KeySource::File(path.to_path_buf()),
            public_key: public_key.to_string(),
        });
    }

    let public_key = key_source.trim();
    if public_key.is_empty() {
        return Err(KeyResolutionError::Empty {
            origin: "inline key".to_string(),
        });
    }
    Ok(KeyMaterial {
        source: KeySource::Inline,
        public_key: public_key.to_string(),
    })
}

/// Resolve an optional key source; absent or blank sources yield `None`
pub fn resolve_optional(
    key_source: Option<&str>,
) -> Result<Option<KeyMaterial>, KeyResolutionError> {
    match key_source {
        Some(s) if !s.trim().is_empty() => resolve(s).map(Some),
        _ => Ok(None),
    }
}

/// Expand `$NAME` and `${NAME}` from the process environment
///
/// Unknown variables and malformed references are left as written.
pub fn expand_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

/// Expand variables using `lookup` in place of the process environment
pub fn expand_vars_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let value = if is_var_name(name) {
            lookup(name)
        } else {
            None
        };
        match value {
            Some(value) => result.push_str(&value),
            None => result.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    result
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
