//! Dataset name validation and coercion.
//!
//! Valid dataset names:
//! - Must be non-empty
//! - Must start with an ASCII letter or `_`
//! - May contain only ASCII letters, digits and `_`

use tabula_types::ContentKey;

use crate::error::{RepoError, RepoResult};

/// Returns `true` if `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
///
/// # Examples
///
/// ```
/// use tabula_repo::names::valid_dataset_name;
///
/// assert!(valid_dataset_name("underscore_name"));
/// assert!(!valid_dataset_name("hyphen-name"));
/// assert!(!valid_dataset_name("0hno3s"));
/// ```
pub fn valid_dataset_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a dataset name, returning `Ok(())` if valid.
pub fn validate_name(name: &str) -> RepoResult<()> {
    if name.is_empty() {
        return Err(RepoError::NameRequired);
    }
    if let Some(first) = name.chars().next() {
        if first.is_ascii_digit() {
            return Err(RepoError::InvalidName {
                name: name.to_string(),
                reason: "must not start with a number".into(),
            });
        }
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(RepoError::InvalidName {
            name: name.to_string(),
            reason: format!("contains forbidden character: {bad:?}"),
        });
    }
    Ok(())
}

/// Derive a dataset name from an arbitrary file name or URL.
///
/// Takes the last path segment, strips its extension, lower-cases it and
/// replaces every character outside `[a-z0-9_]` with `_`. The transform is
/// idempotent.
///
/// ```
/// use tabula_repo::names::coerce_dataset_name;
///
/// assert_eq!(coerce_dataset_name("filename.csv"), "filename");
/// assert_eq!(coerce_dataset_name("space name"), "space_name");
/// assert_eq!(coerce_dataset_name("CAPSNAME"), "capsname");
/// ```
pub fn coerce_dataset_name(input: &str) -> String {
    let base = input.rsplit('/').next().unwrap_or(input);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(i) => &base[..i],
    };
    stem.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// How a user-supplied reference should be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefType {
    /// A bare dataset name, resolved through the namestore.
    Name(String),
    /// A content path, used directly.
    Path(ContentKey),
}

/// Classify a reference string as a name or a content path.
///
/// A token that is a valid dataset name once surrounding slashes are removed
/// is a name; anything else is a path.
pub fn ref_type(reference: &str) -> RefType {
    let trimmed = reference.trim();
    let bare = trimmed.trim_matches('/');
    if valid_dataset_name(bare) {
        RefType::Name(bare.to_string())
    } else {
        RefType::Path(ContentKey::new(trimmed))
    }
}
