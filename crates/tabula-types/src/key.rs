use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// File name of the dataset record inside a saved dataset package.
pub const PACKAGE_FILE_DATASET: &str = "dataset.json";

/// Content-addressed path of an object in a blob store.
///
/// Keys look like `/<namespace>/<hex-hash>` for a root object and
/// `/<namespace>/<hex-hash>/<file>` for a file inside a package. The hash
/// is derived from the object's content, so a key never changes meaning.
/// The empty key stands for "no object" (e.g. the `previous` field of a
/// root revision).
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Create a key from a path string, adding a leading `/` and removing
    /// any trailing `/`. Whitespace-only input yields the empty key.
    pub fn new(path: impl AsRef<str>) -> Self {
        let trimmed = path.as_ref().trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::empty();
        }
        if trimmed.starts_with('/') {
            Self(trimmed.to_string())
        } else {
            Self(format!("/{trimmed}"))
        }
    }

    /// The empty key.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Build the root key for a hash in the given store namespace.
    pub fn from_hash(namespace: &str, hash: &[u8; 32]) -> Self {
        Self(format!("/{namespace}/{}", hex::encode(hash)))
    }

    /// Returns `true` if this is the empty key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a path segment.
    pub fn child(&self, segment: &str) -> Self {
        Self::new(format!("{}/{}", self.0, segment.trim_matches('/')))
    }

    /// Returns `true` if this key addresses the record file of a dataset package.
    pub fn is_package(&self) -> bool {
        self.0
            .strip_suffix(PACKAGE_FILE_DATASET)
            .is_some_and(|rest| rest.ends_with('/'))
    }

    /// The key with any trailing `/dataset.json` removed.
    pub fn package_root(&self) -> Self {
        if self.is_package() {
            Self::new(&self.0[..self.0.len() - PACKAGE_FILE_DATASET.len()])
        } else {
            self.clone()
        }
    }

    /// The key of the record file inside this package.
    pub fn package_file(&self) -> Self {
        if self.is_package() {
            self.clone()
        } else {
            self.child(PACKAGE_FILE_DATASET)
        }
    }

    /// Path segments, excluding empty ones.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The store namespace (first segment), if any.
    pub fn namespace(&self) -> Option<&str> {
        self.segments().next()
    }

    /// The hash segment, decoded.
    pub fn hash(&self) -> Result<[u8; 32], TypeError> {
        let hex_str = self
            .segments()
            .nth(1)
            .ok_or_else(|| TypeError::InvalidKey(self.0.clone()))?;
        let bytes = hex::decode(hex_str).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }

    /// Segments after the namespace and hash (the file path inside a package).
    pub fn sub_path(&self) -> Option<String> {
        let rest: Vec<&str> = self.segments().skip(2).collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        }
    }

    /// Short display form: namespace plus the first 8 hex characters.
    pub fn short(&self) -> String {
        match (self.namespace(), self.segments().nth(1)) {
            (Some(ns), Some(h)) => format!("/{ns}/{}", &h[..h.len().min(8)]),
            _ => self.0.clone(),
        }
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ContentKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
