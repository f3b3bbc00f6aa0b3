use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identifier of a Tabula node.
///
/// Node identifiers are opaque strings on the wire. Identifiers created
/// locally are derived deterministically with BLAKE3 from key material, so
/// the same material always produces the same `PeerId`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from key material (e.g. a node's public key).
    pub fn derive(material: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tabula-peer-v1:");
        hasher.update(material);
        Self(format!("tp{}", hex::encode(&hasher.finalize().as_bytes()[..20])))
    }

    /// Create a random identifier for tests and ephemeral nodes.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::derive(&bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidKey(format!("invalid peer id: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "cosmic", "crimson", "dapper", "eager", "fluffy",
    "gentle", "golden", "happy", "jolly", "keen", "lucky", "mellow", "nimble", "plucky", "quiet",
    "rapid", "rusty", "sly", "snappy", "spotted", "sunny", "swift", "tidy", "velvet", "witty",
    "zesty", "zippy",
];

const BREEDS: &[&str] = &[
    "akita", "basenji", "beagle", "borzoi", "boxer", "briard", "collie", "corgi", "dachshund",
    "dingo", "greyhound", "husky", "keeshond", "kelpie", "labrador", "lurcher", "malamute",
    "mastiff", "papillon", "pointer", "poodle", "pug", "saluki", "samoyed", "schnauzer", "setter",
    "shiba", "spaniel", "terrier", "vizsla", "whippet", "wolfhound",
];

/// Deterministic human-friendly nickname for an identifier.
///
/// The same identifier always yields the same nickname, and every nickname
/// is a valid dataset-style name (`[a-z_]+`).
pub fn nickname(id: &str) -> String {
    let hash = blake3::hash(id.as_bytes());
    let bytes = hash.as_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let breed = BREEDS[bytes[1] as usize % BREEDS.len()];
    format!("{adjective}_{breed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(PeerId::derive(b"key"), PeerId::derive(b"key"));
        assert_ne!(PeerId::derive(b"key"), PeerId::derive(b"other"));
    }

    #[test]
    fn derived_ids_have_prefix() {
        let id = PeerId::derive(b"key");
        assert!(id.as_str().starts_with("tp"));
        assert_eq!(id.as_str().len(), 42);
    }

    #[test]
    fn ephemeral_ids_are_unique() {
        assert_ne!(PeerId::ephemeral(), PeerId::ephemeral());
    }

    #[test]
    fn parse_rejects_whitespace() {
        assert!("has space".parse::<PeerId>().is_err());
        assert!("".parse::<PeerId>().is_err());
        assert_eq!("QmPeer".parse::<PeerId>().unwrap().as_str(), "QmPeer");
    }

    #[test]
    fn nickname_is_stable() {
        assert_eq!(nickname("QmPeer"), nickname("QmPeer"));
        let nick = nickname("QmPeer");
        assert!(nick.contains('_'));
        assert!(nick.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
    }

    #[test]
    fn serde_is_transparent() {
        let id = PeerId::new("QmPeer");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"QmPeer\"");
    }
}
