use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabula_types::{PeerId, DEFAULT_PAGE_SIZE};

use crate::error::{CoreError, CoreResult};

/// Default number of datasets returned by a list request.
pub const DEFAULT_LIST_LIMIT: i64 = 25;

/// Settings for one Tabula node, usually read from `tabula.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding the repository's JSON store files.
    pub repo_path: PathBuf,
    /// Directory holding blob content.
    pub blob_path: PathBuf,
    /// This node's peer id. Derived from the repo path when empty.
    pub peer_id: String,
    /// Address the RPC listener binds to and clients dial.
    pub rpc_addr: SocketAddr,
    /// Page size for 1-indexed paging when a caller gives none.
    pub default_page_size: i64,
    /// Seconds to wait on a URL fetch before giving up.
    pub fetch_timeout: u64,
    /// Known peers: peer id to RPC address.
    pub peers: BTreeMap<String, String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from(".tabula/repo"),
            blob_path: PathBuf::from(".tabula/blobs"),
            peer_id: String::new(),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], 2503)),
            default_page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: 30,
            peers: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// The configured peer id, or one derived from the repo path.
    pub fn peer_id(&self) -> PeerId {
        if self.peer_id.trim().is_empty() {
            PeerId::derive(self.repo_path.to_string_lossy().as_bytes())
        } else {
            PeerId::new(self.peer_id.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let c = NodeConfig::default();
        assert_eq!(c.rpc_addr, "127.0.0.1:2503".parse::<SocketAddr>().unwrap());
        assert_eq!(c.default_page_size, 100);
        assert_eq!(c.fetch_timeout(), Duration::from_secs(30));
        assert!(c.peers.is_empty());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let c = NodeConfig::load(dir.path().join("tabula.toml")).unwrap();
        assert_eq!(c, NodeConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabula.toml");
        std::fs::write(
            &path,
            "peer_id = \"QmLocal\"\nfetch_timeout = 5\n\n[peers]\nQmOther = \"127.0.0.1:4000\"\n",
        )
        .unwrap();
        let c = NodeConfig::load(&path).unwrap();
        assert_eq!(c.peer_id(), PeerId::new("QmLocal"));
        assert_eq!(c.fetch_timeout, 5);
        assert_eq!(c.peers["QmOther"], "127.0.0.1:4000");
        assert_eq!(c.repo_path, PathBuf::from(".tabula/repo"));
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = NodeConfig::default();
        c.peers.insert("QmOther".into(), "10.0.0.2:2503".into());
        let back: NodeConfig = toml::from_str(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn derived_peer_id_is_stable() {
        let c = NodeConfig::default();
        assert_eq!(c.peer_id(), c.peer_id());
        assert!(!c.peer_id().is_empty());
    }

    #[test]
    fn bad_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabula.toml");
        std::fs::write(&path, "fetch_timeout = \"soon\"").unwrap();
        assert!(matches!(NodeConfig::load(&path), Err(CoreError::Config(_))));
    }
}
