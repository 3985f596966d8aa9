//! Core types shared across the redaction subsystem

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Transport-level peer identity
pub type PeerId = String;

/// Block height
pub type Height = i64;

/// Transaction index within a block
pub type TxIndex = i32;

/// A redaction request: overwrite the transaction at (height, index)
/// with `key=value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub block_height: Height,
    pub tx_index: TxIndex,
    pub key: String,
    pub value: String,
}

impl Task {
    pub fn new(
        block_height: Height,
        tx_index: TxIndex,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            block_height,
            tx_index,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Replacement transaction bytes: `key=value`
    pub fn new_tx(&self) -> Vec<u8> {
        format!("{}={}", self.key, self.value).into_bytes()
    }

    /// Rebuild a task from wire fields, splitting at the first `=`
    pub fn from_new_tx(block_height: Height, tx_index: TxIndex, new_tx: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(new_tx)
            .map_err(|e| Error::Decode(format!("transaction is not utf-8: {}", e)))?;
        let (key, value) = text
            .split_once('=')
            .ok_or_else(|| Error::Decode("transaction is not key=value".into()))?;
        Ok(Self::new(block_height, tx_index, key, value))
    }

    pub fn mission_name(&self) -> MissionName {
        MissionName::derive(self.block_height, self.tx_index, &self.new_tx())
    }
}

/// Deterministic identifier of a redaction mission
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionName(String);

impl MissionName {
    /// `{height}-{index}-{first 8 bytes of sha256(height || index || new_tx)}`
    pub fn derive(block_height: Height, tx_index: TxIndex, new_tx: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(block_height.to_le_bytes());
        hasher.update(tx_index.to_le_bytes());
        hasher.update(new_tx);
        let hash = hasher.finalize();
        Self(format!(
            "{}-{}-{}",
            block_height,
            tx_index,
            hex::encode(&hash[..8])
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MissionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for MissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tx_format() {
        let task = Task::new(10, 2, "k", "v2");
        assert_eq!(task.new_tx(), b"k=v2".to_vec());
    }

    #[test]
    fn test_from_new_tx_splits_at_first_equals() {
        let task = Task::from_new_tx(3, 1, b"url=https://x?a=b").unwrap();
        assert_eq!(task.key, "url");
        assert_eq!(task.value, "https://x?a=b");
        assert_eq!(task.new_tx(), b"url=https://x?a=b".to_vec());
    }

    #[test]
    fn test_from_new_tx_rejects_malformed() {
        assert!(matches!(Task::from_new_tx(1, 0, b"novalue"), Err(Error::Decode(_))));
        assert!(matches!(Task::from_new_tx(1, 0, &[0xff, b'=']), Err(Error::Decode(_))));
    }

    #[test]
    fn test_mission_name_is_deterministic() {
        let a = Task::new(10, 2, "k", "v2").mission_name();
        let b = Task::new(10, 2, "k", "v2").mission_name();
        let c = Task::new(10, 2, "k", "v3").mission_name();
        let d = Task::new(10, 3, "k", "v2").mission_name();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.as_str().starts_with("10-2-"));
    }
}
