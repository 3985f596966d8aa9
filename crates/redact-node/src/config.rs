//! Node configuration

use std::collections::HashSet;
use std::time::Duration;

use chameleon::GroupParameters;

use crate::types::PeerId;
use crate::{Element, Error, Result};

/// Default readiness / reorder-buffer retry period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bound of each reorder buffer
pub const DEFAULT_REORDER_CAPACITY: usize = 64;

/// Redaction node configuration
///
/// There is no mission timeout: a mission that never collects responses from
/// every participant stalls the subsystem. Submitted tasks pass through a
/// single-slot queue, since a node holds at most one queued or active
/// mission.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Our identity on the transport
    pub node_id: PeerId,
    /// Every other participant of the redaction set
    pub peers: Vec<PeerId>,
    /// Polynomial threshold t (1 <= t <= n)
    pub threshold: usize,
    /// Retry period for parked messages and readiness waits
    pub poll_interval: Duration,
    /// Bound of the replica-signature and verification reorder buffers
    pub reorder_capacity: usize,
    /// Group generator and domain tag
    pub group: GroupParameters<Element>,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<PeerId>, peers: Vec<PeerId>, threshold: usize) -> Self {
        Self {
            node_id: node_id.into(),
            peers,
            threshold,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reorder_capacity: DEFAULT_REORDER_CAPACITY,
            group: GroupParameters::default(),
        }
    }

    /// Configs for a full node set `ids`, one per node
    pub fn cluster(ids: &[PeerId], threshold: usize) -> Vec<Self> {
        ids.iter()
            .map(|id| {
                let peers = ids.iter().filter(|p| *p != id).cloned().collect();
                Self::new(id.clone(), peers, threshold)
            })
            .collect()
    }

    /// n, including ourselves
    pub fn participants(&self) -> usize {
        self.peers.len() + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::Config("node id must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if *peer == self.node_id {
                return Err(Error::Config(format!("peer list contains self ({})", peer)));
            }
            if !seen.insert(peer) {
                return Err(Error::Config(format!("duplicate peer {}", peer)));
            }
        }

        let n = self.participants();
        if self.threshold == 0 || self.threshold > n {
            return Err(Error::Config(format!(
                "threshold {} out of range 1..={}",
                self.threshold, n
            )));
        }

        if self.reorder_capacity == 0 {
            return Err(Error::Config("reorder capacity must be positive".into()));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<PeerId> {
        (0..n).map(|i| format!("node-{}", i)).collect()
    }

    #[test]
    fn test_cluster_configs() {
        let configs = NodeConfig::cluster(&ids(4), 3);
        assert_eq!(configs.len(), 4);
        for config in &configs {
            assert_eq!(config.participants(), 4);
            assert!(!config.peers.contains(&config.node_id));
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = NodeConfig::new("a", vec!["b".into()], 3);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.threshold = 0;
        assert!(config.validate().is_err());

        config.threshold = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_self_and_duplicates() {
        let config = NodeConfig::new("a", vec!["a".into()], 1);
        assert!(config.validate().is_err());

        let config = NodeConfig::new("a", vec!["b".into(), "b".into()], 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = NodeConfig::new("a", vec!["b".into()], 1);
        config.reorder_capacity = 0;
        assert!(config.validate().is_err());
    }
}
