//! block store collaborator
//!
//! the node's real block store lives outside this crate; the redaction
//! subsystem only needs to read a transaction slot with its chameleon
//! digest and to overwrite the slot's content in place.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chameleon::{ChameleonKey, Randomness};
use rand::{CryptoRng, RngCore};

use crate::types::{Height, TxIndex};
use crate::{Element, Error, Result, Scalar};

/// one transaction as committed in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSlot {
    pub tx: Vec<u8>,
    /// chameleon digest recorded in the block header; never rewritten
    pub digest: Scalar,
    /// randomness opening `digest` to `tx`
    pub randomness: Randomness<Scalar>,
}

/// a completed rewrite, as handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub block_height: Height,
    pub tx_index: TxIndex,
    pub tx: Vec<u8>,
}

pub trait BlockStore: Send + Sync {
    fn tx_slot(&self, block_height: Height, tx_index: TxIndex) -> Result<TxSlot>;

    /// overwrite the slot's content and randomness; the digest stays
    fn rewrite_tx_at(
        &self,
        block_height: Height,
        tx_index: TxIndex,
        tx: &[u8],
        randomness: &Randomness<Scalar>,
    ) -> Result<()>;
}

/// hash every transaction under `key`, producing the slots of a new block
pub fn commit_block<R, T>(
    key: &ChameleonKey<Element>,
    txs: impl IntoIterator<Item = T>,
    rng: &mut R,
) -> Vec<TxSlot>
where
    R: RngCore + CryptoRng,
    T: AsRef<[u8]>,
{
    txs.into_iter()
        .map(|tx| {
            let tx = tx.as_ref();
            let (digest, randomness) = key.commit(&mut *rng, tx);
            TxSlot {
                tx: tx.to_vec(),
                digest,
                randomness,
            }
        })
        .collect()
}

#[derive(Default)]
struct Inner {
    blocks: BTreeMap<Height, Vec<TxSlot>>,
    rewrites: Vec<Rewrite>,
}

/// in-memory block store for tests and the demo cluster
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_block(&self, block_height: Height, slots: Vec<TxSlot>) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| Error::Store(e.to_string()))?;
        if inner.blocks.contains_key(&block_height) {
            return Err(Error::Store(format!("block {} already exists", block_height)));
        }
        inner.blocks.insert(block_height, slots);
        Ok(())
    }

    /// every rewrite applied so far, oldest first
    pub fn rewrites(&self) -> Result<Vec<Rewrite>> {
        let inner = self.inner.read().map_err(|e| Error::Store(e.to_string()))?;
        Ok(inner.rewrites.clone())
    }

    /// check that the slot's current content still opens its digest
    pub fn verify_slot(
        &self,
        key: &ChameleonKey<Element>,
        block_height: Height,
        tx_index: TxIndex,
    ) -> Result<bool> {
        let slot = self.tx_slot(block_height, tx_index)?;
        Ok(key.verify(&slot.tx, &slot.randomness, &slot.digest))
    }
}

fn slot_mut(
    blocks: &mut BTreeMap<Height, Vec<TxSlot>>,
    block_height: Height,
    tx_index: TxIndex,
) -> Result<&mut TxSlot> {
    let index = usize::try_from(tx_index)
        .map_err(|_| Error::Store(format!("negative tx index {}", tx_index)))?;
    blocks
        .get_mut(&block_height)
        .ok_or_else(|| Error::Store(format!("no block at height {}", block_height)))?
        .get_mut(index)
        .ok_or_else(|| Error::Store(format!("no tx {} in block {}", tx_index, block_height)))
}

impl BlockStore for MemoryBlockStore {
    fn tx_slot(&self, block_height: Height, tx_index: TxIndex) -> Result<TxSlot> {
        let index = usize::try_from(tx_index)
            .map_err(|_| Error::Store(format!("negative tx index {}", tx_index)))?;
        let inner = self.inner.read().map_err(|e| Error::Store(e.to_string()))?;
        inner
            .blocks
            .get(&block_height)
            .and_then(|txs| txs.get(index))
            .cloned()
            .ok_or_else(|| Error::Store(format!("no tx {} in block {}", tx_index, block_height)))
    }

    fn rewrite_tx_at(
        &self,
        block_height: Height,
        tx_index: TxIndex,
        tx: &[u8],
        randomness: &Randomness<Scalar>,
    ) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| Error::Store(e.to_string()))?;
        let slot = slot_mut(&mut inner.blocks, block_height, tx_index)?;
        slot.tx = tx.to_vec();
        slot.randomness = randomness.clone();
        inner.rewrites.push(Rewrite {
            block_height,
            tx_index,
            tx: tx.to_vec(),
        });
        Ok(())
    }
}
