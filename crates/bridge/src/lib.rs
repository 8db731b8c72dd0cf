//! Wire contract shared by the logic side and the native render host.
//! This crate centralizes the stable node identities, the patch and event
//! messages that cross the bridge, and the mirror plumbing a render host uses
//! to apply patch batches in order.

use anyhow::Result;
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod console;
pub use console::{Console, ConsoleLogger, HostLogger, LogLevel};

/// Patch and event messages exchanged over the bridge.
pub mod patch;
pub use patch::{
    InboundEvent, NodeSnapshot, Patch, PatchBatch, PatchOp, SnapshotKind, WireValue,
};

/// Host-side tree that mirrors a document from its patch stream.
pub mod host_tree;
pub use host_tree::HostTree;

// ============================
// Stable Node keys (shared across the bridge)
// ============================

/// A 64-bit stable key for nodes, used to correlate asynchronous patches and events.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

/// Width of the per-shard counter inside a packed key.
const COUNTER_BITS: u32 = 32;
/// Width of the shard id inside a packed key.
const SHARD_BITS: u32 = 16;

impl NodeKey {
    /// Pack epoch+shard+counter into a single 64-bit key.
    #[inline]
    pub const fn pack(epoch: u16, shard: u16, counter: u64) -> Self {
        let masked = counter & ((1_u64 << COUNTER_BITS) - 1);
        Self(((epoch as u64) << (COUNTER_BITS + SHARD_BITS)) | ((shard as u64) << COUNTER_BITS) | masked)
    }
    /// Extract epoch from the key.
    #[inline]
    pub const fn epoch(self) -> u16 {
        (self.0 >> (COUNTER_BITS + SHARD_BITS)) as u16
    }
    /// Extract shard from the key.
    #[inline]
    pub const fn shard(self) -> u16 {
        ((self.0 >> COUNTER_BITS) & 0xFFFF) as u16
    }
    /// Extract counter from the key.
    #[inline]
    pub const fn counter(self) -> u64 {
        self.0 & ((1_u64 << COUNTER_BITS) - 1)
    }
}

impl core::fmt::Display for NodeKey {
    fn fmt(&self, formatter: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Next free (epoch, shard) pair of a key space.
#[derive(Debug)]
struct Allocation {
    epoch: u16,
    next_shard: u16,
}

impl Allocation {
    /// Hand out a pair never handed out before. Once every shard of the
    /// epoch is taken the epoch advances; pairs only repeat after all 2^16
    /// epochs were used up.
    fn take(&mut self) -> (u16, u16) {
        let shard = self.next_shard;
        if let Some(next) = self.next_shard.checked_add(1) {
            self.next_shard = next;
        } else {
            self.epoch = self.epoch.wrapping_add(1);
            self.next_shard = 1;
            warn!("node key shards exhausted, rolling to epoch {}", self.epoch);
        }
        (self.epoch, shard)
    }
}

/// Key space minting NodeKeys with unique epoch and shard pairs. Cloning
/// shares the same space.
#[derive(Clone, Debug)]
pub struct KeySpace {
    allocation: Arc<Mutex<Allocation>>,
}

/// Process-wide key space; every document registers its shard here unless it
/// is handed an explicit manager.
static SHARED_KEY_SPACE: Lazy<KeySpace> = Lazy::new(KeySpace::new);

impl KeySpace {
    /// Create a new key space with a time-derived epoch.
    pub fn new() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let epoch = (((now.as_secs() as u32) ^ now.subsec_nanos()) & 0xFFFF) as u16;
        Self {
            allocation: Arc::new(Mutex::new(Allocation { epoch, next_shard: 1 })),
        }
    }

    fn take(&self) -> (u16, u16) {
        match self.allocation.lock() {
            Ok(mut allocation) => allocation.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Register a new manager for a given producer shard.
    pub fn register_manager<L: Eq + Hash + Copy>(&self) -> NodeKeyManager<L> {
        let (epoch, shard) = self.take();
        NodeKeyManager::new(self.clone(), epoch, shard)
    }
    /// Register a manager on the process-wide key space.
    pub fn register_shared<L: Eq + Hash + Copy>() -> NodeKeyManager<L> {
        SHARED_KEY_SPACE.register_manager()
    }
    /// Return the current epoch.
    pub fn epoch(&self) -> u16 {
        match self.allocation.lock() {
            Ok(allocation) => allocation.epoch,
            Err(poisoned) => poisoned.into_inner().epoch,
        }
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest counter a shard can mint.
const MAX_COUNTER: u64 = (1_u64 << COUNTER_BITS) - 1;

/// Per-shard manager mapping local IDs to NodeKeys and back.
///
/// The reverse table is the identity lookup used to resolve inbound host
/// events to local nodes. A manager whose shard runs out of counters takes a
/// fresh shard from its key space; counter 0 of a shard is never minted.
#[derive(Clone, Debug)]
pub struct NodeKeyManager<L: Eq + Hash + Copy> {
    space: KeySpace,
    epoch: u16,
    shard: u16,
    counter: u64,
    root: NodeKey,
    map: HashMap<L, NodeKey>,
    reverse: HashMap<NodeKey, L>,
}

impl<L: Eq + Hash + Copy> NodeKeyManager<L> {
    fn new(space: KeySpace, epoch: u16, shard: u16) -> Self {
        Self {
            space,
            epoch,
            shard,
            counter: 1,
            root: NodeKey::pack(epoch, shard, 0),
            map: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
    /// Get the NodeKey for a local ID, minting if not present.
    #[inline]
    pub fn key_of(&mut self, id: L) -> NodeKey {
        if let Some(&key) = self.map.get(&id) {
            return key;
        }
        if self.counter > MAX_COUNTER {
            let (epoch, shard) = self.space.take();
            debug!("shard {} exhausted, continuing on {epoch}/{shard}", self.shard);
            self.epoch = epoch;
            self.shard = shard;
            self.counter = 1;
        }
        let key = NodeKey::pack(self.epoch, self.shard, self.counter);
        self.counter += 1;
        self.seed(id, key);
        key
    }
    /// Look up the key of a local ID without minting.
    #[inline]
    pub fn get(&self, id: L) -> Option<NodeKey> {
        self.map.get(&id).copied()
    }
    /// Resolve a key back to its local ID.
    #[inline]
    pub fn local_of(&self, key: NodeKey) -> Option<L> {
        self.reverse.get(&key).copied()
    }
    /// Seed a mapping from a local ID to an existing NodeKey.
    #[inline]
    pub fn seed(&mut self, id: L, key: NodeKey) {
        self.map.insert(id, key);
        self.reverse.insert(key, id);
    }
    /// Forget a local ID; its key is never minted again.
    pub fn forget(&mut self, id: L) -> Option<NodeKey> {
        let key = self.map.remove(&id)?;
        self.reverse.remove(&key);
        Some(key)
    }
    /// The key reserved for the root of the document owning this manager.
    #[inline]
    pub const fn root_key(&self) -> NodeKey {
        self.root
    }
    /// The shard new keys are minted from.
    #[inline]
    pub const fn shard(&self) -> u16 {
        self.shard
    }
    /// Number of live mappings.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }
    /// Whether no mapping is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================
// Bridge errors
// ============================

/// Errors raised while moving messages across the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The other side dropped its end of the channel.
    #[error("bridge channel closed while sending {what}")]
    ChannelClosed {
        /// What was being sent.
        what: &'static str,
    },
    /// A batch arrived with a generation that does not follow the previous one.
    #[error("patch batch for root {root} arrived out of order: generation {got} after {last}")]
    OutOfOrder {
        /// Root the batch belongs to.
        root: NodeKey,
        /// Last applied generation.
        last: u64,
        /// Generation of the rejected batch.
        got: u64,
    },
}

// ============================
// Patch subscriber + host mirror pattern
// ============================

/// A subscriber that receives patches and mirrors them into its own state.
pub trait PatchSubscriber {
    /// Apply a single patch to the subscriber state.
    fn apply_patch(&mut self, patch: &Patch) -> Result<()>;

    /// Drop all mirrored state below the root.
    fn reset(&mut self) -> Result<()>;

    /// Apply a whole batch in emission order.
    fn apply_batch(&mut self, batch: &PatchBatch) -> Result<()> {
        if batch.reset {
            self.reset()?;
        }
        for patch in &batch.ops {
            self.apply_patch(patch)?;
        }
        Ok(())
    }
}

/// Render-host end of the bridge: drains patch batches from the logic side and
/// posts host events back to it.
pub struct HostMirror<T: PatchSubscriber> {
    in_batches: mpsc::UnboundedReceiver<PatchBatch>,
    out_events: mpsc::UnboundedSender<InboundEvent>,
    last_generation: HashMap<NodeKey, u64>,
    applied_batches: u64,
    mirror: T,
}

impl<T: PatchSubscriber> HostMirror<T> {
    /// Create a new HostMirror wrapping a subscriber implementation.
    pub fn new(
        out_events: mpsc::UnboundedSender<InboundEvent>,
        in_batches: mpsc::UnboundedReceiver<PatchBatch>,
        mirror: T,
    ) -> Self {
        Self {
            in_batches,
            out_events,
            last_generation: HashMap::new(),
            applied_batches: 0,
            mirror,
        }
    }

    fn apply(&mut self, batch: &PatchBatch) -> Result<()> {
        if let Some(&last) = self.last_generation.get(&batch.root_id) {
            if batch.generation <= last {
                return Err(BridgeError::OutOfOrder {
                    root: batch.root_id,
                    last,
                    got: batch.generation,
                }
                .into());
            }
        }
        self.mirror.apply_batch(batch)?;
        self.last_generation.insert(batch.root_id, batch.generation);
        self.applied_batches += 1;
        Ok(())
    }

    /// Wait for the next batch and apply it. Returns false once the logic side hung up.
    pub async fn update(&mut self) -> Result<bool> {
        match self.in_batches.recv().await {
            Some(batch) => {
                self.apply(&batch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Synchronous variant for draining every batch that is already queued.
    pub fn try_update_sync(&mut self) -> Result<usize> {
        use tokio::sync::mpsc::error::TryRecvError;
        let mut drained = 0;
        loop {
            match self.in_batches.try_recv() {
                Ok(batch) => {
                    self.apply(&batch)?;
                    drained += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(drained)
    }

    /// Post a host-originated event to the logic side.
    pub fn send_event(&self, event: InboundEvent) -> Result<(), BridgeError> {
        self.out_events
            .send(event)
            .map_err(|_| BridgeError::ChannelClosed { what: "host event" })
    }

    /// Number of batches applied so far.
    pub const fn applied_batches(&self) -> u64 {
        self.applied_batches
    }

    /// Access the inner mirror immutably (read-only access)
    pub fn mirror(&self) -> &T {
        &self.mirror
    }

    /// Access the inner mirror mutably
    pub fn mirror_mut(&mut self) -> &mut T {
        &mut self.mirror
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_packing_round_trips_fields() {
        let key = NodeKey::pack(0xBEEF, 7, 42);
        assert_eq!(key.epoch(), 0xBEEF);
        assert_eq!(key.shard(), 7);
        assert_eq!(key.counter(), 42);
    }

    #[test]
    fn managers_from_one_space_never_collide() {
        let space = KeySpace::new();
        let mut first: NodeKeyManager<u32> = space.register_manager();
        let mut second: NodeKeyManager<u32> = space.register_manager();
        assert_ne!(first.key_of(1), second.key_of(1));
        assert_ne!(first.root_key(), second.root_key());
    }

    #[test]
    fn forgotten_ids_do_not_reuse_keys() {
        let space = KeySpace::new();
        let mut manager: NodeKeyManager<u32> = space.register_manager();
        let key = manager.key_of(5);
        assert_eq!(manager.local_of(key), Some(5));
        assert_eq!(manager.forget(5), Some(key));
        assert_eq!(manager.local_of(key), None);
        assert_ne!(manager.key_of(5), key);
    }

    #[test]
    fn exhausted_shards_roll_the_epoch() {
        let space = KeySpace::new();
        let first: NodeKeyManager<u32> = space.register_manager();
        if let Ok(mut allocation) = space.allocation.lock() {
            allocation.next_shard = u16::MAX;
        }
        let last: NodeKeyManager<u32> = space.register_manager();
        let rolled: NodeKeyManager<u32> = space.register_manager();
        assert_eq!(last.shard(), u16::MAX);
        assert_eq!(rolled.shard(), first.shard());
        assert_eq!(rolled.root_key().epoch(), first.root_key().epoch().wrapping_add(1));
        assert_ne!(rolled.root_key(), first.root_key());
        assert_eq!(space.epoch(), rolled.root_key().epoch());
    }

    #[test]
    fn exhausted_counters_move_to_a_fresh_shard() {
        let space = KeySpace::new();
        let mut manager: NodeKeyManager<u32> = space.register_manager();
        let root = manager.root_key();
        manager.counter = MAX_COUNTER;
        let last = manager.key_of(1);
        let next = manager.key_of(2);
        assert_eq!(last.counter(), MAX_COUNTER);
        assert_eq!(next.counter(), 1);
        assert_ne!(next.shard(), last.shard());
        assert_eq!(manager.root_key(), root);
        assert_eq!(manager.local_of(last), Some(1));
        assert_eq!(manager.local_of(next), Some(2));
    }
}
