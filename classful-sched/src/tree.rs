use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use classful_filter::{ClassId, PacketDescriptor};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::bucket::TokenBucket;
use crate::config::{default_burst, ConfigError, ShaperConfig};
use crate::policer::Policer;

/// Default per-class queue depth, in packets.
pub const DEFAULT_QUEUE_DEPTH: usize = 128;

/// A packet admitted into the shaping tree: the descriptor, the opaque
/// payload handle, and the arrival stamp used for FIFO ordering within a
/// class.
#[derive(Debug, Clone)]
pub struct ShapedPacket {
    class: ClassId,
    descriptor: PacketDescriptor,
    payload: Bytes,
    arrival: Instant,
}

impl ShapedPacket {
    pub(crate) fn new(
        class: ClassId,
        descriptor: PacketDescriptor,
        payload: Bytes,
        arrival: Instant,
    ) -> Self {
        Self { class, descriptor, payload, arrival }
    }

    /// The class the packet was admitted into.
    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    #[inline]
    pub fn descriptor(&self) -> &PacketDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// When the packet entered the queue, on the interface's clock.
    #[inline]
    pub fn arrival(&self) -> Instant {
        self.arrival
    }
}

/// Result of offering a packet to a class queue.
pub(crate) enum Enqueue {
    /// Queued. `delayed` is set when the packet cannot transmit
    /// immediately (backlog ahead of it, or no guarantee credit).
    Queued { delayed: bool },
    /// The queue is at its depth bound.
    Full,
}

pub(crate) struct ClassNode {
    pub(crate) id: ClassId,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) priority: u8,
    /// Guaranteed-rate bucket.
    pub(crate) tokens: TokenBucket,
    /// Ceiling-rate bucket (HTB's ctokens); this is what stops borrowing
    /// from pushing the class past its own ceiling.
    pub(crate) ctokens: TokenBucket,
    pub(crate) policer: Option<Policer>,
    pub(crate) queue: VecDeque<ShapedPacket>,
    pub(crate) queue_depth: usize,
}

impl std::fmt::Debug for ClassNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassNode")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl ClassNode {
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The per-interface class tree: a synthetic root (1:0 in tc terms) with
/// rate and ceiling equal to the link capacity, and the configured
/// classes below it.
///
/// Queues and buckets are owned exclusively here. The interface
/// serializes all access behind one lock, which is the single-writer
/// discipline per-class FIFO ordering depends on.
#[derive(Debug)]
pub(crate) struct ClassTree {
    /// Dense arena; index 0 is always the root.
    nodes: Vec<ClassNode>,
    index: FxHashMap<ClassId, usize>,
}

impl ClassTree {
    /// Validates `config` and builds the tree. All buckets start full so
    /// the configured bursts are available immediately after attach.
    pub(crate) fn build(config: &ShaperConfig, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;

        let capacity = config.link_capacity();
        let root_burst = default_burst(capacity);
        let mut nodes = vec![ClassNode {
            id: ClassId::new(0),
            parent: None,
            children: Vec::new(),
            priority: 0,
            tokens: TokenBucket::new(capacity, root_burst, now),
            ctokens: TokenBucket::new(capacity, root_burst, now),
            policer: None,
            queue: VecDeque::new(),
            queue_depth: 0,
        }];

        let mut index = FxHashMap::default();
        for class in config.classes() {
            let idx = nodes.len();
            nodes.push(ClassNode {
                id: class.id(),
                parent: None, // wired below, once every node exists
                children: Vec::new(),
                priority: class.priority(),
                tokens: TokenBucket::new(class.rate(), class.effective_burst(), now),
                ctokens: TokenBucket::new(class.ceil(), class.effective_ceil_burst(), now),
                policer: class.policer().map(|p| Policer::new(p, now)),
                queue: VecDeque::new(),
                queue_depth: class.queue_depth().unwrap_or(DEFAULT_QUEUE_DEPTH),
            });
            index.insert(class.id(), idx);
        }

        for class in config.classes() {
            let idx = index[&class.id()];
            let parent_idx = match class.parent() {
                Some(parent) => index[&parent],
                None => 0,
            };
            nodes[idx].parent = Some(parent_idx);
            nodes[parent_idx].children.push(idx);
        }

        Ok(Self { nodes, index })
    }

    pub(crate) fn lookup(&self, id: ClassId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn node(&self, idx: usize) -> &ClassNode {
        &self.nodes[idx]
    }

    pub(crate) fn nodes(&self) -> &[ClassNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [ClassNode] {
        &mut self.nodes
    }

    /// Applies the class policer, if any. `true` admits.
    pub(crate) fn police(&mut self, idx: usize, bytes: u32, now: Instant) -> bool {
        match &mut self.nodes[idx].policer {
            Some(policer) => policer.admit(bytes, now),
            None => true,
        }
    }

    /// Offers a packet to the class queue, bounded by its depth.
    pub(crate) fn enqueue(&mut self, idx: usize, packet: ShapedPacket) -> Enqueue {
        let now = packet.arrival();
        let node = &mut self.nodes[idx];
        if node.queue.len() >= node.queue_depth {
            trace!(class = %node.id, depth = node.queue_depth, "queue full");
            return Enqueue::Full;
        }

        node.tokens.refill(now);
        let delayed = !node.queue.is_empty() || !node.tokens.has(packet.descriptor().length_bytes());
        node.queue.push_back(packet);
        Enqueue::Queued { delayed }
    }

    /// Packets currently sitting in class queues.
    pub(crate) fn total_queued(&self) -> usize {
        self.nodes.iter().map(|n| n.queue.len()).sum()
    }
}
