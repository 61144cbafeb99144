use std::time::{Duration, Instant};

use tracing::trace;

use crate::tree::{ClassTree, ShapedPacket};

/// The best backlogged leaf found in one scheduling pass.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    priority: u8,
    /// Hops up to the lender; 0 means the leaf sends on its own guarantee.
    depth: usize,
    arrival: Instant,
    leaf: usize,
    lender: usize,
}

impl Candidate {
    /// Selection order: ascending priority, then classes running inside
    /// their own guarantee before borrowers (HTB serves a class at its own
    /// level before one reaching up), then the longest-waiting head packet.
    fn key(&self) -> (u8, usize, Instant) {
        (self.priority, self.depth, self.arrival)
    }
}

impl ClassTree {
    /// Runs one scheduling pass and releases the next packet the tree's
    /// token state allows, or `None` when nothing is eligible.
    ///
    /// The clock is read once per pass (`now`) and every bucket refills
    /// against that single instant, so sibling classes can never observe
    /// skewed refills within a pass.
    pub(crate) fn dequeue_next(&mut self, now: Instant) -> Option<ShapedPacket> {
        self.refill_all(now);

        let mut best: Option<Candidate> = None;
        for leaf in 0..self.nodes().len() {
            let node = self.node(leaf);
            if !node.is_leaf() {
                continue;
            }
            let Some(head) = node.queue.front() else { continue };
            let bytes = head.descriptor().length_bytes();
            let Some((lender, depth)) = self.find_lender(leaf, bytes) else { continue };

            let candidate = Candidate {
                priority: node.priority,
                depth,
                arrival: head.arrival(),
                leaf,
                lender,
            };
            if best.map_or(true, |b| candidate.key() < b.key()) {
                best = Some(candidate);
            }
        }

        let chosen = best?;
        let packet = self.nodes_mut()[chosen.leaf].queue.pop_front()?;
        let bytes = packet.descriptor().length_bytes();

        // Guarantee charge: leaf up to and including the lender. The
        // lender pays out of its guarantee; nodes between pick up the
        // debt (their buckets go negative) and repay it as they refill.
        let mut cursor = Some(chosen.leaf);
        while let Some(idx) = cursor {
            self.nodes_mut()[idx].tokens.charge(bytes);
            if idx == chosen.lender {
                break;
            }
            cursor = self.node(idx).parent;
        }

        // Ceiling charge: the packet transits every ancestor, so every
        // ceiling on the path to the root pays for it. The root charge is
        // what bounds aggregate throughput at link capacity.
        let mut cursor = Some(chosen.leaf);
        while let Some(idx) = cursor {
            self.nodes_mut()[idx].ctokens.charge(bytes);
            cursor = self.node(idx).parent;
        }

        trace!(class = %packet.class(), bytes, depth = chosen.depth, "dequeued");
        Some(packet)
    }

    /// Earliest time a backlogged class could plausibly become eligible.
    ///
    /// A wake hint for pollers: it accounts for each leaf's own ceiling
    /// deficit and the soonest guarantee refill on its ancestor path, but
    /// not for ceiling contention between siblings, so the schedule may
    /// still yield nothing at the hinted time, in which case callers poll
    /// again.
    pub(crate) fn next_wake(&mut self, now: Instant) -> Option<Duration> {
        self.refill_all(now);

        let mut soonest: Option<Duration> = None;
        for leaf in 0..self.nodes().len() {
            let node = self.node(leaf);
            if !node.is_leaf() {
                continue;
            }
            let Some(head) = node.queue.front() else { continue };
            let bytes = head.descriptor().length_bytes();

            let Some(ceiling_wait) = node.ctokens.time_until(bytes) else { continue };

            // Soonest possible lender anywhere on the path.
            let mut lend_wait: Option<Duration> = None;
            let mut cursor = Some(leaf);
            while let Some(idx) = cursor {
                let n = self.node(idx);
                if let Some(t) = n.tokens.time_until(bytes) {
                    lend_wait = Some(lend_wait.map_or(t, |cur| cur.min(t)));
                }
                cursor = n.parent;
            }
            let Some(lend_wait) = lend_wait else { continue };

            let wait = ceiling_wait.max(lend_wait);
            soonest = Some(soonest.map_or(wait, |cur| cur.min(wait)));
        }
        soonest
    }

    fn refill_all(&mut self, now: Instant) {
        for node in self.nodes_mut() {
            node.tokens.refill(now);
            node.ctokens.refill(now);
        }
    }

    /// Walks leaf → root. Every ceiling on the path must have credit for
    /// the packet; the lender is the nearest node with guarantee credit.
    /// `None` means the leaf is not eligible this pass.
    fn find_lender(&self, leaf: usize, bytes: u32) -> Option<(usize, usize)> {
        let mut lender = None;
        let mut cursor = Some(leaf);
        let mut hops = 0usize;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if !node.ctokens.has(bytes) {
                return None;
            }
            if lender.is_none() && node.tokens.has(bytes) {
                lender = Some((idx, hops));
            }
            cursor = node.parent;
            hops += 1;
        }
        lender
    }
}
