//! Packet classification for the classful shaping engine.
//!
//! This crate is the software replacement for a tc filter chain: an ordered
//! table of match rules maps each packet descriptor to the shaping class it
//! belongs to. Rules are checked in ascending priority order (lower number
//! first, catch-all semantics via the rule set's default class), the same
//! priority discipline tc applies to its filters.
//!
//! Everything here is pure, immutable data: a [`RuleSet`] is built once,
//! shared behind an `Arc`, and replaced wholesale when configuration
//! changes, so classification can run concurrently with the scheduler
//! without ever observing a half-updated table.

use std::fmt;

mod classify;
pub use classify::Verdict;

mod packet;
pub use packet::{PacketDescriptor, Protocol};

mod rule;
pub use rule::{ClassificationRule, RuleSet, TosMatch, DEFAULT_RULE_PRIORITY};

/// Identifies a shaping class within one interface's tree.
///
/// Ids are interface-local, the way tc class minors are local to their
/// qdisc; two interfaces may both have a class 12 with different meanings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(u16);

impl ClassId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1:{}", self.0)
    }
}
