//! # Hierarchical shaping scheduler
//!
//! The stateful half of classful: a per-interface class tree with
//! token-bucket shaping, borrowing, hard policing, and counters, fronted
//! by the [`Shaper`] object.
//!
//! ## Architecture
//!
//! Each interface owns one tree, rooted at a synthetic class sized to the
//! link's capacity:
//!
//! ```text
//!                 ┌─────────────────────────────┐
//!                 │        Root (1:0)           │
//!                 │  rate = ceil = link capacity│
//!                 └──────────────┬──────────────┘
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!    ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!    │ Voice (1:10)  │   │ Video (1:20)  │   │ Data (1:30)   │
//!    │ rate 512k     │   │ rate 1000k    │   │ rate 256k     │
//!    │ ceil 2000k    │   │ ceil 2000k    │   │ ceil 256k     │
//!    │ prio 0        │   │ prio 1        │   │ prio 2        │
//!    └───────────────┘   └───────────────┘   └───────────────┘
//! ```
//!
//! Every class carries two buckets, one refilled at its guaranteed rate
//! and one at its ceiling. A backlogged leaf may send when the ceiling
//! buckets along its whole ancestor path have credit and some node on
//! that path (the leaf itself, or an ancestor lending idle guarantee)
//! has guaranteed credit. That is the borrowing rule of a hierarchical
//! token bucket: idle capacity flows down, but never past a class's own
//! ceiling and never past any ancestor's.
//!
//! ## Packet flow
//!
//! 1. [`Shaper::ingress`] classifies the descriptor against the active
//!    rule set.
//! 2. The class policer (if configured) applies its hard limit.
//! 3. The packet joins the class queue, bounded by the queue depth.
//! 4. An external transmit loop pulls with [`Shaper::dequeue_next`]
//!    whenever it has capacity, or drives an [`Egress`] to wait for the
//!    schedule asynchronously.

mod bucket;

mod config;
pub use config::{ClassConfig, ConfigError, PolicerConfig, ShaperConfig};

mod egress;
pub use egress::Egress;

mod interface;
pub use interface::{Decision, Phase, Shaper, ShaperError};

mod policer;

mod sched;

mod stats;
pub use stats::{ClassCounters, StatsSnapshot};

mod tree;
pub use tree::{ShapedPacket, DEFAULT_QUEUE_DEPTH};
