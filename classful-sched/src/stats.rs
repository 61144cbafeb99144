use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use classful_filter::ClassId;
use rustc_hash::FxHashMap;

/// Live counters for one shaping class.
/// Shared between the ingress/dequeue paths and telemetry readers;
/// monotonically increasing, cleared only by detaching the interface.
#[derive(Debug, Default)]
pub(crate) struct ClassStats {
    admitted_packets: AtomicU64,
    admitted_bytes: AtomicU64,
    shaped_delayed: AtomicU64,
    policed_dropped: AtomicU64,
    queue_dropped: AtomicU64,
    dequeued_packets: AtomicU64,
    dequeued_bytes: AtomicU64,
}

impl ClassStats {
    #[inline]
    pub(crate) fn record_admitted(&self, bytes: u32) {
        self.admitted_packets.fetch_add(1, Ordering::Relaxed);
        self.admitted_bytes.fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_shaped_delayed(&self) {
        self.shaped_delayed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_policed_drop(&self) {
        self.policed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_queue_drop(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dequeued(&self, bytes: u32) {
        self.dequeued_packets.fetch_add(1, Ordering::Relaxed);
        self.dequeued_bytes.fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClassCounters {
        ClassCounters {
            admitted_packets: self.admitted_packets.load(Ordering::Relaxed),
            admitted_bytes: self.admitted_bytes.load(Ordering::Relaxed),
            shaped_delayed: self.shaped_delayed.load(Ordering::Relaxed),
            policed_dropped: self.policed_dropped.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            dequeued_packets: self.dequeued_packets.load(Ordering::Relaxed),
            dequeued_bytes: self.dequeued_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one class's counters.
///
/// Each field is read atomically, but the struct as a whole is not a
/// cross-counter transaction. Adequate for monitoring, which is its job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounters {
    /// Packets that passed policing and joined the class queue.
    pub admitted_packets: u64,
    /// Bytes admitted into the class queue.
    pub admitted_bytes: u64,
    /// Admitted packets that could not transmit immediately (backlog
    /// ahead of them, or no guarantee credit on arrival).
    pub shaped_delayed: u64,
    /// Packets dropped by the class policer's hard limit.
    pub policed_dropped: u64,
    /// Packets dropped because the class queue was at its depth bound.
    pub queue_dropped: u64,
    /// Packets the scheduler released for transmission.
    pub dequeued_packets: u64,
    /// Bytes released for transmission.
    pub dequeued_bytes: u64,
}

/// Telemetry snapshot for one interface.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Counters per shaping class.
    pub classes: FxHashMap<ClassId, ClassCounters>,
    /// Packets excluded from shaping entirely (multicast, non-TCP/UDP).
    pub excluded_packets: u64,
}

impl fmt::Display for StatsSnapshot {
    /// A per-class traffic summary, one line per class in id order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<ClassId> = self.classes.keys().copied().collect();
        ids.sort();
        for id in ids {
            let c = &self.classes[&id];
            writeln!(
                f,
                "{id}: admitted {} pkts / {} B, dequeued {} pkts / {} B, \
                 delayed {}, policed {}, queue-dropped {}",
                c.admitted_packets,
                c.admitted_bytes,
                c.dequeued_packets,
                c.dequeued_bytes,
                c.shaped_delayed,
                c.policed_dropped,
                c.queue_dropped,
            )?;
        }
        write!(f, "excluded: {} pkts", self.excluded_packets)
    }
}
