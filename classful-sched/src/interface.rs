use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use classful_common::{Clock, MonotonicClock};
use classful_filter::{ClassId, PacketDescriptor, RuleSet, Verdict};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::config::{ConfigError, ShaperConfig};
use crate::stats::{ClassStats, StatsSnapshot};
use crate::tree::{ClassTree, Enqueue, ShapedPacket};

/// Decision returned by [`Shaper::ingress`] for every offered packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Classified, policed, and queued in the given class.
    Admitted(ClassId),
    /// Multicast or non-TCP/UDP; bypasses the shaping tree untouched.
    Excluded,
    /// Dropped by the class policer's hard limit.
    PolicedDrop,
    /// Dropped because the class queue is at its depth bound.
    QueueFull,
}

/// Configuration lifecycle of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No configuration attached; ingress and dequeue are errors.
    Unconfigured,
    /// Serving an attached configuration.
    Active,
    /// A replacement configuration is being validated and staged while
    /// the current one keeps serving.
    Draining,
}

#[derive(Debug, Error)]
pub enum ShaperError {
    #[error("interface has no attached configuration")]
    NotAttached,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("class {0} is not in the active tree")]
    UnknownClass(ClassId),
}

/// Everything one attached configuration owns: the rule set shared with
/// classifying callers, the tree behind its queue lock, and the counter
/// registry.
#[derive(Debug)]
struct ActiveState {
    rules: Arc<RuleSet>,
    tree: Mutex<ClassTree>,
    stats: FxHashMap<ClassId, Arc<ClassStats>>,
    excluded: Arc<AtomicU64>,
}

/// One interface's shaping engine.
///
/// Owns the class tree, rule set, and counters for a single egress
/// interface. Instances share nothing, so interfaces can be driven fully
/// in parallel; within one interface, classification is lock-free reads
/// of the swapped-in rule set while enqueue/dequeue serialize on the
/// tree lock.
///
/// Configuration replacement is atomic: [`reload`](Self::reload) builds
/// and validates the new tree while the old one keeps serving, then swaps
/// both tree and rules in a single write. In-flight callers observe
/// either the old configuration or the new one, never a mix.
#[derive(Debug)]
pub struct Shaper {
    name: String,
    clock: Arc<dyn Clock>,
    active: RwLock<Option<ActiveState>>,
    draining: AtomicBool,
    /// Signalled on every admission; the egress driver parks on it.
    notify: Notify,
}

impl Shaper {
    /// Creates a detached shaper for the named interface on the
    /// production monotonic clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(MonotonicClock))
    }

    /// Creates a detached shaper with an explicit clock source. Tests use
    /// this with a manually-advanced clock.
    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            active: RwLock::new(None),
            draining: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        if self.draining.load(Ordering::Acquire) {
            Phase::Draining
        } else if self.active.read().is_some() {
            Phase::Active
        } else {
            Phase::Unconfigured
        }
    }

    /// Attaches a configuration, validating it as a whole. On a fresh
    /// attach all counters start at zero; attaching over an existing
    /// configuration is a re-attach and resets them too. Use
    /// [`reload`](Self::reload) to replace configuration without losing
    /// counter history.
    pub fn attach(&self, config: ShaperConfig) -> Result<(), ShaperError> {
        let state = self.build_state(&config, None)?;
        *self.active.write() = Some(state);
        debug!(interface = %self.name, classes = config.classes().len(), "configuration attached");
        Ok(())
    }

    /// Replaces the configuration atomically.
    ///
    /// The old tree keeps serving while the replacement is validated and
    /// built (the interface reports [`Phase::Draining`] for that window).
    /// A validation failure changes nothing: classification and
    /// scheduling continue against the old configuration exactly as
    /// before. Counters carry over for classes that keep their id;
    /// packets still queued in the replaced tree are discarded.
    pub fn reload(&self, config: ShaperConfig) -> Result<(), ShaperError> {
        if self.active.read().is_none() {
            return self.attach(config);
        }

        self.draining.store(true, Ordering::Release);
        let result = self.build_state(&config, Some(&self.active));
        let outcome = match result {
            Ok(state) => {
                let mut guard = self.active.write();
                let discarded =
                    guard.as_ref().map_or(0, |old| old.tree.lock().total_queued());
                *guard = Some(state);
                debug!(interface = %self.name, discarded, "configuration replaced");
                Ok(())
            }
            Err(err) => {
                debug!(interface = %self.name, %err, "reload rejected; old configuration kept");
                Err(err)
            }
        };
        self.draining.store(false, Ordering::Release);
        outcome
    }

    /// Detaches the interface, synchronously discarding anything still
    /// queued and dropping all counters.
    pub fn detach(&self) {
        if let Some(state) = self.active.write().take() {
            let discarded = state.tree.lock().total_queued();
            debug!(interface = %self.name, discarded, "detached");
        }
        // Wake egress waiters so they observe the detach promptly.
        self.notify.notify_waiters();
    }

    /// Runs one packet through classification, policing, and admission.
    ///
    /// The returned [`Decision`] tells the caller exactly what happened;
    /// dropped packets are counted but never resent by the engine.
    pub fn ingress(
        &self,
        descriptor: PacketDescriptor,
        payload: Bytes,
    ) -> Result<Decision, ShaperError> {
        let guard = self.active.read();
        let state = guard.as_ref().ok_or(ShaperError::NotAttached)?;

        let class = match state.rules.classify(&descriptor) {
            Verdict::Excluded => {
                state.excluded.fetch_add(1, Ordering::Relaxed);
                return Ok(Decision::Excluded);
            }
            Verdict::Class(class) => class,
        };
        let stats =
            state.stats.get(&class).ok_or(ShaperError::UnknownClass(class))?;
        let bytes = descriptor.length_bytes();
        let now = self.clock.now();

        let mut tree = state.tree.lock();
        let idx = tree.lookup(class).ok_or(ShaperError::UnknownClass(class))?;

        if !tree.police(idx, bytes, now) {
            stats.record_policed_drop();
            trace!(interface = %self.name, %class, bytes, "policed drop");
            return Ok(Decision::PolicedDrop);
        }

        match tree.enqueue(idx, ShapedPacket::new(class, descriptor, payload, now)) {
            Enqueue::Queued { delayed } => {
                stats.record_admitted(bytes);
                if delayed {
                    stats.record_shaped_delayed();
                }
                drop(tree);
                drop(guard);
                self.notify.notify_one();
                Ok(Decision::Admitted(class))
            }
            Enqueue::Full => {
                stats.record_queue_drop();
                Ok(Decision::QueueFull)
            }
        }
    }

    /// Pulls the next packet the schedule allows, or `None` when nothing
    /// is currently eligible. Never blocks: callers poll again (or wait
    /// for [`next_wake`](Self::next_wake), or use [`crate::Egress`]).
    pub fn dequeue_next(&self) -> Result<Option<ShapedPacket>, ShaperError> {
        let guard = self.active.read();
        let state = guard.as_ref().ok_or(ShaperError::NotAttached)?;
        let now = self.clock.now();

        let packet = state.tree.lock().dequeue_next(now);
        if let Some(packet) = &packet {
            if let Some(stats) = state.stats.get(&packet.class()) {
                stats.record_dequeued(packet.descriptor().length_bytes());
            }
        }
        Ok(packet)
    }

    /// How long until a backlogged class could next become eligible.
    /// `None` when nothing is queued (or nothing is attached).
    pub fn next_wake(&self) -> Option<Duration> {
        let guard = self.active.read();
        let state = guard.as_ref()?;
        let now = self.clock.now();
        let wake = state.tree.lock().next_wake(now);
        wake
    }

    /// Point-in-time counter snapshot. An unconfigured interface reports
    /// an empty snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        match &*self.active.read() {
            None => StatsSnapshot::default(),
            Some(state) => StatsSnapshot {
                classes: state
                    .stats
                    .iter()
                    .map(|(id, stats)| (*id, stats.snapshot()))
                    .collect(),
                excluded_packets: state.excluded.load(Ordering::Relaxed),
            },
        }
    }

    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }

    /// Builds the replacement state. When `carry_over` is given, classes
    /// that keep their id keep their counters, and the interface-level
    /// excluded count is carried with them.
    fn build_state(
        &self,
        config: &ShaperConfig,
        carry_over: Option<&RwLock<Option<ActiveState>>>,
    ) -> Result<ActiveState, ShaperError> {
        let now = self.clock.now();
        let tree = ClassTree::build(config, now)?;

        let previous = carry_over.map(|lock| lock.read());
        let previous = previous.as_ref().and_then(|guard| guard.as_ref());

        let stats = config
            .classes()
            .iter()
            .map(|class| {
                let carried = previous
                    .and_then(|old| old.stats.get(&class.id()).cloned())
                    .unwrap_or_default();
                (class.id(), carried)
            })
            .collect();
        let excluded = previous
            .map(|old| Arc::clone(&old.excluded))
            .unwrap_or_default();

        Ok(ActiveState {
            rules: Arc::new(config.rules().clone()),
            tree: Mutex::new(tree),
            stats,
            excluded,
        })
    }
}

impl fmt::Display for Shaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shaper({})", self.name)
    }
}
