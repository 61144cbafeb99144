use classful_common::{Rate, MTU_ETHERNET};
use classful_filter::{ClassId, RuleSet};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Default burst sizing: 10ms worth of traffic at the given rate, floored
/// at one Ethernet MTU so a full-size frame always fits the bucket.
pub(crate) fn default_burst(rate: Rate) -> u64 {
    (rate.bytes_per_sec() / 100).max(u64::from(MTU_ETHERNET))
}

/// Errors rejected at configuration load time.
///
/// Validation is all-or-nothing: any of these rejects the entire
/// configuration and the interface keeps serving whatever it served
/// before (or stays unconfigured on a first attach).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration defines no classes")]
    EmptyTree,
    #[error("class id 1:0 is reserved for the root")]
    ReservedRootId,
    #[error("duplicate class id {0}")]
    DuplicateClass(ClassId),
    #[error("class {class} references unknown parent {parent}")]
    UnknownParent { class: ClassId, parent: ClassId },
    #[error("cyclic parent chain through class {0}")]
    CyclicParents(ClassId),
    #[error("class {0} has a zero ceiling")]
    ZeroCeil(ClassId),
    #[error("class {class}: guaranteed rate {rate} exceeds ceiling {ceil}")]
    RateAboveCeil { class: ClassId, rate: Rate, ceil: Rate },
    #[error("children of {parent} guarantee {guaranteed} combined, above its ceiling {ceil}")]
    GuaranteesExceedCeil { parent: ClassId, guaranteed: Rate, ceil: Rate },
    #[error("rule set steers traffic into unknown class {0}")]
    UnknownTarget(ClassId),
    #[error("class {0} has children and cannot receive traffic directly")]
    TargetNotLeaf(ClassId),
    #[error("class {0} has children and cannot carry a policer")]
    PolicerOnInner(ClassId),
}

/// Hard policing limit for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicerConfig {
    rate: Rate,
    burst_bytes: Option<u64>,
}

impl PolicerConfig {
    pub fn new(rate: Rate) -> Self {
        Self { rate, burst_bytes: None }
    }

    /// Overrides the derived burst. Must be at least the largest packet
    /// the class should ever admit, or such packets will always be
    /// dropped.
    pub fn with_burst(mut self, bytes: u64) -> Self {
        self.burst_bytes = Some(bytes);
        self
    }

    #[inline]
    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub(crate) fn effective_burst(&self) -> u64 {
        self.burst_bytes.unwrap_or_else(|| default_burst(self.rate))
    }
}

/// Definition of one shaping class.
///
/// `rate` is the bandwidth the class is guaranteed when backlogged;
/// `ceil` is the most it may reach by borrowing idle capacity from its
/// ancestors. Priority 0 is the highest and is served first, as with HTB
/// class priorities.
#[derive(Debug, Clone)]
pub struct ClassConfig {
    id: ClassId,
    parent: Option<ClassId>,
    rate: Rate,
    ceil: Rate,
    priority: u8,
    burst_bytes: Option<u64>,
    ceil_burst_bytes: Option<u64>,
    queue_depth: Option<usize>,
    policer: Option<PolicerConfig>,
}

impl ClassConfig {
    /// Creates a class attached directly under the interface root.
    pub fn new(id: ClassId, rate: Rate, ceil: Rate) -> Self {
        Self {
            id,
            parent: None,
            rate,
            ceil,
            priority: 0,
            burst_bytes: None,
            ceil_burst_bytes: None,
            queue_depth: None,
            policer: None,
        }
    }

    /// Re-parents the class under another class instead of the root.
    pub fn with_parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the scheduling priority (0 = highest, served first).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the guaranteed-rate bucket's burst, in bytes.
    pub fn with_burst(mut self, bytes: u64) -> Self {
        self.burst_bytes = Some(bytes);
        self
    }

    /// Overrides the ceiling bucket's burst, in bytes (HTB's `cburst`).
    pub fn with_ceil_burst(mut self, bytes: u64) -> Self {
        self.ceil_burst_bytes = Some(bytes);
        self
    }

    /// Bounds the class queue, in packets. Defaults to
    /// [`DEFAULT_QUEUE_DEPTH`](crate::DEFAULT_QUEUE_DEPTH).
    pub fn with_queue_depth(mut self, packets: usize) -> Self {
        self.queue_depth = Some(packets);
        self
    }

    /// Adds a hard policer on top of the shaping limits.
    pub fn with_policer(mut self, policer: PolicerConfig) -> Self {
        self.policer = Some(policer);
        self
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    #[inline]
    pub fn rate(&self) -> Rate {
        self.rate
    }

    #[inline]
    pub fn ceil(&self) -> Rate {
        self.ceil
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub(crate) fn effective_burst(&self) -> u64 {
        self.burst_bytes.unwrap_or_else(|| default_burst(self.rate))
    }

    pub(crate) fn effective_ceil_burst(&self) -> u64 {
        self.ceil_burst_bytes.unwrap_or_else(|| default_burst(self.ceil))
    }

    pub(crate) fn queue_depth(&self) -> Option<usize> {
        self.queue_depth
    }

    pub(crate) fn policer(&self) -> Option<&PolicerConfig> {
        self.policer.as_ref()
    }
}

/// Complete declarative configuration for one interface: link capacity
/// (which sizes the synthetic root), the class definitions, and the
/// classification rule set.
///
/// Built once, validated as a whole, and applied atomically. There is no
/// incremental mutation of a live tree.
#[derive(Debug, Clone)]
pub struct ShaperConfig {
    link_capacity: Rate,
    classes: Vec<ClassConfig>,
    rules: RuleSet,
}

impl ShaperConfig {
    /// Creates an empty configuration for a link of the given capacity.
    /// The capacity is the orchestrator's answer to the physical-link
    /// byte-capacity query; it becomes the root's rate and ceiling.
    pub fn new(link_capacity: Rate, rules: RuleSet) -> Self {
        Self { link_capacity, classes: Vec::new(), rules }
    }

    /// Adds a class definition.
    pub fn with_class(mut self, class: ClassConfig) -> Self {
        self.classes.push(class);
        self
    }

    #[inline]
    pub fn link_capacity(&self) -> Rate {
        self.link_capacity
    }

    #[inline]
    pub fn classes(&self) -> &[ClassConfig] {
        &self.classes
    }

    #[inline]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Validates the configuration as a whole. Nothing is applied on
    /// failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classes.is_empty() {
            return Err(ConfigError::EmptyTree);
        }

        let mut by_id: FxHashMap<ClassId, &ClassConfig> = FxHashMap::default();
        for class in &self.classes {
            if class.id() == ClassId::new(0) {
                return Err(ConfigError::ReservedRootId);
            }
            if by_id.insert(class.id(), class).is_some() {
                return Err(ConfigError::DuplicateClass(class.id()));
            }
        }

        let mut parents: FxHashSet<ClassId> = FxHashSet::default();
        for class in &self.classes {
            if let Some(parent) = class.parent() {
                if !by_id.contains_key(&parent) {
                    return Err(ConfigError::UnknownParent { class: class.id(), parent });
                }
                parents.insert(parent);
            }

            // Walk the parent chain; revisiting a node means a cycle.
            let mut seen: FxHashSet<ClassId> = FxHashSet::default();
            seen.insert(class.id());
            let mut cursor = class.parent();
            while let Some(id) = cursor {
                if !seen.insert(id) {
                    return Err(ConfigError::CyclicParents(id));
                }
                cursor = by_id.get(&id).and_then(|c| c.parent());
            }

            if class.ceil().is_zero() {
                return Err(ConfigError::ZeroCeil(class.id()));
            }
            if class.rate() > class.ceil() {
                return Err(ConfigError::RateAboveCeil {
                    class: class.id(),
                    rate: class.rate(),
                    ceil: class.ceil(),
                });
            }
        }

        // Children may not collectively guarantee more than the parent's
        // ceiling (the root's ceiling being the link capacity).
        let mut guaranteed: FxHashMap<Option<ClassId>, u64> = FxHashMap::default();
        for class in &self.classes {
            *guaranteed.entry(class.parent()).or_default() += class.rate().bytes_per_sec();
        }
        for (parent, sum) in guaranteed {
            let (parent_id, ceil) = match parent {
                None => (ClassId::new(0), self.link_capacity),
                Some(id) => (id, by_id[&id].ceil()),
            };
            if sum > ceil.bytes_per_sec() {
                return Err(ConfigError::GuaranteesExceedCeil {
                    parent: parent_id,
                    guaranteed: Rate::from_bytes_per_sec(sum),
                    ceil,
                });
            }
        }

        for class in &self.classes {
            if parents.contains(&class.id()) && class.policer().is_some() {
                return Err(ConfigError::PolicerOnInner(class.id()));
            }
        }

        // Every class the rule set can steer into must exist and be a leaf.
        for target in self.rules.targets() {
            match by_id.get(&target) {
                None => return Err(ConfigError::UnknownTarget(target)),
                Some(_) if parents.contains(&target) => {
                    return Err(ConfigError::TargetNotLeaf(target))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}
