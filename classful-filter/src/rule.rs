use rustc_hash::FxHashSet;

use crate::packet::{PacketDescriptor, Protocol};
use crate::ClassId;

/// Default rule priority, matching tc's default filter priority (49152).
/// Explicitly-prioritized rules usually sit well below this; a rule left at
/// the default is checked after them.
pub const DEFAULT_RULE_PRIORITY: u16 = 49152;

/// Bitmask match over the packet's DSCP/TOS byte.
///
/// Matches when `(packet.tos & mask) == (value & mask)`, the same key/mask
/// semantics a u32 filter applies to the TOS field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TosMatch {
    value: u8,
    mask: u8,
}

impl TosMatch {
    /// Exact match on the full byte (mask `0xFF`).
    pub const fn new(value: u8) -> Self {
        Self { value, mask: 0xFF }
    }

    /// Restricts the comparison to the bits set in `mask`. A mask of
    /// `0xFC` compares only the DSCP bits, ignoring ECN.
    pub const fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    #[inline]
    pub(crate) const fn matches(&self, tos: u8) -> bool {
        tos & self.mask == self.value & self.mask
    }
}

/// One classification rule: a set of match fields and the class that
/// matching packets are steered into.
///
/// Omitted fields are wildcards, so a rule with only a TOS match
/// classifies on TOS alone. All present fields must match for the rule
/// to fire.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    priority: u16,
    protocol: Option<Protocol>,
    src_ports: Option<FxHashSet<u16>>,
    dst_ports: Option<FxHashSet<u16>>,
    tos: Option<TosMatch>,
    target: ClassId,
}

impl ClassificationRule {
    /// Creates a wildcard rule steering everything into `target`, at
    /// [`DEFAULT_RULE_PRIORITY`].
    pub fn new(target: ClassId) -> Self {
        Self {
            priority: DEFAULT_RULE_PRIORITY,
            protocol: None,
            src_ports: None,
            dst_ports: None,
            tos: None,
            target,
        }
    }

    /// Sets the evaluation priority. Lower numbers are checked first; rules
    /// with equal priority keep their configuration order.
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts the rule to one transport protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Restricts the rule to packets whose source port is in the set.
    pub fn with_src_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.src_ports = Some(ports.into_iter().collect());
        self
    }

    /// Restricts the rule to packets whose destination port is in the set.
    pub fn with_dst_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.dst_ports = Some(ports.into_iter().collect());
        self
    }

    /// Restricts the rule by DSCP/TOS byte.
    pub fn with_tos(mut self, tos: TosMatch) -> Self {
        self.tos = Some(tos);
        self
    }

    #[inline]
    pub fn priority(&self) -> u16 {
        self.priority
    }

    #[inline]
    pub fn target(&self) -> ClassId {
        self.target
    }

    pub(crate) fn matches(&self, packet: &PacketDescriptor) -> bool {
        if self.protocol.is_some_and(|p| p != packet.protocol()) {
            return false;
        }
        if let Some(ports) = &self.src_ports {
            if !ports.contains(&packet.src_port()) {
                return false;
            }
        }
        if let Some(ports) = &self.dst_ports {
            if !ports.contains(&packet.dst_port()) {
                return false;
            }
        }
        if let Some(tos) = &self.tos {
            if !tos.matches(packet.tos()) {
                return false;
            }
        }
        true
    }
}

/// An immutable, ordered classification table plus the default class for
/// packets no rule matches.
///
/// Rules are stable-sorted by ascending priority at construction, so equal
/// priorities keep configuration order. A live rule set is never edited:
/// the interface shares it behind an `Arc` and replaces it wholesale on
/// reload, which is what keeps classification atomic with respect to
/// configuration changes.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
    default_class: ClassId,
}

impl RuleSet {
    pub fn new(default_class: ClassId, mut rules: Vec<ClassificationRule>) -> Self {
        rules.sort_by_key(ClassificationRule::priority);
        Self { rules, default_class }
    }

    #[inline]
    pub fn default_class(&self) -> ClassId {
        self.default_class
    }

    #[inline]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Every class id a packet can be steered into, default included.
    /// Used by the scheduler's configuration validation.
    pub fn targets(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.rules.iter().map(ClassificationRule::target).chain(Some(self.default_class))
    }

    /// A DSCP-based policy: expedited-forwarding voice (TOS 184) and
    /// assured-forwarding video (TOS 160) over UDP, everything else into
    /// `data`.
    pub fn dscp_policy(voice: ClassId, video: ClassId, data: ClassId) -> Self {
        Self::new(
            data,
            vec![
                ClassificationRule::new(voice)
                    .with_priority(10)
                    .with_protocol(Protocol::Udp)
                    .with_tos(TosMatch::new(184)),
                ClassificationRule::new(video)
                    .with_priority(20)
                    .with_protocol(Protocol::Udp)
                    .with_tos(TosMatch::new(160)),
            ],
        )
    }

    /// A port-based policy: SIP/RTP ports to `voice`, RTSP/RTMP to `video`,
    /// well-known TCP service ports to `data`, anything else to `unknown`.
    /// Each category matches either direction, so a rule pair (source set,
    /// destination set) shares one priority band.
    pub fn port_policy(voice: ClassId, video: ClassId, data: ClassId, unknown: ClassId) -> Self {
        const VOICE_PORTS: [u16; 5] = [5060, 5004, 5005, 5006, 5007];
        const VIDEO_PORTS: [u16; 2] = [554, 1935];
        const DATA_PORTS: [u16; 7] = [80, 443, 21, 22, 25, 110, 143];

        let directional = |target: ClassId, priority: u16, ports: &[u16]| {
            [
                ClassificationRule::new(target)
                    .with_priority(priority)
                    .with_src_ports(ports.iter().copied()),
                ClassificationRule::new(target)
                    .with_priority(priority)
                    .with_dst_ports(ports.iter().copied()),
            ]
        };

        let mut rules = Vec::with_capacity(6);
        rules.extend(directional(voice, 10, &VOICE_PORTS));
        rules.extend(directional(video, 20, &VIDEO_PORTS));
        rules.extend(directional(data, 30, &DATA_PORTS));
        Self::new(unknown, rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tos_mask_compares_only_masked_bits() {
        // DSCP EF is 46, i.e. TOS 184 once shifted; ECN bits must not matter.
        let rule = TosMatch::new(184).with_mask(0xFC);
        assert!(rule.matches(184));
        assert!(rule.matches(185));
        assert!(rule.matches(186));
        assert!(!rule.matches(160));
    }

    #[test]
    fn omitted_fields_are_wildcards() {
        let rule = ClassificationRule::new(ClassId::new(1)).with_dst_ports([443]);
        let pkt = PacketDescriptor::new(Protocol::Tcp, "10.0.2.3".parse().unwrap(), 1200)
            .with_ports(49500, 443)
            .with_tos(0);
        assert!(rule.matches(&pkt));

        let wrong_port = PacketDescriptor::new(Protocol::Tcp, "10.0.2.3".parse().unwrap(), 1200)
            .with_ports(49500, 8080);
        assert!(!rule.matches(&wrong_port));
    }

    #[test]
    fn all_present_fields_must_match() {
        let rule = ClassificationRule::new(ClassId::new(1))
            .with_protocol(Protocol::Udp)
            .with_tos(TosMatch::new(184));
        let tcp = PacketDescriptor::new(Protocol::Tcp, "10.0.2.3".parse().unwrap(), 200)
            .with_tos(184);
        assert!(!rule.matches(&tcp));
    }
}
