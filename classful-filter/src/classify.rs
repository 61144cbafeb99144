use tracing::trace;

use crate::packet::PacketDescriptor;
use crate::rule::RuleSet;
use crate::ClassId;

/// Outcome of classifying one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Shape the packet through the given class.
    Class(ClassId),
    /// Multicast or non-TCP/UDP traffic. Excluded packets bypass the
    /// shaping tree entirely: they are neither policed nor queued, and no
    /// class counter moves for them.
    Excluded,
}

impl RuleSet {
    /// Classifies a packet against this rule set.
    ///
    /// Deterministic and total: identical inputs against an unchanged rule
    /// set always produce the same verdict, and every packet gets exactly
    /// one: a matched class, the default class, or [`Verdict::Excluded`].
    ///
    /// The first rule (in ascending priority order) whose present fields
    /// all match wins. No side effects; safe to call from any number of
    /// threads sharing the set.
    pub fn classify(&self, packet: &PacketDescriptor) -> Verdict {
        if packet.dst().is_multicast() || !packet.protocol().is_port_bearing() {
            trace!(dst = %packet.dst(), protocol = ?packet.protocol(), "excluded from shaping");
            return Verdict::Excluded;
        }

        for rule in self.rules() {
            if rule.matches(packet) {
                trace!(class = %rule.target(), priority = rule.priority(), "rule matched");
                return Verdict::Class(rule.target());
            }
        }

        Verdict::Class(self.default_class())
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;
    use crate::rule::{ClassificationRule, TosMatch};
    use crate::Protocol;

    const VOICE: ClassId = ClassId::new(10);
    const VIDEO: ClassId = ClassId::new(20);
    const DATA: ClassId = ClassId::new(30);
    const UNKNOWN: ClassId = ClassId::new(40);

    fn server() -> IpAddr {
        "10.0.2.3".parse().unwrap()
    }

    fn udp(tos: u8, dst_port: u16) -> PacketDescriptor {
        PacketDescriptor::new(Protocol::Udp, server(), 200).with_tos(tos).with_ports(40000, dst_port)
    }

    #[test]
    fn lowest_priority_number_wins_regardless_of_list_order() {
        // Both rules match a TOS-184 UDP packet; the priority-1 rule must
        // win even though it is listed second.
        let set = RuleSet::new(
            DATA,
            vec![
                ClassificationRule::new(VIDEO).with_priority(5).with_protocol(Protocol::Udp),
                ClassificationRule::new(VOICE).with_priority(1).with_tos(TosMatch::new(184)),
            ],
        );
        assert_eq!(set.classify(&udp(184, 9000)), Verdict::Class(VOICE));
    }

    #[test]
    fn equal_priority_keeps_configuration_order() {
        let set = RuleSet::new(
            DATA,
            vec![
                ClassificationRule::new(VOICE).with_priority(7).with_protocol(Protocol::Udp),
                ClassificationRule::new(VIDEO).with_priority(7).with_protocol(Protocol::Udp),
            ],
        );
        assert_eq!(set.classify(&udp(0, 9000)), Verdict::Class(VOICE));
    }

    #[test]
    fn no_match_falls_back_to_default_class() {
        let set = RuleSet::new(
            DATA,
            vec![ClassificationRule::new(VOICE).with_priority(1).with_tos(TosMatch::new(184))],
        );
        assert_eq!(set.classify(&udp(0, 9000)), Verdict::Class(DATA));
    }

    #[test]
    fn classification_is_deterministic() {
        let set = RuleSet::dscp_policy(VOICE, VIDEO, DATA);
        let pkt = udp(184, 5004);
        let first = set.classify(&pkt);
        for _ in 0..100 {
            assert_eq!(set.classify(&pkt), first);
        }
    }

    #[test]
    fn multicast_and_non_transport_are_excluded() {
        let set = RuleSet::dscp_policy(VOICE, VIDEO, DATA);

        let multicast = PacketDescriptor::new(Protocol::Udp, "224.0.0.251".parse().unwrap(), 120);
        assert_eq!(set.classify(&multicast), Verdict::Excluded);

        let v6_multicast = PacketDescriptor::new(Protocol::Udp, "ff02::1".parse().unwrap(), 120);
        assert_eq!(set.classify(&v6_multicast), Verdict::Excluded);

        let icmp = PacketDescriptor::new(Protocol::Other(1), server(), 84);
        assert_eq!(set.classify(&icmp), Verdict::Excluded);
    }

    #[test]
    fn dscp_policy_matches_voice_and_video_marks() {
        let set = RuleSet::dscp_policy(VOICE, VIDEO, DATA);
        assert_eq!(set.classify(&udp(184, 9000)), Verdict::Class(VOICE));
        assert_eq!(set.classify(&udp(160, 9000)), Verdict::Class(VIDEO));
        assert_eq!(set.classify(&udp(0, 9000)), Verdict::Class(DATA));

        let tcp = PacketDescriptor::new(Protocol::Tcp, server(), 1400).with_tos(184);
        assert_eq!(set.classify(&tcp), Verdict::Class(DATA));
    }

    #[test]
    fn port_policy_matches_either_direction() {
        let set = RuleSet::port_policy(VOICE, VIDEO, DATA, UNKNOWN);

        // SIP by destination port.
        assert_eq!(set.classify(&udp(0, 5060)), Verdict::Class(VOICE));

        // RTP by source port (a reply flow).
        let reply = PacketDescriptor::new(Protocol::Udp, server(), 200).with_ports(5004, 40000);
        assert_eq!(set.classify(&reply), Verdict::Class(VOICE));

        let rtsp = PacketDescriptor::new(Protocol::Tcp, server(), 600).with_ports(41000, 554);
        assert_eq!(set.classify(&rtsp), Verdict::Class(VIDEO));

        let https = PacketDescriptor::new(Protocol::Tcp, server(), 1400).with_ports(41000, 443);
        assert_eq!(set.classify(&https), Verdict::Class(DATA));

        assert_eq!(set.classify(&udp(0, 9999)), Verdict::Class(UNKNOWN));
    }
}
