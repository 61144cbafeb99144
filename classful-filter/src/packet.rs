use std::net::IpAddr;

/// Transport protocol of an observed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Any other IP protocol number (ICMP, IGMP, ...).
    Other(u8),
}

impl Protocol {
    /// Whether the protocol carries transport ports the classifier can
    /// match on.
    pub const fn is_port_bearing(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

/// Immutable view of one packet arriving on an interface.
///
/// Only the header fields the engine consults are carried; the payload
/// travels separately as an opaque handle and is never inspected. A
/// descriptor is created per observed packet and discarded once the engine
/// has emitted its decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    length_bytes: u32,
    protocol: Protocol,
    src_port: u16,
    dst_port: u16,
    tos: u8,
    dst: IpAddr,
}

impl PacketDescriptor {
    /// Creates a descriptor for a packet of `length_bytes` on the wire,
    /// headed to `dst`. Ports default to 0 and TOS to 0; set them with the
    /// `with_*` methods when the protocol carries them.
    pub fn new(protocol: Protocol, dst: IpAddr, length_bytes: u32) -> Self {
        Self { length_bytes, protocol, src_port: 0, dst_port: 0, tos: 0, dst }
    }

    /// Sets the transport source and destination ports.
    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    /// Sets the DSCP/TOS byte from the IP header.
    pub fn with_tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    #[inline]
    pub fn length_bytes(&self) -> u32 {
        self.length_bytes
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    #[inline]
    pub fn tos(&self) -> u8 {
        self.tos
    }

    #[inline]
    pub fn dst(&self) -> IpAddr {
        self.dst
    }
}
