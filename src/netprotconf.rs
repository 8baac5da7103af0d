//! Network Protocol Configuration: the strategy a virtual channel uses to
//! tell packets apart from idle data inside a reassembled data field.
//!
//! The base/default strategy ([`NetProtConf::idle`]) treats every byte as a
//! one-byte idle packet, mirroring the "assume all packets are idle, so
//! nothing bad can happen" posture of the protocol's reference
//! implementation. Concrete variants override the capability set; a virtual
//! channel without one wired in falls back to the default owned instance.

use std::fmt;

/// The six capabilities a network protocol configuration must provide.
///
/// Modelled as a tagged variant rather than a trait object: the concrete
/// strategies a virtual channel needs ([`NetProtConf::idle`],
/// [`NetProtConf::test_proto_2b`], [`NetProtConf::space_packet_6b`]) are
/// closed over a handful of constants, and [`Custom`](NetProtConf::Custom)
/// covers anything else via boxed callbacks.
pub enum NetProtConf {
    /// Every byte is a one-byte idle packet.
    Idle,
    /// A 2-byte header: `version(3b) | length(13b)`.
    TestProto2B {
        idle_version: u8,
        test_version: u8,
        idle_byte: u8,
    },
    /// The CCSDS Space Packet 6-byte primary header.
    SpacePacket6B,
    /// A caller-supplied implementation of the capability set.
    Custom(Box<dyn NetProtConfCallbacks>),
}

/// Trait object form of the capability set, for [`NetProtConf::Custom`].
pub trait NetProtConfCallbacks: Send + Sync {
    fn is_idle_packet(&self, first_byte: u8) -> bool;
    fn packet_header_length(&self, first_byte: u8) -> usize;
    fn extract_packet_length(&self, header: &[u8]) -> usize;
    fn generate_idle_packet(&self) -> u8;
    fn generate_test_packet(&self, payload: &[u8]) -> Vec<u8>;
    fn debug_render(&self, packet: &[u8]) -> String {
        format!("{packet:02X?}")
    }
}

impl fmt::Debug for NetProtConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "NetProtConf::Idle"),
            Self::TestProto2B { .. } => write!(f, "NetProtConf::TestProto2B"),
            Self::SpacePacket6B => write!(f, "NetProtConf::SpacePacket6B"),
            Self::Custom(_) => write!(f, "NetProtConf::Custom(..)"),
        }
    }
}

impl Default for NetProtConf {
    fn default() -> Self {
        Self::Idle
    }
}

impl NetProtConf {
    /// The default, base strategy: every byte is a one-byte idle packet.
    pub fn idle() -> Self {
        Self::Idle
    }

    /// A 2-byte test header `version(3b) | length(13b)`, using the
    /// reference implementation's conventional idle byte `0x1F` and
    /// test-packet version `2`.
    pub fn test_proto_2b() -> Self {
        Self::TestProto2B {
            idle_version: 0,
            test_version: 2,
            idle_byte: 0x1F,
        }
    }

    /// The CCSDS Space Packet 6-byte primary header strategy. Has no idle
    /// marker of its own: [`NetProtConf::is_idle_packet`] always returns
    /// `false` for this variant.
    pub fn space_packet_6b() -> Self {
        Self::SpacePacket6B
    }

    pub fn custom(callbacks: impl NetProtConfCallbacks + 'static) -> Self {
        Self::Custom(Box::new(callbacks))
    }

    pub fn is_idle_packet(&self, first_byte: u8) -> bool {
        match self {
            Self::Idle => true,
            Self::TestProto2B { idle_version, .. } => (first_byte >> 5) == *idle_version,
            Self::SpacePacket6B => false,
            Self::Custom(cb) => cb.is_idle_packet(first_byte),
        }
    }

    pub fn packet_header_length(&self, first_byte: u8) -> usize {
        match self {
            Self::Idle => 1,
            Self::TestProto2B { .. } => 2,
            Self::SpacePacket6B => 6,
            Self::Custom(cb) => cb.packet_header_length(first_byte),
        }
    }

    /// Extracts the total packet length (header + payload) from the
    /// already-captured header bytes. `header` is exactly
    /// [`NetProtConf::packet_header_length`] bytes long.
    pub fn extract_packet_length(&self, header: &[u8]) -> usize {
        match self {
            Self::Idle => 1,
            Self::TestProto2B { .. } => {
                let word = u16::from_be_bytes([header[0], header[1]]);
                (word & 0x1FFF) as usize
            }
            Self::SpacePacket6B => {
                let data_len_minus_one = u16::from_be_bytes([header[4], header[5]]);
                data_len_minus_one as usize + 7
            }
            Self::Custom(cb) => cb.extract_packet_length(header),
        }
    }

    pub fn generate_idle_packet(&self) -> u8 {
        match self {
            Self::Idle => b'*',
            Self::TestProto2B { idle_byte, .. } => *idle_byte,
            Self::SpacePacket6B => b'*',
            Self::Custom(cb) => cb.generate_idle_packet(),
        }
    }

    /// Builds a well-formed packet of this protocol's shape around `payload`,
    /// for test/demo purposes.
    pub fn generate_test_packet(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            Self::Idle => vec![self.generate_idle_packet()],
            Self::TestProto2B { test_version, .. } => {
                let total_len = payload.len() + 2;
                let word = (u16::from(*test_version) << 13) | (total_len as u16 & 0x1FFF);
                let mut out = word.to_be_bytes().to_vec();
                out.extend_from_slice(payload);
                out
            }
            Self::SpacePacket6B => {
                let mut out = vec![0u8; 6];
                let header0: u16 = 0x1800; // version 0, type telemetry, sec_hdr=0, apid=0
                out[0..2].copy_from_slice(&header0.to_be_bytes());
                let header1: u16 = 0xC000; // grouping unsegmented, sequence_count = 0
                out[2..4].copy_from_slice(&header1.to_be_bytes());
                let len_minus_one = (payload.len().max(1) - 1) as u16;
                out[4..6].copy_from_slice(&len_minus_one.to_be_bytes());
                out.extend_from_slice(payload);
                out
            }
            Self::Custom(cb) => cb.generate_test_packet(payload),
        }
    }

    /// Renders a packet for `tracing::debug!` consumption when a virtual
    /// channel's `debug_output` flag is set.
    pub fn debug_render(&self, packet: &[u8]) -> String {
        match self {
            Self::Idle => format!("IdlePacket[{} bits] Content: {:02X?}", packet.len() * 8, packet),
            Self::TestProto2B { .. } => format!("TestPacket[{} bits] Content: {:02X?}", packet.len() * 8, packet),
            Self::SpacePacket6B => format!("SpacePacket[{} bits] Content: {:02X?}", packet.len() * 8, packet),
            Self::Custom(cb) => cb.debug_render(packet),
        }
    }
}
