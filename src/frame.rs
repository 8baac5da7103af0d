//! Bit-exact encode/decode of one TM Transfer Frame, per ECSS-E-ST-50-03C.
//!
//! A [`TmTransferFrame`] is configured once (frame length, FECF policy,
//! secondary header usage, extended VC frame count) and then `wrap`ped for
//! transmission or `unwrap`ped from received bytes against that same
//! configuration. The configuration is never read back through a parent
//! pointer: callers snapshot it at construction, per the channel ownership
//! model in the rest of this crate.

use crate::error::TransferFrameError;
use crate::ocf::Ocf;
use crate::timestamp::{FrameBitrate, FrameTimestamp};
use byteorder::{BigEndian, ReadBytesExt};
use crc::{Crc, CRC_16_IBM_3740};
use std::io::{Cursor, Read};

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflect, no final XOR.
/// A correctly received frame with its FECF attached CRCs to zero.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub const MIN_FRAME_LENGTH: u16 = 7;
pub const MAX_FRAME_LENGTH: u16 = 2048;
pub const PRIMARY_HEADER_LENGTH: u16 = 6;
pub const FECF_LENGTH: u16 = 2;
pub const OCF_LENGTH: u16 = 4;
pub const MAX_SECONDARY_HEADER_DATA_LENGTH: u8 = 63;
pub const TRANSFER_FRAME_VERSION: u8 = 0;

/// Byte offset of the first packet header inside the data field, or one of
/// the two reserved sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstHeaderPointer {
    /// A real offset into the data field. Must be `< 0x7FE`.
    ByteIndex(u16),
    /// `0x7FE`: the data field contains idle data only.
    OnlyIdleData,
    /// `0x7FF`: no packet header starts in this frame (continuation only).
    NoFirstHeader,
}

impl FirstHeaderPointer {
    pub const ONLY_IDLE_DATA: u16 = 0x7FE;
    pub const NO_FIRST_HEADER: u16 = 0x7FF;

    pub fn into_u16(self) -> u16 {
        match self {
            Self::ByteIndex(v) => v & 0x7FF,
            Self::OnlyIdleData => Self::ONLY_IDLE_DATA,
            Self::NoFirstHeader => Self::NO_FIRST_HEADER,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value & 0x7FF {
            Self::ONLY_IDLE_DATA => Self::OnlyIdleData,
            Self::NO_FIRST_HEADER => Self::NoFirstHeader,
            v => Self::ByteIndex(v),
        }
    }
}

/// Snapshot of the per-physical-channel/per-master-channel settings a frame
/// needs in order to wrap or unwrap itself, passed by value rather than
/// through a back-pointer to the owning channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    pub frame_length: u16,
    pub fecf_present: bool,
    pub ocf_present: bool,
    pub secondary_header_present: bool,
    pub extended_vc_frame_count: bool,
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), TransferFrameError> {
        if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&self.frame_length) {
            return Err(TransferFrameError::FrameLengthOutOfRange(self.frame_length));
        }
        Ok(())
    }

    /// The maximum number of secondary-header data bytes that fit given the
    /// rest of this configuration, clamped to the protocol's hard ceiling of
    /// 64 total bytes (1 header byte + up to 63 data bytes).
    pub fn max_secondary_header_data_length(&self) -> u8 {
        let reserved = PRIMARY_HEADER_LENGTH
            + OCF_LENGTH * self.ocf_present as u16
            + FECF_LENGTH * self.fecf_present as u16
            + 1; // at least one data-field byte must remain
        let available = self.frame_length.saturating_sub(reserved);
        available.min(MAX_SECONDARY_HEADER_DATA_LENGTH as u16) as u8
    }

    /// The raw (possibly non-positive) data field length given a concrete
    /// secondary-header data length. Overflow is the caller's job to check.
    fn raw_data_field_length(&self, sh_data_len: u16) -> i64 {
        let sh_total = if self.secondary_header_present {
            1 + sh_data_len as i64
        } else {
            0
        };
        self.frame_length as i64
            - PRIMARY_HEADER_LENGTH as i64
            - sh_total
            - OCF_LENGTH as i64 * self.ocf_present as i64
            - FECF_LENGTH as i64 * self.fecf_present as i64
    }

    /// Data field length for a secondary header carrying `sh_data_len`
    /// bytes of mission data (0 when no secondary header is present, or
    /// when extended VC frame count forces exactly 3 bytes).
    pub fn data_field_length(&self, sh_data_len: u16) -> Result<u16, TransferFrameError> {
        let raw = self.raw_data_field_length(sh_data_len);
        if raw <= 0 {
            return Err(TransferFrameError::Overflow(raw));
        }
        Ok(raw as u16)
    }
}

/// One fixed-length TM Transfer Frame, fully decoded: primary header fields,
/// secondary header (if present), data field, OCF (if present), plus the
/// receive-only timestamp/bitrate metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TmTransferFrame {
    config: FrameConfig,

    pub tfvn: u8,
    pub scid: u16,
    pub vcid: u8,
    pub ocf_flag: bool,
    pub mc_frame_count: u8,
    /// The full (possibly 32-bit extended) virtual channel frame counter.
    /// Only the low byte is meaningful unless `config.extended_vc_frame_count`.
    pub vc_frame_count: u32,
    pub secondary_header_flag: bool,
    /// True iff this frame's data field is byte-synchronised, forward
    /// ordered packets-or-idle-data framed with a First Header Pointer —
    /// the wire `sync_flag` is the logical *negation* of this value
    /// (`sync_flag == 0` when `data_field_synchronised == true`). Preserve
    /// this inversion in both `wrap` and `unwrap`.
    pub data_field_synchronised: bool,
    pub first_header_pointer: FirstHeaderPointer,

    /// Secondary header mission-specific data bytes (excludes the
    /// version/length byte, which is derived at encode time).
    pub secondary_header_data: Vec<u8>,
    pub data_field: Vec<u8>,
    pub ocf: Option<Ocf>,

    pub timestamp: FrameTimestamp,
    pub bitrate: FrameBitrate,
}

impl TmTransferFrame {
    /// A frame with all fields zeroed/defaulted under the given configuration.
    pub fn new(config: FrameConfig) -> Result<Self, TransferFrameError> {
        config.validate()?;
        Ok(Self {
            config,
            tfvn: TRANSFER_FRAME_VERSION,
            scid: 0,
            vcid: 0,
            ocf_flag: config.ocf_present,
            mc_frame_count: 0,
            vc_frame_count: 0,
            secondary_header_flag: config.secondary_header_present,
            data_field_synchronised: true,
            first_header_pointer: FirstHeaderPointer::NoFirstHeader,
            secondary_header_data: Vec::new(),
            data_field: Vec::new(),
            ocf: None,
            timestamp: FrameTimestamp::new(),
            bitrate: FrameBitrate::new(),
        })
    }

    pub fn config(&self) -> FrameConfig {
        self.config
    }

    pub fn length(&self) -> u16 {
        self.config.frame_length
    }

    pub fn fecf_status(&self) -> bool {
        self.config.fecf_present
    }

    /// The data field length this frame's configuration currently implies.
    /// Fails with [`TransferFrameError::Overflow`] if the reserved header,
    /// OCF and FECF bytes leave zero or fewer bytes for the data field.
    pub fn data_field_length(&self) -> Result<u16, TransferFrameError> {
        let sh_len = if self.config.extended_vc_frame_count {
            3
        } else {
            self.secondary_header_data.len() as u16
        };
        self.config.data_field_length(sh_len)
    }

    /// Assigns the data field. Requires the slice to be exactly
    /// [`TmTransferFrame::data_field_length`] bytes — unlike reading it
    /// back, assignment is strict.
    pub fn set_data_field(&mut self, data: Vec<u8>) -> Result<(), TransferFrameError> {
        let expected = self.data_field_length()? as usize;
        if data.len() != expected {
            return Err(TransferFrameError::WrongDataFieldLength(data.len(), expected));
        }
        self.data_field = data;
        Ok(())
    }

    /// Reads the data field back, padding with zero bytes or truncating to
    /// exactly `want` bytes. This leniency exists only on the read path;
    /// writing the data field (`set_data_field`) enforces exact sizing.
    pub fn data_field_padded(&self, want: usize) -> Vec<u8> {
        let mut out = self.data_field.clone();
        out.resize(want, 0);
        out
    }

    pub fn activate_extended_vc_frame_count(&mut self) {
        self.config.extended_vc_frame_count = true;
    }

    /// Reconstructs the full 32-bit VC frame counter from the low byte in
    /// the primary header and the three high bytes carried in the secondary
    /// header data field. Only meaningful when extended counting is active.
    fn assemble_extended_vc_frame_count(low_byte: u8, sh_data: &[u8; 3]) -> u32 {
        (u32::from(sh_data[0]) << 24)
            | (u32::from(sh_data[1]) << 16)
            | (u32::from(sh_data[2]) << 8)
            | u32::from(low_byte)
    }

    /// Serializes this frame to exactly [`FrameConfig::frame_length`] bytes.
    pub fn wrap(&self) -> Result<Vec<u8>, TransferFrameError> {
        let data_field_length = self.data_field_length()?;
        if self.data_field.len() != data_field_length as usize {
            return Err(TransferFrameError::WrongDataFieldLength(
                self.data_field.len(),
                data_field_length as usize,
            ));
        }

        let mut out = Vec::with_capacity(self.config.frame_length as usize);

        let sync_flag_bit: u16 = if self.data_field_synchronised { 0 } else { 1 };
        let first_word: u16 = (u16::from(self.tfvn) & 0x3) << 14
            | (self.scid & 0x3FF) << 4
            | (u16::from(self.vcid) & 0x7) << 1
            | self.ocf_flag as u16;
        let second_word: u16 = (self.secondary_header_flag as u16) << 15
            | sync_flag_bit << 14
            | 0 << 13 // packet_order, reserved, fixed to 0
            | 0b11 << 11 // segment_len_id, fixed to 0b11 (unsegmented)
            | self.first_header_pointer.into_u16();

        out.extend_from_slice(&first_word.to_be_bytes());
        out.push(self.mc_frame_count);
        out.push((self.vc_frame_count & 0xFF) as u8);
        out.extend_from_slice(&second_word.to_be_bytes());

        if self.secondary_header_flag {
            let sh_data: Vec<u8> = if self.config.extended_vc_frame_count {
                vec![
                    (self.vc_frame_count >> 24) as u8,
                    (self.vc_frame_count >> 16) as u8,
                    (self.vc_frame_count >> 8) as u8,
                ]
            } else {
                self.secondary_header_data.clone()
            };
            if sh_data.len() > MAX_SECONDARY_HEADER_DATA_LENGTH as usize {
                return Err(TransferFrameError::SecondaryHeaderTooLong(
                    sh_data.len(),
                    MAX_SECONDARY_HEADER_DATA_LENGTH,
                ));
            }
            out.push((TRANSFER_FRAME_VERSION & 0x3) << 6 | sh_data.len() as u8);
            out.extend_from_slice(&sh_data);
        }

        out.extend_from_slice(&self.data_field);

        if self.ocf_flag {
            let ocf = self.ocf.as_ref().ok_or(TransferFrameError::MissingOcf)?;
            out.extend_from_slice(&ocf.wrap());
        }

        if self.config.fecf_present {
            let fecf = CRC16.checksum(&out);
            out.extend_from_slice(&fecf.to_be_bytes());
        }

        debug_assert_eq!(out.len(), self.config.frame_length as usize);
        Ok(out)
    }

    /// Parses `raw` against this frame's configuration, replacing its own
    /// contents. `raw` must be exactly [`FrameConfig::frame_length`] bytes.
    pub fn unwrap(&mut self, raw: &[u8]) -> Result<(), TransferFrameError> {
        if raw.len() != self.config.frame_length as usize {
            return Err(TransferFrameError::WrongLength(
                raw.len(),
                self.config.frame_length,
            ));
        }

        if self.config.fecf_present && CRC16.checksum(raw) != 0 {
            return Err(TransferFrameError::Checksum);
        }

        let mut cursor = Cursor::new(raw);
        let first_word = cursor.read_u16::<BigEndian>()?;
        let tfvn = ((first_word >> 14) & 0x3) as u8;
        if tfvn != TRANSFER_FRAME_VERSION {
            return Err(TransferFrameError::UnsupportedVersion(tfvn));
        }
        let scid = (first_word >> 4) & 0x3FF;
        let vcid = ((first_word >> 1) & 0x7) as u8;
        let ocf_flag = (first_word & 0x1) != 0;

        let mc_frame_count = cursor.read_u8()?;
        let vc_frame_count_low = cursor.read_u8()?;

        let second_word = cursor.read_u16::<BigEndian>()?;
        let secondary_header_flag = (second_word >> 15) & 0x1 != 0;
        let sync_flag = (second_word >> 14) & 0x1;
        let data_field_synchronised = sync_flag == 0;
        let first_header_pointer = FirstHeaderPointer::from_u16(second_word & 0x7FF);

        let mut secondary_header_data = Vec::new();
        let mut vc_frame_count = u32::from(vc_frame_count_low);

        if secondary_header_flag {
            let sh_first_byte = cursor.read_u8()?;
            let sh_data_len = (sh_first_byte & 0x3F) as usize;
            let max = self.config.max_secondary_header_data_length() as usize;
            if sh_data_len > max {
                return Err(TransferFrameError::SecondaryHeaderTooLong(sh_data_len, max as u8));
            }
            secondary_header_data = vec![0u8; sh_data_len];
            cursor.read_exact(&mut secondary_header_data)?;

            if self.config.extended_vc_frame_count {
                if secondary_header_data.len() < 3 {
                    return Err(TransferFrameError::SecondaryHeaderTooLong(
                        secondary_header_data.len(),
                        3,
                    ));
                }
                let high = [
                    secondary_header_data[0],
                    secondary_header_data[1],
                    secondary_header_data[2],
                ];
                vc_frame_count = Self::assemble_extended_vc_frame_count(vc_frame_count_low, &high);
            }
        }

        let position = cursor.position() as usize;
        let trailer_len = OCF_LENGTH as usize * ocf_flag as usize
            + FECF_LENGTH as usize * self.config.fecf_present as usize;
        if raw.len() < position + trailer_len {
            return Err(TransferFrameError::Overflow(
                raw.len() as i64 - position as i64 - trailer_len as i64,
            ));
        }
        let data_field_end = raw.len() - FECF_LENGTH as usize * self.config.fecf_present as usize
            - OCF_LENGTH as usize * ocf_flag as usize;
        let data_field = raw[position..data_field_end].to_vec();

        let ocf = if ocf_flag {
            Some(Ocf::unwrap(&raw[data_field_end..data_field_end + OCF_LENGTH as usize])?)
        } else {
            None
        };

        self.tfvn = tfvn;
        self.scid = scid;
        self.vcid = vcid;
        self.ocf_flag = ocf_flag;
        self.mc_frame_count = mc_frame_count;
        self.vc_frame_count = vc_frame_count;
        self.secondary_header_flag = secondary_header_flag;
        self.data_field_synchronised = data_field_synchronised;
        self.first_header_pointer = first_header_pointer;
        self.secondary_header_data = secondary_header_data;
        self.data_field = data_field;
        self.ocf = ocf;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn config(fecf: bool, ocf: bool, sh: bool) -> FrameConfig {
        FrameConfig {
            frame_length: 64,
            fecf_present: fecf,
            ocf_present: ocf,
            secondary_header_present: sh,
            extended_vc_frame_count: false,
        }
    }

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, false)]
    #[case(false, true, false)]
    #[case(true, true, false)]
    #[case(true, true, true)]
    fn roundtrip(#[case] fecf: bool, #[case] ocf: bool, #[case] sh: bool) {
        let cfg = config(fecf, ocf, sh);
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.scid = 102;
        frame.vcid = 3;
        frame.mc_frame_count = 5;
        frame.vc_frame_count = 9;
        frame.data_field_synchronised = true;
        frame.first_header_pointer = FirstHeaderPointer::ByteIndex(0);
        if sh {
            frame.secondary_header_data = vec![0xAB, 0xCD];
        }
        if ocf {
            frame.ocf = Some(Ocf::new(crate::ocf::OcfReportType::Type1Clcw, 7).unwrap());
        }
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0x1F; len]).unwrap();

        let bytes = frame.wrap().unwrap();
        assert_eq!(bytes.len(), 64);

        let mut recovered = TmTransferFrame::new(cfg).unwrap();
        recovered.unwrap(&bytes).unwrap();

        assert_eq!(recovered.scid, frame.scid);
        assert_eq!(recovered.vcid, frame.vcid);
        assert_eq!(recovered.vc_frame_count & 0xFF, frame.vc_frame_count & 0xFF);
        assert_eq!(recovered.data_field, frame.data_field);
        assert_eq!(recovered.ocf, frame.ocf);
        assert_eq!(recovered.secondary_header_data, frame.secondary_header_data);
    }

    #[test]
    fn frame_length_boundaries() {
        assert!(FrameConfig {
            frame_length: 7,
            ..config(false, false, false)
        }
        .validate()
        .is_ok());
        assert!(FrameConfig {
            frame_length: 2048,
            ..config(false, false, false)
        }
        .validate()
        .is_ok());
        assert!(FrameConfig {
            frame_length: 6,
            ..config(false, false, false)
        }
        .validate()
        .is_err());
        assert!(FrameConfig {
            frame_length: 2049,
            ..config(false, false, false)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn fecf_detects_bit_flip() {
        let cfg = config(true, false, false);
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0x1F; len]).unwrap();
        let mut bytes = frame.wrap().unwrap();
        bytes[10] ^= 0x01;

        let mut recovered = TmTransferFrame::new(cfg).unwrap();
        assert_eq!(recovered.unwrap(&bytes), Err(TransferFrameError::Checksum));
    }

    #[test]
    fn data_field_length_overflow_on_oversized_secondary_header() {
        let cfg = FrameConfig {
            frame_length: MIN_FRAME_LENGTH,
            fecf_present: true,
            ocf_present: true,
            secondary_header_present: true,
            extended_vc_frame_count: false,
        };
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.secondary_header_data = vec![0u8; 10];
        assert!(matches!(
            frame.data_field_length(),
            Err(TransferFrameError::Overflow(_))
        ));
    }

    #[test]
    fn extended_vc_frame_count_roundtrip() {
        let cfg = FrameConfig {
            frame_length: 32,
            fecf_present: false,
            ocf_present: false,
            secondary_header_present: true,
            extended_vc_frame_count: true,
        };
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.vc_frame_count = 0xAABBCCDD;
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0; len]).unwrap();
        let bytes = frame.wrap().unwrap();

        let mut recovered = TmTransferFrame::new(cfg).unwrap();
        recovered.unwrap(&bytes).unwrap();
        assert_eq!(recovered.vc_frame_count, 0xAABBCCDD);
    }

    #[test]
    fn data_field_padded_pads_and_truncates() {
        let cfg = config(false, false, false);
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0x42; len]).unwrap();

        assert_eq!(frame.data_field_padded(len + 2).len(), len + 2);
        assert_eq!(frame.data_field_padded(len - 1).len(), len - 1);
    }

    #[test]
    fn set_data_field_requires_exact_size() {
        let cfg = config(false, false, false);
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        assert!(frame.set_data_field(vec![0; 3]).is_err());
    }
}
