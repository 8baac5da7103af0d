//! Operational Control Field (OCF): a 4-byte trailer carrying a
//! report-type-tagged content value, typically a CLCW.

use crate::error::OcfError;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

const TYPE1_MAX_CONTENT: u32 = 0x7FFF_FFFF;
const TYPE2_MAX_CONTENT: u32 = 0x3FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which of the three OCF report types a value carries.
pub enum OcfReportType {
    /// `0xxxxxxx`: a CLCW report, 31 content bits.
    Type1Clcw,
    /// `10xxxxxx`: a project-specific report, 30 content bits.
    Type2ProjectSpecific,
    /// `11xxxxxx`: a report type reserved for future use, 30 content bits.
    Type2FutureReserved,
}

impl OcfReportType {
    fn max_content(self) -> u32 {
        match self {
            Self::Type1Clcw => TYPE1_MAX_CONTENT,
            Self::Type2ProjectSpecific | Self::Type2FutureReserved => TYPE2_MAX_CONTENT,
        }
    }

    fn content_bits(self) -> u8 {
        match self {
            Self::Type1Clcw => 31,
            Self::Type2ProjectSpecific | Self::Type2FutureReserved => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// An Operational Control Field value: a report type plus its content bits.
///
/// Defaults to `Type1Clcw` with content `0`, mirroring the channel's
/// synthesized idle OCF fallback only when it is explicitly asked for
/// ([`OcfReportType::Type2FutureReserved`], see the master channel).
pub struct Ocf {
    report_type: OcfReportType,
    content: u32,
}

impl Default for Ocf {
    fn default() -> Self {
        Self {
            report_type: OcfReportType::Type1Clcw,
            content: 0,
        }
    }
}

impl Ocf {
    pub fn new(report_type: OcfReportType, content: u32) -> Result<Self, OcfError> {
        let mut ocf = Self {
            report_type,
            content: 0,
        };
        ocf.set_content(content)?;
        Ok(ocf)
    }

    pub fn report_type(&self) -> OcfReportType {
        self.report_type
    }

    pub fn content(&self) -> u32 {
        self.content
    }

    /// Sets the report type, leaving content unchanged and unchecked against
    /// the new type's width — call [`Ocf::set_content`] afterwards if in doubt.
    pub fn set_report_type(&mut self, report_type: OcfReportType) {
        self.report_type = report_type;
    }

    /// Sets the content value, width-checked against the report type.
    ///
    /// The Type-1 limit rejects `content == 0x7FFFFFFF` itself (the check is
    /// `content >= 0x7FFFFFFF`, not `>`). That boundary is preserved exactly
    /// as observable wire behaviour even though it reads like an off-by-one
    /// against a naive "31-bit maximum".
    pub fn set_content(&mut self, content: u32) -> Result<(), OcfError> {
        if content >= self.report_type.max_content() {
            return Err(OcfError::ContentOutOfRange(
                content,
                self.report_type.content_bits(),
            ));
        }
        self.content = content;
        Ok(())
    }

    /// Serializes to exactly 4 bytes, big-endian content in the report-type tag.
    pub fn wrap(&self) -> [u8; 4] {
        let tagged = match self.report_type {
            OcfReportType::Type1Clcw => self.content,
            OcfReportType::Type2ProjectSpecific => 0x8000_0000 | self.content,
            OcfReportType::Type2FutureReserved => 0xC000_0000 | self.content,
        };
        tagged.to_be_bytes()
    }

    /// Parses exactly 4 bytes into an [`Ocf`]. Fails if `raw` is not 4 bytes long.
    pub fn unwrap(raw: &[u8]) -> Result<Self, OcfError> {
        if raw.len() != 4 {
            return Err(OcfError::WrongLength(raw.len()));
        }
        let mut cursor: &[u8] = raw;
        let word = cursor
            .read_u32::<BigEndian>()
            .expect("length already checked to be 4 bytes");

        let (report_type, content) = if word & 0x8000_0000 == 0 {
            (OcfReportType::Type1Clcw, word & TYPE1_MAX_CONTENT)
        } else if word & 0x4000_0000 == 0 {
            (OcfReportType::Type2ProjectSpecific, word & TYPE2_MAX_CONTENT)
        } else {
            (OcfReportType::Type2FutureReserved, word & TYPE2_MAX_CONTENT)
        };

        Ok(Self {
            report_type,
            content,
        })
    }

    /// Parses from any [`Read`]er, consuming exactly 4 bytes.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, OcfError> {
        let mut buf = [0u8; 4];
        reader
            .read_exact(&mut buf)
            .map_err(|_| OcfError::WrongLength(0))?;
        Self::unwrap(&buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OcfReportType::Type1Clcw, 0)]
    #[case(OcfReportType::Type1Clcw, 0x7FFF_FFFE)]
    #[case(OcfReportType::Type2ProjectSpecific, 0x0A0B0C)]
    #[case(OcfReportType::Type2FutureReserved, 0x3FFF_FFFE)]
    fn roundtrip(#[case] report_type: OcfReportType, #[case] content: u32) {
        let ocf = Ocf::new(report_type, content).expect("content in range");
        let wrapped = ocf.wrap();
        let recovered = Ocf::unwrap(&wrapped).expect("well-formed 4 byte OCF");
        assert_eq!(recovered.report_type(), report_type);
        assert_eq!(recovered.content(), content);
    }

    #[test]
    fn type1_boundary_0x7fffffff_is_rejected() {
        assert!(Ocf::new(OcfReportType::Type1Clcw, 0x7FFF_FFFF).is_err());
    }

    #[test]
    fn type1_boundary_0x7ffffffe_is_accepted() {
        assert!(Ocf::new(OcfReportType::Type1Clcw, 0x7FFF_FFFE).is_ok());
    }

    #[test]
    fn type2_content_out_of_range() {
        assert!(Ocf::new(OcfReportType::Type2ProjectSpecific, 0x3FFF_FFFF).is_err());
    }

    #[test]
    fn unwrap_rejects_wrong_length() {
        assert!(matches!(
            Ocf::unwrap(&[0, 0, 0]),
            Err(OcfError::WrongLength(3))
        ));
    }

    #[test]
    fn wrap_tags_report_type_in_leading_bits() {
        let ocf = Ocf::new(OcfReportType::Type2FutureReserved, 1).unwrap();
        let bytes = ocf.wrap();
        assert_eq!(bytes[0] & 0xC0, 0xC0);
    }
}
