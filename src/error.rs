//! Fatal-error taxonomy for the TMTP core.
//!
//! Each subsystem gets its own error enum, tagged in [`TmtpError`] so a caller
//! crossing several subsystem boundaries (physical channel calling master
//! channel calling virtual channel) can match on one type. Per-frame
//! anomalies are not modelled here: those are non-fatal and live in
//! [`crate::warning::ChannelWarning`].

use std::io::Error as IoError;
use thiserror::Error;

/// A TMTP `Result`, conveniently wrapping [`TmtpError`].
pub type Result<T> = std::result::Result<T, TmtpError>;

#[derive(Error, Debug)]
/// Top-level error uniting every subsystem's fatal-error type.
pub enum TmtpError {
    #[error(transparent)]
    Ocf(#[from] OcfError),
    #[error(transparent)]
    TransferFrame(#[from] TransferFrameError),
    #[error(transparent)]
    VirtualChannel(#[from] VirtualChannelError),
    #[error(transparent)]
    MasterChannel(#[from] MasterChannelError),
    #[error(transparent)]
    PhysicalChannel(#[from] PhysicalChannelError),
    #[error("I/O error")]
    Io(#[from] IoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised while constructing or serializing an [`crate::ocf::Ocf`].
pub enum OcfError {
    #[error("OCF content {0:#X} exceeds the {1}-bit width for this report type")]
    ContentOutOfRange(u32, u8),
    #[error("OCF must be exactly 4 bytes, received {0}")]
    WrongLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised while wrapping/unwrapping a [`crate::frame::TmTransferFrame`].
pub enum TransferFrameError {
    #[error("frame length {0} out of range (7-2048)")]
    FrameLengthOutOfRange(u16),
    #[error("data field would be {0} bytes or fewer, nothing left to carry data")]
    Overflow(i64),
    #[error("received frame length {0} does not match configured length {1}")]
    WrongLength(usize, u16),
    #[error("assigned data field length {0} does not match the configured data field length {1}")]
    WrongDataFieldLength(usize, usize),
    #[error("checksum error")]
    Checksum,
    #[error("unsupported transfer frame version {0}")]
    UnsupportedVersion(u8),
    #[error("secondary header length {0} exceeds the maximum of {1} bytes")]
    SecondaryHeaderTooLong(usize, u8),
    #[error("ocf_flag is set but no OCF value was assigned to the frame")]
    MissingOcf,
    #[error(transparent)]
    Ocf(#[from] OcfError),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<IoError> for TransferFrameError {
    fn from(err: IoError) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by a virtual channel; always tagged with the offending VCID.
#[error("virtual channel {vcid}: {kind}")]
pub struct VirtualChannelError {
    pub vcid: u16,
    pub kind: VirtualChannelErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VirtualChannelErrorKind {
    #[error("packet buffer overflow")]
    SendBufferOverflow,
    #[error("direct data field access requested but no callable is connected")]
    DirectAccessNotConnected,
    #[error("direct data field access callable returned {0} bytes, expected {1}")]
    DirectAccessWrongSize(usize, usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by a master channel.
pub enum MasterChannelError {
    #[error("spacecraft id {0} out of range (0-1023)")]
    ScidOutOfRange(u16),
    #[error("idle channel id {0} out of range (0-7)")]
    IdleChannelOutOfRange(u16),
    #[error("virtual channel id {0} out of range (0-7)")]
    VcidOutOfRange(u16),
    #[error("virtual channel {0} is reserved as the idle channel")]
    IsIdleChannel(u16),
    #[error("OCF send queue is full")]
    SendOcfBufferOverflow,
    #[error("OCF receive queue is empty")]
    NoOcfAvailable,
    #[error("virtual channel {0} produced a frame whose OCF flag does not match the master channel setting")]
    InvariantViolated(u16),
    #[error(transparent)]
    Frame(#[from] TransferFrameError),
    #[error(transparent)]
    VirtualChannel(#[from] VirtualChannelError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by a physical channel.
pub enum PhysicalChannelError {
    #[error("frame length {0} out of range (7-2048)")]
    FrameLengthOutOfRange(u16),
    #[error("no master channel configured and a send was requested")]
    NoMasterChannel,
    #[error("frame returned by master channel has wrong length: {0}, expected {1}")]
    WrongFrameLength(u16, u16),
    #[error("frame returned by master channel has wrong FECF setting, expected {0}")]
    WrongFecfSetting(bool),
    #[error(transparent)]
    Master(#[from] MasterChannelError),
    #[error(transparent)]
    Frame(#[from] TransferFrameError),
}
