#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

//! ECSS-E-ST-50-03C TM Transfer Frame en/decoder with channel state
//! machines and Sink/Stream support.
//!
//! The module layout mirrors the standard's own decomposition:
//!
//! - [`frame`] — the fixed-length transfer frame itself: primary header,
//!   optional secondary header, data field, optional OCF, optional FECF.
//! - [`ocf`] — the 4-byte Operational Control Field carried at the tail of
//!   a frame.
//! - [`virtual_channel`] — per-VC packet fragmentation/reassembly.
//! - [`master_channel`] — round-robin scheduling across up to 8 virtual
//!   channels plus OCF queues.
//! - [`physical_channel`] — the outermost facade: frame length/FECF
//!   policy, owning exactly one master channel.
//! - [`netprotconf`] — pluggable strategies for telling packets apart from
//!   idle data inside a reassembled data field.
//! - [`timestamp`] — the reference timestamp/bitrate a receiver attaches
//!   to every frame it unwraps.
//! - [`warning`] — the non-fatal, accumulating per-frame anomaly type.
//! - [`error`] — the fatal-error taxonomy.

pub mod error;
pub mod frame;
pub mod master_channel;
pub mod netprotconf;
pub mod ocf;
pub mod physical_channel;
pub mod timestamp;
pub mod virtual_channel;
pub mod warning;

#[cfg(any(feature = "async-codec", feature = "tokio-codec"))]
#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// This module provides implementations to provide Sink/Stream support for
/// framing transfer frames directly off a byte stream.
///
/// It provides implementations of both the asynchronous-codec and the
/// tokio-util::codec traits for compatibility.
pub mod codec;

#[doc(inline)]
pub use error::{Result, TmtpError};
#[doc(inline)]
pub use frame::{FirstHeaderPointer, FrameConfig, TmTransferFrame};
#[doc(inline)]
pub use master_channel::{MasterChannel, McConfig};
#[doc(inline)]
pub use netprotconf::NetProtConf;
#[doc(inline)]
pub use ocf::{Ocf, OcfReportType};
#[doc(inline)]
pub use physical_channel::{PcConfig, PhysicalChannel};
#[doc(inline)]
pub use timestamp::{FrameBitrate, FrameTimestamp};
#[doc(inline)]
pub use virtual_channel::{TimeTaggedPacket, VcConfig, VirtualChannel};
#[doc(inline)]
pub use warning::ChannelWarning;
