//! Entry point: a physical channel is the outermost facade, holding the
//! frame length and FECF policy for one link and owning exactly one master
//! channel. It turns raw byte buffers into dispatched frames and back.

use tracing::warn;

use crate::error::PhysicalChannelError;
use crate::frame::{FrameConfig, TmTransferFrame};
use crate::master_channel::MasterChannel;
use crate::timestamp::{FrameBitrate, FrameTimestamp};
use crate::warning::ChannelWarning;

/// The decode template a physical channel uses to unwrap every inbound
/// frame. `secondary_header_present`/`extended_vc_frame_count` are assumed
/// uniform across every virtual channel on this link — a physical channel
/// cannot know a per-VC layout before it has parsed the VCID out of the
/// frame it is trying to parse.
#[derive(Debug, Clone, Copy)]
pub struct PcConfig {
    pub frame_length: u16,
    pub fecf_present: bool,
    pub secondary_header_present: bool,
    pub extended_vc_frame_count: bool,
}

impl Default for PcConfig {
    fn default() -> Self {
        Self {
            frame_length: 1115,
            fecf_present: false,
            secondary_header_present: false,
            extended_vc_frame_count: false,
        }
    }
}

pub struct PhysicalChannel {
    config: PcConfig,
    master_channel: Option<MasterChannel>,
}

impl std::fmt::Debug for PhysicalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalChannel")
            .field("config", &self.config)
            .field("has_master_channel", &self.master_channel.is_some())
            .finish()
    }
}

impl PhysicalChannel {
    pub fn new(config: PcConfig) -> Result<Self, PhysicalChannelError> {
        if !(crate::frame::MIN_FRAME_LENGTH..=crate::frame::MAX_FRAME_LENGTH).contains(&config.frame_length) {
            return Err(PhysicalChannelError::FrameLengthOutOfRange(config.frame_length));
        }
        Ok(Self {
            config,
            master_channel: None,
        })
    }

    pub fn config(&self) -> PcConfig {
        self.config
    }

    pub fn set_master_channel(&mut self, master_channel: MasterChannel) {
        self.master_channel = Some(master_channel);
    }

    pub fn master_channel(&self) -> Option<&MasterChannel> {
        self.master_channel.as_ref()
    }

    pub fn master_channel_mut(&mut self) -> Option<&mut MasterChannel> {
        self.master_channel.as_mut()
    }

    fn decode_frame_config(&self) -> FrameConfig {
        FrameConfig {
            frame_length: self.config.frame_length,
            fecf_present: self.config.fecf_present,
            ocf_present: self.master_channel.as_ref().map(|mc| mc.config().ocf_present).unwrap_or(false),
            secondary_header_present: self.config.secondary_header_present,
            extended_vc_frame_count: self.config.extended_vc_frame_count,
        }
    }

    /// Unwraps `raw` against this channel's decode template, attaches the
    /// supplied reference timestamp/bitrate, and dispatches the result to
    /// the master channel. Never fails: a malformed frame or an absent
    /// master channel surfaces as a non-fatal warning instead.
    pub fn receive_frame(
        &mut self,
        raw: &[u8],
        timestamp: FrameTimestamp,
        bitrate: FrameBitrate,
    ) -> ChannelWarning {
        let mut warning = ChannelWarning::new();

        let mut frame = match TmTransferFrame::new(self.decode_frame_config()) {
            Ok(frame) => frame,
            Err(err) => {
                warning.add_frame_unwrap_error(err.to_string());
                return warning;
            }
        };

        if let Err(err) = frame.unwrap(raw) {
            warn!(error = %err, "frame unwrap failed");
            warning.add_frame_unwrap_error(err.to_string());
            return warning;
        }

        frame.timestamp = timestamp;
        frame.bitrate = bitrate;

        match self.master_channel.as_mut() {
            Some(mc) => warning += &mc.receive_frame(&frame),
            None => warning.set_unconfigured_mc(),
        }

        warning
    }

    /// Asks the master channel for the next frame and serializes it,
    /// checking the result against this channel's length/FECF policy.
    pub fn send_frame(&mut self, timestamp: FrameTimestamp) -> Result<Vec<u8>, PhysicalChannelError> {
        let frame_config = self.decode_frame_config();

        let mc = self.master_channel.as_mut().ok_or(PhysicalChannelError::NoMasterChannel)?;
        let frame = mc.build_frame(frame_config, timestamp)?;

        if frame.length() != self.config.frame_length {
            return Err(PhysicalChannelError::WrongFrameLength(frame.length(), self.config.frame_length));
        }
        if frame.fecf_status() != self.config.fecf_present {
            return Err(PhysicalChannelError::WrongFecfSetting(self.config.fecf_present));
        }

        let bytes = frame.wrap()?;
        debug_assert_eq!(bytes.len(), self.config.frame_length as usize);
        Ok(bytes)
    }
}
