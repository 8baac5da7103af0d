//! Non-fatal, per-frame warning accumulator.
//!
//! [`ChannelWarning`] is deliberately not an error type: receive-side
//! anomalies (a dropped frame, a buffer overflow, a sequence gap) are
//! recoverable and must never abort processing of the frames around them.
//! Warnings accumulate additively (`+=`) and drain one category at a time,
//! oldest-priority-first, through [`ChannelWarning::pop_warning`].

use std::fmt;

/// Accumulates warnings raised while receiving frames.
///
/// Combine two warning values with `+=`: string/counter fields sum, boolean
/// fields OR together. Nothing is ever lost by combining.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelWarning {
    frame_unwrap_error: String,
    lost_mc_frames: u16,
    lost_vc_frames: u64,
    packet_resync: bool,
    no_packet_sink_specified: bool,
    no_ocf_sink_specified: bool,
    unconfigured_vc: bool,
    unconfigured_mc: bool,
    rec_packet_buffer_overflow: bool,
    rec_ocf_buffer_overflow: bool,
    wrong_ocf_flag: bool,
    wrong_scid: bool,
    wrong_vcid: bool,
    wrong_second_header_flag: bool,
    wrong_synchronisation_flag: bool,
    free_message: String,
}

impl ChannelWarning {
    /// Builds an empty (no warnings) instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame-unwrap failure description. Newlines are flattened to
    /// spaces and entries are joined with `"; "` so several can accumulate
    /// across `+=` without losing any of them.
    pub fn add_frame_unwrap_error(&mut self, msg: impl AsRef<str>) {
        push_flattened(&mut self.frame_unwrap_error, msg.as_ref());
    }

    /// Adds `count` to the master-channel lost-frames tally.
    pub fn add_mc_lost_frames_count(&mut self, count: u16) {
        self.lost_mc_frames = self.lost_mc_frames.saturating_add(count);
    }

    /// Adds `count` to the virtual-channel lost-frames tally.
    pub fn add_vc_lost_frames_count(&mut self, count: u64) {
        self.lost_vc_frames = self.lost_vc_frames.saturating_add(count);
    }

    pub fn set_packet_resynced(&mut self) {
        self.packet_resync = true;
    }

    pub fn set_no_packet_sink_specified(&mut self) {
        self.no_packet_sink_specified = true;
    }

    pub fn set_no_ocf_sink_specified(&mut self) {
        self.no_ocf_sink_specified = true;
    }

    pub fn set_unconfigured_vc(&mut self) {
        self.unconfigured_vc = true;
    }

    pub fn set_unconfigured_mc(&mut self) {
        self.unconfigured_mc = true;
    }

    pub fn set_rec_packet_buffer_overflow(&mut self) {
        self.rec_packet_buffer_overflow = true;
    }

    pub fn set_rec_ocf_buffer_overflow(&mut self) {
        self.rec_ocf_buffer_overflow = true;
    }

    pub fn set_wrong_ocf_flag(&mut self) {
        self.wrong_ocf_flag = true;
    }

    pub fn set_wrong_scid(&mut self) {
        self.wrong_scid = true;
    }

    pub fn set_wrong_vcid(&mut self) {
        self.wrong_vcid = true;
    }

    pub fn set_wrong_second_header_flag(&mut self) {
        self.wrong_second_header_flag = true;
    }

    pub fn set_wrong_synchronisation_flag(&mut self) {
        self.wrong_synchronisation_flag = true;
    }

    /// Appends a free-form diagnostic message not covered by any other category.
    pub fn append_free_message(&mut self, msg: impl AsRef<str>) {
        push_flattened(&mut self.free_message, msg.as_ref());
    }

    /// Drains and returns the highest-priority non-empty category, clearing
    /// it. Returns `None` once every category is empty.
    ///
    /// The priority order is fixed (for test reproducibility and so a caller
    /// repeatedly draining a warning always sees the same category first):
    /// frame-unwrap error, lost MC frames, lost VC frames, packet resync, no
    /// packet sink, no OCF sink, unconfigured VC, unconfigured MC, received
    /// packet buffer overflow, received OCF buffer overflow, wrong OCF flag,
    /// wrong SCID, wrong VCID, wrong secondary header flag, wrong
    /// synchronisation flag, free message.
    pub fn pop_warning(&mut self) -> Option<String> {
        if !self.frame_unwrap_error.is_empty() {
            let msg = format!("Error while unwrapping the frame: {}", self.frame_unwrap_error);
            self.frame_unwrap_error.clear();
            Some(msg)
        } else if self.lost_mc_frames > 0 {
            let msg = format!("Lost {} master channel frames.", self.lost_mc_frames);
            self.lost_mc_frames = 0;
            Some(msg)
        } else if self.lost_vc_frames > 0 {
            let msg = format!("Lost {} virtual channel frames.", self.lost_vc_frames);
            self.lost_vc_frames = 0;
            Some(msg)
        } else if self.packet_resync {
            self.packet_resync = false;
            Some("Packet resync.".to_string())
        } else if self.no_packet_sink_specified {
            self.no_packet_sink_specified = false;
            Some("No packet sink specified.".to_string())
        } else if self.no_ocf_sink_specified {
            self.no_ocf_sink_specified = false;
            Some("No OCF sink specified.".to_string())
        } else if self.unconfigured_vc {
            self.unconfigured_vc = false;
            Some("Frame for unconfigured virtual channel received.".to_string())
        } else if self.unconfigured_mc {
            self.unconfigured_mc = false;
            Some("Frame for unconfigured master channel received.".to_string())
        } else if self.rec_packet_buffer_overflow {
            self.rec_packet_buffer_overflow = false;
            Some("Buffer overflow in received packet buffer.".to_string())
        } else if self.rec_ocf_buffer_overflow {
            self.rec_ocf_buffer_overflow = false;
            Some("Buffer overflow in received OCF buffer.".to_string())
        } else if self.wrong_ocf_flag {
            self.wrong_ocf_flag = false;
            Some("Frame with wrong OCF flag received.".to_string())
        } else if self.wrong_scid {
            self.wrong_scid = false;
            Some("Frame with wrong spacecraft ID received.".to_string())
        } else if self.wrong_vcid {
            self.wrong_vcid = false;
            Some("Frame with wrong virtual channel ID received.".to_string())
        } else if self.wrong_second_header_flag {
            self.wrong_second_header_flag = false;
            Some("Frame with wrong second header flag received.".to_string())
        } else if self.wrong_synchronisation_flag {
            self.wrong_synchronisation_flag = false;
            Some("Frame with wrong synchronisation flag received.".to_string())
        } else if !self.free_message.is_empty() {
            let msg = std::mem::take(&mut self.free_message);
            Some(msg)
        } else {
            None
        }
    }

    /// True iff at least one category still has something to drain.
    pub fn warning_available(&self) -> bool {
        !self.frame_unwrap_error.is_empty()
            || self.lost_mc_frames > 0
            || self.lost_vc_frames > 0
            || self.packet_resync
            || self.no_packet_sink_specified
            || self.no_ocf_sink_specified
            || self.unconfigured_vc
            || self.unconfigured_mc
            || self.rec_packet_buffer_overflow
            || self.rec_ocf_buffer_overflow
            || self.wrong_ocf_flag
            || self.wrong_scid
            || self.wrong_vcid
            || self.wrong_second_header_flag
            || self.wrong_synchronisation_flag
            || !self.free_message.is_empty()
    }
}

fn push_flattened(dest: &mut String, msg: &str) {
    dest.extend(msg.chars().map(|c| if c == '\n' { ' ' } else { c }));
    dest.push_str("; ");
}

impl std::ops::AddAssign<&ChannelWarning> for ChannelWarning {
    fn add_assign(&mut self, rhs: &ChannelWarning) {
        self.frame_unwrap_error.push_str(&rhs.frame_unwrap_error);
        self.lost_mc_frames = self.lost_mc_frames.saturating_add(rhs.lost_mc_frames);
        self.lost_vc_frames = self.lost_vc_frames.saturating_add(rhs.lost_vc_frames);

        self.packet_resync |= rhs.packet_resync;
        self.no_packet_sink_specified |= rhs.no_packet_sink_specified;
        self.no_ocf_sink_specified |= rhs.no_ocf_sink_specified;
        self.unconfigured_vc |= rhs.unconfigured_vc;
        self.unconfigured_mc |= rhs.unconfigured_mc;
        self.rec_packet_buffer_overflow |= rhs.rec_packet_buffer_overflow;
        self.rec_ocf_buffer_overflow |= rhs.rec_ocf_buffer_overflow;
        self.wrong_ocf_flag |= rhs.wrong_ocf_flag;
        self.wrong_scid |= rhs.wrong_scid;
        self.wrong_vcid |= rhs.wrong_vcid;
        self.wrong_second_header_flag |= rhs.wrong_second_header_flag;
        self.wrong_synchronisation_flag |= rhs.wrong_synchronisation_flag;

        self.free_message.push_str(&rhs.free_message);
    }
}

impl std::ops::AddAssign for ChannelWarning {
    fn add_assign(&mut self, rhs: ChannelWarning) {
        *self += &rhs;
    }
}

impl fmt::Display for ChannelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clone = self.clone();
        let mut first = true;
        while let Some(msg) = clone.pop_warning() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{msg}")?;
            first = false;
        }
        Ok(())
    }
}
