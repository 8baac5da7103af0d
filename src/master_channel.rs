//! A master channel owns up to eight virtual channels and the round-robin
//! scheduler that multiplexes them onto one outgoing frame stream, plus the
//! two OCF FIFOs and the master-frame-count sequence counter.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::MasterChannelError;
use crate::frame::{FirstHeaderPointer, FrameConfig, TmTransferFrame};
use crate::ocf::{Ocf, OcfReportType};
use crate::timestamp::FrameTimestamp;
use crate::virtual_channel::{VcConfig, VirtualChannel};
use crate::warning::ChannelWarning;

pub const VC_SLOTS: usize = 8;
pub const SEND_OCF_BUFFER_SIZE: usize = 100;
pub const REC_OCF_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct McConfig {
    pub scid: u16,
    pub ocf_present: bool,
    pub idle_channel: u8,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            scid: 0,
            ocf_present: false,
            idle_channel: 7,
        }
    }
}

impl McConfig {
    fn validate(&self) -> Result<(), MasterChannelError> {
        if self.scid > 1023 {
            return Err(MasterChannelError::ScidOutOfRange(self.scid));
        }
        if self.idle_channel > 7 {
            return Err(MasterChannelError::IdleChannelOutOfRange(self.idle_channel as u16));
        }
        Ok(())
    }
}

type OcfSinkFn = dyn FnMut() + Send;

pub struct MasterChannel {
    config: McConfig,
    virtual_channels: [Option<VirtualChannel>; VC_SLOTS],
    cur: u8,
    mc_frame_count: u8,
    send_ocf_fifo: VecDeque<Ocf>,
    recv_ocf_fifo: VecDeque<Ocf>,
    ocf_sink: Option<Box<OcfSinkFn>>,
}

impl std::fmt::Debug for MasterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterChannel")
            .field("config", &self.config)
            .field("cur", &self.cur)
            .field("mc_frame_count", &self.mc_frame_count)
            .finish()
    }
}

impl MasterChannel {
    pub fn new(config: McConfig) -> Result<Self, MasterChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            virtual_channels: Default::default(),
            cur: 0,
            mc_frame_count: 0,
            send_ocf_fifo: VecDeque::new(),
            recv_ocf_fifo: VecDeque::new(),
            ocf_sink: None,
        })
    }

    pub fn config(&self) -> McConfig {
        self.config
    }

    /// Connects the OCF sink callback: invoked once per OCF this channel
    /// enqueues into its receive FIFO, after [`MasterChannel::receive_ocf`]
    /// is guaranteed to return it. Without one connected, each enqueued OCF
    /// instead raises [`ChannelWarning::set_no_ocf_sink_specified`].
    pub fn connect_ocf_sink(&mut self, f: impl FnMut() + Send + 'static) {
        self.ocf_sink = Some(Box::new(f));
    }

    pub fn disconnect_ocf_sink(&mut self) {
        self.ocf_sink = None;
    }

    /// Creates (or replaces) a virtual channel at `vcid`. Fails if `vcid`
    /// is the configured idle channel or out of the `0..8` range.
    pub fn create_tm_virtual_channel(
        &mut self,
        vcid: u8,
        vc_config: VcConfig,
    ) -> Result<(), MasterChannelError> {
        if vcid > 7 {
            return Err(MasterChannelError::VcidOutOfRange(vcid as u16));
        }
        if vcid == self.config.idle_channel {
            return Err(MasterChannelError::IsIdleChannel(vcid as u16));
        }
        self.virtual_channels[vcid as usize] = Some(VirtualChannel::new(VcConfig { vcid, ..vc_config }));
        Ok(())
    }

    /// Creates the reserved idle channel, which `create_tm_virtual_channel`
    /// refuses to touch. Only meaningful once, at setup time.
    pub fn create_idle_virtual_channel(&mut self, vc_config: VcConfig) {
        let vcid = self.config.idle_channel;
        self.virtual_channels[vcid as usize] =
            Some(VirtualChannel::new(VcConfig { vcid, ..vc_config }));
    }

    pub fn virtual_channel(&self, vcid: u8) -> Option<&VirtualChannel> {
        self.virtual_channels.get(vcid as usize)?.as_ref()
    }

    pub fn virtual_channel_mut(&mut self, vcid: u8) -> Option<&mut VirtualChannel> {
        self.virtual_channels.get_mut(vcid as usize)?.as_mut()
    }

    /// Enqueues an OCF for transmission on the next frame that has room for
    /// one. Fails once [`SEND_OCF_BUFFER_SIZE`] OCFs are already queued.
    pub fn send_ocf(&mut self, ocf: Ocf) -> Result<(), MasterChannelError> {
        if self.send_ocf_fifo.len() >= SEND_OCF_BUFFER_SIZE {
            return Err(MasterChannelError::SendOcfBufferOverflow);
        }
        self.send_ocf_fifo.push_back(ocf);
        Ok(())
    }

    /// Pops the oldest received OCF, if any.
    pub fn receive_ocf(&mut self) -> Option<Ocf> {
        self.recv_ocf_fifo.pop_front()
    }

    /// Picks the next virtual channel in round-robin order starting at
    /// `cur`: the first configured, non-idle VC with a frame available.
    /// Falls back to the idle channel when none qualifies.
    fn pick_vc(&mut self) -> u8 {
        for i in 0..VC_SLOTS as u8 {
            let vcid = (self.cur + i) % VC_SLOTS as u8;
            if vcid == self.config.idle_channel {
                continue;
            }
            if let Some(vc) = &self.virtual_channels[vcid as usize] {
                if vc.has_frame_available() {
                    self.cur = (vcid + 1) % VC_SLOTS as u8;
                    trace!(vcid, "round-robin selected non-idle VC");
                    return vcid;
                }
            }
        }
        trace!(vcid = self.config.idle_channel, "round-robin falling back to idle channel");
        self.config.idle_channel
    }

    /// Builds the next frame: selects a VC by round-robin, fills in SCID,
    /// master-frame-count, OCF (if enabled), and the VC's own data field.
    pub fn build_frame(
        &mut self,
        mut frame_config: FrameConfig,
        timestamp: FrameTimestamp,
    ) -> Result<TmTransferFrame, MasterChannelError> {
        let vcid = self.pick_vc();
        let vc = self
            .virtual_channels
            .get_mut(vcid as usize)
            .and_then(|slot| slot.as_mut())
            .expect("round-robin only selects configured slots");
        let vc_config = vc.config();

        frame_config.ocf_present = self.config.ocf_present;
        frame_config.secondary_header_present = vc_config.secondary_header_present;
        frame_config.extended_vc_frame_count = vc_config.extended_frame_count;

        let mut frame = TmTransferFrame::new(frame_config)?;
        let data_field_length = frame.data_field_length()?;

        let (data_field, fhp) = vc.build_data_field(data_field_length as usize, timestamp)?;
        let tx_count = vc.next_tx_frame_count();

        frame.scid = self.config.scid;
        frame.vcid = vcid;
        frame.mc_frame_count = self.mc_frame_count;
        self.mc_frame_count = self.mc_frame_count.wrapping_add(1);
        frame.vc_frame_count = tx_count;
        frame.secondary_header_flag = vc_config.secondary_header_present;
        frame.data_field_synchronised = vc_config.data_field_synchronised;
        frame.first_header_pointer = fhp;
        frame.set_data_field(data_field)?;

        if self.config.ocf_present {
            let ocf = self
                .send_ocf_fifo
                .pop_front()
                .unwrap_or_else(|| Ocf::new(OcfReportType::Type2FutureReserved, 0).expect("0 is always in range"));
            frame.ocf_flag = true;
            frame.ocf = Some(ocf);
        }

        if frame.ocf_flag != self.config.ocf_present {
            return Err(MasterChannelError::InvariantViolated(vcid as u16));
        }

        Ok(frame)
    }

    /// Dispatches a received, already-unwrapped frame: checks SCID and
    /// master-frame-count, enqueues its OCF (if both sides agree one is
    /// present), and routes the data field to the matching virtual channel.
    pub fn receive_frame(&mut self, frame: &TmTransferFrame) -> ChannelWarning {
        let mut warning = ChannelWarning::new();

        if frame.scid != self.config.scid {
            warning.set_wrong_scid();
            return warning;
        }

        let gap = gap_u8(self.mc_frame_count, frame.mc_frame_count);
        if gap > 0 {
            warning.add_mc_lost_frames_count(gap as u16);
        }
        self.mc_frame_count = frame.mc_frame_count.wrapping_add(1);

        if frame.ocf_flag != self.config.ocf_present {
            warning.set_wrong_ocf_flag();
        } else if self.config.ocf_present {
            if let Some(ocf) = &frame.ocf {
                if self.recv_ocf_fifo.len() < REC_OCF_BUFFER_SIZE {
                    self.recv_ocf_fifo.push_back(*ocf);
                    match self.ocf_sink.as_mut() {
                        Some(sink) => sink(),
                        None => warning.set_no_ocf_sink_specified(),
                    }
                } else {
                    warning.set_rec_ocf_buffer_overflow();
                }
            }
        }

        match self.virtual_channels.get_mut(frame.vcid as usize).and_then(|s| s.as_mut()) {
            Some(vc) => {
                let vc_warning = vc.process_received_frame(frame);
                warning += &vc_warning;
            }
            None => warning.set_unconfigured_vc(),
        }

        warning
    }
}

/// Wrap-around gap between an `expected` and `incoming` mod-256 counter: 0
/// when they match, otherwise how many frames were skipped in between.
fn gap_u8(expected: u8, incoming: u8) -> u8 {
    incoming.wrapping_sub(expected)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::netprotconf::NetProtConf;

    fn frame_config() -> FrameConfig {
        FrameConfig {
            frame_length: 64,
            fecf_present: false,
            ocf_present: false,
            secondary_header_present: false,
            extended_vc_frame_count: false,
        }
    }

    #[test]
    fn round_robin_visits_every_configured_vc_once() {
        let mut mc = MasterChannel::new(McConfig {
            scid: 1,
            ocf_present: false,
            idle_channel: 7,
        })
        .unwrap();
        for vcid in 0..7 {
            mc.create_tm_virtual_channel(vcid, VcConfig::default()).unwrap();
            mc.virtual_channel_mut(vcid)
                .unwrap()
                .set_net_prot_conf(NetProtConf::idle());
            mc.virtual_channel_mut(vcid).unwrap().send_packet(vec![1]).unwrap();
        }
        mc.create_idle_virtual_channel(VcConfig::default());

        let mut seen = std::collections::HashSet::new();
        for _ in 0..7 {
            let frame = mc.build_frame(frame_config(), FrameTimestamp::new()).unwrap();
            assert_ne!(frame.vcid, 7);
            seen.insert(frame.vcid);
        }
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn falls_back_to_idle_channel_when_nothing_queued() {
        let mut mc = MasterChannel::new(McConfig {
            scid: 1,
            ocf_present: false,
            idle_channel: 7,
        })
        .unwrap();
        mc.create_tm_virtual_channel(1, VcConfig::default()).unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());

        let frame = mc.build_frame(frame_config(), FrameTimestamp::new()).unwrap();
        assert_eq!(frame.vcid, 7);
        assert_eq!(frame.first_header_pointer, FirstHeaderPointer::OnlyIdleData);
    }

    #[test]
    fn creating_vc_at_idle_slot_fails() {
        let mut mc = MasterChannel::new(McConfig::default()).unwrap();
        assert!(mc.create_tm_virtual_channel(7, VcConfig::default()).is_err());
    }

    #[test]
    fn creating_vc_out_of_range_fails() {
        let mut mc = MasterChannel::new(McConfig::default()).unwrap();
        assert!(mc.create_tm_virtual_channel(8, VcConfig::default()).is_err());
    }

    #[test]
    fn wrong_scid_is_the_only_warning() {
        let mut mc = MasterChannel::new(McConfig {
            scid: 5,
            ..McConfig::default()
        })
        .unwrap();
        let cfg = frame_config();
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.scid = 6;
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0; len]).unwrap();

        let mut warning = mc.receive_frame(&frame);
        assert_eq!(warning.pop_warning(), Some("Frame with wrong spacecraft ID received.".to_string()));
        assert_eq!(warning.pop_warning(), None);
    }

    #[test]
    fn unconfigured_vc_is_flagged() {
        let mut mc = MasterChannel::new(McConfig::default()).unwrap();
        let cfg = frame_config();
        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.vcid = 3;
        frame.first_header_pointer = FirstHeaderPointer::OnlyIdleData;
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0; len]).unwrap();

        let mut warning = mc.receive_frame(&frame);
        assert_eq!(
            warning.pop_warning(),
            Some("Frame for unconfigured virtual channel received.".to_string())
        );
    }

    #[test]
    fn dropped_master_frame_reports_lost_mc_frames() {
        let mut mc = MasterChannel::new(McConfig::default()).unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());
        let cfg = frame_config();

        let mut first = TmTransferFrame::new(cfg).unwrap();
        first.vcid = 7;
        first.mc_frame_count = 0;
        first.first_header_pointer = FirstHeaderPointer::OnlyIdleData;
        let len = first.data_field_length().unwrap() as usize;
        first.set_data_field(vec![0; len]).unwrap();
        assert!(!mc.receive_frame(&first).warning_available());

        let mut third = TmTransferFrame::new(cfg).unwrap();
        third.vcid = 7;
        third.mc_frame_count = 2;
        third.first_header_pointer = FirstHeaderPointer::OnlyIdleData;
        third.set_data_field(vec![0; len]).unwrap();
        let mut warning = mc.receive_frame(&third);
        assert_eq!(warning.pop_warning(), Some("Lost 1 master channel frames.".to_string()));
    }

    #[test]
    fn first_master_frame_joining_mid_stream_reports_lost_frames() {
        let mut mc = MasterChannel::new(McConfig::default()).unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());
        let cfg = frame_config();

        let mut frame = TmTransferFrame::new(cfg).unwrap();
        frame.vcid = 7;
        frame.mc_frame_count = 4;
        frame.first_header_pointer = FirstHeaderPointer::OnlyIdleData;
        let len = frame.data_field_length().unwrap() as usize;
        frame.set_data_field(vec![0; len]).unwrap();

        let mut warning = mc.receive_frame(&frame);
        assert_eq!(warning.pop_warning(), Some("Lost 4 master channel frames.".to_string()));
        assert_eq!(warning.pop_warning(), None);
    }

    #[test]
    fn ocf_roundtrip_through_master_channel() {
        let mut mc = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        mc.send_ocf(Ocf::new(OcfReportType::Type2ProjectSpecific, 0x0A0B0C).unwrap())
            .unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());

        let frame = mc
            .build_frame(
                FrameConfig {
                    ocf_present: true,
                    ..frame_config()
                },
                FrameTimestamp::new(),
            )
            .unwrap();
        assert!(frame.ocf_flag);

        let mut receiver = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        receiver.create_idle_virtual_channel(VcConfig::default());
        receiver.receive_frame(&frame);

        let received = receiver.receive_ocf().unwrap();
        assert_eq!(received.report_type(), OcfReportType::Type2ProjectSpecific);
        assert_eq!(received.content(), 0x0A0B0C);
    }

    #[test]
    fn missing_ocf_sink_is_flagged() {
        let mut mc = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        mc.send_ocf(Ocf::new(OcfReportType::Type2ProjectSpecific, 0x0A0B0C).unwrap())
            .unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());
        let frame = mc
            .build_frame(
                FrameConfig {
                    ocf_present: true,
                    ..frame_config()
                },
                FrameTimestamp::new(),
            )
            .unwrap();

        let mut receiver = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        receiver.create_idle_virtual_channel(VcConfig::default());

        let mut warning = receiver.receive_frame(&frame);
        assert_eq!(warning.pop_warning(), Some("No OCF sink specified.".to_string()));
        assert_eq!(warning.pop_warning(), None);
    }

    #[test]
    fn connected_ocf_sink_is_invoked() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut mc = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        mc.send_ocf(Ocf::new(OcfReportType::Type2ProjectSpecific, 0x0A0B0C).unwrap())
            .unwrap();
        mc.create_idle_virtual_channel(VcConfig::default());
        let frame = mc
            .build_frame(
                FrameConfig {
                    ocf_present: true,
                    ..frame_config()
                },
                FrameTimestamp::new(),
            )
            .unwrap();

        let mut receiver = MasterChannel::new(McConfig {
            scid: 9,
            ocf_present: true,
            idle_channel: 7,
        })
        .unwrap();
        receiver.create_idle_virtual_channel(VcConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = calls.clone();
        receiver.connect_ocf_sink(move || {
            sink_calls.fetch_add(1, Ordering::SeqCst);
        });

        let warning = receiver.receive_frame(&frame);
        assert!(!warning.warning_available());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
