//! Per-virtual-channel send FIFO and receive reassembly state machine.
//!
//! A virtual channel is the unit of packet multiplexing below a master
//! channel: it buffers whole outgoing packets and slices them across
//! however many frames it takes to send them (tracking only a byte offset
//! into the head packet, never a raw iterator, so the FIFO can reallocate
//! freely underneath it), and on the receive side walks an incoming data
//! field by First Header Pointer to reassemble packets, discarding its
//! in-flight reassembly on any frame-count gap.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{VirtualChannelError, VirtualChannelErrorKind};
use crate::frame::{FirstHeaderPointer, TmTransferFrame};
use crate::netprotconf::NetProtConf;
use crate::timestamp::{FrameBitrate, FrameTimestamp};
use crate::warning::ChannelWarning;

pub const SEND_PACKET_BUFFER_SIZE: usize = 100;
pub const REC_PACKET_BUFFER_SIZE: usize = 100;

/// A reassembled packet paired with the estimated timestamp and bitrate in
/// effect when its first header byte arrived. Timestamp/bitrate are absent
/// when the owning frame did not carry valid reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTaggedPacket {
    pub data: Vec<u8>,
    pub timestamp: Option<FrameTimestamp>,
    pub bitrate: Option<FrameBitrate>,
}

/// Per-channel configuration, set once at construction and otherwise only
/// through explicit setters (never read back through a parent pointer).
#[derive(Debug, Clone, Copy)]
pub struct VcConfig {
    pub vcid: u8,
    pub secondary_header_present: bool,
    pub extended_frame_count: bool,
    pub data_field_synchronised: bool,
    pub direct_data_field_access: bool,
    pub debug_output: bool,
}

impl Default for VcConfig {
    fn default() -> Self {
        Self {
            vcid: 0,
            secondary_header_present: false,
            extended_frame_count: false,
            data_field_synchronised: true,
            direct_data_field_access: false,
            debug_output: false,
        }
    }
}

type DirectSendFn = dyn FnMut(usize, FrameTimestamp) -> Vec<u8> + Send;
type DirectRecvFn = dyn FnMut(&[u8], FrameTimestamp, FrameBitrate) + Send;
type PacketSinkFn = dyn FnMut() + Send;

/// Receive-side reassembly progress, tracked only for observability; the
/// actual state lives in `rx_packet`/`rx_header_length`/`rx_total_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReassemblyState {
    AwaitFrame,
    ReadingHeader,
    ReadingBody,
}

pub struct VirtualChannel {
    config: VcConfig,

    default_net_prot_conf: NetProtConf,
    net_prot_conf_override: Option<NetProtConf>,

    send_fifo: VecDeque<Vec<u8>>,
    send_cursor: usize,

    recv_fifo: VecDeque<TimeTaggedPacket>,

    rx_state: ReassemblyState,
    rx_packet: Vec<u8>,
    rx_header_length: usize,
    rx_total_length: usize,
    rx_pending_timestamp: Option<(FrameTimestamp, FrameBitrate)>,
    rx_frame_count: u32,

    tx_frame_count: u32,

    direct_send: Option<Box<DirectSendFn>>,
    direct_recv: Option<Box<DirectRecvFn>>,

    packet_sink: Option<Box<PacketSinkFn>>,
}

impl std::fmt::Debug for VirtualChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualChannel")
            .field("config", &self.config)
            .field("send_fifo_len", &self.send_fifo.len())
            .field("recv_fifo_len", &self.recv_fifo.len())
            .finish()
    }
}

impl VirtualChannel {
    pub fn new(config: VcConfig) -> Self {
        Self {
            config,
            default_net_prot_conf: NetProtConf::idle(),
            net_prot_conf_override: None,
            send_fifo: VecDeque::new(),
            send_cursor: 0,
            recv_fifo: VecDeque::new(),
            rx_state: ReassemblyState::AwaitFrame,
            rx_packet: Vec::new(),
            rx_header_length: 0,
            rx_total_length: 0,
            rx_pending_timestamp: None,
            rx_frame_count: 0,
            tx_frame_count: 0,
            direct_send: None,
            direct_recv: None,
            packet_sink: None,
        }
    }

    pub fn vcid(&self) -> u8 {
        self.config.vcid
    }

    /// Returns the current transmit frame counter and advances it
    /// (mod-256, or mod-2³² when extended counting is configured).
    pub fn next_tx_frame_count(&mut self) -> u32 {
        let current = self.tx_frame_count;
        self.tx_frame_count = if self.config.extended_frame_count {
            current.wrapping_add(1)
        } else {
            (current + 1) & 0xFF
        };
        current
    }

    pub fn config(&self) -> VcConfig {
        self.config
    }

    /// Injects a non-default network protocol configuration. The active
    /// configuration becomes this one until [`VirtualChannel::clear_net_prot_conf`]
    /// is called.
    pub fn set_net_prot_conf(&mut self, conf: NetProtConf) {
        self.net_prot_conf_override = Some(conf);
    }

    pub fn clear_net_prot_conf(&mut self) {
        self.net_prot_conf_override = None;
    }

    fn active_net_prot_conf(&self) -> &NetProtConf {
        self.net_prot_conf_override
            .as_ref()
            .unwrap_or(&self.default_net_prot_conf)
    }

    /// Connects the packet sink callback: invoked once per packet this VC
    /// enqueues into its receive FIFO, after [`VirtualChannel::receive_packet`]
    /// is guaranteed to return it. Without one connected, each completed
    /// packet instead raises [`ChannelWarning::set_no_packet_sink_specified`].
    pub fn connect_packet_sink(&mut self, f: impl FnMut() + Send + 'static) {
        self.packet_sink = Some(Box::new(f));
    }

    pub fn disconnect_packet_sink(&mut self) {
        self.packet_sink = None;
    }

    pub fn set_direct_send(&mut self, f: impl FnMut(usize, FrameTimestamp) -> Vec<u8> + Send + 'static) {
        self.direct_send = Some(Box::new(f));
    }

    pub fn set_direct_recv(
        &mut self,
        f: impl FnMut(&[u8], FrameTimestamp, FrameBitrate) + Send + 'static,
    ) {
        self.direct_recv = Some(Box::new(f));
    }

    /// Enqueues a whole packet for transmission. Fails if the send FIFO has
    /// reached [`SEND_PACKET_BUFFER_SIZE`].
    pub fn send_packet(&mut self, packet: Vec<u8>) -> Result<(), VirtualChannelError> {
        if self.send_fifo.len() >= SEND_PACKET_BUFFER_SIZE {
            return Err(VirtualChannelError {
                vcid: self.config.vcid as u16,
                kind: VirtualChannelErrorKind::SendBufferOverflow,
            });
        }
        self.send_fifo.push_back(packet);
        Ok(())
    }

    /// True iff this VC would produce a non-idle data field right now: the
    /// send FIFO holds a packet, or direct-access mode is active (the
    /// calling application is assumed to always have something to emit).
    pub fn has_frame_available(&self) -> bool {
        if self.config.direct_data_field_access {
            return self.direct_send.is_some();
        }
        !self.send_fifo.is_empty()
    }

    /// Pops the oldest reassembled packet, if any.
    pub fn receive_packet(&mut self) -> Option<TimeTaggedPacket> {
        self.recv_fifo.pop_front()
    }

    pub fn recv_fifo_len(&self) -> usize {
        self.recv_fifo.len()
    }

    /// Builds one frame-sized data field. Returns the data field bytes and
    /// the First Header Pointer that goes with them.
    pub fn build_data_field(
        &mut self,
        data_field_length: usize,
        timestamp: FrameTimestamp,
    ) -> Result<(Vec<u8>, FirstHeaderPointer), VirtualChannelError> {
        if self.config.direct_data_field_access {
            let Some(send_fn) = self.direct_send.as_mut() else {
                return Err(VirtualChannelError {
                    vcid: self.config.vcid as u16,
                    kind: VirtualChannelErrorKind::DirectAccessNotConnected,
                });
            };
            let data = send_fn(data_field_length, timestamp);
            if data.len() != data_field_length {
                return Err(VirtualChannelError {
                    vcid: self.config.vcid as u16,
                    kind: VirtualChannelErrorKind::DirectAccessWrongSize(data.len(), data_field_length),
                });
            }
            return Ok((data, FirstHeaderPointer::ByteIndex(0)));
        }

        let net_prot_conf = self.active_net_prot_conf();
        let mut data = Vec::with_capacity(data_field_length);
        let mut fhp = FirstHeaderPointer::NoFirstHeader;

        while data.len() < data_field_length {
            if self.send_fifo.is_empty() {
                if data.is_empty() {
                    fhp = FirstHeaderPointer::OnlyIdleData;
                }
                data.push(net_prot_conf.generate_idle_packet());
                continue;
            }

            let head_len = self.send_fifo[0].len();
            let avail = head_len - self.send_cursor;
            let need = data_field_length - data.len();
            let at_head_start = self.send_cursor == 0;

            if avail > need {
                if at_head_start && matches!(fhp, FirstHeaderPointer::NoFirstHeader) {
                    fhp = FirstHeaderPointer::ByteIndex(data.len() as u16);
                }
                let head = &self.send_fifo[0];
                data.extend_from_slice(&head[self.send_cursor..self.send_cursor + need]);
                self.send_cursor += need;
            } else {
                if at_head_start && matches!(fhp, FirstHeaderPointer::NoFirstHeader) {
                    fhp = FirstHeaderPointer::ByteIndex(data.len() as u16);
                }
                let head = self.send_fifo.pop_front().expect("checked non-empty above");
                data.extend_from_slice(&head[self.send_cursor..]);
                self.send_cursor = 0;
            }
        }

        if self.config.debug_output {
            debug!(vcid = self.config.vcid, "{}", net_prot_conf.debug_render(&data));
        }

        Ok((data, fhp))
    }

    /// Processes one received, already-parsed frame addressed to this VC.
    /// Returns accumulated warnings; never fails (receive-side anomalies
    /// are non-fatal by design).
    pub fn process_received_frame(&mut self, frame: &TmTransferFrame) -> ChannelWarning {
        let mut warning = ChannelWarning::new();

        if frame.vcid != self.config.vcid {
            warning.set_wrong_vcid();
            return warning;
        }
        if frame.secondary_header_flag != self.config.secondary_header_present {
            warning.set_wrong_second_header_flag();
            return warning;
        }
        if frame.data_field_synchronised != self.config.data_field_synchronised {
            warning.set_wrong_synchronisation_flag();
            return warning;
        }

        let modulus: u64 = if self.config.extended_frame_count {
            1u64 << 32
        } else {
            256
        };
        let incoming = if self.config.extended_frame_count {
            frame.vc_frame_count as u64
        } else {
            (frame.vc_frame_count & 0xFF) as u64
        };

        if self.rx_frame_count as u64 != incoming {
            let expected = self.rx_frame_count as u64;
            let gap = (incoming + modulus - expected) % modulus;
            if gap > 0 {
                self.reset_reassembly();
                warning.add_vc_lost_frames_count(gap);
            }
        }
        self.rx_frame_count = ((incoming + 1) % modulus) as u32;

        if matches!(frame.first_header_pointer, FirstHeaderPointer::OnlyIdleData) {
            return warning;
        }

        if self.config.direct_data_field_access {
            if let Some(recv_fn) = self.direct_recv.as_mut() {
                recv_fn(&frame.data_field, frame.timestamp, frame.bitrate);
            }
            return warning;
        }

        self.walk_data_field(frame, &mut warning);
        warning
    }

    fn reset_reassembly(&mut self) {
        self.rx_state = ReassemblyState::AwaitFrame;
        self.rx_packet.clear();
        self.rx_header_length = 0;
        self.rx_total_length = 0;
        self.rx_pending_timestamp = None;
    }

    fn walk_data_field(&mut self, frame: &TmTransferFrame, warning: &mut ChannelWarning) {
        let fhp = match frame.first_header_pointer {
            FirstHeaderPointer::ByteIndex(v) => v as usize,
            FirstHeaderPointer::NoFirstHeader => usize::MAX,
            FirstHeaderPointer::OnlyIdleData => return,
        };
        let sh_len = frame.secondary_header_data.len();
        let data = &frame.data_field;
        let mut cursor = 0usize;

        while cursor < data.len() {
            if self.rx_packet.is_empty() && self.rx_state == ReassemblyState::AwaitFrame {
                if cursor < fhp {
                    if fhp <= data.len() {
                        cursor = fhp;
                        warning.set_packet_resynced();
                        if cursor >= data.len() {
                            break;
                        }
                    } else {
                        break;
                    }
                }

                let first_byte = data[cursor];
                let net_prot_conf = self.active_net_prot_conf();
                if net_prot_conf.is_idle_packet(first_byte) {
                    cursor += 1;
                    continue;
                }

                let header_length = net_prot_conf.packet_header_length(first_byte);
                self.rx_header_length = header_length;
                self.rx_packet.push(first_byte);
                self.rx_state = ReassemblyState::ReadingHeader;

                if frame.timestamp.is_valid() && frame.bitrate.is_valid() {
                    let offset_bits = (6 + sh_len + cursor) as f64 * 8.0;
                    let raw = offset_bits / frame.bitrate.bitrate();
                    let seconds = frame.timestamp.seconds() + raw.trunc() as u64;
                    let mut ts = FrameTimestamp::new();
                    ts.set_seconds(seconds);
                    let _ = ts.set_fractions(raw.fract());
                    self.rx_pending_timestamp = Some((ts, frame.bitrate));
                } else {
                    self.rx_pending_timestamp = None;
                }

                cursor += 1;
                if self.rx_packet.len() == self.rx_header_length {
                    self.finish_header();
                    if self.rx_packet.len() == self.rx_total_length {
                        self.enqueue_completed_packet(warning);
                    }
                }
                continue;
            }

            if self.rx_state == ReassemblyState::ReadingHeader {
                self.rx_packet.push(data[cursor]);
                cursor += 1;
                if self.rx_packet.len() == self.rx_header_length {
                    self.finish_header();
                    if self.rx_packet.len() == self.rx_total_length {
                        self.enqueue_completed_packet(warning);
                    }
                }
                continue;
            }

            // ReadingBody.
            if cursor == fhp {
                self.reset_reassembly();
                warning.set_packet_resynced();
                continue;
            }
            self.rx_packet.push(data[cursor]);
            cursor += 1;

            if self.rx_packet.len() == self.rx_total_length {
                self.enqueue_completed_packet(warning);
            }
        }
    }

    fn finish_header(&mut self) {
        let net_prot_conf = self.active_net_prot_conf();
        self.rx_total_length = net_prot_conf.extract_packet_length(&self.rx_packet);
        self.rx_state = ReassemblyState::ReadingBody;
    }

    fn enqueue_completed_packet(&mut self, warning: &mut ChannelWarning) {
        if self.config.debug_output {
            let net_prot_conf = self.active_net_prot_conf();
            trace!(vcid = self.config.vcid, "{}", net_prot_conf.debug_render(&self.rx_packet));
        }
        if self.recv_fifo.len() < REC_PACKET_BUFFER_SIZE {
            let (timestamp, bitrate) = match self.rx_pending_timestamp.take() {
                Some((ts, br)) => (Some(ts), Some(br)),
                None => (None, None),
            };
            self.recv_fifo.push_back(TimeTaggedPacket {
                data: std::mem::take(&mut self.rx_packet),
                timestamp,
                bitrate,
            });
            match self.packet_sink.as_mut() {
                Some(sink) => sink(),
                None => warning.set_no_packet_sink_specified(),
            }
        } else {
            warning.set_rec_packet_buffer_overflow();
        }
        self.reset_reassembly();
    }
}
