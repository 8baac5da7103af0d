//! End-to-end coverage through the public API only (physical channel in,
//! physical channel out), one test per concrete scenario.

use tmtp::{
    FirstHeaderPointer, FrameBitrate, FrameTimestamp, MasterChannel, McConfig, NetProtConf, Ocf,
    OcfReportType, PcConfig, PhysicalChannel, VcConfig,
};

fn channel(scid: u16, frame_length: u16, fecf_present: bool, ocf_present: bool, vcid: u8) -> PhysicalChannel {
    let mut pc = PhysicalChannel::new(PcConfig {
        frame_length,
        fecf_present,
        secondary_header_present: false,
        extended_vc_frame_count: false,
    })
    .unwrap();

    let mut mc = MasterChannel::new(McConfig {
        scid,
        ocf_present,
        idle_channel: 7,
    })
    .unwrap();
    mc.create_idle_virtual_channel(VcConfig::default());
    if vcid != 7 {
        mc.create_tm_virtual_channel(vcid, VcConfig::default()).unwrap();
        let vc = mc.virtual_channel_mut(vcid).unwrap();
        vc.set_net_prot_conf(NetProtConf::test_proto_2b());
        vc.connect_packet_sink(|| {});
    }
    if ocf_present {
        mc.connect_ocf_sink(|| {});
    }
    pc.set_master_channel(mc);
    pc
}

#[test]
fn single_packet_in_single_frame() {
    let conf = NetProtConf::test_proto_2b();
    let mut sender = channel(102, 1115, false, false, 1);
    let mut receiver = channel(102, 1115, false, false, 1);

    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0u8; 10]))
        .unwrap();

    let bytes = sender.send_frame(FrameTimestamp::new()).unwrap();
    assert_eq!(bytes.len(), 1115);

    let warning = receiver.receive_frame(&bytes, FrameTimestamp::new(), FrameBitrate::new());
    assert!(!warning.warning_available());

    let vc = receiver.master_channel_mut().unwrap().virtual_channel_mut(1).unwrap();
    let packet = vc.receive_packet().unwrap();
    assert_eq!(packet.data, conf.generate_test_packet(&[0u8; 10]));
    assert!(vc.receive_packet().is_none());
}

#[test]
fn packet_spanning_two_frames() {
    let conf = NetProtConf::test_proto_2b();
    let mut sender = channel(7, 106, false, false, 1);
    let mut receiver = channel(7, 106, false, false, 1);

    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0xABu8; 148]))
        .unwrap();
    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0xCDu8; 8]))
        .unwrap();

    let frame1 = sender.send_frame(FrameTimestamp::new()).unwrap();
    let frame2 = sender.send_frame(FrameTimestamp::new()).unwrap();

    let w1 = receiver.receive_frame(&frame1, FrameTimestamp::new(), FrameBitrate::new());
    assert!(!w1.warning_available());
    let mut w2 = receiver.receive_frame(&frame2, FrameTimestamp::new(), FrameBitrate::new());
    assert_eq!(w2.pop_warning(), None);

    let vc = receiver.master_channel_mut().unwrap().virtual_channel_mut(1).unwrap();
    let first = vc.receive_packet().unwrap();
    assert_eq!(first.data, conf.generate_test_packet(&[0xABu8; 148]));
    let second = vc.receive_packet().unwrap();
    assert_eq!(second.data, conf.generate_test_packet(&[0xCDu8; 8]));
}

#[test]
fn dropped_frame_in_the_middle() {
    let conf = NetProtConf::test_proto_2b();
    let mut sender = channel(7, 106, false, false, 1);
    let mut receiver = channel(7, 106, false, false, 1);

    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0xABu8; 148]))
        .unwrap();
    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0xCDu8; 8]))
        .unwrap();

    let first_frame = sender.send_frame(FrameTimestamp::new()).unwrap();
    let _dropped_frame = sender.send_frame(FrameTimestamp::new()).unwrap();

    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[9u8; 10]))
        .unwrap();
    let third_frame = sender.send_frame(FrameTimestamp::new()).unwrap();

    let w1 = receiver.receive_frame(&first_frame, FrameTimestamp::new(), FrameBitrate::new());
    assert!(!w1.warning_available());

    let mut w3 = receiver.receive_frame(&third_frame, FrameTimestamp::new(), FrameBitrate::new());
    assert_eq!(w3.pop_warning(), Some("Lost 1 virtual channel frames.".to_string()));
    assert_eq!(w3.pop_warning(), None);

    let vc = receiver.master_channel_mut().unwrap().virtual_channel_mut(1).unwrap();
    let packet = vc.receive_packet().unwrap();
    assert_eq!(packet.data, conf.generate_test_packet(&[9u8; 10]));
    assert!(vc.receive_packet().is_none());
}

#[test]
fn fecf_error_is_a_warning_not_a_panic() {
    let conf = NetProtConf::test_proto_2b();
    let mut sender = channel(7, 64, true, false, 1);
    let mut receiver = channel(7, 64, true, false, 1);

    sender
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .send_packet(conf.generate_test_packet(&[0x2Au8]))
        .unwrap();
    let mut bytes = sender.send_frame(FrameTimestamp::new()).unwrap();
    bytes[10] ^= 0x01;

    let mut warning = receiver.receive_frame(&bytes, FrameTimestamp::new(), FrameBitrate::new());
    let popped = warning.pop_warning().unwrap();
    assert!(popped.starts_with("Error while unwrapping the frame:"));
    assert!(popped.contains("checksum") || popped.contains("Checksum"));

    let vc = receiver.master_channel_mut().unwrap().virtual_channel_mut(1).unwrap();
    assert!(vc.receive_packet().is_none());
}

#[test]
fn ocf_round_trip() {
    let mut sender = channel(7, 64, false, true, 1);
    let mut receiver = channel(7, 64, false, true, 1);

    sender
        .master_channel_mut()
        .unwrap()
        .send_ocf(Ocf::new(OcfReportType::Type2ProjectSpecific, 0x0A0B0C).unwrap())
        .unwrap();

    let bytes = sender.send_frame(FrameTimestamp::new()).unwrap();
    let warning = receiver.receive_frame(&bytes, FrameTimestamp::new(), FrameBitrate::new());
    assert!(!warning.warning_available());

    let ocf = receiver.master_channel_mut().unwrap().receive_ocf().unwrap();
    assert_eq!(ocf.report_type(), OcfReportType::Type2ProjectSpecific);
    assert_eq!(ocf.content(), 0x0A0B0C);
}

#[test]
fn idle_round_robin_emits_idle_frame_when_nothing_queued() {
    let mut sender = channel(7, 64, false, false, 1);

    let bytes = sender.send_frame(FrameTimestamp::new()).unwrap();

    let mut receiver = channel(7, 64, false, false, 1);
    let warning = receiver.receive_frame(&bytes, FrameTimestamp::new(), FrameBitrate::new());
    assert!(!warning.warning_available());

    // Nothing was queued on VC 1, so the idle channel (VCID 7) must have
    // produced this frame, carrying no first header.
    assert!(receiver
        .master_channel_mut()
        .unwrap()
        .virtual_channel_mut(1)
        .unwrap()
        .receive_packet()
        .is_none());

    let mut probe_frame = tmtp::TmTransferFrame::new(tmtp::FrameConfig {
        frame_length: 64,
        fecf_present: false,
        ocf_present: false,
        secondary_header_present: false,
        extended_vc_frame_count: false,
    })
    .unwrap();
    probe_frame.unwrap(&bytes).unwrap();
    assert_eq!(probe_frame.vcid, 7);
    assert_eq!(probe_frame.first_header_pointer, FirstHeaderPointer::OnlyIdleData);
}
