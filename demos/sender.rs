//! Illustrative sender: wires a physical channel from `demos/demo.toml`,
//! queues a handful of test packets on its data VC, and writes the
//! resulting frames to a TCP loopback connection. Run `receiver` first.

#[path = "config.rs"]
mod config;

use std::io::Write;
use std::net::TcpStream;

use tmtp::{FrameTimestamp, NetProtConf};
use tracing::info;

fn main() {
    tracing_subscriber::fmt::init();

    let cfg = config::DemoConfig::load("demos/demo.toml");
    let mut pc = config::build_channel(&cfg);
    let conf = NetProtConf::test_proto_2b();

    let mut stream = TcpStream::connect(&cfg.listen_addr).expect("failed to connect to receiver demo");

    for i in 0..5u8 {
        pc.master_channel_mut()
            .expect("master channel configured by build_channel")
            .virtual_channel_mut(cfg.vcid)
            .expect("virtual channel configured by build_channel")
            .send_packet(conf.generate_test_packet(&[i; 4]))
            .expect("packet did not fit in the send queue");

        let bytes = pc
            .send_frame(FrameTimestamp::new())
            .expect("failed to build outgoing frame");
        stream.write_all(&bytes).expect("failed to write frame to socket");
        info!(frame = i, bytes = bytes.len(), "sent frame");
    }
}
