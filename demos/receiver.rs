//! Illustrative receiver: binds the TCP loopback address from
//! `demos/demo.toml`, accepts one connection, and unwraps every incoming
//! frame through a physical channel, logging reassembled packets as they
//! complete.

#[path = "config.rs"]
mod config;

use std::io::Read;
use std::net::TcpListener;

use tmtp::{FrameBitrate, FrameTimestamp};
use tracing::{info, warn};

fn main() {
    tracing_subscriber::fmt::init();

    let cfg = config::DemoConfig::load("demos/demo.toml");
    let mut pc = config::build_channel(&cfg);

    let listener = TcpListener::bind(&cfg.listen_addr).expect("failed to bind receiver demo socket");
    let (mut stream, peer) = listener.accept().expect("failed to accept sender connection");
    info!(%peer, "sender connected");

    let mut buf = vec![0u8; cfg.frame_length as usize];
    loop {
        if let Err(err) = stream.read_exact(&mut buf) {
            info!(error = %err, "connection closed, stopping");
            break;
        }

        let mut warning = pc.receive_frame(&buf, FrameTimestamp::new(), FrameBitrate::new());
        while let Some(msg) = warning.pop_warning() {
            warn!(message = %msg, "frame warning");
        }

        if let Some(vc) = pc.master_channel_mut().and_then(|mc| mc.virtual_channel_mut(cfg.vcid)) {
            while let Some(packet) = vc.receive_packet() {
                info!(data = ?packet.data, "received packet");
            }
        }
    }
}
