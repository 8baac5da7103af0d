//! Shared TOML configuration loading for the sender/receiver demos.
//! Not part of the published library surface.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DemoConfig {
    pub scid: u16,
    pub vcid: u8,
    pub frame_length: u16,
    pub fecf_present: bool,
    pub listen_addr: String,
}

impl DemoConfig {
    pub fn load(path: &str) -> Self {
        let text = std::fs::read_to_string(path).unwrap_or_else(|err| panic!("failed to read {path}: {err}"));
        toml::from_str(&text).unwrap_or_else(|err| panic!("failed to parse {path}: {err}"))
    }
}

/// Assembles a physical channel with one idle VC and one data VC speaking
/// the 2-byte test protocol, per the loaded configuration.
pub fn build_channel(config: &DemoConfig) -> tmtp::PhysicalChannel {
    let mut pc = tmtp::PhysicalChannel::new(tmtp::PcConfig {
        frame_length: config.frame_length,
        fecf_present: config.fecf_present,
        secondary_header_present: false,
        extended_vc_frame_count: false,
    })
    .expect("invalid physical channel configuration");

    let mut mc = tmtp::MasterChannel::new(tmtp::McConfig {
        scid: config.scid,
        ocf_present: false,
        idle_channel: 7,
    })
    .expect("invalid master channel configuration");

    mc.create_idle_virtual_channel(tmtp::VcConfig::default());
    mc.create_tm_virtual_channel(config.vcid, tmtp::VcConfig::default())
        .expect("invalid virtual channel id in demo config");
    mc.virtual_channel_mut(config.vcid)
        .expect("virtual channel just created")
        .set_net_prot_conf(tmtp::NetProtConf::test_proto_2b());

    pc.set_master_channel(mc);
    pc
}
