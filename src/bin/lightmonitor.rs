use anyhow::Context;
use effectcontrol_rs::config::{self, ConfigError, Root};
use effectcontrol_rs::listener::Monitor;
use std::io;
use tracing::{info, warn};

const CONFIG_PATH: &str = "./config.yaml";

/// Listen address from the config file, or the default if there is none.
fn default_addr(path: &str) -> anyhow::Result<String> {
    let root = match config::read_config(path) {
        Ok(root) => root,
        Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Root::default(),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path)),
    };
    Ok(root.monitor.udp_addr)
}

fn main() -> anyhow::Result<()> {
    effectcontrol_rs::init_logging();

    let addr = match std::env::args().nth(1) {
        Some(addr) => addr,
        None => default_addr(CONFIG_PATH)?,
    };

    let monitor = Monitor::start(&addr).with_context(|| format!("unable to listen on {}", addr))?;

    monitor.serve(|received| match received.decode() {
        Ok(packet) => {
            let tag = packet.tag.as_deref().unwrap_or("-");
            info!("{} [{}] {} lights", received.source, tag, packet.lights.len());
            for (id, [r, g, b]) in &packet.lights {
                info!("  #{:<3} {:3} {:3} {:3}", id, r, g, b);
            }
        }
        Err(err) => warn!("{}: bad packet: {}", received.source, err),
    })?;

    Ok(())
}
