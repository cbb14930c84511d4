//! Sends light state to the effect server.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use thiserror::Error;
use tracing::debug;

use crate::model::Snapshot;
use crate::protocol::{self, LightCommand};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("{addr}: {source}")]
    Transport {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Something that can push a state snapshot out to the lights.
pub trait Dispatch {
    /// Send the whole snapshot. Returns the number of bytes sent.
    fn send_state(&mut self, snapshot: &Snapshot) -> Result<usize, SendError>;
}

/// Scaled light commands for a snapshot, in light order.
pub fn commands(snapshot: &Snapshot) -> Vec<LightCommand> {
    snapshot
        .lights
        .iter()
        .map(|light| {
            LightCommand::from_rgb(
                light.index,
                protocol::scale(light.base_rgb, i64::from(light.intensity)),
            )
        })
        .collect()
}

/// Sends commands to the Effect Server.
pub struct UdpClient {
    /// UDP socket reused between calls.
    socket: UdpSocket,
}

impl UdpClient {
    /// Bind a socket on an ephemeral local port.
    pub fn new() -> io::Result<UdpClient> {
        Self::bind("0.0.0.0:0")
    }

    pub fn bind(local_addr: &str) -> io::Result<UdpClient> {
        let socket = UdpSocket::bind(local_addr)?;
        Ok(UdpClient { socket })
    }

    /// Send one packet to `host:port`.
    pub fn send_packet(&self, host: &str, port: u16, packet: &[u8]) -> Result<usize, SendError> {
        let transport = |source| SendError::Transport {
            addr: format!("{}:{}", host, port),
            source,
        };
        let addr = resolve_ipv4(host, port).map_err(transport)?;
        self.socket.send_to(packet, addr).map_err(transport)
    }
}

/// First IPv4 address `host` resolves to. The socket is bound to an IPv4
/// address, so anything else can't be sent to.
fn resolve_ipv4(host: &str, port: u16) -> io::Result<SocketAddr> {
    first_ipv4((host, port).to_socket_addrs()?)
}

fn first_ipv4<I: IntoIterator<Item = SocketAddr>>(addrs: I) -> io::Result<SocketAddr> {
    addrs.into_iter().find(SocketAddr::is_ipv4).ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no IPv4 address")
    })
}

impl Dispatch for UdpClient {
    fn send_state(&mut self, snapshot: &Snapshot) -> Result<usize, SendError> {
        let settings = &snapshot.settings;
        let packet = protocol::encode_packet(&settings.tag, &commands(snapshot));
        let sent = self.send_packet(&settings.server_ip, settings.server_port, &packet)?;
        debug!(
            "[udp] sent {} B to {}:{}",
            sent, settings.server_ip, settings.server_port
        );
        Ok(sent)
    }
}
