//! Receives effect server packets from the network, for monitoring.

use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::parser::{self, Packet, ParserResult};

const MAX_PACKET_SIZE: usize = 4096;

/// A datagram as it came off the socket.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub source: SocketAddr,
    pub data: Vec<u8>,
}

impl ReceivedPacket {
    pub fn decode(&self) -> ParserResult<Packet> {
        parser::decode_packet(&self.data)
    }
}

/// A running UDP listener thread and the channel it feeds.
pub struct Monitor {
    local_addr: SocketAddr,
    receiver: Receiver<ReceivedPacket>,
    handle: JoinHandle<()>,
}

impl Monitor {
    /// Bind `addr` and start receiving on a background thread.
    pub fn start(addr: &str) -> io::Result<Monitor> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;
        let (sender, receiver) = channel::unbounded();
        info!("[udp] listening at {}", local_addr);

        let handle = start_udp_thread(socket, sender);
        Ok(Monitor {
            local_addr,
            receiver,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn receiver(&self) -> &Receiver<ReceivedPacket> {
        &self.receiver
    }

    /// Pass every packet to `f` until the listener thread goes away.
    pub fn serve<F: FnMut(&ReceivedPacket)>(self, mut f: F) -> io::Result<()> {
        for packet in self.receiver.iter() {
            f(&packet);
        }
        self.handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "UDP thread panicked"))
    }
}

/// Start a thread that will accept UDP packets and pass them on.
fn start_udp_thread(socket: UdpSocket, sender: Sender<ReceivedPacket>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        let mut buf = [0; MAX_PACKET_SIZE];
        let (len, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) => {
                warn!("[udp] receive failed: {}", err);
                return;
            }
        };
        debug!("[udp] recv {} B from {}", len, source);

        let packet = ReceivedPacket {
            source,
            data: buf[..len].to_owned(),
        };
        if sender.send(packet).is_err() {
            debug!("[udp] packet receiver gone, exiting thread");
            return;
        }
    })
}
