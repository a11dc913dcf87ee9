// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Default destination, the IPv4 limited broadcast address.
pub const BROADCAST_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::BROADCAST);

/// Transmits serialized messages as datagrams.
///
/// Sending is best-effort: implementations never report failures to the
/// caller and never block.
pub trait MessageSender {
    fn send(&mut self, bytes: &[u8], port: u16);
}

/// Datagram counters kept by [`UdpMessageSender`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    /// Datagrams handed to the network stack
    pub sent: u64,
    /// Datagrams dropped because the socket refused them
    pub failed: u64,
}

/// UDP [`MessageSender`] sending to a fixed broadcast, multicast or unicast
/// address.
#[derive(Debug)]
pub struct UdpMessageSender {
    socket: UdpSocket,
    address: IpAddr,
    stats: SendStats,
}

impl UdpMessageSender {
    /// Binds an ephemeral local port and prepares it for sending to
    /// `address`.
    pub async fn bind(address: IpAddr) -> io::Result<Self> {
        let local: SocketAddr = match address {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        if address.is_ipv4() {
            socket.set_broadcast(true)?;
        }
        // try_send_to only succeeds once the reactor has seen the socket
        // writable.
        socket.writable().await?;
        debug!("udp sender bound to {} for {}", socket.local_addr()?, address);

        Ok(UdpMessageSender {
            socket,
            address,
            stats: SendStats::default(),
        })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn stats(&self) -> SendStats {
        self.stats
    }
}

impl MessageSender for UdpMessageSender {
    fn send(&mut self, bytes: &[u8], port: u16) {
        let dest = SocketAddr::new(self.address, port);
        match self.socket.try_send_to(bytes, dest) {
            Ok(n) => {
                self.stats.sent += 1;
                trace!("sent {} bytes to {}", n, dest);
            }
            Err(err) => {
                self.stats.failed += 1;
                debug!("dropped datagram to {}: {}", dest, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_send() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut sender = UdpMessageSender::bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .unwrap();
        sender.send(b"<geomessages/>", port);

        let mut buf = [0; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<geomessages/>");
        assert_eq!(sender.stats(), SendStats { sent: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_every_datagram_is_counted() {
        // Port 0 is rejected by most stacks; either way nothing surfaces.
        let mut sender = UdpMessageSender::bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .unwrap();
        sender.send(b"dropped", 0);
        assert_eq!(sender.stats().sent + sender.stats().failed, 1);
    }
}
