// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use log::{debug, warn};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value = "45678")]
    port: u16,

    /// Exit after this many datagrams
    #[arg(short, long)]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    debug!("listening on {}", local);
    let socket = UdpSocket::bind(local).await?;

    let mut buf = vec![0u8; 65536];
    let mut received = 0;

    while args.count.map_or(true, |count| received < count) {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(datagram) => datagram,
            Err(err) => {
                warn!("receive error: {}", err);
                continue;
            }
        };
        received += 1;

        println!("{} bytes from {}", len, peer);
        println!("{}", String::from_utf8_lossy(&buf[..len]));
    }

    Ok(())
}
