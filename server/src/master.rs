//! Mock master server handing out a fixed address list in pages.

use log::{debug, error, info, warn};
use shared::packet::MASTER_SENTINEL;
use shared::{MasterQuery, MasterReply};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Addresses per reply; a real master sends up to ~230 per datagram.
pub const DEFAULT_PAGE_SIZE: usize = 200;

pub struct MasterServer {
    socket: Arc<UdpSocket>,
    servers: Vec<SocketAddrV4>,
    page_size: usize,
}

impl MasterServer {
    pub async fn bind(
        addr: &str,
        servers: Vec<SocketAddrV4>,
        page_size: usize,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!(
            "Master server listening on {} with {} servers",
            socket.local_addr()?,
            servers.len()
        );
        Ok(Self {
            socket,
            servers,
            page_size: page_size.max(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Reply to a query: the page of addresses following `seed`. The final
    /// page ends with the `0.0.0.0:0` sentinel.
    pub fn page(&self, query: &MasterQuery) -> MasterReply {
        let start = if query.seed == MASTER_SENTINEL {
            0
        } else {
            match self.servers.iter().position(|a| *a == query.seed) {
                Some(i) => i + 1,
                None => {
                    warn!("Unknown seed {}, ending enumeration", query.seed);
                    self.servers.len()
                }
            }
        };

        let end = (start + self.page_size).min(self.servers.len());
        let mut servers = self.servers[start..end].to_vec();
        if end == self.servers.len() {
            servers.push(MASTER_SENTINEL);
        }
        MasterReply { servers }
    }

    pub async fn run(self) {
        let mut buffer = [0u8; 1024];
        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let query = match MasterQuery::decode(&buffer[..len]) {
                Ok(query) => query,
                Err(e) => {
                    warn!("Undecodable master query from {}: {}", addr, e);
                    continue;
                }
            };
            debug!(
                "Master query from {}: region {} seed {} filter {:?}",
                addr, query.region, query.seed, query.filter
            );

            let reply = self.page(&query);
            if let Err(e) = self.socket.send_to(&reply.encode(), addr).await {
                error!("Failed to send master reply to {}: {}", addr, e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
