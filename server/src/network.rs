//! UDP responder answering A2S queries for one [`GameState`].

use crate::client_manager::ClientManager;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TRACKED_CLIENTS: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponderOptions {
    /// Answer A2S_INFO only after a challenge round trip.
    pub require_challenge: bool,
    /// Wait this long before every reply.
    pub delay: Duration,
    /// Never reply at all.
    pub silent: bool,
}

pub struct GameServer {
    socket: Arc<UdpSocket>,
    state: Arc<RwLock<GameState>>,
    clients: Arc<RwLock<ClientManager>>,
    options: ResponderOptions,
}

impl GameServer {
    pub async fn bind(
        addr: &str,
        state: GameState,
        options: ResponderOptions,
    ) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Game server listening on {}", socket.local_addr()?);

        Ok(GameServer {
            socket,
            state: Arc::new(RwLock::new(state)),
            clients: Arc::new(RwLock::new(ClientManager::new(
                MAX_TRACKED_CLIENTS,
                CHALLENGE_TIMEOUT,
            ))),
            options,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle onto the served state; changes show up in later replies.
    pub fn state(&self) -> Arc<RwLock<GameState>> {
        Arc::clone(&self.state)
    }

    /// Receives and answers requests until the socket fails.
    pub async fn run(self) {
        let mut buffer = [0u8; 2048];

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let request = match Packet::decode(&buffer[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Undecodable packet from {}: {}", addr, e);
                    continue;
                }
            };

            if self.options.silent {
                debug!("Ignoring {:?} from {}", request, addr);
                continue;
            }

            let Some(reply) = self.reply_to(request, addr).await else {
                continue;
            };

            // Replies go out from their own task so a delay never holds up
            // the receive loop.
            let socket = Arc::clone(&self.socket);
            let delay = self.options.delay;
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let Err(e) = socket.send_to(&reply.encode(), addr).await {
                    error!("Failed to send reply to {}: {}", addr, e);
                }
            });
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn reply_to(&self, request: Packet, addr: SocketAddr) -> Option<Packet> {
        match request {
            Packet::InfoRequest { challenge } => {
                if self.options.require_challenge && !self.verify(addr, challenge).await {
                    return Some(self.challenge(addr).await);
                }
                Some(Packet::Info(self.state.read().await.info.clone()))
            }
            Packet::PlayersRequest { challenge } => {
                if !self.verify(addr, Some(challenge)).await {
                    return Some(self.challenge(addr).await);
                }
                Some(Packet::Players(self.state.read().await.players.clone()))
            }
            Packet::RulesRequest { challenge } => {
                if !self.verify(addr, Some(challenge)).await {
                    return Some(self.challenge(addr).await);
                }
                Some(Packet::Rules(self.state.read().await.rules.clone()))
            }
            other => {
                warn!("Unexpected {:?} from {}", other, addr);
                None
            }
        }
    }

    async fn verify(&self, addr: SocketAddr, challenge: Option<i32>) -> bool {
        match challenge {
            Some(challenge) => self.clients.write().await.verify(addr, challenge),
            None => false,
        }
    }

    async fn challenge(&self, addr: SocketAddr) -> Packet {
        let challenge = self.clients.write().await.challenge_for(addr);
        Packet::Challenge { challenge }
    }
}
