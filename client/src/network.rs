use crate::error::{DirectoryError, FetchError};
use crate::query::{DirectoryQuery, QueryBackend};
use crate::record::AttributeResult;
use log::{debug, info, warn};
use shared::packet::{MASTER_SENTINEL, NO_CHALLENGE};
use shared::{MasterQuery, MasterReply, Packet, Player, Rules, ServerInfo, DEFAULT_GAME_PORT};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

pub const DEFAULT_MASTER: &str = "hl2master.steampowered.com:27011";

const RECV_BUFFER: usize = 4096;

/// Page limit for one enumeration; the master hands out a few hundred
/// addresses per page.
const MAX_MASTER_PAGES: usize = 1024;

/// Talks the Source query protocol over UDP.
///
/// Every fetch opens its own ephemeral socket connected to the target, so
/// concurrent fetches never see each other's replies.
#[derive(Debug, Clone)]
pub struct UdpBackend {
    master: String,
}

impl UdpBackend {
    pub fn new(master: impl Into<String>) -> Self {
        Self {
            master: master.into(),
        }
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    /// Runs a request that the server may answer with a challenge first.
    /// `request` builds the packet for a given challenge; `None` is the
    /// initial attempt.
    async fn challenged<T>(
        address: &str,
        request: impl Fn(Option<i32>) -> Packet,
        accept: impl Fn(Packet) -> Option<T>,
    ) -> AttributeResult<T> {
        let socket = connect(address).await?;

        let mut packet = exchange(&socket, &request(None)).await?;
        if let Packet::Challenge { challenge } = packet {
            debug!("{} issued challenge {:#x}", address, challenge);
            packet = exchange(&socket, &request(Some(challenge))).await?;
        }

        match packet {
            Packet::Challenge { .. } => Err(FetchError::Malformed(
                "server answered the challenge with another challenge".to_string(),
            )),
            other => {
                let kind = packet_kind(&other);
                accept(other)
                    .ok_or_else(|| FetchError::Malformed(format!("unexpected {} reply", kind)))
            }
        }
    }
}

fn packet_kind(packet: &Packet) -> &'static str {
    match packet {
        Packet::InfoRequest { .. } => "info request",
        Packet::PlayersRequest { .. } => "players request",
        Packet::RulesRequest { .. } => "rules request",
        Packet::Challenge { .. } => "challenge",
        Packet::Info(_) => "info",
        Packet::Players(_) => "players",
        Packet::Rules(_) => "rules",
    }
}

/// Resolves `address`, adding the default game port when none is given.
pub async fn resolve(address: &str) -> Result<SocketAddr, String> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let with_port = if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_GAME_PORT)
    };

    let mut candidates: Vec<SocketAddr> = lookup_host(&with_port)
        .await
        .map_err(|e| e.to_string())?
        .collect();
    // Prefer IPv4; the master only hands out IPv4 addresses anyway.
    candidates.sort_by_key(|a| !a.is_ipv4());
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| format!("no addresses for {}", with_port))
}

async fn bind_for(peer: SocketAddr) -> std::io::Result<UdpSocket> {
    let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(peer).await?;
    Ok(socket)
}

async fn connect(address: &str) -> Result<UdpSocket, FetchError> {
    let peer = resolve(address)
        .await
        .map_err(|e| FetchError::Unreachable(format!("cannot resolve {}: {}", address, e)))?;
    Ok(bind_for(peer).await?)
}

async fn exchange(socket: &UdpSocket, request: &Packet) -> Result<Packet, FetchError> {
    socket.send(&request.encode()).await?;

    let mut buffer = [0u8; RECV_BUFFER];
    let len = socket.recv(&mut buffer).await?;
    Ok(Packet::decode(&buffer[..len])?)
}

impl QueryBackend for UdpBackend {
    async fn enumerate(&self, query: &DirectoryQuery) -> Result<Vec<String>, DirectoryError> {
        let mut seed: SocketAddrV4 = query
            .start
            .parse()
            .map_err(|_| DirectoryError::InvalidStart(query.start.clone()))?;

        let peer = resolve(&self.master)
            .await
            .map_err(|reason| DirectoryError::Resolve {
                address: self.master.clone(),
                reason,
            })?;
        let socket = bind_for(peer).await?;
        debug!("Master server {} resolved to {}", self.master, peer);

        let mut servers = Vec::new();
        let mut buffer = [0u8; RECV_BUFFER];

        for page in 0..MAX_MASTER_PAGES {
            let request = MasterQuery {
                region: query.region,
                seed,
                filter: query.filter.clone(),
            };
            socket.send(&request.encode()).await?;

            let len = timeout(query.timeout, socket.recv(&mut buffer))
                .await
                .map_err(|_| DirectoryError::Timeout(query.timeout))??;
            let reply = MasterReply::decode(&buffer[..len])?;
            debug!("Master page {}: {} entries", page, reply.servers.len());

            servers.extend(
                reply
                    .servers
                    .iter()
                    .filter(|a| **a != MASTER_SENTINEL)
                    .map(|a| a.to_string()),
            );

            let last = match reply.servers.last() {
                Some(&last) if !reply.is_last() => last,
                _ => return Ok(servers),
            };
            if last == seed {
                warn!("Master server repeated seed {}, stopping", seed);
                return Ok(servers);
            }
            seed = last;
        }

        info!(
            "Stopped master enumeration after {} pages ({} servers)",
            MAX_MASTER_PAGES,
            servers.len()
        );
        Ok(servers)
    }

    async fn info(&self, address: &str, limit: Duration) -> AttributeResult<ServerInfo> {
        let fetch = Self::challenged(
            address,
            |challenge| Packet::InfoRequest { challenge },
            |packet| match packet {
                Packet::Info(info) => Some(info),
                _ => None,
            },
        );
        timeout(limit, fetch).await.map_err(|_| FetchError::Timeout)?
    }

    async fn rules(&self, address: &str, limit: Duration) -> AttributeResult<Rules> {
        let fetch = Self::challenged(
            address,
            |challenge| Packet::RulesRequest {
                challenge: challenge.unwrap_or(NO_CHALLENGE),
            },
            |packet| match packet {
                Packet::Rules(rules) => Some(rules),
                _ => None,
            },
        );
        timeout(limit, fetch).await.map_err(|_| FetchError::Timeout)?
    }

    async fn players(&self, address: &str, limit: Duration) -> AttributeResult<Vec<Player>> {
        let fetch = Self::challenged(
            address,
            |challenge| Packet::PlayersRequest {
                challenge: challenge.unwrap_or(NO_CHALLENGE),
            },
            |packet| match packet {
                Packet::Players(players) => Some(players),
                _ => None,
            },
        );
        timeout(limit, fetch).await.map_err(|_| FetchError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Region;

    /// Answers each datagram with the replies produced by `respond`.
    async fn fake_server<F>(respond: F) -> SocketAddr
    where
        F: Fn(Packet) -> Vec<Packet> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let Ok(request) = Packet::decode(&buf[..len]) else {
                    continue;
                };
                for reply in respond(request) {
                    let _ = socket.send_to(&reply.encode(), from).await;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_info_with_challenge_handshake() {
        let addr = fake_server(|request| match request {
            Packet::InfoRequest { challenge: None } => vec![Packet::Challenge { challenge: 77 }],
            Packet::InfoRequest {
                challenge: Some(77),
            } => vec![Packet::Info(ServerInfo {
                name: "challenged".into(),
                ..ServerInfo::default()
            })],
            _ => vec![],
        })
        .await;

        let backend = UdpBackend::new(DEFAULT_MASTER);
        let info = tokio_test::assert_ok!(
            backend
                .info(&addr.to_string(), Duration::from_secs(2))
                .await
        );
        assert_eq!(info.name, "challenged");
    }

    #[tokio::test]
    async fn test_players_without_challenge() {
        let addr = fake_server(|request| match request {
            Packet::PlayersRequest { .. } => vec![Packet::Players(vec![Player::new(
                1, "bob", 3, 12.5,
            )])],
            _ => vec![],
        })
        .await;

        let backend = UdpBackend::new(DEFAULT_MASTER);
        let players = backend
            .players(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(players, vec![Player::new(1, "bob", 3, 12.5)]);
    }

    #[tokio::test]
    async fn test_repeated_challenge_is_malformed() {
        let addr = fake_server(|_| vec![Packet::Challenge { challenge: 1 }]).await;
        let backend = UdpBackend::new(DEFAULT_MASTER);
        let err = backend
            .rules(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let addr = fake_server(|_| vec![]).await;
        let backend = UdpBackend::new(DEFAULT_MASTER);
        let err = backend
            .info(&addr.to_string(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_unreachable() {
        let backend = UdpBackend::new(DEFAULT_MASTER);
        let err = backend
            .info("no-such-host.invalid", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_resolve_adds_default_port() {
        let addr = resolve("localhost").await.unwrap();
        assert_eq!(addr.port(), DEFAULT_GAME_PORT);
        assert_eq!(
            resolve("127.0.0.1:9000").await.unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalid_start_address() {
        let backend = UdpBackend::new("127.0.0.1:1");
        let query = DirectoryQuery {
            region: Region::Europe,
            start: "nonsense".into(),
            filter: String::new(),
            timeout: Duration::from_millis(100),
        };
        let err = backend.enumerate(&query).await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidStart(_)));
    }
}
