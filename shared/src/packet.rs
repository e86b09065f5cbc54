//! Datagram codec for game-server queries (A2S_INFO, A2S_PLAYER, A2S_RULES)
//! and master-server enumeration.
//!
//! Game-server packets share the "simple" header `FF FF FF FF` followed by a
//! type byte; requests and replies are distinguished by that byte, so one
//! `Packet` enum covers both directions. Split replies (header `FE FF FF FF`)
//! are not reassembled.

use crate::wire::{Reader, Writer};
use crate::{
    Environment, Player, Region, Rules, ServerInfo, ServerType, Spectator, TheShip,
    THE_SHIP_APP_ID,
};
use std::net::{Ipv4Addr, SocketAddrV4};

const SIMPLE_HEADER: i32 = -1;
const SPLIT_HEADER: i32 = -2;

const A2S_INFO: u8 = 0x54;
const A2S_PLAYER: u8 = 0x55;
const A2S_RULES: u8 = 0x56;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO: u8 = 0x49;
const S2A_PLAYER: u8 = 0x44;
const S2A_RULES: u8 = 0x45;

const INFO_PAYLOAD: &str = "Source Engine Query";

const EDF_PORT: u8 = 0x80;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_SPECTATOR: u8 = 0x40;
const EDF_KEYWORDS: u8 = 0x20;
const EDF_GAME_ID: u8 = 0x01;

const MASTER_QUERY: u8 = 0x31;
const MASTER_REPLY_HEADER: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0x66, 0x0A];

/// Challenge value sent when the client does not hold one yet.
pub const NO_CHALLENGE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("packet truncated while reading {0}")]
    Truncated(&'static str),
    #[error("unexpected packet header {0:#x}")]
    BadHeader(i32),
    #[error("split responses are not supported")]
    Split,
    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),
    #[error("unexpected request payload {0:?}")]
    UnexpectedPayload(String),
    #[error("unknown region code {0:#04x}")]
    UnknownRegion(u8),
    #[error("invalid address {0:?}")]
    BadAddress(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    InfoRequest { challenge: Option<i32> },
    PlayersRequest { challenge: i32 },
    RulesRequest { challenge: i32 },

    Challenge { challenge: i32 },
    Info(ServerInfo),
    Players(Vec<Player>),
    Rules(Rules),
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.i32(SIMPLE_HEADER);

        match self {
            Packet::InfoRequest { challenge } => {
                w.u8(A2S_INFO).cstring(INFO_PAYLOAD);
                if let Some(challenge) = challenge {
                    w.i32(*challenge);
                }
            }
            Packet::PlayersRequest { challenge } => {
                w.u8(A2S_PLAYER).i32(*challenge);
            }
            Packet::RulesRequest { challenge } => {
                w.u8(A2S_RULES).i32(*challenge);
            }
            Packet::Challenge { challenge } => {
                w.u8(S2C_CHALLENGE).i32(*challenge);
            }
            Packet::Info(info) => {
                w.u8(S2A_INFO);
                encode_info(&mut w, info);
            }
            Packet::Players(players) => {
                w.u8(S2A_PLAYER).u8(players.len().min(u8::MAX as usize) as u8);
                for player in players.iter().take(u8::MAX as usize) {
                    w.u8(player.index)
                        .cstring(&player.name)
                        .i32(player.score)
                        .f32(player.duration);
                }
            }
            Packet::Rules(rules) => {
                w.u8(S2A_RULES).u16(rules.len().min(u16::MAX as usize) as u16);
                for (name, value) in rules.iter().take(u16::MAX as usize) {
                    w.cstring(name).cstring(value);
                }
            }
        }

        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Packet, CodecError> {
        let mut r = Reader::new(data);

        match r.i32("header")? {
            SIMPLE_HEADER => {}
            SPLIT_HEADER => return Err(CodecError::Split),
            other => return Err(CodecError::BadHeader(other)),
        }

        match r.u8("packet type")? {
            A2S_INFO => {
                let payload = r.cstring("info payload")?;
                if payload != INFO_PAYLOAD {
                    return Err(CodecError::UnexpectedPayload(payload));
                }
                let challenge = if r.remaining() >= 4 {
                    Some(r.i32("challenge")?)
                } else {
                    None
                };
                Ok(Packet::InfoRequest { challenge })
            }
            A2S_PLAYER => Ok(Packet::PlayersRequest {
                challenge: r.i32("challenge")?,
            }),
            A2S_RULES => Ok(Packet::RulesRequest {
                challenge: r.i32("challenge")?,
            }),
            S2C_CHALLENGE => Ok(Packet::Challenge {
                challenge: r.i32("challenge")?,
            }),
            S2A_INFO => Ok(Packet::Info(decode_info(&mut r)?)),
            S2A_PLAYER => {
                let count = r.u8("player count")?;
                let mut players = Vec::with_capacity(count as usize);
                // Some servers announce more players than they actually list.
                for _ in 0..count {
                    if r.is_empty() {
                        break;
                    }
                    players.push(Player {
                        index: r.u8("player index")?,
                        name: r.cstring("player name")?,
                        score: r.i32("player score")?,
                        duration: r.f32("player duration")?,
                    });
                }
                Ok(Packet::Players(players))
            }
            S2A_RULES => {
                let count = r.u16("rule count")?;
                let mut rules = Rules::new();
                for _ in 0..count {
                    if r.is_empty() {
                        break;
                    }
                    let name = r.cstring("rule name")?;
                    let value = r.cstring("rule value")?;
                    rules.insert(name, value);
                }
                Ok(Packet::Rules(rules))
            }
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

fn encode_info(w: &mut Writer, info: &ServerInfo) {
    w.u8(info.protocol)
        .cstring(&info.name)
        .cstring(&info.map)
        .cstring(&info.folder)
        .cstring(&info.game)
        .u16(info.app_id)
        .u8(info.players)
        .u8(info.max_players)
        .u8(info.bots)
        .u8(info.server_type.code())
        .u8(info.environment.code())
        .u8(info.password as u8)
        .u8(info.vac as u8);

    if info.app_id == THE_SHIP_APP_ID {
        let ship = info.the_ship.unwrap_or_default();
        w.u8(ship.mode).u8(ship.witnesses).u8(ship.duration);
    }

    w.cstring(&info.version);

    let mut edf = 0u8;
    if info.port.is_some() {
        edf |= EDF_PORT;
    }
    if info.steam_id.is_some() {
        edf |= EDF_STEAM_ID;
    }
    if info.spectator.is_some() {
        edf |= EDF_SPECTATOR;
    }
    if info.keywords.is_some() {
        edf |= EDF_KEYWORDS;
    }
    if info.game_id.is_some() {
        edf |= EDF_GAME_ID;
    }
    if edf == 0 {
        return;
    }

    w.u8(edf);
    if let Some(port) = info.port {
        w.u16(port);
    }
    if let Some(steam_id) = info.steam_id {
        w.u64(steam_id);
    }
    if let Some(spectator) = &info.spectator {
        w.u16(spectator.port).cstring(&spectator.name);
    }
    if let Some(keywords) = &info.keywords {
        w.cstring(keywords);
    }
    if let Some(game_id) = info.game_id {
        w.u64(game_id);
    }
}

fn decode_info(r: &mut Reader<'_>) -> Result<ServerInfo, CodecError> {
    let mut info = ServerInfo {
        protocol: r.u8("protocol")?,
        name: r.cstring("name")?,
        map: r.cstring("map")?,
        folder: r.cstring("folder")?,
        game: r.cstring("game")?,
        app_id: r.u16("app id")?,
        players: r.u8("players")?,
        max_players: r.u8("max players")?,
        bots: r.u8("bots")?,
        server_type: ServerType::from_code(r.u8("server type")?),
        environment: Environment::from_code(r.u8("environment")?),
        password: r.u8("visibility")? != 0,
        vac: r.u8("vac")? != 0,
        ..ServerInfo::default()
    };

    if info.app_id == THE_SHIP_APP_ID {
        info.the_ship = Some(TheShip {
            mode: r.u8("ship mode")?,
            witnesses: r.u8("ship witnesses")?,
            duration: r.u8("ship duration")?,
        });
    }

    info.version = r.cstring("version")?;

    if r.is_empty() {
        return Ok(info);
    }

    let edf = r.u8("extra data flag")?;
    if edf & EDF_PORT != 0 {
        info.port = Some(r.u16("port")?);
    }
    if edf & EDF_STEAM_ID != 0 {
        info.steam_id = Some(r.u64("steam id")?);
    }
    if edf & EDF_SPECTATOR != 0 {
        info.spectator = Some(Spectator {
            port: r.u16("spectator port")?,
            name: r.cstring("spectator name")?,
        });
    }
    if edf & EDF_KEYWORDS != 0 {
        info.keywords = Some(r.cstring("keywords")?);
    }
    if edf & EDF_GAME_ID != 0 {
        info.game_id = Some(r.u64("game id")?);
    }

    Ok(info)
}

/// Request for one page of server addresses.
///
/// `seed` is `0.0.0.0:0` for the first page and the last address of the
/// previous page afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterQuery {
    pub region: Region,
    pub seed: SocketAddrV4,
    pub filter: String,
}

/// Address that starts an enumeration and terminates the final page.
pub const MASTER_SENTINEL: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

impl MasterQuery {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u8(MASTER_QUERY)
            .u8(self.region.wire_code())
            .cstring(&self.seed.to_string())
            .cstring(&self.filter);
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<MasterQuery, CodecError> {
        let mut r = Reader::new(data);
        let kind = r.u8("query type")?;
        if kind != MASTER_QUERY {
            return Err(CodecError::UnknownType(kind));
        }
        let code = r.u8("region")?;
        let region = Region::from_wire_code(code).ok_or(CodecError::UnknownRegion(code))?;
        let seed_text = r.cstring("seed")?;
        let seed = seed_text
            .parse()
            .map_err(|_| CodecError::BadAddress(seed_text.clone()))?;
        let filter = if r.is_empty() {
            String::new()
        } else {
            r.cstring("filter")?
        };
        Ok(MasterQuery {
            region,
            seed,
            filter,
        })
    }
}

/// One page of addresses from the master server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterReply {
    pub servers: Vec<SocketAddrV4>,
}

impl MasterReply {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.bytes(&MASTER_REPLY_HEADER);
        for addr in &self.servers {
            w.bytes(&addr.ip().octets()).u16_be(addr.port());
        }
        w.finish()
    }

    pub fn decode(data: &[u8]) -> Result<MasterReply, CodecError> {
        let mut r = Reader::new(data);
        let header = r.bytes(MASTER_REPLY_HEADER.len(), "master header")?;
        if header != MASTER_REPLY_HEADER {
            return Err(CodecError::BadHeader(i32::from_le_bytes([
                header[0], header[1], header[2], header[3],
            ])));
        }

        let mut servers = Vec::with_capacity(r.remaining() / 6);
        while !r.is_empty() {
            let ip = r.bytes(4, "server address")?;
            let port = r.u16_be("server port")?;
            servers.push(SocketAddrV4::new(
                Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
                port,
            ));
        }
        Ok(MasterReply { servers })
    }

    /// True when this page ends the enumeration.
    pub fn is_last(&self) -> bool {
        self.servers.last().map_or(true, |a| *a == MASTER_SENTINEL)
    }
}
