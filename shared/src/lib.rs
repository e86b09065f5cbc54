//! Types shared by the `sourceq` client and the mock responders: the server
//! attribute model (info, players, rules), master-server regions, and the
//! datagram codec for the Source query protocol.

pub mod packet;
pub mod wire;

pub use packet::{CodecError, MasterQuery, MasterReply, Packet};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default game port used when an address is given without one.
pub const DEFAULT_GAME_PORT: u16 = 27015;

/// App id of The Ship, whose info replies carry three extra bytes.
pub const THE_SHIP_APP_ID: u16 = 2400;

/// Server configuration key/value pairs, kept sorted by key.
pub type Rules = BTreeMap<String, String>;

/// Hosting type advertised in an info reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Dedicated,
    Listen,
    Proxy,
    #[default]
    Unknown,
}

impl ServerType {
    pub fn from_code(code: u8) -> Self {
        match code.to_ascii_lowercase() {
            b'd' => ServerType::Dedicated,
            b'l' => ServerType::Listen,
            b'p' => ServerType::Proxy,
            _ => ServerType::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ServerType::Dedicated => b'd',
            ServerType::Listen => b'l',
            ServerType::Proxy => b'p',
            ServerType::Unknown => b'?',
        }
    }
}

/// Operating system the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Linux,
    Windows,
    Mac,
    #[default]
    Unknown,
}

impl Environment {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'l' => Environment::Linux,
            b'w' => Environment::Windows,
            // Older servers report Mac as 'm', newer ones as 'o'.
            b'm' | b'o' => Environment::Mac,
            _ => Environment::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Environment::Linux => b'l',
            Environment::Windows => b'w',
            Environment::Mac => b'm',
            Environment::Unknown => b'?',
        }
    }
}

/// Extra fields only present for The Ship servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TheShip {
    pub mode: u8,
    pub witnesses: u8,
    pub duration: u8,
}

/// SourceTV relay advertised in the extra data block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Spectator {
    pub port: u16,
    pub name: String,
}

/// General server information (A2S_INFO reply).
///
/// Fields after `version` come from the optional extra data block and are
/// `None` when the server did not send them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ServerInfo {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub server_type: ServerType,
    pub environment: Environment,
    pub password: bool,
    pub vac: bool,
    pub the_ship: Option<TheShip>,
    pub version: String,
    pub port: Option<u16>,
    pub steam_id: Option<u64>,
    pub spectator: Option<Spectator>,
    pub keywords: Option<String>,
    pub game_id: Option<u64>,
}

/// One entry of the connected-player roster (A2S_PLAYER reply).
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Player {
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected.
    pub duration: f32,
}

impl Player {
    pub fn new(index: u8, name: impl Into<String>, score: i32, duration: f32) -> Self {
        Self {
            index,
            name: name.into(),
            score,
            duration,
        }
    }
}

/// Region filter understood by the master server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    UsEast,
    UsWest,
    SouthAmerica,
    Europe,
    Asia,
    Australia,
    MiddleEast,
    Africa,
    RestOfWorld,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("region '{0}' does not exist (expected one of USE, USW, SA, EU, AS, AU, ME, AF, OTHER)")]
pub struct UnknownRegion(pub String);

impl Region {
    /// Every region, in the order they are listed to users.
    pub const ALL: [Region; 9] = [
        Region::UsEast,
        Region::UsWest,
        Region::SouthAmerica,
        Region::Europe,
        Region::Asia,
        Region::Australia,
        Region::MiddleEast,
        Region::Africa,
        Region::RestOfWorld,
    ];

    /// Short code accepted on the command line.
    pub fn code(self) -> &'static str {
        match self {
            Region::UsEast => "USE",
            Region::UsWest => "USW",
            Region::SouthAmerica => "SA",
            Region::Europe => "EU",
            Region::Asia => "AS",
            Region::Australia => "AU",
            Region::MiddleEast => "ME",
            Region::Africa => "AF",
            Region::RestOfWorld => "OTHER",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::UsEast => "US East coast",
            Region::UsWest => "US West coast",
            Region::SouthAmerica => "South America",
            Region::Europe => "Europe",
            Region::Asia => "Asia",
            Region::Australia => "Australia",
            Region::MiddleEast => "Middle East",
            Region::Africa => "Africa",
            Region::RestOfWorld => "Rest of the world",
        }
    }

    /// Region byte sent in a master query.
    pub fn wire_code(self) -> u8 {
        match self {
            Region::UsEast => 0x00,
            Region::UsWest => 0x01,
            Region::SouthAmerica => 0x02,
            Region::Europe => 0x03,
            Region::Asia => 0x04,
            Region::Australia => 0x05,
            Region::MiddleEast => 0x06,
            Region::Africa => 0x07,
            Region::RestOfWorld => 0xFF,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<Self> {
        Region::ALL.into_iter().find(|r| r.wire_code() == code)
    }
}

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Region::ALL
            .into_iter()
            .find(|r| r.code() == wanted)
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
