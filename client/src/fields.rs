//! Field registry: the table of every column a user can ask for.
//!
//! Each entry pairs a display descriptor with exactly one accessor. The
//! accessor is tagged by the source it reads ([`FieldKind::Info`] for the
//! fetched `ServerInfo` snapshot, [`FieldKind::Connection`] for the endpoint
//! itself), so deciding whether a name exists and how to evaluate it is a
//! single lookup. Entries keep their registration order; that order is what
//! `--list-fields` and the detail view show.
//!
//! The registry is built once at startup and then only read.

use crate::error::{RenderError, SpecError};
use crate::record::ServerRecord;
use serde::Serialize;
use shared::ServerInfo;
use std::collections::HashMap;
use std::fmt;

/// A cell value before it is turned into text or JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<Option<u64>> for FieldValue {
    fn from(v: Option<u64>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::UInt)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        v.map_or(FieldValue::Null, FieldValue::Text)
    }
}

/// Which side of the column the padding goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Right,
}

pub type InfoAccessor = fn(&ServerInfo) -> FieldValue;
pub type ConnectionAccessor = fn(&str) -> FieldValue;
/// Maps a raw value to its display form; `None` when the value has no
/// display form.
pub type Transformer = fn(&FieldValue) -> Option<FieldValue>;

/// Source capability of a field, carrying its accessor.
#[derive(Clone, Copy)]
pub enum FieldKind {
    Info(InfoAccessor),
    Connection(ConnectionAccessor),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Info(_) => f.write_str("Info"),
            FieldKind::Connection(_) => f.write_str("Connection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub display: &'static str,
    pub width: Option<usize>,
    pub description: Option<&'static str>,
    pub align: Align,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub descriptor: FieldDescriptor,
    pub kind: FieldKind,
    pub transform: Option<Transformer>,
}

impl FieldDef {
    pub fn info(
        name: &'static str,
        display: &'static str,
        width: usize,
        accessor: InfoAccessor,
    ) -> Self {
        Self::new(name, display, width, FieldKind::Info(accessor))
    }

    pub fn connection(
        name: &'static str,
        display: &'static str,
        width: usize,
        accessor: ConnectionAccessor,
    ) -> Self {
        Self::new(name, display, width, FieldKind::Connection(accessor))
    }

    fn new(name: &'static str, display: &'static str, width: usize, kind: FieldKind) -> Self {
        Self {
            descriptor: FieldDescriptor {
                name,
                display,
                width: Some(width),
                description: None,
                align: Align::Left,
            },
            kind,
            transform: None,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.descriptor.description = Some(description);
        self
    }

    pub fn right_aligned(mut self) -> Self {
        self.descriptor.align = Align::Right;
        self
    }

    pub fn unpadded(mut self) -> Self {
        self.descriptor.width = None;
        self
    }

    pub fn transform(mut self, transform: Transformer) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Evaluates the accessor against `record`, then the transformer.
    pub fn value(&self, record: &ServerRecord) -> Result<FieldValue, RenderError> {
        let raw = match self.kind {
            FieldKind::Info(read) => read(record.info()?),
            FieldKind::Connection(read) => read(&record.address),
        };
        self.display_value(raw)
    }

    /// Evaluates an info field directly against a snapshot. Connection
    /// fields have nothing to read here.
    pub fn info_value(&self, info: &ServerInfo) -> Option<Result<FieldValue, RenderError>> {
        match self.kind {
            FieldKind::Info(read) => Some(self.display_value(read(info))),
            FieldKind::Connection(_) => None,
        }
    }

    fn display_value(&self, raw: FieldValue) -> Result<FieldValue, RenderError> {
        match self.transform {
            Some(transform) => transform(&raw).ok_or_else(|| RenderError::Untransformable {
                field: self.descriptor.name,
                value: format!("{:?}", raw),
            }),
            None => Ok(raw),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    fields: Vec<FieldDef>,
    by_name: HashMap<&'static str, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field. Returns false, keeping the existing entry, if the name
    /// is already registered.
    pub fn register(&mut self, field: FieldDef) -> bool {
        if self.by_name.contains_key(field.name()) {
            return false;
        }
        self.by_name.insert(field.name(), self.fields.len());
        self.fields.push(field);
        true
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn lookup(&self, name: &str) -> Result<&FieldDef, SpecError> {
        self.get(name)
            .ok_or_else(|| SpecError::UnknownField(name.to_string()))
    }

    /// Fields in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The built-in server fields.
    pub fn standard() -> Self {
        let mut registry = Registry::new();
        for field in standard_fields() {
            registry.register(field);
        }
        registry
    }
}

fn standard_fields() -> Vec<FieldDef> {
    use FieldValue::{Bool, Int, Null, Text};

    vec![
        FieldDef::connection("ip", "IP Addr", 21, |addr| Text(addr.to_string()))
            .describe("IP Address of the Server"),
        FieldDef::info("name", "Name", 15, |i| Text(i.name.clone())).describe("Name of Server"),
        FieldDef::info("map", "Map", 10, |i| Text(i.map.clone())),
        FieldDef::info("folder", "Folder", 10, |i| Text(i.folder.clone())),
        FieldDef::info("game", "Game", 5, |i| Text(i.game.clone())),
        FieldDef::info("id", "ID", 5, |i| Int(i.app_id.into()))
            .describe("Steam application id")
            .right_aligned(),
        FieldDef::info("players", "Ply", 3, |i| Int(i.players.into()))
            .describe("Number Players")
            .right_aligned(),
        FieldDef::info("maxplayers", "Max", 3, |i| Int(i.max_players.into()))
            .describe("Maximum number of players allowed")
            .right_aligned(),
        FieldDef::info("bots", "Bots", 5, |i| Int(i.bots.into()))
            .describe("Number of Bots")
            .right_aligned(),
        FieldDef::info("servertype", "Type", 5, |i| {
            Text((i.server_type.code() as char).to_string())
        })
        .describe("Hosting Type (eg dedicated)")
        .transform(server_type_label),
        FieldDef::info("environment", "Env", 3, |i| {
            Text((i.environment.code() as char).to_string())
        })
        .describe("Environment OS")
        .transform(environment_label),
        FieldDef::info("visibility", "Pw.", 3, |i| Bool(i.password))
            .describe("Is a password required to join?"),
        FieldDef::info("vac", "VAC", 3, |i| Bool(i.vac)).describe("Is the server VAC protected?"),
        FieldDef::info("version", "Version", 5, |i| Text(i.version.clone())),
        FieldDef::info("port", "Port", 5, |i| {
            i.port.map_or(Null, |p| Int(p.into()))
        }),
        FieldDef::info("steamid", "SteamID", 10, |i| i.steam_id.into()),
        FieldDef::info("spectatorport", "SpPort", 7, |i| {
            i.spectator.as_ref().map_or(Null, |s| Int(s.port.into()))
        }),
        FieldDef::info("spectatorname", "Spectator", 9, |i| {
            i.spectator.as_ref().map(|s| s.name.clone()).into()
        }),
        FieldDef::info("keywords", "Keywords", 9, |i| i.keywords.clone().into()),
        FieldDef::info("gameid", "GameID", 6, |i| i.game_id.into()),
        FieldDef::info("mode", "Mode", 4, |i| {
            i.the_ship.map_or(Null, |s| Int(s.mode.into()))
        })
        .describe("Game mode (The Ship)"),
        FieldDef::info("witnesses", "Witnesses", 10, |i| {
            i.the_ship.map_or(Null, |s| Int(s.witnesses.into()))
        })
        .describe("# Witnesses for The Ship."),
        FieldDef::info("duration", "Arrest In", 7, |i| {
            i.the_ship.map_or(Null, |s| Int(s.duration.into()))
        })
        .describe("Will arrest in (The Ship)"),
    ]
}

fn environment_label(value: &FieldValue) -> Option<FieldValue> {
    match value {
        FieldValue::Text(code) => Some(FieldValue::Text(
            match code.as_str() {
                "l" => "Lnx",
                "w" => "Win",
                "m" | "o" => "Mac",
                _ => "?",
            }
            .to_string(),
        )),
        _ => None,
    }
}

fn server_type_label(value: &FieldValue) -> Option<FieldValue> {
    match value {
        FieldValue::Text(code) => Some(FieldValue::Text(
            match code.as_str() {
                "d" => "Ded",
                "l" => "Lst",
                "p" => "TV",
                _ => "?",
            }
            .to_string(),
        )),
        _ => None,
    }
}
