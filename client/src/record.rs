//! Query targets and the per-server records produced for them.

use crate::error::{FetchError, RenderError};
use shared::{Player, Rules, ServerInfo};
use std::fmt;

/// Outcome of one attribute fetch.
pub type AttributeResult<T> = Result<T, FetchError>;

/// Where a target's address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    Directory,
    Explicit,
}

/// A server to query, tagged with its dispatch index.
///
/// The index is the target's position in the request and is what the
/// collator uses to restore order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub index: usize,
    pub address: String,
    pub origin: TargetOrigin,
}

impl Target {
    pub fn explicit(index: usize, address: impl Into<String>) -> Self {
        Self {
            index,
            address: address.into(),
            origin: TargetOrigin::Explicit,
        }
    }

    pub fn from_directory(index: usize, address: impl Into<String>) -> Self {
        Self {
            index,
            address: address.into(),
            origin: TargetOrigin::Directory,
        }
    }

    /// Numbers a list of explicit addresses in argument order.
    pub fn explicit_list<I, S>(addresses: I) -> Vec<Target>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        addresses
            .into_iter()
            .enumerate()
            .map(|(index, address)| Target::explicit(index, address))
            .collect()
    }
}

/// The three attribute requests a game server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Attribute {
    Info,
    Rules,
    Players,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attribute::Info => "info",
            Attribute::Rules => "rules",
            Attribute::Players => "players",
        })
    }
}

/// Which attributes to fetch for every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub info: bool,
    pub rules: bool,
    pub players: bool,
}

impl Selection {
    pub const INFO_ONLY: Selection = Selection {
        info: true,
        rules: false,
        players: false,
    };

    pub const ALL: Selection = Selection {
        info: true,
        rules: true,
        players: true,
    };

    pub fn wants(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Info => self.info,
            Attribute::Rules => self.rules,
            Attribute::Players => self.players,
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Selection::INFO_ONLY
    }
}

/// Everything learned about one target. `None` means the attribute was not
/// requested.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub index: usize,
    pub address: String,
    pub origin: TargetOrigin,
    pub info: Option<AttributeResult<ServerInfo>>,
    pub rules: Option<AttributeResult<Rules>>,
    pub players: Option<AttributeResult<Vec<Player>>>,
}

impl ServerRecord {
    pub fn new(target: &Target) -> Self {
        Self {
            index: target.index,
            address: target.address.clone(),
            origin: target.origin,
            info: None,
            rules: None,
            players: None,
        }
    }

    /// Record for a target whose query task died: every requested attribute
    /// carries `error`.
    pub fn failed(target: &Target, selection: Selection, error: FetchError) -> Self {
        let mut record = ServerRecord::new(target);
        if selection.info {
            record.info = Some(Err(error.clone()));
        }
        if selection.rules {
            record.rules = Some(Err(error.clone()));
        }
        if selection.players {
            record.players = Some(Err(error));
        }
        record
    }

    /// A target is unreachable when its info fetch failed.
    pub fn is_unreachable(&self) -> bool {
        matches!(self.info, Some(Err(_)))
    }

    pub fn info(&self) -> Result<&ServerInfo, RenderError> {
        match &self.info {
            Some(Ok(info)) => Ok(info),
            _ => Err(RenderError::Unavailable("server info")),
        }
    }

    /// Errors carried by this record, in attribute order.
    pub fn errors(&self) -> Vec<(Attribute, &FetchError)> {
        let mut errors = Vec::new();
        if let Some(Err(e)) = &self.info {
            errors.push((Attribute::Info, e));
        }
        if let Some(Err(e)) = &self.rules {
            errors.push((Attribute::Rules, e));
        }
        if let Some(Err(e)) = &self.players {
            errors.push((Attribute::Players, e));
        }
        errors
    }
}
