//! Per-server report: every info field, the player roster and the rules,
//! rather than one table row per server.

use super::{pad_left, pad_right, Renderer};
use crate::error::FetchError;
use crate::fields::Registry;
use crate::record::{AttributeResult, ServerRecord};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{Player, Rules};
use std::io::{self, Write};

const INDENT: &str = "  ";

pub struct DetailTextRenderer<'r, W> {
    out: W,
    registry: &'r Registry,
}

impl<'r, W: Write> DetailTextRenderer<'r, W> {
    pub fn new(out: W, registry: &'r Registry) -> Self {
        Self { out, registry }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_info(&mut self, record: &ServerRecord) -> io::Result<()> {
        let info = match &record.info {
            None => return Ok(()),
            Some(Err(e)) => return self.write_error("Info", "server info", e),
            Some(Ok(info)) => info,
        };

        let rows: Vec<(&str, String)> = self
            .registry
            .iter()
            .filter_map(|field| {
                let value = field.info_value(info)?;
                Some((
                    field.name(),
                    match value {
                        Ok(value) => value.to_string(),
                        Err(e) => e.to_string(),
                    },
                ))
            })
            .collect();

        writeln!(self.out, "{}Info:", INDENT)?;
        write_pairs(&mut self.out, rows.iter().map(|(k, v)| (*k, v.as_str())))?;
        writeln!(self.out)
    }

    fn write_players(&mut self, record: &ServerRecord) -> io::Result<()> {
        let players = match &record.players {
            None => return Ok(()),
            Some(Err(e)) => return self.write_error("Players", "player list", e),
            Some(Ok(players)) => players,
        };

        writeln!(self.out, "{}Players:", INDENT)?;
        let prefix = INDENT.repeat(2);

        let mut rows = vec![[
            "#".to_string(),
            "Name".to_string(),
            "Id".to_string(),
            "Scr".to_string(),
            "Time".to_string(),
        ]];
        for (i, player) in players.iter().enumerate() {
            rows.push([
                (i + 1).to_string(),
                player.name.clone(),
                player.index.to_string(),
                player.score.to_string(),
                format_duration(player.duration),
            ]);
        }

        let mut widths = [0usize; 5];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        for (i, row) in rows.iter().enumerate() {
            writeln!(
                self.out,
                "{} {} | {} | {} | {} | {} ",
                prefix,
                pad_left(&row[0], widths[0]),
                pad_right(&row[1], widths[1]),
                pad_right(&row[2], widths[2]),
                pad_left(&row[3], widths[3]),
                pad_right(&row[4], widths[4]),
            )?;
            if i == 0 {
                let ruler: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
                writeln!(self.out, "{}{}", prefix, ruler.join("+"))?;
            }
        }
        writeln!(self.out)
    }

    fn write_rules(&mut self, record: &ServerRecord) -> io::Result<()> {
        let rules = match &record.rules {
            None => return Ok(()),
            Some(Err(e)) => return self.write_error("Rules", "rules", e),
            Some(Ok(rules)) => rules,
        };

        writeln!(self.out, "{}Rules:", INDENT)?;
        write_pairs(&mut self.out, rules.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        writeln!(self.out)
    }

    fn write_error(&mut self, section: &str, what: &str, error: &FetchError) -> io::Result<()> {
        writeln!(self.out, "{}{}:", INDENT, section)?;
        writeln!(self.out, "{}Error fetching {}: {}", INDENT.repeat(2), what, error)?;
        writeln!(self.out)
    }
}

/// Writes `| key: value` lines with the values lined up.
fn write_pairs<'a, W: Write>(
    out: &mut W,
    pairs: impl Iterator<Item = (&'a str, &'a str)> + Clone,
) -> io::Result<()> {
    let key_width = pairs.clone().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    for (key, value) in pairs {
        writeln!(
            out,
            "{}| {} {}",
            INDENT.repeat(2),
            pad_right(&format!("{}:", key), key_width + 1),
            value
        )?;
    }
    Ok(())
}

/// Formats a connection time rounded down to whole seconds, e.g. `1h2m3s`.
pub fn format_duration(seconds: f32) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{}s", s),
        (0, _) => format!("{}m{}s", m, s),
        _ => format!("{}h{}m{}s", h, m, s),
    }
}

impl<W: Write> Renderer for DetailTextRenderer<'_, W> {
    fn render(&mut self, record: &ServerRecord) -> io::Result<()> {
        writeln!(self.out, "Server: {}", record.address)?;
        self.write_info(record)?;
        self.write_players(record)?;
        self.write_rules(record)?;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// JSON form of the detail view: `{"servers": [...]}`, one entry per
/// record, each attribute as `{"error", "value"}` or null when it was not
/// requested.
pub struct DetailJsonRenderer<W> {
    out: W,
    servers: Vec<Value>,
}

impl<W: Write> DetailJsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            servers: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn attribute_json<T: Serialize>(result: &Option<AttributeResult<T>>) -> Value {
    match result {
        None => Value::Null,
        Some(Ok(value)) => json!({
            "error": null,
            "value": serde_json::to_value(value).unwrap_or(Value::Null),
        }),
        Some(Err(e)) => json!({ "error": e.to_string(), "value": null }),
    }
}

impl<W: Write> Renderer for DetailJsonRenderer<W> {
    fn render(&mut self, record: &ServerRecord) -> io::Result<()> {
        let server = json!({
            "address": record.address,
            "info": attribute_json(&record.info),
            "rules": attribute_json::<Rules>(&record.rules),
            "players": attribute_json::<Vec<Player>>(&record.players),
        });
        self.servers.push(server);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let servers = std::mem::take(&mut self.servers);
        serde_json::to_writer(&mut self.out, &json!({ "servers": servers }))?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
