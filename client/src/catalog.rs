//! Static listings printed by `--list-fields`, `--list-filters` and
//! `--list-regions`.

use crate::fields::Registry;
use shared::Region;
use std::io::{self, Write};

/// Master-server filter keys with their descriptions. A `\n` in a
/// description starts a continuation line.
pub const KNOWN_FILTERS: &[(&str, &str)] = &[
    ("type", "Servers running (d)edicated, (l)isten, or (p) SourceTV."),
    (
        "secure",
        "(1) Servers using anti-cheat technology\n(VAC, but potentially others as well).",
    ),
    ("gamedir", "Servers running the specified\nmodification (ex. cstrike)"),
    ("map", "Servers running the specified map (ex. cs_italy)"),
    ("linux", "Servers running on a Linux (1) platform"),
    ("empty", "Servers that are not empty (1)"),
    ("full", "Servers that are not full (1)"),
    ("proxy", "Servers that are spectator proxies (1)"),
    ("napp", "Servers that are NOT running game ([appid])"),
    ("noplayers", "Servers that are empty (1)"),
    ("white", "Servers that are whitelisted (1)"),
    (
        "gametype",
        "Servers with all of the given\ntag(s) in sv_tags (tag1,tag2,...)",
    ),
    (
        "gamedata",
        "Servers with all of the given\ntag(s) in their 'hidden' tags\n(L4D2) (tag1,tag2,...)",
    ),
    (
        "gamedataor",
        "Servers with any of the given\ntag(s) in their 'hidden' tags\n(L4D2) (tag1,tag2,...)",
    ),
];

const ITEM_INDENT: usize = 4;
const NAME_GAP: usize = 4;

/// Writes `name  description` rows with continuation lines hung under the
/// first description line.
fn write_hanging<W: Write>(out: &mut W, rows: &[(&str, &str)]) -> io::Result<()> {
    let name_width = rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0) + NAME_GAP;
    let hang = format!("\n{}", " ".repeat(ITEM_INDENT + name_width));

    for (name, detail) in rows {
        writeln!(
            out,
            "{}{:<width$}{}",
            " ".repeat(ITEM_INDENT),
            name,
            detail.split('\n').collect::<Vec<_>>().join(&hang),
            width = name_width
        )?;
    }
    Ok(())
}

pub fn write_filters<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Known Filters")?;
    writeln!(
        out,
        "(See https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol#Filter)"
    )?;
    writeln!(out)?;
    write_hanging(out, KNOWN_FILTERS)?;
    writeln!(out)
}

pub fn write_regions<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Valid Regions:")?;
    let rows: Vec<(&str, &str)> = Region::ALL.iter().map(|r| (r.code(), r.name())).collect();
    write_hanging(out, &rows)?;
    writeln!(out)
}

pub fn write_fields<W: Write>(out: &mut W, registry: &Registry) -> io::Result<()> {
    writeln!(out, "Known Fields (name, default width, description)")?;
    writeln!(out)?;

    let name_width = registry.iter().map(|f| f.name().len()).max().unwrap_or(0) + NAME_GAP;
    for field in registry.iter() {
        let d = &field.descriptor;
        let width = d.width.map_or_else(|| "-".to_string(), |w| w.to_string());
        writeln!(
            out,
            "{}{:<name_width$}{:>3}    {}",
            " ".repeat(ITEM_INDENT),
            d.name,
            width,
            d.description.unwrap_or(d.display),
        )?;
    }
    writeln!(out)
}
