//! Parser for field expressions such as `ip=21,name,map=20`.
//!
//! Tokens are separated by commas and/or whitespace; each is a field name
//! with an optional `=width`. The resolved list keeps token order, which is
//! the column order every renderer uses.

use crate::error::SpecError;
use crate::fields::{FieldDef, Registry};
use regex::Regex;
use std::sync::OnceLock;

// A token ends at a separator or the end of input, so `name=abc` cannot
// split into two names.
const FIELD_TOKEN: &str = r"[\s,]*([A-Za-z0-9_]+)(?:=(\d*))?(?:[\s,]+|$)";

fn field_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FIELD_TOKEN).expect("field token pattern is valid"))
}

/// A registry field together with the width it is rendered at.
///
/// `width` is `None` when the column is unpadded.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedField<'r> {
    pub field: &'r FieldDef,
    pub width: Option<usize>,
}

impl<'r> ResolvedField<'r> {
    pub fn new(field: &'r FieldDef, width: Option<usize>) -> Self {
        Self { field, width }
    }

    /// Resolves `name` at its registry default width.
    pub fn named(registry: &'r Registry, name: &str) -> Result<Self, SpecError> {
        let field = registry.lookup(name)?;
        Ok(Self::new(field, field.descriptor.width))
    }

    pub fn name(&self) -> &'static str {
        self.field.name()
    }

    /// Header text: the display name, or the raw name if it has none.
    pub fn title(&self) -> &'static str {
        match self.field.descriptor.display {
            "" => self.field.name(),
            display => display,
        }
    }
}

/// Resolves a field expression against `registry`.
///
/// A blank expression yields no fields. Unknown names fail the whole parse;
/// so does any text the token pattern cannot account for.
pub fn parse_fields<'r>(
    spec: &str,
    registry: &'r Registry,
) -> Result<Vec<ResolvedField<'r>>, SpecError> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut fields = Vec::new();
    let mut consumed = 0;

    for caps in field_token().captures_iter(spec) {
        let whole = caps.get(0).ok_or_else(|| SpecError::Malformed(spec.to_string()))?;
        if whole.start() != consumed {
            return Err(SpecError::Malformed(spec.to_string()));
        }
        consumed = whole.end();

        let name = caps
            .get(1)
            .ok_or_else(|| SpecError::Malformed(spec.to_string()))?
            .as_str();
        let field = registry.lookup(name)?;

        // A bare `=` or an override too large for usize keeps the default.
        let width = caps
            .get(2)
            .and_then(|w| w.as_str().parse::<usize>().ok())
            .or(field.descriptor.width);

        fields.push(ResolvedField::new(field, width));
    }

    if fields.is_empty() || consumed != spec.len() {
        return Err(SpecError::Malformed(spec.to_string()));
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    fn summary(fields: &[ResolvedField<'_>]) -> Vec<(&'static str, Option<usize>)> {
        fields.iter().map(|f| (f.name(), f.width)).collect()
    }

    #[test]
    fn test_default_expression() {
        let registry = Registry::standard();
        let fields = parse_fields("ip=21,name", &registry).unwrap();
        assert_eq!(summary(&fields), vec![("ip", Some(21)), ("name", Some(15))]);
    }

    #[test]
    fn test_order_follows_tokens() {
        let registry = Registry::standard();
        let fields = parse_fields("map, players=2 ,ip,name=30", &registry).unwrap();
        assert_eq!(
            summary(&fields),
            vec![
                ("map", Some(10)),
                ("players", Some(2)),
                ("ip", Some(21)),
                ("name", Some(30)),
            ]
        );
    }

    #[test]
    fn test_whitespace_and_trailing_commas() {
        let registry = Registry::standard();
        let fields = parse_fields("  ip , name ,, ", &registry).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name(), "name");
    }

    #[test]
    fn test_zero_width_is_kept() {
        let registry = Registry::standard();
        let fields = parse_fields("name=0", &registry).unwrap();
        assert_eq!(fields[0].width, Some(0));
    }

    #[test]
    fn test_duplicate_fields_are_allowed() {
        let registry = Registry::standard();
        let fields = parse_fields("name,name=3", &registry).unwrap();
        assert_eq!(summary(&fields), vec![("name", Some(15)), ("name", Some(3))]);
    }

    #[test]
    fn test_oversized_width_uses_default() {
        let registry = Registry::standard();
        let fields = parse_fields("map=99999999999999999999999", &registry).unwrap();
        assert_eq!(fields[0].width, Some(10));
    }

    #[test]
    fn test_empty_override_uses_default() {
        let registry = Registry::standard();
        let fields = parse_fields("ip=,name", &registry).unwrap();
        assert_eq!(summary(&fields), vec![("ip", Some(21)), ("name", Some(15))]);

        let fields = parse_fields("map=", &registry).unwrap();
        assert_eq!(summary(&fields), vec![("map", Some(10))]);
    }

    #[test]
    fn test_unpadded_default() {
        let mut registry = Registry::new();
        registry.register(
            FieldDef::info("raw", "Raw", 0, |i| FieldValue::Text(i.name.clone())).unpadded(),
        );
        let fields = parse_fields("raw", &registry).unwrap();
        assert_eq!(fields[0].width, None);
        let fields = parse_fields("raw=4", &registry).unwrap();
        assert_eq!(fields[0].width, Some(4));
    }

    #[test]
    fn test_blank_is_empty() {
        let registry = Registry::standard();
        assert!(parse_fields("", &registry).unwrap().is_empty());
        assert!(parse_fields("   ", &registry).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_field_fails_whole_parse() {
        let registry = Registry::standard();
        assert_eq!(
            parse_fields("ip,bogus,name", &registry).unwrap_err(),
            SpecError::UnknownField("bogus".to_string())
        );
    }

    #[test]
    fn test_malformed_expressions() {
        let registry = Registry::standard();
        for spec in [",", "=21", "ip;name", "ip=-3", "name=abc", "ip=name", "%%"] {
            assert_eq!(
                parse_fields(spec, &registry).unwrap_err(),
                SpecError::Malformed(spec.to_string()),
                "spec {:?}",
                spec
            );
        }
    }

    #[test]
    fn test_title_falls_back_to_name() {
        let mut registry = Registry::new();
        registry.register(FieldDef::connection("host", "", 8, |a| {
            FieldValue::Text(a.to_string())
        }));
        let field = ResolvedField::named(&registry, "host").unwrap();
        assert_eq!(field.title(), "host");
        assert_eq!(field.width, Some(8));
    }
}
