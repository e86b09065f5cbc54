use super::{center, pad_left, pad_right, Renderer};
use crate::fields::Align;
use crate::fieldspec::ResolvedField;
use crate::record::ServerRecord;
use log::debug;
use std::io::{self, Write};

/// Shown in place of a cell whose value could not be produced.
pub const PLACEHOLDER: &str = "-";

pub const DEFAULT_DIVIDER: &str = " ¦ ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOptions {
    pub divider: String,
    pub header: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            divider: DEFAULT_DIVIDER.to_string(),
            header: true,
        }
    }
}

/// One line per record, columns padded to their widths and joined by the
/// divider.
pub struct TextRenderer<'r, W> {
    out: W,
    fields: Vec<ResolvedField<'r>>,
    options: TextOptions,
}

impl<'r, W: Write> TextRenderer<'r, W> {
    pub fn new(out: W, fields: Vec<ResolvedField<'r>>, options: TextOptions) -> Self {
        Self {
            out,
            fields,
            options,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn header_line(&self) -> String {
        self.fields
            .iter()
            .map(|f| match f.width {
                Some(width) => center(f.title(), width),
                None => f.title().to_string(),
            })
            .collect::<Vec<_>>()
            .join(&self.options.divider)
    }

    fn line(&self, record: &ServerRecord) -> String {
        self.fields
            .iter()
            .map(|f| {
                let text = match f.field.value(record) {
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        debug!("{} {}: {}", record.address, f.name(), e);
                        PLACEHOLDER.to_string()
                    }
                };
                match (f.width, f.field.descriptor.align) {
                    (None, _) => text,
                    (Some(width), Align::Left) => pad_right(&text, width),
                    (Some(width), Align::Right) => pad_left(&text, width),
                }
            })
            .collect::<Vec<_>>()
            .join(&self.options.divider)
    }
}

impl<W: Write> Renderer for TextRenderer<'_, W> {
    fn begin(&mut self) -> io::Result<()> {
        if self.options.header {
            let header = self.header_line();
            writeln!(self.out, "{}", header)?;
        }
        Ok(())
    }

    fn render(&mut self, record: &ServerRecord) -> io::Result<()> {
        let line = self.line(record);
        writeln!(self.out, "{}", line)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
