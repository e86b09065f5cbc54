use super::Renderer;
use crate::fieldspec::ResolvedField;
use crate::record::ServerRecord;
use log::debug;
use serde_json::{Map, Value};
use std::io::{self, Write};

/// Buffers one object per record and writes them as a single array when
/// the stream ends.
///
/// Keys are field names, so a field listed twice yields one key: it keeps
/// the position of its first listing. Width is the only thing that can
/// differ between repeats and JSON ignores it.
pub struct JsonRenderer<'r, W> {
    out: W,
    fields: Vec<ResolvedField<'r>>,
    rows: Vec<Value>,
}

impl<'r, W: Write> JsonRenderer<'r, W> {
    pub fn new(out: W, fields: Vec<ResolvedField<'r>>) -> Self {
        Self {
            out,
            fields,
            rows: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn row(&self, record: &ServerRecord) -> Value {
        let mut object = Map::with_capacity(self.fields.len());
        for f in &self.fields {
            let value = match f.field.value(record) {
                Ok(value) => serde_json::to_value(value).unwrap_or(Value::Null),
                Err(e) => {
                    debug!("{} {}: {}", record.address, f.name(), e);
                    Value::Null
                }
            };
            object.insert(f.name().to_string(), value);
        }
        Value::Object(object)
    }
}

impl<W: Write> Renderer for JsonRenderer<'_, W> {
    fn render(&mut self, record: &ServerRecord) -> io::Result<()> {
        let row = self.row(record);
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let rows = Value::Array(std::mem::take(&mut self.rows));
        serde_json::to_writer(&mut self.out, &rows)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}
