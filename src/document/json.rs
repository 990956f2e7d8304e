//! JSON loading and pretty printing

use crate::error::{ContentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use serde_json::{Map, Value};
use std::io;
use std::path::Path;

/// Output options for JSON documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonOptions {
    /// Spaces per indentation level
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Write `<`, `>` and `&` as `\u` escapes
    #[serde(default)]
    pub escape_html: bool,

    /// Write every non-ASCII character as a `\u` escape
    #[serde(default)]
    pub ensure_ascii: bool,
}

fn default_indent() -> usize {
    4
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            escape_html: false,
            ensure_ascii: false,
        }
    }
}

/// Parse a JSON document whose top level must be an object
pub fn parse(text: &str, path: &Path) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(text).map_err(|source| ContentError::JsonParse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ContentError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Pretty print `value` with a trailing newline.
///
/// Forward slashes are never escaped.
pub fn render(value: &Value, options: &JsonOptions) -> io::Result<String> {
    let indent = vec![b' '; options.indent];
    let formatter = ContentFormatter {
        inner: PrettyFormatter::with_indent(&indent),
        escape_html: options.escape_html,
        ensure_ascii: options.ensure_ascii,
    };
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(io::Error::from)?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Pretty formatter with optional HTML-safe and ASCII-only string output
struct ContentFormatter<'a> {
    inner: PrettyFormatter<'a>,
    escape_html: bool,
    ensure_ascii: bool,
}

impl Formatter for ContentFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if !self.escape_html && !self.ensure_ascii {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            match c {
                '<' | '>' | '&' if self.escape_html => write!(writer, "\\u{:04x}", c as u32)?,
                c if self.ensure_ascii && !c.is_ascii() => {
                    for unit in c.encode_utf16(&mut units) {
                        write!(writer, "\\u{:04x}", unit)?;
                    }
                }
                c => {
                    let mut bytes = [0u8; 4];
                    writer.write_all(c.encode_utf8(&mut bytes).as_bytes())?;
                }
            }
        }
        Ok(())
    }
}
