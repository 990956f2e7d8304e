//! YAML loading, emitting and in-place patching
//!
//! Loading goes straight from the YAML event stream into a
//! `serde_json::Value` so that duplicate keys can be handled by policy
//! instead of failing inside `serde_yaml::Mapping`.
//!
//! Writing a mutated document first tries [`patch`], which rewrites only the
//! lines belonging to changed keys and leaves comments, quoting and key order
//! of everything else untouched. When the layout is too unusual to patch
//! safely the caller falls back to [`emit`].

use crate::error::{ContentError, Result};
use regex::Regex;
use serde::de::{self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// What to do when a mapping repeats a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeys {
    /// Fail the load with a parse error
    #[default]
    Reject,
    /// Keep the first occurrence
    FirstWins,
    /// Keep the last occurrence, at the position of the first
    LastWins,
}

/// Loading and output options for YAML documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YamlOptions {
    /// Recursively sort mapping keys on output
    #[serde(default)]
    pub sorted: bool,

    #[serde(default)]
    pub duplicate_keys: DuplicateKeys,
}

/// Parse a YAML document whose top level must be a mapping.
///
/// An empty document (or one holding only comments) is an empty mapping.
pub fn parse(text: &str, path: &Path, options: &YamlOptions) -> Result<Map<String, Value>> {
    let has_content = text.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#') && trimmed != "---"
    });
    if !has_content {
        return Ok(Map::new());
    }

    let deserializer = serde_yaml::Deserializer::from_str(text);
    let value = ValueSeed {
        duplicates: options.duplicate_keys,
    }
    .deserialize(deserializer)
    .map_err(|source| ContentError::YamlParse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ContentError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Emit a mapping as block-style YAML.
///
/// The emitter does not fold long scalars; multi-line strings become
/// literal blocks.
pub fn emit(map: &Map<String, Value>) -> std::result::Result<String, serde_yaml::Error> {
    serde_yaml::to_string(map)
}

#[derive(Clone, Copy)]
struct ValueSeed {
    duplicates: DuplicateKeys,
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor {
            duplicates: self.duplicates,
        })
    }
}

/// Mapping keys are always strings in the loaded document
struct KeySeed;

impl<'de> DeserializeSeed<'de> for KeySeed {
    type Value = String;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<String, D::Error> {
        let value = deserializer.deserialize_any(ValueVisitor {
            duplicates: DuplicateKeys::LastWins,
        })?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        })
    }
}

struct ValueVisitor {
    duplicates: DuplicateKeys,
}

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any YAML value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(match Number::from_f64(v) {
            Some(n) => Value::Number(n),
            None if v.is_nan() => Value::String(".nan".to_string()),
            None if v > 0.0 => Value::String(".inf".to_string()),
            None => Value::String("-.inf".to_string()),
        })
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Value, D::Error> {
        ValueSeed {
            duplicates: self.duplicates,
        }
        .deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let seed = ValueSeed {
            duplicates: self.duplicates,
        };
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element_seed(seed)? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Value, A::Error> {
        let seed = ValueSeed {
            duplicates: self.duplicates,
        };
        let mut map = Map::new();
        while let Some(key) = access.next_key_seed(KeySeed)? {
            let value = access.next_value_seed(seed)?;
            if map.contains_key(&key) {
                match self.duplicates {
                    DuplicateKeys::Reject => {
                        return Err(de::Error::custom(format!("duplicate key `{key}`")));
                    }
                    DuplicateKeys::FirstWins => continue,
                    DuplicateKeys::LastWins => {}
                }
            }
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    // Tagged values (`!Ref foo`) keep their content and lose the tag
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> std::result::Result<Value, A::Error> {
        let (_tag, variant): (String, _) = data.variant()?;
        variant.newtype_variant_seed(ValueSeed {
            duplicates: self.duplicates,
        })
    }
}

/// One `key: value` entry and the lines it spans
#[derive(Debug)]
struct Entry {
    key: String,
    /// Key as written, quotes included
    raw_key: String,
    /// Text after the colon on the key line
    rest: String,
    start: usize,
    end: usize,
}

fn key_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?P<key>"[^"]*"|'[^']*'|[^\s#'"\-\[\]{}&*!|>%@`][^:#]*?)\s*:(?:[ \t]+(?P<rest>.*))?$"#)
            .expect("key line pattern is valid")
    })
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_filler(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if raw.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[raw.len() - 1] == bytes[0] {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}

/// Entries at exactly `indent` within `lines[lo..hi]`.
///
/// Returns `None` when a line at that level is not a plain `key: value`
/// entry (sequences, flow collections, document markers).
fn entries(lines: &[String], lo: usize, hi: usize, indent: usize) -> Option<Vec<Entry>> {
    let mut found: Vec<Entry> = Vec::new();
    for (idx, line) in lines.iter().enumerate().take(hi).skip(lo) {
        if is_filler(line) {
            continue;
        }
        let level = indentation(line);
        if level > indent {
            if found.is_empty() {
                return None;
            }
            continue;
        }
        if level < indent {
            return None;
        }
        // Indentless sequence items continue the previous entry
        let body = &line[indent..];
        if body.starts_with("- ") || body.trim_end() == "-" {
            if found.is_empty() {
                return None;
            }
            continue;
        }
        let caps = key_line_regex().captures(body)?;
        let raw_key = caps.name("key")?.as_str().to_string();
        if let Some(last) = found.last_mut() {
            last.end = idx;
        }
        found.push(Entry {
            key: unquote(&raw_key),
            raw_key,
            rest: caps.name("rest").map(|m| m.as_str().to_string()).unwrap_or_default(),
            start: idx,
            end: hi,
        });
    }
    // Trailing blank and comment lines belong to whatever follows
    for entry in &mut found {
        while entry.end > entry.start + 1 && is_filler(&lines[entry.end - 1]) {
            entry.end -= 1;
        }
    }
    Some(found)
}

/// Split a single-line scalar into its value text and trailing comment
fn split_scalar(rest: &str) -> Option<(char, &str, &str)> {
    let rest = rest.trim_end();
    let first = rest.chars().next()?;
    match first {
        '\'' => {
            let mut chars = rest.char_indices().skip(1).peekable();
            while let Some((i, c)) = chars.next() {
                if c == '\'' {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        chars.next();
                        continue;
                    }
                    return Some(('\'', &rest[..=i], &rest[i + 1..]));
                }
            }
            None
        }
        '"' => {
            let mut escaped = false;
            for (i, c) in rest.char_indices().skip(1) {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => return Some(('"', &rest[..=i], &rest[i + 1..])),
                    _ => escaped = false,
                }
            }
            None
        }
        '|' | '>' | '&' | '*' | '!' | '[' | '{' | '#' => None,
        _ => match rest.find(" #") {
            Some(i) => Some((' ', rest[..i].trim_end(), &rest[i..])),
            None => Some((' ', rest, "")),
        },
    }
}

/// Render `value` as a scalar in the given quote style, if it fits one line
fn render_scalar(value: &Value, style: char) -> Option<String> {
    match (value, style) {
        (Value::String(s), '\'') if !s.contains('\n') => Some(format!("'{}'", s.replace('\'', "''"))),
        (Value::String(s), '"') => serde_json::to_string(s).ok(),
        (Value::Array(_), _) | (Value::Object(_), _) => None,
        _ => {
            let text = serde_yaml::to_string(value).ok()?;
            let text = text.trim_end_matches('\n');
            if text.contains('\n') {
                None
            } else {
                Some(text.to_string())
            }
        }
    }
}

/// Render `key: value` as block YAML indented by `indent`
fn render_entry(raw_key: &str, value: &Value, indent: usize) -> Option<Vec<String>> {
    let mut single = Map::new();
    single.insert(unquote(raw_key), value.clone());
    let text = serde_yaml::to_string(&single).ok()?;
    let pad = " ".repeat(indent);
    Some(
        text.lines()
            .map(|line| {
                if line.is_empty() {
                    String::new()
                } else {
                    format!("{pad}{line}")
                }
            })
            .collect(),
    )
}

/// Replace, insert or delete one entry among `found` at `indent`.
///
/// `insert_at` is where a missing key gets appended.
fn apply(
    lines: &mut Vec<String>,
    found: &[Entry],
    key: &str,
    value: Option<&Value>,
    indent: usize,
    insert_at: usize,
) -> Option<()> {
    let existing = found.iter().find(|e| e.key == key);
    match (existing, value) {
        (None, None) => Some(()),
        (None, Some(value)) => {
            let rendered = render_entry(key, value, indent)?;
            lines.splice(insert_at..insert_at, rendered);
            Some(())
        }
        (Some(entry), None) => {
            lines.drain(entry.start..entry.end);
            Some(())
        }
        (Some(entry), Some(value)) => {
            if entry.end == entry.start + 1 {
                if let Some((style, _, comment)) = split_scalar(&entry.rest) {
                    if let Some(scalar) = render_scalar(value, style) {
                        lines[entry.start] = format!(
                            "{}{}: {}{}",
                            " ".repeat(indent),
                            entry.raw_key,
                            scalar,
                            comment
                        );
                        return Some(());
                    }
                }
            }
            let rendered = render_entry(&entry.raw_key, value, indent)?;
            lines.splice(entry.start..entry.end, rendered);
            Some(())
        }
    }
}

/// Rewrite `source` so that the keys at `touched` match `data`.
///
/// Paths of length one address top-level keys, length two a key inside a
/// top-level block mapping; deeper paths rewrite their top-level entry.
/// Returns `None` when the source layout cannot be patched safely.
pub fn patch(source: &str, data: &Map<String, Value>, touched: &[Vec<String>]) -> Option<String> {
    if source.contains('\r') {
        return None;
    }
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let trailing_newline = source.is_empty() || source.ends_with('\n');

    // A leading document marker is fine, any other marker is not
    let first_content = lines.iter().position(|l| !is_filler(l)).unwrap_or(0);
    let lo = if lines.get(first_content).map(|l| l.trim_end()) == Some("---") {
        first_content + 1
    } else {
        first_content
    };

    for path in touched {
        let top = entries(&lines, lo, lines.len(), 0)?;
        let Some(first) = path.first() else {
            continue;
        };
        let nested = path.len() == 2
            && top
                .iter()
                .find(|e| &e.key == first)
                .map(|e| e.rest.trim().is_empty() || e.rest.trim_start().starts_with('#'))
                .unwrap_or(false)
            && data.get(first).map(Value::is_object).unwrap_or(false);

        if nested {
            let parent = top.iter().find(|e| &e.key == first)?;
            let child_indent = lines[parent.start + 1..parent.end]
                .iter()
                .find(|l| !is_filler(l))
                .map(|l| indentation(l))
                .filter(|&n| n > 0);
            let children = child_indent
                .and_then(|n| entries(&lines, parent.start + 1, parent.end, n).map(|c| (n, c)));
            if let Some((n, children)) = children {
                let value = data.get(first).and_then(|v| v.get(&path[1]));
                let insert_at = parent.end;
                apply(&mut lines, &children, &path[1], value, n, insert_at)?;
                continue;
            }
        }

        let value = data.get(first);
        let insert_at = lines.len();
        apply(&mut lines, &top, first, value, 0, insert_at)?;
    }

    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}
