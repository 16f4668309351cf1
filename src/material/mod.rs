//! Material definition parsing.
//!
//! Materials are key-value text files: a shader name followed by a braced
//! block of properties. Nested blocks (proxies, fallback sections) are
//! recognized syntactically but their contents are discarded; only the
//! top-level shader block's properties are kept.

mod lines;

use std::collections::HashMap;
use std::io::Read;

use lines::LineReader;

use crate::error::{Result, SourceError};
use crate::types::ColorRgb;

/// A parsed material file: shader name mapped to its property block.
#[derive(Debug, Clone, Default)]
pub struct MaterialFile {
    groups: Vec<(String, MaterialPropertyGroup)>,
}

impl MaterialFile {
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self> {
        let mut reader = LineReader::new(text);
        let mut groups = Vec::new();

        while let Some(shader) = reader.read_match(parse_shader_name) {
            let group = MaterialPropertyGroup::parse(&mut reader)?;
            groups.push((shader, group));
        }

        Ok(Self { groups })
    }

    /// Shader names in file order.
    pub fn shaders(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains_shader(&self, shader: &str) -> bool {
        self.get(shader).is_some()
    }

    /// Look up a shader's property group, case-insensitively.
    pub fn get(&self, shader: &str) -> Option<&MaterialPropertyGroup> {
        self.groups
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(shader))
            .map(|(_, group)| group)
    }
}

/// The property block of a single shader.
///
/// Property names are case-insensitive; duplicate names overwrite. The typed
/// getters never fail: absent or unparseable values yield the caller's
/// default.
#[derive(Debug, Clone, Default)]
pub struct MaterialPropertyGroup {
    properties: HashMap<String, String>,
}

impl MaterialPropertyGroup {
    fn parse(reader: &mut LineReader) -> Result<Self> {
        if !reader.read_token("{") {
            return Err(expected(reader, "'{'"));
        }

        let mut properties = HashMap::new();
        while !reader.read_token("}") {
            if reader.read_match(parse_block_name).is_some() {
                // Nested block: recognized, contents discarded.
                MaterialPropertyGroup::parse(reader)?;
                continue;
            }

            match reader.read_match(parse_property) {
                Some((name, value)) => {
                    properties.insert(name.to_ascii_lowercase(), value);
                }
                None => return Err(expected(reader, "shader property")),
            }
        }

        Ok(Self { properties })
    }

    /// Property names, lowercased.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Raw value lookup, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn get_string<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn get_i32(&self, name: &str, default: i32) -> i32 {
        self.get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_f32(&self, name: &str, default: f32) -> f32 {
        self.get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get_i32(name, default as i32) != 0
    }

    /// Parse an `{r g b}` literal.
    pub fn get_color(&self, name: &str, default: ColorRgb) -> ColorRgb {
        self.get(name)
            .and_then(parse_color_literal)
            .unwrap_or(default)
    }
}

fn expected(reader: &LineReader, what: &str) -> SourceError {
    let (line, text) = reader.context();
    SourceError::MaterialParse {
        expected: what.to_string(),
        line,
        text,
    }
}

fn parse_color_literal(value: &str) -> Option<ColorRgb> {
    let inner = value.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut parts = inner.split_whitespace();
    let r = parts.next()?.parse().ok()?;
    let g = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ColorRgb::new(r, g, b))
}

fn is_bare_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c == '$' || c == '%' || c == '_' || c.is_ascii_alphanumeric())
}

fn is_shader_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '\\')
}

/// A shader name line: a quoted or bare path-like identifier, with no braces
/// or stray quotes around it.
fn parse_shader_name(line: &str) -> Option<String> {
    match line.find('"') {
        Some(open) => {
            if line[..open].contains(['{', '}']) {
                return None;
            }
            let after = &line[open + 1..];
            let close = after.find('"')?;
            let name = &after[..close];
            if after[close + 1..].contains(['"', '{', '}']) || !is_shader_name(name) {
                return None;
            }
            Some(name.to_string())
        }
        None => {
            let name = line.trim();
            is_shader_name(name).then(|| name.to_string())
        }
    }
}

/// A nested block introducer: a line holding nothing but a name.
fn parse_block_name(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        if !inner.is_empty() && !inner.contains('"') {
            return Some(inner.to_string());
        }
        return None;
    }
    is_bare_name(trimmed).then(|| trimmed.to_string())
}

/// A property assignment: quoted or bare name followed by a quoted value or
/// a single bare token.
fn parse_property(line: &str) -> Option<(String, String)> {
    let (name, rest) = match line.find('"') {
        Some(open) => {
            if line[..open].contains(['{', '}']) {
                return None;
            }
            let after = &line[open + 1..];
            let close = after.find('"')?;
            let name = &after[..close];
            if name.is_empty() {
                return None;
            }
            (name, after[close + 1..].trim_start())
        }
        None => {
            let trimmed = line.trim();
            let split = trimmed.find(char::is_whitespace)?;
            let name = &trimmed[..split];
            if !is_bare_name(name) {
                return None;
            }
            (name, trimmed[split..].trim_start())
        }
    };

    let value = match rest.strip_prefix('"') {
        Some(quoted) => {
            let close = quoted.find('"')?;
            if quoted[close + 1..].contains(['"', '{', '}']) {
                return None;
            }
            &quoted[..close]
        }
        None => {
            let token = rest.trim_end();
            if token.is_empty() || token.contains(char::is_whitespace) || token.contains('"') {
                return None;
            }
            token
        }
    };

    if value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}
