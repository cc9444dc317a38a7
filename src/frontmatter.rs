//! Front-matter codec for markdown documents.
//!
//! Product pages and blog articles start with a small key/value header:
//!
//! ```text
//! +++                              ---
//! title = "FastAPI Backend Pack"   title: "FastAPI Backend Pack"
//! slug = "fastapi-backend-pack-1"  slug: fastapi-backend-pack-1
//! +++                              tags:
//!                                    - fastapi
//! # Body...                        ---
//! ```
//!
//! The header as a whole is never handed to a TOML or YAML parser. It is kept
//! as an ordered list of raw lines; lines that look like `key = value` (or
//! `key: value`) are indexed by key, everything else (comments, blank lines,
//! list items) is carried through verbatim. Rendering an unmodified
//! [`Document`] reproduces the input byte for byte, and [`FrontMatter::upsert`]
//! only rewrites the one line whose value actually changed. Individual quoted
//! values are decoded with the `toml` grammar and written as JSON strings,
//! which both header styles accept.

/// Which header style a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `+++` fences with `key = value` lines.
    Toml,
    /// `---` fences with `key: value` lines.
    Yaml,
}

impl Delimiter {
    fn fence(self) -> &'static str {
        match self {
            Delimiter::Toml => "+++",
            Delimiter::Yaml => "---",
        }
    }

    fn separator(self) -> char {
        match self {
            Delimiter::Toml => '=',
            Delimiter::Yaml => ':',
        }
    }

    fn from_fence(line: &str) -> Option<Self> {
        match line.trim_end() {
            "+++" => Some(Delimiter::Toml),
            "---" => Some(Delimiter::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Field { key: String, raw: String },
    Other(String),
}

impl Line {
    fn raw(&self) -> &str {
        match self {
            Line::Field { raw, .. } | Line::Other(raw) => raw,
        }
    }
}

/// Ordered header of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    delimiter: Delimiter,
    open: String,
    close: String,
    close_terminated: bool,
    lines: Vec<Line>,
}

/// A markdown document split into its optional header and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub front_matter: Option<FrontMatter>,
    /// Everything after the closing fence line (or the whole text).
    pub body: String,
}

impl Document {
    /// Split `text` into header and body. Text without a complete header
    /// becomes a body-only document.
    pub fn parse(text: &str) -> Self {
        let mut segments = text.split_inclusive('\n');
        let Some(first) = segments.next() else {
            return Self::body_only(text);
        };
        let open = strip_newline(first);
        let Some(delimiter) = Delimiter::from_fence(open) else {
            return Self::body_only(text);
        };

        let mut consumed = first.len();
        let mut lines = Vec::new();
        for segment in segments {
            consumed += segment.len();
            let raw = strip_newline(segment);
            if Delimiter::from_fence(raw) == Some(delimiter) {
                return Self {
                    front_matter: Some(FrontMatter {
                        delimiter,
                        open: open.to_string(),
                        close: raw.to_string(),
                        close_terminated: segment.ends_with('\n'),
                        lines,
                    }),
                    body: text[consumed..].to_string(),
                };
            }
            lines.push(classify_line(raw, delimiter));
        }
        Self::body_only(text)
    }

    /// Create a document with a fresh `+++` header.
    pub fn with_toml_header(fields: &[(&str, &str)], body: String) -> Self {
        let mut front_matter = FrontMatter::empty(Delimiter::Toml);
        for (key, value) in fields {
            front_matter.upsert(key, value);
        }
        Self {
            front_matter: Some(front_matter),
            body,
        }
    }

    fn body_only(text: &str) -> Self {
        Self {
            front_matter: None,
            body: text.to_string(),
        }
    }

    /// Serialize back to text. Untouched lines are emitted verbatim.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(fm) = &self.front_matter {
            out.push_str(&fm.open);
            out.push('\n');
            for line in &fm.lines {
                out.push_str(line.raw());
                out.push('\n');
            }
            out.push_str(&fm.close);
            if fm.close_terminated {
                out.push('\n');
            }
        }
        out.push_str(&self.body);
        out
    }

    /// Shorthand for a string value from the header.
    pub fn get(&self, key: &str) -> Option<String> {
        self.front_matter.as_ref().and_then(|fm| fm.get(key))
    }
}

impl FrontMatter {
    pub fn empty(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            open: delimiter.fence().to_string(),
            close: delimiter.fence().to_string(),
            close_terminated: true,
            lines: Vec::new(),
        }
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Keys in header order (first occurrence only).
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for line in &self.lines {
            if let Line::Field { key, .. } = line
                && !keys.contains(&key.as_str())
            {
                keys.push(key.as_str());
            }
        }
        keys
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| matches!(l, Line::Field { key: k, .. } if k == key))
    }

    fn raw_value(&self, key: &str) -> Option<&str> {
        let idx = self.position(key)?;
        let raw = self.lines[idx].raw();
        raw.split_once(self.delimiter.separator())
            .map(|(_, value)| value.trim())
    }

    /// Decoded scalar value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.raw_value(key).map(decode_scalar)
    }

    /// Decoded list value for `key`.
    ///
    /// Accepts an inline array (`["a", "b"]` / `[a, b]`) or, in YAML headers,
    /// an empty value followed by indented `- item` lines.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        let Some(idx) = self.position(key) else {
            return Vec::new();
        };
        let value = self.raw_value(key).unwrap_or_default();
        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            return inner
                .split(',')
                .map(|item| decode_scalar(item.trim()))
                .filter(|item| !item.is_empty())
                .collect();
        }
        if !value.is_empty() {
            return vec![decode_scalar(value)];
        }
        self.lines[idx + 1..]
            .iter()
            .map_while(|line| match line {
                Line::Other(raw) => Some(raw.trim()),
                Line::Field { .. } => None,
            })
            .filter_map(|raw| raw.strip_prefix('-'))
            .map(|item| decode_scalar(item.trim()))
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Set `key` to the string `value`.
    ///
    /// An existing key keeps its position; its line is rewritten only when
    /// the decoded value differs. A missing key is appended as the last
    /// header line. Returns whether the header changed.
    pub fn upsert(&mut self, key: &str, value: &str) -> bool {
        let line = self.render_field(key, value);
        match self.position(key) {
            Some(idx) => {
                if self.get(key).as_deref() == Some(value) {
                    return false;
                }
                self.lines[idx] = line;
                true
            }
            None => {
                self.lines.push(line);
                true
            }
        }
    }

    fn render_field(&self, key: &str, value: &str) -> Line {
        let raw = match self.delimiter {
            Delimiter::Toml => format!("{key} = {}", quote(value)),
            Delimiter::Yaml => format!("{key}: {}", quote(value)),
        };
        Line::Field {
            key: key.to_string(),
            raw,
        }
    }
}

fn strip_newline(segment: &str) -> &str {
    segment.strip_suffix('\n').unwrap_or(segment)
}

fn classify_line(raw: &str, delimiter: Delimiter) -> Line {
    let starts_clean = raw
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if starts_clean && let Some((key, _)) = raw.split_once(delimiter.separator()) {
        let key = key.trim();
        if !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Line::Field {
                key: key.to_string(),
                raw: raw.to_string(),
            };
        }
    }
    Line::Other(raw.to_string())
}

/// Render `value` as a one-line double-quoted string valid in both TOML and YAML.
///
/// JSON string syntax is a subset of both basic TOML strings and YAML
/// double-quoted scalars, except that TOML also forbids a raw DEL.
pub fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('\u{7f}', "\\u007f")
}

/// Decode one header value.
///
/// Quoted strings go through the TOML grammar, so every TOML escape
/// (`\uXXXX`, `\UXXXXXXXX`, `\b`, `\f`) is honored. Bare values and
/// non-string literals come back as written.
fn decode_scalar(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('\r');
    if raw.starts_with('"') || raw.starts_with('\'') {
        if let Ok(mut table) = toml::from_str::<toml::Table>(&format!("v = {raw}"))
            && let Some(toml::Value::String(decoded)) = table.remove("v")
        {
            return decoded;
        }
        if let Ok(decoded) = serde_json::from_str::<String>(raw) {
            return decoded;
        }
        // YAML single quotes double an embedded quote, which TOML rejects.
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return raw[1..raw.len() - 1].replace("''", "'");
        }
    }
    raw.to_string()
}
