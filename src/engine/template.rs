//! Per-item placeholder substitution for command templates
//!
//! A template is plain text with placeholders of the form `[modifier.modifier...]`.
//! Each placeholder starts from the work item's path and applies its modifiers
//! left to right:
//!
//! | modifier      | `src/app/main.cpp` becomes |
//! |---------------|----------------------------|
//! | *(empty)*     | `src/app/main.cpp`         |
//! | `filename`    | `main.cpp`                 |
//! | `stem`        | `main`                     |
//! | `extension`   | `.cpp`                     |
//! | `parent_path` | `src/app`                  |
//!
//! `[[` and `]]` produce literal brackets. They are tokenized before any
//! placeholder matching, so an escaped bracket never opens or closes a
//! placeholder: `[[.stem]]` renders as the text `[.stem]`.
//!
//! A `[` without a closing `]` (or with another `[` before it) is literal text.
//! Unknown modifier names are ignored.

use std::fmt;
use std::path::{Path, PathBuf};

/// One path transformation inside a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Filename,
    Stem,
    Extension,
    ParentPath,
}

impl Modifier {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "filename" => Some(Modifier::Filename),
            "stem" => Some(Modifier::Stem),
            "extension" => Some(Modifier::Extension),
            "parent_path" => Some(Modifier::ParentPath),
            _ => None,
        }
    }

    fn apply(self, path: &Path) -> PathBuf {
        match self {
            Modifier::Filename => path.file_name().map(PathBuf::from).unwrap_or_default(),
            Modifier::Stem => path.file_stem().map(PathBuf::from).unwrap_or_default(),
            Modifier::Extension => path
                .extension()
                .map(|ext| {
                    let mut dotted = std::ffi::OsString::from(".");
                    dotted.push(ext);
                    PathBuf::from(dotted)
                })
                .unwrap_or_default(),
            Modifier::ParentPath => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }
}

/// A parsed piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Vec<Modifier>),
}

/// A command string parsed into literal and placeholder segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Parse a template. Never fails: malformed brackets are kept as text.
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(c) = rest.chars().next() {
            if rest.starts_with("[[") {
                literal.push('[');
                rest = &rest[2..];
            } else if rest.starts_with("]]") {
                literal.push(']');
                rest = &rest[2..];
            } else if c == '[' {
                match placeholder_body(&rest[1..]) {
                    Some(body) => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        let modifiers = body.split('.').filter_map(Modifier::from_name).collect();
                        segments.push(Segment::Placeholder(modifiers));
                        rest = &rest[body.len() + 2..];
                    }
                    None => {
                        literal.push('[');
                        rest = &rest[1..];
                    }
                }
            } else {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    /// Render the template for one work item
    pub fn instantiate(&self, item: &Path) -> String {
        let mut out = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(modifiers) => {
                    let resolved = modifiers
                        .iter()
                        .fold(item.to_path_buf(), |path, modifier| modifier.apply(&path));
                    out.push_str(&resolved.to_string_lossy());
                }
            }
        }
        out
    }

    /// Render the template for one item and interpret the result as a path
    pub fn instantiate_path(&self, item: &Path) -> PathBuf {
        PathBuf::from(self.instantiate(item))
    }

    /// Whether any placeholder appears in the template
    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// Parsed segments, in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The original template text
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Content of a placeholder starting right after its `[`, if it closes
fn placeholder_body(after_open: &str) -> Option<&str> {
    let close = after_open.find(']')?;
    let body = &after_open[..close];
    if body.contains('[') {
        return None;
    }
    Some(body)
}

impl From<&str> for CommandTemplate {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse `template` and render it for `item` in one step
pub fn instantiate(template: &str, item: &Path) -> String {
    CommandTemplate::parse(template).instantiate(item)
}
