//! Best-effort structure extraction from free-text step descriptions.
//!
//! Nothing here is a parser. Descriptions that match no pattern simply yield
//! nothing and the chunker falls back to the iterative strategy.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NUMBERED_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)\s*([^:\n()]+?)\s*:").expect("valid numbered section regex"));

static BULLETED_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*•]\s+([^:\n]+?)\s*:\s*(.*)$").expect("valid bulleted section regex"));

static COMPONENT_RES: LazyLock<Vec<(ComponentKind, Regex)>> = LazyLock::new(|| {
    [
        (ComponentKind::Class, r"(?i)\bclass\s+([A-Za-z_]\w*)"),
        (ComponentKind::Function, r"(?i)\b(?:def|function)\s+([A-Za-z_]\w*)"),
        (ComponentKind::Method, r"(?i)\bmethod\s+([A-Za-z_]\w*)"),
        (ComponentKind::Route, r"(?i)\broute\s+([/\w\-.:{}]+)"),
        (ComponentKind::Component, r"(?i)\bcomponent\s+([A-Za-z_]\w*)"),
        (ComponentKind::Module, r"(?i)\bmodule\s+([A-Za-z_][\w.]*)"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid component regex")))
    .collect()
});

/// A named slice of a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Class,
    Function,
    Method,
    Route,
    Component,
    Module,
}

impl ComponentKind {
    /// Classes, functions and modules can be generated in isolation
    pub fn is_independent(self) -> bool {
        matches!(self, ComponentKind::Class | ComponentKind::Function | ComponentKind::Module)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Class => "class",
            ComponentKind::Function => "function",
            ComponentKind::Method => "method",
            ComponentKind::Route => "route",
            ComponentKind::Component => "component",
            ComponentKind::Module => "module",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeComponent {
    pub kind: ComponentKind,
    pub name: String,
    /// Byte offset of the match, used for ordering
    pub position: usize,
}

/// Sections written as `(1) Name: text (2) Name: text`, or failing that as
/// `- Name: text` bullets (at most `max_bulleted`)
pub fn extract_sections(description: &str, max_bulleted: usize) -> Vec<Section> {
    let numbered = extract_numbered_sections(description);
    if !numbered.is_empty() {
        return numbered;
    }

    BULLETED_SECTION_RE
        .captures_iter(description)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            (!name.is_empty()).then(|| Section {
                name: name.to_string(),
                text: text.to_string(),
            })
        })
        .take(max_bulleted)
        .collect()
}

fn extract_numbered_sections(description: &str) -> Vec<Section> {
    let matches: Vec<_> = NUMBERED_SECTION_RE.captures_iter(description).collect();

    matches
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?.as_str().trim();
            let end = matches
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(description.len());
            let text = description[whole.end()..end].trim();
            (!name.is_empty()).then(|| Section {
                name: name.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Named code units in order of first appearance, at most `max_per_kind`
/// of each kind
pub fn extract_components(description: &str, max_per_kind: usize) -> Vec<CodeComponent> {
    let mut seen = HashSet::new();
    let mut components = Vec::new();

    for (kind, re) in COMPONENT_RES.iter() {
        let mut taken = 0;
        for caps in re.captures_iter(description) {
            if taken >= max_per_kind {
                break;
            }
            let Some(name) = caps.get(1) else { continue };
            if !seen.insert((*kind, name.as_str().to_string())) {
                continue;
            }
            components.push(CodeComponent {
                kind: *kind,
                name: name.as_str().to_string(),
                position: name.start(),
            });
            taken += 1;
        }
    }

    components.sort_by_key(|c| c.position);
    components
}

/// Text following `"<file>: "` in the description
///
/// Matches the full path first, then the bare file name.
pub fn extract_file_slice(description: &str, file: &str) -> Option<String> {
    let base_name = file.rsplit('/').next().unwrap_or(file);
    let mut names = vec![file];
    if base_name != file {
        names.push(base_name);
    }

    names.into_iter().find_map(|name| {
        let pattern = format!(r"{}\s*:\s*([^\n]+)", regex::escape(name));
        let re = Regex::new(&pattern).ok()?;
        let text = re.captures(description)?.get(1)?.as_str().trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}
