//! Symbol outlines for summary and index tiers
//!
//! A line-oriented regex scan, not a parser. It only needs to be good enough
//! for the assistant to know what a file contains and ask for it by name.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// A declaration found in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// 1-based line number
    pub line: usize,
    /// The declaring line, trimmed
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Rust,
    Python,
    Script,
    Go,
    R,
    CFamily,
    Markdown,
}

impl Language {
    fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        let lang = match ext.as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" => Language::Script,
            "go" => Language::Go,
            "r" => Language::R,
            "c" | "h" | "cc" | "cpp" | "hpp" | "cxx" | "java" | "cs" | "kt" | "swift" => {
                Language::CFamily
            }
            "md" | "markdown" | "rmd" | "qmd" => Language::Markdown,
            _ => return None,
        };
        Some(lang)
    }
}

/// Patterns per language. Each regex has a `name` capture group.
static PATTERNS: LazyLock<Vec<(Language, Regex)>> = LazyLock::new(|| {
    let table: &[(Language, &str)] = &[
        (
            Language::Rust,
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?(?:(?:fn|struct|enum|trait|mod|type|union)\s+|macro_rules!\s*)(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ),
        (
            Language::Rust,
            r"^\s*(?:unsafe\s+)?impl(?:<[^>]*>)?\s+(?:[A-Za-z_][\w:<>, ]*\s+for\s+)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        ),
        (
            Language::Python,
            r"^\s*(?:async\s+)?(?:def|class)\s+(?P<name>[A-Za-z_]\w*)",
        ),
        (
            Language::Script,
            r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum)\s+(?P<name>[A-Za-z_$][\w$]*)",
        ),
        (
            Language::Script,
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
        ),
        (
            Language::Go,
            r"^func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_]\w*)",
        ),
        (Language::Go, r"^type\s+(?P<name>[A-Za-z_]\w*)"),
        (
            Language::R,
            r"^\s*(?P<name>[A-Za-z.][\w.]*)\s*(?:<-|=)\s*function\s*\(",
        ),
        (
            Language::CFamily,
            r"^\s*(?:public\s+|private\s+|protected\s+|internal\s+|static\s+|final\s+|abstract\s+|sealed\s+)*(?:class|struct|interface|enum|record)\s+(?P<name>[A-Za-z_]\w*)",
        ),
        (
            Language::CFamily,
            r"^[A-Za-z_][\w\s\*&:<>,\[\]]*?\b(?P<name>[A-Za-z_]\w*)\s*\([^;]*\)\s*(?:const\s*)?\{?\s*$",
        ),
        (Language::Markdown, r"^#{1,6}\s+(?P<name>.+?)\s*#*\s*$"),
    ];
    table
        .iter()
        .filter_map(|(lang, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*lang, re)),
            Err(e) => {
                tracing::warn!("Skipping outline pattern for {:?}: {}", lang, e);
                None
            }
        })
        .collect()
});

/// Words a C-family function pattern can mistake for a name
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "else", "catch", "sizeof", "do",
];

/// Extract declarations from a file's lines, in file order.
///
/// Files with an unrecognized extension produce an empty outline.
pub fn extract_outline(path: &str, lines: &[String]) -> Vec<Symbol> {
    let Some(lang) = Language::from_path(path) else {
        return Vec::new();
    };
    let patterns: Vec<&Regex> = PATTERNS
        .iter()
        .filter(|(l, _)| *l == lang)
        .map(|(_, re)| re)
        .collect();

    let mut symbols = Vec::new();
    let mut in_fence = false;
    for (idx, line) in lines.iter().enumerate() {
        if lang == Language::Markdown && line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let found = patterns
            .iter()
            .find_map(|re| re.captures(line).and_then(|c| c.name("name")));
        if let Some(name) = found {
            let name = name.as_str();
            if lang == Language::CFamily && CONTROL_KEYWORDS.contains(&name) {
                continue;
            }
            symbols.push(Symbol {
                name: name.to_string(),
                line: idx + 1,
                signature: line.trim().to_string(),
            });
        }
    }
    symbols
}
