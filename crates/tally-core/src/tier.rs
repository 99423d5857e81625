//! Detail tiers for batches of files
//!
//! A batch is sent at one tier. Small batches go out in full; medium ones as
//! outlines with head/tail previews; large ones as symbol indexes. A single
//! oversized file forces at least the summary tier so it cannot consume the
//! budget while the batch looks small in aggregate.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::outline::extract_outline;

/// Aggregate line ceiling for the full tier
pub const TIER1_MAX_LINES: usize = 2000;
/// Aggregate line ceiling for the summary tier
pub const TIER2_MAX_LINES: usize = 5000;
/// A single file above this many lines is never sent in full
pub const LARGE_FILE_LINES: usize = 800;

const OUTLINE_MAX_ENTRIES: usize = 40;
const INDEX_MAX_SYMBOLS: usize = 60;
const HEAD_LINES: usize = 20;
const TAIL_LINES: usize = 10;

/// Level of detail for file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Complete file contents
    Full,
    /// Outline plus head and tail previews
    Summary,
    /// Metadata and symbol names only
    Index,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Full => "full",
            Tier::Summary => "summary",
            Tier::Index => "index",
        })
    }
}

/// Size of one candidate file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: String,
    pub size_bytes: u64,
    pub line_count: usize,
}

impl FileStat {
    pub fn new(path: impl Into<String>, size_bytes: u64, line_count: usize) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            line_count,
        }
    }

    /// Stat a file from its already-read lines
    pub fn from_lines(path: impl Into<String>, lines: &[String]) -> Self {
        let size_bytes = lines.iter().map(|l| l.len() as u64 + 1).sum();
        Self::new(path, size_bytes, lines.len())
    }
}

/// The tier chosen for a batch, with the numbers behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDecision {
    pub tier: Tier,
    pub total_lines: usize,
    pub total_files: usize,
    pub max_single_file_lines: usize,
    pub reason: String,
}

/// Line thresholds used by [`TierThresholds::select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub full_max_lines: usize,
    pub summary_max_lines: usize,
    pub large_file_lines: usize,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            full_max_lines: TIER1_MAX_LINES,
            summary_max_lines: TIER2_MAX_LINES,
            large_file_lines: LARGE_FILE_LINES,
        }
    }
}

impl TierThresholds {
    /// Choose a tier for a batch of files
    pub fn select(&self, files: &[FileStat]) -> TierDecision {
        if files.is_empty() {
            return TierDecision {
                tier: Tier::Full,
                total_lines: 0,
                total_files: 0,
                max_single_file_lines: 0,
                reason: "no files selected".to_string(),
            };
        }

        let total_lines: usize = files.iter().map(|f| f.line_count).sum();
        let max_single_file_lines = files.iter().map(|f| f.line_count).max().unwrap_or(0);

        let (tier, reason) = if total_lines <= self.full_max_lines
            && max_single_file_lines <= self.large_file_lines
        {
            (
                Tier::Full,
                format!(
                    "{} lines across {} file(s) fits the full tier",
                    total_lines,
                    files.len()
                ),
            )
        } else if total_lines <= self.summary_max_lines {
            let why = if max_single_file_lines > self.large_file_lines {
                format!(
                    "largest file has {} lines (over {})",
                    max_single_file_lines, self.large_file_lines
                )
            } else {
                format!("{} lines exceeds {}", total_lines, self.full_max_lines)
            };
            (Tier::Summary, why)
        } else {
            (
                Tier::Index,
                format!("{} lines exceeds {}", total_lines, self.summary_max_lines),
            )
        };

        tracing::debug!("Tier {} for {} file(s): {}", tier, files.len(), reason);

        TierDecision {
            tier,
            total_lines,
            total_files: files.len(),
            max_single_file_lines,
            reason,
        }
    }
}

/// Choose a tier with the default thresholds
pub fn select_tier(files: &[FileStat]) -> TierDecision {
    TierThresholds::default().select(files)
}

fn fence_lang(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

fn request_note(path: &str) -> String {
    format!(
        "Full content is available on request: ask for `{}` by name.",
        path
    )
}

fn push_fenced(out: &mut String, lang: &str, lines: &[String]) {
    out.push_str("```");
    out.push_str(lang);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("```\n");
}

/// Render a file's lines at the given tier
pub fn render_file(path: &str, lines: &[String], tier: Tier) -> String {
    let lang = fence_lang(path);
    let mut out = String::new();

    match tier {
        Tier::Full => {
            out.push_str(&format!("### {} ({} lines)\n", path, lines.len()));
            push_fenced(&mut out, lang, lines);
        }
        Tier::Summary => {
            out.push_str(&format!("### {} ({} lines, summary)\n", path, lines.len()));

            let outline = extract_outline(path, lines);
            if !outline.is_empty() {
                out.push_str("Outline:\n");
                for symbol in outline.iter().take(OUTLINE_MAX_ENTRIES) {
                    out.push_str(&format!("- L{}: {}\n", symbol.line, symbol.signature));
                }
                if outline.len() > OUTLINE_MAX_ENTRIES {
                    out.push_str(&format!(
                        "- ... {} more\n",
                        outline.len() - OUTLINE_MAX_ENTRIES
                    ));
                }
            }

            if lines.len() <= HEAD_LINES + TAIL_LINES {
                out.push_str("Content:\n");
                push_fenced(&mut out, lang, lines);
            } else {
                out.push_str(&format!("Head (first {} lines):\n", HEAD_LINES));
                push_fenced(&mut out, lang, &lines[..HEAD_LINES]);
                out.push_str(&format!("Tail (last {} lines):\n", TAIL_LINES));
                push_fenced(&mut out, lang, &lines[lines.len() - TAIL_LINES..]);
            }
            out.push_str(&request_note(path));
            out.push('\n');
        }
        Tier::Index => {
            let stat = FileStat::from_lines(path, lines);
            out.push_str(&format!(
                "### {} ({} lines, {} bytes, index)\n",
                path, stat.line_count, stat.size_bytes
            ));
            let outline = extract_outline(path, lines);
            if !outline.is_empty() {
                let names: Vec<&str> = outline
                    .iter()
                    .take(INDEX_MAX_SYMBOLS)
                    .map(|s| s.name.as_str())
                    .collect();
                out.push_str("Symbols: ");
                out.push_str(&names.join(", "));
                if outline.len() > INDEX_MAX_SYMBOLS {
                    out.push_str(&format!(" (+{} more)", outline.len() - INDEX_MAX_SYMBOLS));
                }
                out.push('\n');
            }
            out.push_str(&request_note(path));
            out.push('\n');
        }
    }

    out
}
