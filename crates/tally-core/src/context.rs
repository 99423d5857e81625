//! Context document assembly
//!
//! Turns a selection of sources into an ordered list of named sections. The
//! order is fixed (config, session, git, skills, data sources, files) so the
//! same selection always renders to the same text.

use crate::collab::{DataCatalog, DataDetail, SkillCatalog, Workspace};
use crate::error::Result;
use crate::sent::Delta;
use crate::tier::{FileStat, Tier, TierDecision, TierThresholds, render_file};
use crate::tokens::estimate_tokens;

/// Separator placed between sections
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// What to include in a context document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSelection {
    pub config: bool,
    pub session: bool,
    pub git: bool,
    /// Include recent commits with the git status
    pub git_history: bool,
    pub data_sources: Vec<String>,
    pub data_detail: DataDetail,
    pub skills: Vec<String>,
    pub files: Vec<String>,
}

impl ContextSelection {
    pub fn has_ambient(&self) -> bool {
        self.config || self.session || self.git
    }

    pub fn is_empty(&self) -> bool {
        !self.has_ambient()
            && self.data_sources.is_empty()
            && self.skills.is_empty()
            && self.files.is_empty()
    }
}

/// One rendered section of a context document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSource {
    Config(String),
    Session(String),
    Git(String),
    Skill { name: String, text: String },
    Data { name: String, text: String },
    File { path: String, tier: Tier, text: String },
}

impl ContextSource {
    /// Stable section name used for attribution
    pub fn name(&self) -> String {
        match self {
            ContextSource::Config(_) => "config".to_string(),
            ContextSource::Session(_) => "session".to_string(),
            ContextSource::Git(_) => "git".to_string(),
            ContextSource::Skill { name, .. } => format!("skill_{}", name),
            ContextSource::Data { name, .. } => format!("data_{}", name),
            ContextSource::File { path, .. } => format!("file_{}", path),
        }
    }

    /// Tier the section was rendered at. Non-file sections are always full.
    pub fn tier(&self) -> Tier {
        match self {
            ContextSource::File { tier, .. } => *tier,
            _ => Tier::Full,
        }
    }

    pub fn render(&self) -> String {
        match self {
            ContextSource::Config(text) => format!("## Project configuration\n\n{}", text),
            ContextSource::Session(text) => format!("## Session\n\n{}", text),
            ContextSource::Git(text) => format!("## Version control\n\n{}", text),
            ContextSource::Skill { name, text } => format!("## Skill: {}\n\n{}", name, text),
            ContextSource::Data { name, text } => format!("## Data: {}\n\n{}", name, text),
            ContextSource::File { text, .. } => text.trim_end().to_string(),
        }
    }
}

/// An assembled, ordered set of sections ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDocument {
    pub sections: Vec<ContextSource>,
    /// Tier decision for the file batch
    pub tier_decision: TierDecision,
}

impl ContextDocument {
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(ContextSource::render)
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }

    pub fn char_count(&self) -> usize {
        self.render().chars().count()
    }

    pub fn estimated_tokens(&self) -> u64 {
        estimate_tokens(&self.render())
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(ContextSource::name).collect()
    }

    pub fn has_files(&self) -> bool {
        self.sections
            .iter()
            .any(|s| matches!(s, ContextSource::File { .. }))
    }

    /// Items that actually made it into the document
    pub fn delivered(&self) -> Delta {
        let mut delta = Delta::default();
        for section in &self.sections {
            match section {
                ContextSource::File { path, .. } => delta.files.push(path.clone()),
                ContextSource::Data { name, .. } => delta.data_sources.push(name.clone()),
                ContextSource::Skill { name, .. } => delta.skills.push(name.clone()),
                _ => {}
            }
        }
        delta
    }

    /// Context level recorded on the conversation after this document is sent
    pub fn level(&self) -> Tier {
        if self.has_files() {
            self.tier_decision.tier
        } else {
            Tier::Full
        }
    }
}

/// Renders selections against the project's collaborators
pub struct ContextAssembler<'a> {
    workspace: &'a dyn Workspace,
    data: &'a dyn DataCatalog,
    skills: &'a dyn SkillCatalog,
    thresholds: TierThresholds,
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim_end().to_string())
        .filter(|t| !t.trim().is_empty())
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        workspace: &'a dyn Workspace,
        data: &'a dyn DataCatalog,
        skills: &'a dyn SkillCatalog,
    ) -> Self {
        Self {
            workspace,
            data,
            skills,
            thresholds: TierThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Assemble with every file rendered at the batch tier.
    ///
    /// Returns `Ok(None)` when the selection produces no sections.
    pub fn assemble(&self, selection: &ContextSelection) -> Result<Option<ContextDocument>> {
        self.assemble_with(selection, |_, decision| decision.tier)
    }

    /// Assemble with a caller-chosen tier per file
    pub fn assemble_with<F>(
        &self,
        selection: &ContextSelection,
        tier_for: F,
    ) -> Result<Option<ContextDocument>>
    where
        F: Fn(&FileStat, &TierDecision) -> Tier,
    {
        let mut sections = Vec::new();

        if selection.config {
            if let Some(text) = non_empty(self.workspace.read_config_text()) {
                sections.push(ContextSource::Config(text));
            }
        }
        if selection.session {
            if let Some(text) = non_empty(self.workspace.session_info()) {
                sections.push(ContextSource::Session(text));
            }
        }
        if selection.git {
            if let Some(text) = non_empty(self.workspace.read_vcs_status(selection.git_history)) {
                sections.push(ContextSource::Git(text));
            }
        }

        for name in &selection.skills {
            match non_empty(self.skills.read(name)) {
                Some(text) => sections.push(ContextSource::Skill {
                    name: name.clone(),
                    text,
                }),
                None => tracing::warn!("Skipping unknown skill '{}'", name),
            }
        }

        for name in &selection.data_sources {
            match non_empty(self.data.describe(name, selection.data_detail)) {
                Some(text) => sections.push(ContextSource::Data {
                    name: name.clone(),
                    text,
                }),
                None => tracing::warn!("Skipping unknown data source '{}'", name),
            }
        }

        let files = self.read_files(&selection.files)?;
        let stats: Vec<FileStat> = files
            .iter()
            .map(|(path, lines)| FileStat::from_lines(path.clone(), lines))
            .collect();
        let decision = self.thresholds.select(&stats);

        for ((path, lines), stat) in files.iter().zip(&stats) {
            let tier = tier_for(stat, &decision);
            sections.push(ContextSource::File {
                path: path.clone(),
                tier,
                text: render_file(path, lines, tier),
            });
        }

        if sections.is_empty() {
            tracing::debug!("Context selection produced no sections");
            return Ok(None);
        }

        let document = ContextDocument {
            sections,
            tier_decision: decision,
        };
        tracing::debug!(
            "Assembled context: {} sections, ~{} tokens",
            document.sections.len(),
            document.estimated_tokens()
        );
        Ok(Some(document))
    }

    /// Read selected files, skipping ones that have disappeared
    fn read_files(&self, paths: &[String]) -> Result<Vec<(String, Vec<String>)>> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if !self.workspace.file_exists(path) {
                tracing::warn!("Skipping missing file '{}'", path);
                continue;
            }
            match self.workspace.read_file(path) {
                Ok(lines) => files.push((path.clone(), lines)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Skipping missing file '{}'", path);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(files)
    }
}
