//! Skill documents
//!
//! A skill is a markdown file in the skills directory; its name is the file stem.

use std::fs;
use std::path::PathBuf;

use tally_core::SkillCatalog;

/// Default skills directory, relative to the working directory
pub const DEFAULT_SKILLS_DIR: &str = ".tally/skills";

/// Skill catalog over a directory of markdown files
pub struct DirSkillCatalog {
    dir: PathBuf,
}

impl DirSkillCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SkillCatalog for DirSkillCatalog {
    fn list(&self) -> Vec<String> {
        let pattern = format!("{}/*.md", glob::Pattern::escape(&self.dir.to_string_lossy()));
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };

        let mut names: Vec<String> = paths
            .filter_map(Result::ok)
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    fn read(&self, name: &str) -> Option<String> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        let path = self.dir.join(format!("{}.md", name));
        match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Cannot read skill {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("review.md"), "# Review\nCheck errors.\n").unwrap();
        fs::write(dir.path().join("blank.md"), "  \n").unwrap();
        fs::write(dir.path().join("other.txt"), "skip").unwrap();
        let skills = DirSkillCatalog::new(dir.path());

        assert_eq!(skills.list(), vec!["blank", "review"]);
        assert_eq!(skills.read("review").unwrap(), "# Review\nCheck errors.");
        assert!(skills.read("blank").is_none());
        assert!(skills.read("missing").is_none());
        assert!(skills.read("../review").is_none());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let skills = DirSkillCatalog::new("/nonexistent/tally/skills");
        assert!(skills.list().is_empty());
    }
}
