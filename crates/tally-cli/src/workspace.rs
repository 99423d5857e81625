//! Filesystem workspace
//!
//! Project configuration is loaded hierarchically from context files
//! (TALLY.md, AGENTS.md or CLAUDE.md):
//! 1. Global: ~/.config/tally/
//! 2. Parent directories: from the repository root down to the workspace root
//! 3. The workspace root itself
//!
//! Later files take higher priority. Parts are joined with the same separator
//! used between context sections.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use tally_core::Workspace;
use tally_core::context::SECTION_SEPARATOR;

/// Names of context files to look for (in order of preference)
const CONTEXT_FILE_NAMES: &[&str] = &["TALLY.md", "AGENTS.md", "CLAUDE.md"];

/// Directories never listed as project files
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "venv", "dist", "build"];

const GIT_LOG_ENTRIES: &str = "10";

/// Workspace rooted at a directory on disk
pub struct FsWorkspace {
    root: PathBuf,
    max_files: usize,
    global_dir: Option<PathBuf>,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            root: root.into(),
            max_files,
            global_dir: dirs::config_dir().map(|d| d.join("tally")),
        }
    }

    /// Override the global context directory
    pub fn with_global_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.global_dir = dir;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        (!escapes).then(|| self.root.join(relative))
    }

    fn walk(&self, dir: &Path, files: &mut Vec<String>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list {}: {}", dir.display(), e);
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();

        for path in paths {
            if files.len() >= self.max_files {
                return;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                if !SKIPPED_DIRS.contains(&name) {
                    self.walk(&path, files);
                }
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                files.push(to_slash(relative));
            }
        }
    }

    /// Context files from the global directory, then from the repository
    /// root (or the filesystem root) down to the workspace root
    fn context_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        let stop = find_repo_root(&self.root);

        let mut current = Some(self.root.as_path());
        while let Some(dir) = current {
            dirs.push(dir.to_path_buf());
            if stop.as_deref() == Some(dir) {
                break;
            }
            current = dir.parent();
        }
        dirs.reverse();

        if let Some(global) = &self.global_dir {
            dirs.insert(0, global.clone());
        }
        dirs
    }

    fn git(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .ok()?;
        if !output.status.success() {
            tracing::debug!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Find the repository root by looking for a .git directory
fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }

    None
}

/// Load the first non-empty context file in a directory
fn load_context_from_dir(dir: &Path) -> Option<String> {
    for name in CONTEXT_FILE_NAMES {
        let path = dir.join(name);
        if let Ok(content) = fs::read_to_string(&path) {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    None
}

impl Workspace for FsWorkspace {
    fn list_project_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        self.walk(&self.root, &mut files);
        files
    }

    fn read_file(&self, path: &str) -> std::io::Result<Vec<String>> {
        let full = self.resolve(path).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is outside the workspace", path),
            )
        })?;
        let bytes = fs::read(full)?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn file_exists(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|p| p.is_file())
    }

    fn read_config_text(&self) -> Option<String> {
        let parts: Vec<String> = self
            .context_dirs()
            .iter()
            .filter_map(|dir| load_context_from_dir(dir))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(SECTION_SEPARATOR))
        }
    }

    fn read_vcs_status(&self, include_history: bool) -> Option<String> {
        let status = self.git(&["status", "--short", "--branch"])?;
        let mut text = format!("Status:\n{}", status);
        if include_history {
            if let Some(log) = self.git(&["log", "--oneline", "-n", GIT_LOG_ENTRIES]) {
                if !log.is_empty() {
                    text.push_str("\n\nRecent commits:\n");
                    text.push_str(&log);
                }
            }
        }
        Some(text)
    }

    fn session_info(&self) -> Option<String> {
        Some(format!(
            "Working directory: {}\nDate: {}\nPlatform: {} ({})",
            self.root.display(),
            chrono::Local::now().format("%Y-%m-%d %H:%M"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        ))
    }
}
