//! Collaborator traits the core reads project material through
//!
//! Implementations live outside the core (the CLI provides filesystem,
//! CSV and skills-directory versions). All calls are synchronous: they are
//! local reads, not suspension points.

use serde::{Deserialize, Serialize};

/// Access to the user's project
pub trait Workspace: Send + Sync {
    /// Paths of candidate project files, relative to the project root
    fn list_project_files(&self) -> Vec<String>;

    /// Lines of a file, without line terminators
    fn read_file(&self, path: &str) -> std::io::Result<Vec<String>>;

    fn file_exists(&self, path: &str) -> bool;

    /// Project configuration or memory text, if any
    fn read_config_text(&self) -> Option<String>;

    /// Version-control status, optionally with recent history. `None` outside a repository.
    fn read_vcs_status(&self, include_history: bool) -> Option<String>;

    /// Environment description (OS, working directory, tool versions)
    fn session_info(&self) -> Option<String>;
}

/// How much detail to include when describing a data source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDetail {
    /// Column types plus a statistical summary
    #[default]
    Full,
    /// Dimensions and column names only
    Shape,
}

/// A tabular data source the user can share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub name: String,
    pub row_count: usize,
    pub col_count: usize,
}

/// Enumerates and describes tabular data sources
pub trait DataCatalog: Send + Sync {
    fn enumerate(&self) -> Vec<DataSourceInfo>;

    /// Text description of a data source, `None` if it does not exist
    fn describe(&self, name: &str, detail: DataDetail) -> Option<String>;
}

/// Named instruction documents the user can share with the assistant
pub trait SkillCatalog: Send + Sync {
    fn list(&self) -> Vec<String>;

    fn read(&self, name: &str) -> Option<String>;
}

/// A catalog with nothing in it
#[derive(Debug, Default, Clone, Copy)]
pub struct Empty;

impl DataCatalog for Empty {
    fn enumerate(&self) -> Vec<DataSourceInfo> {
        Vec::new()
    }

    fn describe(&self, _name: &str, _detail: DataDetail) -> Option<String> {
        None
    }
}

impl SkillCatalog for Empty {
    fn list(&self) -> Vec<String> {
        Vec::new()
    }

    fn read(&self, _name: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for tests

    use std::collections::BTreeMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryWorkspace {
        pub files: Mutex<BTreeMap<String, String>>,
        pub config: Option<String>,
        pub vcs: Option<String>,
        pub session: Option<String>,
    }

    impl MemoryWorkspace {
        pub fn with_file(self, path: &str, text: &str) -> Self {
            self.files.lock().insert(path.to_string(), text.to_string());
            self
        }
    }

    impl Workspace for MemoryWorkspace {
        fn list_project_files(&self) -> Vec<String> {
            self.files.lock().keys().cloned().collect()
        }

        fn read_file(&self, path: &str) -> std::io::Result<Vec<String>> {
            self.files
                .lock()
                .get(path)
                .map(|t| t.lines().map(str::to_string).collect())
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }

        fn file_exists(&self, path: &str) -> bool {
            self.files.lock().contains_key(path)
        }

        fn read_config_text(&self) -> Option<String> {
            self.config.clone()
        }

        fn read_vcs_status(&self, include_history: bool) -> Option<String> {
            self.vcs.as_ref().map(|s| {
                if include_history {
                    format!("{}\nhistory: abc123 initial", s)
                } else {
                    s.clone()
                }
            })
        }

        fn session_info(&self) -> Option<String> {
            self.session.clone()
        }
    }

    #[derive(Default)]
    pub struct MemoryCatalog {
        pub tables: BTreeMap<String, (usize, usize)>,
        pub skills: BTreeMap<String, String>,
    }

    impl DataCatalog for MemoryCatalog {
        fn enumerate(&self) -> Vec<DataSourceInfo> {
            self.tables
                .iter()
                .map(|(name, (rows, cols))| DataSourceInfo {
                    name: name.clone(),
                    row_count: *rows,
                    col_count: *cols,
                })
                .collect()
        }

        fn describe(&self, name: &str, detail: DataDetail) -> Option<String> {
            let (rows, cols) = self.tables.get(name)?;
            Some(match detail {
                DataDetail::Shape => format!("{}: {} x {}", name, rows, cols),
                DataDetail::Full => format!("{}: {} x {}\nsummary: ...", name, rows, cols),
            })
        }
    }

    impl SkillCatalog for MemoryCatalog {
        fn list(&self) -> Vec<String> {
            self.skills.keys().cloned().collect()
        }

        fn read(&self, name: &str) -> Option<String> {
            self.skills.get(name).cloned()
        }
    }
}
