//! Conversation files on disk
//!
//! One pretty-printed JSON document per conversation under
//! `<data dir>/tally/conversations`. Writes go to a temporary file that is
//! renamed over the old record, so a crash never leaves a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use tally_core::{Conversation, ConversationId, ConversationRepository, Error, Result};

const EXTENSION: &str = "json";

/// Repository storing each conversation as a JSON file
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Default location for conversation files
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("conversations")
    }

    /// Open a repository rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for an id, or `None` if the id cannot name a file in this directory
    fn path_for(&self, id: &ConversationId) -> Option<PathBuf> {
        let id = id.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| self.dir.join(format!("{}.{}", id, EXTENSION)))
    }

    fn read(path: &Path) -> Result<Conversation> {
        let text = fs::read_to_string(path).map_err(|e| persistence(path, e))?;
        serde_json::from_str(&text).map_err(|e| persistence(path, e))
    }
}

fn persistence(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Persistence(format!("{}: {}", path.display(), e))
}

impl ConversationRepository for JsonFileRepository {
    fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self
            .path_for(&conversation.id)
            .ok_or_else(|| Error::Persistence(format!("invalid id '{}'", conversation.id)))?;
        let json =
            serde_json::to_string_pretty(conversation).map_err(|e| persistence(&path, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| persistence(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| persistence(&path, e))
    }

    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn load_all(&self) -> Result<Vec<Conversation>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| persistence(&self.dir, e))?;

        let mut conversations = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            // One bad file should not hide every other conversation
            match Self::read(&path) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => tracing::warn!("Skipping conversation file: {}", e),
            }
        }
        Ok(conversations)
    }

    fn delete(&self, id: &ConversationId) -> Result<()> {
        let Some(path) = self.path_for(id) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ChatMessage, Role};

    fn repo() -> (tempfile::TempDir, JsonFileRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("conversations")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, repo) = repo();
        let mut conv = Conversation::new(1000);
        conv.push_message(ChatMessage::new(Role::User, "hello there"));
        conv.sent.commit(&tally_core::Delta {
            files: vec!["src/main.rs".to_string()],
            ..Default::default()
        });
        repo.save(&conv).unwrap();

        let loaded = repo.load(&conv.id).unwrap().unwrap();
        assert_eq!(loaded, conv);
        assert!(repo.dir().join(format!("{}.json", conv.id)).exists());
    }

    #[test]
    fn test_save_replaces_without_leftovers() {
        let (_dir, repo) = repo();
        let mut conv = Conversation::new(1000);
        repo.save(&conv).unwrap();
        conv.title = "Renamed".to_string();
        repo.save(&conv).unwrap();

        assert_eq!(repo.load(&conv.id).unwrap().unwrap().title, "Renamed");
        let files: Vec<_> = fs::read_dir(repo.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_load_all_skips_bad_files() {
        let (_dir, repo) = repo();
        repo.save(&Conversation::new(1000)).unwrap();
        repo.save(&Conversation::new(1000)).unwrap();
        fs::write(repo.dir().join("broken.json"), "{not json").unwrap();
        fs::write(repo.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(repo.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, repo) = repo();
        let conv = Conversation::new(1000);
        repo.save(&conv).unwrap();
        repo.delete(&conv.id).unwrap();
        repo.delete(&conv.id).unwrap();
        assert!(repo.load(&conv.id).unwrap().is_none());
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let (_dir, repo) = repo();
        let id = ConversationId::from("../escape");
        assert!(repo.load(&id).unwrap().is_none());
        repo.delete(&id).unwrap();
    }

    #[test]
    fn test_missing_fields_load_with_defaults() {
        let (_dir, repo) = repo();
        fs::write(
            repo.dir().join("conv_1_abc.json"),
            r#"{"id":"conv_1_abc","title":"Old","created_at":1,"updated_at":2}"#,
        )
        .unwrap();

        let conv = repo.load(&ConversationId::from("conv_1_abc")).unwrap().unwrap();
        assert!(conv.messages.is_empty());
        assert!(conv.sent.sent(tally_core::Category::Files).is_empty());
    }
}
