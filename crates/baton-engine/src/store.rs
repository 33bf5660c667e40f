use crate::state::TaskState;
use async_trait::async_trait;
use baton_core::{BatonError, BatonResult};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable storage for task documents.
///
/// The whole document is rewritten on every save; implementations never
/// patch a stored task in place.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Writes the full task document.
    async fn save(&self, state: &TaskState) -> BatonResult<()>;
    /// Reads a task document, `None` when the id is unknown to the store.
    async fn load(&self, id: Uuid) -> BatonResult<Option<TaskState>>;
    /// Removes a task document. Removing an absent id is not an error.
    async fn delete(&self, id: Uuid) -> BatonResult<()>;
    /// All task ids the store knows about.
    async fn list(&self) -> BatonResult<Vec<Uuid>>;
}

/// File-based task store, one pretty-printed JSON document per task.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> BatonResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_err("create task directory", &dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    fn task_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn storage_err(action: &str, subject: &str, e: impl std::fmt::Display) -> BatonError {
    BatonError::Storage(format!("Failed to {action} '{subject}': {e}"))
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, state: &TaskState) -> BatonResult<()> {
        let path = self.task_path(state.task_id);
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| storage_err("write task", &state.task_id.to_string(), e))?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> BatonResult<Option<TaskState>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| storage_err("read task", &id.to_string(), e))?;
        let state: TaskState = serde_json::from_str(&data)
            .map_err(|e| storage_err("parse task", &id.to_string(), e))?;
        Ok(Some(state))
    }

    async fn delete(&self, id: Uuid) -> BatonResult<()> {
        let path = self.task_path(id);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| storage_err("delete task", &id.to_string(), e))?;
        }
        Ok(())
    }

    async fn list(&self) -> BatonResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| storage_err("list tasks in", &self.dir.display().to_string(), e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list tasks in", &self.dir.display().to_string(), e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::ExecutionMode;
    use baton_core::TaskStep;

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(tmp.path()).await.unwrap();

        let mut state = TaskState::new("write a haiku", ExecutionMode::Autonomous);
        state.add_step(TaskStep::user("write a haiku"));
        state.increment_round();
        store.save(&state).await.unwrap();

        let loaded = store.load(state.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.task_id, state.task_id);
        assert_eq!(loaded.initial_prompt, "write a haiku");
        assert_eq!(loaded.round_count, 1);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].text_content(), "write a haiku");
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(tmp.path()).await.unwrap();

        let loaded = store.load(Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_rewrites_whole_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(tmp.path()).await.unwrap();

        let mut state = TaskState::new("prompt", ExecutionMode::Autonomous);
        store.save(&state).await.unwrap();

        state.add_step(TaskStep::text("writer", "first draft"));
        state.increment_round();
        store.save(&state).await.unwrap();

        let loaded = store.load(state.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.round_count, 1);
        assert_eq!(loaded.history.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(tmp.path()).await.unwrap();

        let a = TaskState::new("a", ExecutionMode::Autonomous);
        let b = TaskState::new("b", ExecutionMode::Autonomous);
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let mut ids = store.list().await.unwrap();
        ids.sort();
        let mut expected = vec![a.task_id, b.task_id];
        expected.sort();
        assert_eq!(ids, expected);

        store.delete(a.task_id).await.unwrap();
        assert!(store.load(a.task_id).await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec![b.task_id]);

        // Deleting an already-deleted task is a no-op.
        store.delete(a.task_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_document_is_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(tmp.path()).await.unwrap();

        let id = Uuid::new_v4();
        tokio::fs::write(tmp.path().join(format!("{id}.json")), "not json")
            .await
            .unwrap();

        let err = store.load(id).await.unwrap_err();
        assert!(matches!(err, BatonError::Storage(_)));
    }
}
