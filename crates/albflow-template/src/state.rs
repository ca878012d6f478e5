//! Local deployment state
//!
//! Each scoped stack owns a directory under `.albflow/stacks/`:
//!
//! - `record.json`: the latest [`DeploymentRecord`]
//! - `template.json`: the last template submitted
//! - `template.previous.json`: the template it replaced
//! - `lock.json`: held while a provision or delete of that stack is in flight
//!
//! Stacks never share a file, so two stacks of one project can be
//! provisioned at the same time.

use crate::driver::DeploymentRecord;
use crate::error::{Result, StackError};
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".albflow";
const STACKS_DIR: &str = "stacks";
const RECORD_FILE: &str = "record.json";
const TEMPLATE_FILE: &str = "template.json";
const PREVIOUS_TEMPLATE_FILE: &str = "template.previous.json";
const LOCK_FILE: &str = "lock.json";
const STALE_LOCK_HOURS: i64 = 1;

/// On-disk form of a stack's record
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    saved_at: DateTime<Utc>,
    record: DeploymentRecord,
}

/// What a lock holder is doing to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPurpose {
    Provision,
    Delete,
}

impl std::fmt::Display for LockPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockPurpose::Provision => write!(f, "provision"),
            LockPurpose::Delete => write!(f, "delete"),
        }
    }
}

/// Reads and writes the `.albflow/` directory of a project
pub struct StateManager {
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Directory of one scoped stack
    ///
    /// Scoped names only contain `[A-Za-z0-9-]`; anything else is refused
    /// so a name can never escape `.albflow/stacks/`.
    pub fn stack_dir(&self, stack_name: &str) -> Result<PathBuf> {
        let valid = !stack_name.is_empty()
            && !stack_name.starts_with('-')
            && stack_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(StackError::State(format!(
                "'{}' is not a scoped stack name",
                stack_name
            )));
        }
        Ok(self.state_dir().join(STACKS_DIR).join(stack_name))
    }

    /// Path of the last submitted template for a stack
    pub fn template_path(&self, stack_name: &str) -> Result<PathBuf> {
        Ok(self.stack_dir(stack_name)?.join(TEMPLATE_FILE))
    }

    async fn ensure_stack_dir(&self, stack_name: &str) -> Result<PathBuf> {
        let dir = self.stack_dir(stack_name)?;
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created stack state directory: {}", dir.display());
        }
        Ok(dir)
    }

    /// Latest record of a stack, `None` if it was never provisioned here
    pub async fn load_record(&self, stack_name: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.stack_dir(stack_name)?.join(RECORD_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: RecordFile = serde_json::from_str(&content)?;
        if file.version > STATE_VERSION {
            return Err(StackError::State(format!(
                "Record of {} has version {}, newer than supported version {}",
                stack_name, file.version, STATE_VERSION
            )));
        }
        Ok(Some(file.record))
    }

    /// Replace the record of its stack
    pub async fn save_record(&self, record: &DeploymentRecord) -> Result<()> {
        let dir = self.ensure_stack_dir(&record.stack_name).await?;
        let file = RecordFile {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            record: record.clone(),
        };
        write_replacing(&dir.join(RECORD_FILE), &serde_json::to_string_pretty(&file)?).await?;
        tracing::debug!("Saved {} record for {}", record.phase, record.stack_name);
        Ok(())
    }

    /// Forget a deleted stack: its record and both templates
    ///
    /// Returns whether a record existed. The lock file, if any, belongs to
    /// the caller and is left in place.
    pub async fn remove_stack(&self, stack_name: &str) -> Result<bool> {
        let dir = self.stack_dir(stack_name)?;
        let existed = remove_if_exists(&dir.join(RECORD_FILE)).await?;
        remove_if_exists(&dir.join(TEMPLATE_FILE)).await?;
        remove_if_exists(&dir.join(PREVIOUS_TEMPLATE_FILE)).await?;
        tracing::debug!("Removed local state of {}", stack_name);
        Ok(existed)
    }

    /// Store the template about to be submitted
    ///
    /// The template it replaces moves to `template.previous.json`, unless
    /// both are identical.
    pub async fn save_template(&self, stack_name: &str, template: &Template) -> Result<PathBuf> {
        let dir = self.ensure_stack_dir(stack_name).await?;
        let path = dir.join(TEMPLATE_FILE);

        if let Some(current) = self.load_template(stack_name).await?
            && current.digest()? != template.digest()?
        {
            fs::rename(&path, dir.join(PREVIOUS_TEMPLATE_FILE)).await?;
            tracing::debug!("Kept previous template of {}", stack_name);
        }

        write_replacing(&path, &template.to_json()?).await?;
        tracing::debug!("Saved template to {}", path.display());
        Ok(path)
    }

    pub async fn load_template(&self, stack_name: &str) -> Result<Option<Template>> {
        read_template(&self.template_path(stack_name)?).await
    }

    /// Template that was submitted before the current one
    pub async fn load_previous_template(&self, stack_name: &str) -> Result<Option<Template>> {
        read_template(&self.stack_dir(stack_name)?.join(PREVIOUS_TEMPLATE_FILE)).await
    }

    /// Lock one stack for a provision or delete
    ///
    /// The lock file is created atomically. A lock older than one hour, or
    /// one that cannot be read, is treated as stale and replaced once.
    pub async fn acquire_lock(&self, stack_name: &str, purpose: LockPurpose) -> Result<StateLock> {
        let lock_path = self.ensure_stack_dir(stack_name).await?.join(LOCK_FILE);
        let info = LockInfo {
            stack: stack_name.to_string(),
            purpose,
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)?;

        for attempt in 0..2 {
            match create_exclusive(&lock_path, &content).await {
                Ok(()) => {
                    tracing::debug!("Acquired {} lock on {}", purpose, stack_name);
                    return Ok(StateLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt == 0 => {
                    let existing = fs::read_to_string(&lock_path).await?;
                    match serde_json::from_str::<LockInfo>(&existing) {
                        Ok(held) if !held.is_stale() => {
                            return Err(StackError::Lock(format!(
                                "{} is locked for {} by {} (pid {}) since {}",
                                stack_name, held.purpose, held.holder, held.pid, held.acquired_at
                            )));
                        }
                        Ok(held) => tracing::warn!(
                            "Removing stale {} lock on {} from {}",
                            held.purpose,
                            stack_name,
                            held.holder
                        ),
                        Err(_) => tracing::warn!("Removing unreadable lock on {}", stack_name),
                    }
                    remove_if_exists(&lock_path).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StackError::Lock(format!(
            "{} was locked again while replacing a stale lock",
            stack_name
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    stack: String,
    purpose: LockPurpose,
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn is_stale(&self) -> bool {
        Utc::now().signed_duration_since(self.acquired_at).num_hours() >= STALE_LOCK_HOURS
    }
}

/// RAII guard for a stack lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            remove_if_exists(&self.lock_path).await?;
            self.released = true;
            tracing::debug!("Released {}", self.lock_path.display());
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

async fn create_exclusive(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Write through a sibling temp file so readers never see half a file
async fn write_replacing(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn read_template(path: &Path) -> Result<Option<Template>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(Template::from_json(&content)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeploymentPhase;
    use tempfile::tempdir;

    fn failed_record(stack: &str) -> DeploymentRecord {
        let mut record = DeploymentRecord::new("MyALBStack", stack);
        record.fail("assembly failed").unwrap();
        record
    }

    fn template(description: &str) -> Template {
        Template::from_json(&format!(
            r#"{{
                "AWSTemplateFormatVersion": "2010-09-09",
                "Description": "{}",
                "Metadata": {{"Deployment": "S", "Routing": [], "CreationOrder": []}},
                "Resources": {{}}
            }}"#,
            description
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_record_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager
            .save_record(&failed_record("MyALBStack-123456789012"))
            .await
            .unwrap();

        let saved = manager
            .load_record("MyALBStack-123456789012")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.phase, DeploymentPhase::Failed);
        assert_eq!(saved.error.as_deref(), Some("assembly failed"));
        let path = temp_dir
            .path()
            .join(".albflow/stacks/MyALBStack-123456789012/record.json");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_record() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(manager.load_record("S-1").await.unwrap().is_none());
        assert!(!manager.remove_stack("S-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_records_are_kept_per_stack() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save_record(&failed_record("A-1")).await.unwrap();
        manager.save_record(&failed_record("B-1")).await.unwrap();
        assert!(manager.remove_stack("A-1").await.unwrap());

        assert!(manager.load_record("A-1").await.unwrap().is_none());
        assert!(manager.load_record("B-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_newer_record_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let dir = manager.stack_dir("S-1").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = serde_json::json!({
            "version": 99,
            "saved_at": "2024-01-01T00:00:00Z",
        });
        file["record"] = serde_json::to_value(failed_record("S-1")).unwrap();
        std::fs::write(dir.join(RECORD_FILE), file.to_string()).unwrap();

        let err = manager.load_record("S-1").await.unwrap_err();
        assert!(matches!(err, StackError::State(_)));
    }

    #[test]
    fn test_stack_dir_refuses_unscoped_names() {
        let manager = StateManager::new("/tmp/project");
        assert!(manager.stack_dir("MyALBStack-123456789012").is_ok());
        for name in ["", "../etc", "a/b", "-x", "with space"] {
            let err = manager.stack_dir(name).unwrap_err();
            assert!(matches!(err, StackError::State(_)), "{:?}", name);
        }
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_stack() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock("A-1", LockPurpose::Provision).await.unwrap();
        let err = manager
            .acquire_lock("A-1", LockPurpose::Delete)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StackError::Lock(ref m) if m.contains("provision")));

        // Another stack of the same project is independent
        let other = manager.acquire_lock("B-1", LockPurpose::Provision).await.unwrap();

        lock.release().await.unwrap();
        let again = manager.acquire_lock("A-1", LockPurpose::Delete).await.unwrap();
        drop(again);
        drop(other);
        assert!(!manager.stack_dir("A-1").unwrap().join(LOCK_FILE).exists());
        assert!(!manager.stack_dir("B-1").unwrap().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_stale_or_unreadable_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let dir = manager.stack_dir("S-1").unwrap();
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(
            dir.join(LOCK_FILE),
            r#"{"stack": "S-1", "purpose": "provision", "holder": "old-host",
                "pid": 1, "acquired_at": "2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let lock = manager.acquire_lock("S-1", LockPurpose::Provision).await.unwrap();
        lock.release().await.unwrap();

        std::fs::write(dir.join(LOCK_FILE), "not json").unwrap();
        assert!(manager.acquire_lock("S-1", LockPurpose::Delete).await.is_ok());
    }

    #[tokio::test]
    async fn test_save_template_keeps_previous() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(manager.load_template("S-1").await.unwrap().is_none());
        let path = manager.save_template("S-1", &template("v1")).await.unwrap();
        assert!(path.ends_with(".albflow/stacks/S-1/template.json"));
        assert!(manager.load_previous_template("S-1").await.unwrap().is_none());

        // Resubmitting the same template keeps no duplicate
        manager.save_template("S-1", &template("v1")).await.unwrap();
        assert!(manager.load_previous_template("S-1").await.unwrap().is_none());

        manager.save_template("S-1", &template("v2")).await.unwrap();
        assert_eq!(manager.load_template("S-1").await.unwrap(), Some(template("v2")));
        assert_eq!(
            manager.load_previous_template("S-1").await.unwrap(),
            Some(template("v1"))
        );
    }
}
