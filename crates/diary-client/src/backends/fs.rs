//! Filesystem-backed object store.
//!
//! Objects live under `root/<key>`. A resumable session is a partial file
//! `root/.sessions/<token>.part` plus a JSON descriptor naming its target
//! key; a transfer appends whatever the partial file does not hold yet and
//! then moves it into place.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use diary_shared::ObjectError;

use crate::remote::ObjectStore;

const SESSIONS_DIR: &str = ".sessions";

#[derive(Debug, Serialize, Deserialize)]
struct SessionDescriptor {
    path: String,
    opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub async fn new(root: PathBuf) -> Result<Self, ObjectError> {
        fs::create_dir_all(root.join(SESSIONS_DIR))
            .await
            .map_err(|e| {
                ObjectError::Unavailable(format!(
                    "Failed to create object directory '{}': {}",
                    root.display(),
                    e
                ))
            })?;

        info!(path = %root.display(), "Object store initialized");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object key to a file under the root.
    ///
    /// Keys are relative, made of plain segments only, and may not reach
    /// into the session folder.
    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectError> {
        let relative = Path::new(key.trim_end_matches('/'));
        let mut resolved = self.root.clone();
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(c) => {
                    if depth == 0 && c == SESSIONS_DIR {
                        return Err(ObjectError::Transfer(format!("Reserved key: {key}")));
                    }
                    resolved.push(c);
                    depth += 1;
                }
                _ => {
                    return Err(ObjectError::Transfer(format!(
                        "Path traversal detected: {key}"
                    )));
                }
            }
        }
        if depth == 0 {
            return Err(ObjectError::Transfer("Empty object key".to_string()));
        }
        Ok(resolved)
    }

    fn session_paths(&self, token: &str) -> Result<(PathBuf, PathBuf), ObjectError> {
        // tokens are ours: a UUID, nothing else
        let token = Uuid::parse_str(token).map_err(|_| ObjectError::SessionExpired)?;
        let dir = self.root.join(SESSIONS_DIR);
        Ok((
            dir.join(format!("{token}.json")),
            dir.join(format!("{token}.part")),
        ))
    }

    fn source_path(source_uri: &str) -> PathBuf {
        PathBuf::from(source_uri.strip_prefix("file://").unwrap_or(source_uri))
    }
}

fn io_err(context: &str, e: std::io::Error) -> ObjectError {
    ObjectError::Transfer(format!("{context}: {e}"))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn open_session(&self, path: &str) -> Result<String, ObjectError> {
        self.object_path(path)?;

        let token = Uuid::new_v4().to_string();
        let (meta, part) = self.session_paths(&token)?;
        let descriptor = SessionDescriptor {
            path: path.to_string(),
            opened_at: Utc::now(),
        };
        let json = serde_json::to_vec(&descriptor)
            .map_err(|e| ObjectError::Transfer(format!("Session descriptor: {e}")))?;

        fs::write(&part, b"")
            .await
            .map_err(|e| io_err("Failed to create session file", e))?;
        fs::write(&meta, json)
            .await
            .map_err(|e| io_err("Failed to write session descriptor", e))?;

        debug!(path, session = %token, "Opened upload session");
        Ok(token)
    }

    async fn put_resumable(
        &self,
        path: &str,
        source_uri: &str,
        session: &str,
    ) -> Result<(), ObjectError> {
        let target = self.object_path(path)?;
        let (meta, part) = self.session_paths(session)?;

        let descriptor: SessionDescriptor = match fs::read(&meta).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|_| ObjectError::SessionExpired)?,
            Err(_) => return Err(ObjectError::SessionExpired),
        };
        if descriptor.path != path {
            return Err(ObjectError::SessionExpired);
        }

        let received = match fs::metadata(&part).await {
            Ok(m) => m.len() as usize,
            Err(_) => return Err(ObjectError::SessionExpired),
        };

        let data = fs::read(Self::source_path(source_uri))
            .await
            .map_err(|e| io_err("Failed to read source", e))?;

        if received > data.len() {
            // partial file does not belong to this source any more
            let _ = fs::remove_file(&part).await;
            let _ = fs::remove_file(&meta).await;
            return Err(ObjectError::SessionExpired);
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&part)
            .await
            .map_err(|e| io_err("Failed to open session file", e))?;
        file.write_all(&data[received..])
            .await
            .map_err(|e| io_err("Failed to append to session file", e))?;
        file.sync_all()
            .await
            .map_err(|e| io_err("Failed to flush session file", e))?;
        drop(file);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("Failed to create object folder", e))?;
        }
        fs::rename(&part, &target)
            .await
            .map_err(|e| io_err("Failed to commit object", e))?;
        let _ = fs::remove_file(&meta).await;

        debug!(
            path,
            resumed_from = received,
            size = data.len(),
            "Stored object"
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ObjectError> {
        let target = self.object_path(path)?;

        if !target.exists() {
            return Err(ObjectError::NotFound);
        }

        fs::remove_file(&target)
            .await
            .map_err(|e| io_err("Failed to delete object", e))?;

        debug!(path, "Deleted object");
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String, ObjectError> {
        let target = self.object_path(path)?;
        if !target.is_file() {
            return Err(ObjectError::NotFound);
        }
        Ok(format!("file://{}", target.display()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectError> {
        // walk from the deepest folder the prefix names
        let folder = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if folder.is_empty() {
            self.root.clone()
        } else {
            self.object_path(folder)?
        };

        let mut keys = Vec::new();
        let mut pending = vec![(start, folder.to_string())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err("Failed to list objects", e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_err("Failed to read directory entry", e))?
            {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if key_prefix.is_empty() && name == SESSIONS_DIR {
                    continue;
                }
                let key = if key_prefix.is_empty() {
                    name
                } else {
                    format!("{key_prefix}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_err("Failed to read file type", e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
