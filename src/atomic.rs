//! 临时写入与原子替换：上传中的 blob 对读取方不可见。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::storage::StorageError;

/// 目标 blob 同目录下的隐藏临时文件，`finalize` 时重命名到位。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
    written: u64,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn new(target: &Path) -> Result<Self, StorageError> {
        let parent = target.parent().ok_or(StorageError::InvalidKey)?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "blob".into());
        let temp_path = parent.join(format!(".{base}.tmp.{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步后原子替换目标文件，已存在的同名 blob 被覆盖。返回写入字节数。
    pub async fn finalize(self) -> Result<u64, StorageError> {
        let Self {
            target,
            temp_path,
            file,
            written,
        } = self;
        if let Err(err) = file.sync_all().await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&target).await.is_ok() {
                    fs::rename(&temp_path, &target).await?;
                } else {
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(err.into());
                }
            }
            #[cfg(not(windows))]
            {
                let _ = fs::remove_file(&temp_path).await;
                return Err(err.into());
            }
        }

        if let Some(parent) = target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(written)
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
