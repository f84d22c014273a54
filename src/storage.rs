//! 扁平命名空间的磁盘 blob 存储。

use std::fs::Metadata;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};

use crate::atomic::AtomicFile;

/// 上传字段中决定存储键所需的信息。
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: Option<String>,
}

/// 把一次上传映射为存储键的纯函数。
pub type KeyStrategy = fn(&IncomingFile) -> String;

/// 默认策略：直接使用客户端提供的文件名，同名上传互相覆盖。
pub fn original_name_key(file: &IncomingFile) -> String {
    file.original_name.clone()
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key is not a single path segment")]
    InvalidKey,
    #[error("blob not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 已打开的 blob 及其元数据。
pub struct StoredBlob {
    pub file: File,
    pub metadata: Metadata,
}

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 键必须恰好是一个普通路径段，不允许分隔符、`.` 或 `..`。
    pub fn resolve_key(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) {
            return Err(StorageError::InvalidKey);
        }
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(key)),
            _ => Err(StorageError::InvalidKey),
        }
    }

    /// 为 `key` 开始一次写入；`finalize` 之前旧内容保持可读。
    pub async fn create_blob(&self, key: &str) -> Result<AtomicFile, StorageError> {
        let target = self.resolve_key(key)?;
        AtomicFile::new(&target).await
    }

    /// 打开已存储的 blob。目录与符号链接一律视为不存在。
    pub async fn open_blob(&self, key: &str) -> Result<StoredBlob, StorageError> {
        let target = self.resolve_key(key)?;
        let metadata = match fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(err) => return Err(StorageError::Io(err)),
        };
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        let file = File::open(&target).await?;
        Ok(StoredBlob { file, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create root");
        (temp, Storage::new(root))
    }

    #[test]
    fn resolve_key_accepts_plain_names() {
        let (_temp, storage) = make_storage();
        let path = storage.resolve_key("report final.pdf").expect("resolve");
        assert_eq!(path, storage.root_path().join("report final.pdf"));
    }

    #[test]
    fn resolve_key_rejects_nested_or_relative_names() {
        let (_temp, storage) = make_storage();
        for key in ["", ".", "..", "../secret.txt", "a/b.txt", "a\\b.txt", "/etc/passwd"] {
            assert!(
                matches!(storage.resolve_key(key), Err(StorageError::InvalidKey)),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn original_name_strategy_keeps_the_client_name() {
        let incoming = IncomingFile {
            original_name: "holiday.jpg".into(),
            content_type: Some("image/jpeg".into()),
        };
        assert_eq!(original_name_key(&incoming), "holiday.jpg");
    }

    #[tokio::test]
    async fn open_missing_blob_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.open_blob("nope.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn open_directory_is_not_found() {
        let (_temp, storage) = make_storage();
        std::fs::create_dir(storage.root_path().join("folder")).expect("mkdir");
        let result = storage.open_blob("folder").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_blob_refuses_symlink() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = make_storage();
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, storage.root_path().join("link")).expect("symlink");

        let result = storage.open_blob("link").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn written_blob_can_be_reopened() {
        let (_temp, storage) = make_storage();
        let mut blob = storage.create_blob("a.txt").await.expect("create");
        blob.write_chunk(b"hello").await.expect("write");
        blob.finalize().await.expect("finalize");

        let stored = storage.open_blob("a.txt").await.expect("open");
        assert_eq!(stored.metadata.len(), 5);
    }
}
