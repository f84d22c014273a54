//! Process-wide context: built once at startup, handed to the router, torn
//! down after the server drains.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Args;
use crate::records::{self, RecordStore};
use crate::storage::{Storage, original_name_key};
use crate::upload::UploadConfig;

#[derive(Clone)]
pub struct ShareContext {
    pub storage: Arc<Storage>,
    pub records: Arc<dyn RecordStore>,
    pub upload: Arc<UploadConfig>,
    /// Request body cap for `POST /upload`; 0 disables it.
    pub upload_max_size: u64,
}

impl ShareContext {
    /// `port` is the port actually bound, used for links when a request has no
    /// `Host` header.
    pub async fn init(args: &Args, port: u16) -> io::Result<Self> {
        let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
        storage.ensure_root().await?;
        // A store that fails to open is logged and replaced; startup continues.
        let database = PathBuf::from(&args.database);
        let records = tokio::task::spawn_blocking(move || records::connect(&database))
            .await
            .map_err(io::Error::other)?;
        let upload = Arc::new(UploadConfig {
            key_strategy: original_name_key,
            trust_proxy: args.trust_proxy,
            fallback_host: format!("localhost:{port}"),
        });
        info!(storage = %storage.root_path().display(), "storage ready");
        Ok(Self {
            storage,
            records,
            upload,
            upload_max_size: args.upload_max_size,
        })
    }

    pub async fn shutdown(self) {
        self.records.close().await;
        info!("record store closed");
    }
}
