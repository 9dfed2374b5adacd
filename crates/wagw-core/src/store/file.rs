// # File Device Store
//
// File-based implementation of DeviceStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: falls back to the backup if the main file fails to parse
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "device": {
//     "id": "5511999999999:12@s.whatsapp.net",
//     "push_name": null,
//     "created_at": "2025-01-09T12:00:00Z",
//     "paired_at": "2025-01-09T12:01:30Z"
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::device_store::{DeviceRecord, DeviceStore};

/// Device file format version
const DEVICE_FILE_VERSION: &str = "1.0";

/// Serializable device file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DeviceFileFormat {
    version: String,
    device: Option<DeviceRecord>,
}

/// File-based device store
#[derive(Debug)]
pub struct FileDeviceStore {
    path: PathBuf,
    device: Arc<RwLock<Option<DeviceRecord>>>,
}

impl FileDeviceStore {
    /// Create or load a file device store
    ///
    /// Creates parent directories as needed. A corrupted file is recovered
    /// from its backup; if that fails too, the store starts empty (unpaired).
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create device store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let device = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            device: Arc::new(RwLock::new(device)),
        })
    }

    /// Path of the device file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<Option<DeviceRecord>, Error> {
        match Self::load(path).await {
            Ok(device) => Ok(device),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Device file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                match Self::load(&backup_path).await {
                    Ok(device) => {
                        tracing::info!("Recovered device from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore device file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(device)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup unusable: {}. Starting unpaired.",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Option<DeviceRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Device file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::device_store(format!(
                "Failed to read device file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: DeviceFileFormat = serde_json::from_str(&content)?;

        if file.version != DEVICE_FILE_VERSION {
            tracing::warn!(
                "Device file version mismatch: expected {}, got {}. Attempting to load anyway.",
                DEVICE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.device)
    }

    /// Write the device file atomically
    async fn write(&self, device: Option<&DeviceRecord>) -> Result<(), Error> {
        let file = DeviceFileFormat {
            version: DEVICE_FILE_VERSION.to_string(),
            device: device.cloned(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut tmp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::device_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            tmp.write_all(json.as_bytes()).await?;
            tmp.flush().await?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create device file backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::device_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Device written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    async fn get_or_create_device(&self) -> Result<DeviceRecord, Error> {
        let mut guard = self.device.write().await;
        if let Some(device) = guard.as_ref() {
            return Ok(device.clone());
        }

        let device = DeviceRecord::unpaired();
        self.write(Some(&device)).await?;
        *guard = Some(device.clone());
        Ok(device)
    }

    async fn save_device(&self, device: &DeviceRecord) -> Result<(), Error> {
        let mut guard = self.device.write().await;
        self.write(Some(device)).await?;
        *guard = Some(device.clone());
        Ok(())
    }

    async fn delete_device(&self) -> Result<(), Error> {
        let mut guard = self.device.write().await;
        self.write(None).await?;
        *guard = None;
        Ok(())
    }
}
