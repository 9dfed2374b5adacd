// # Memory Device Store
//
// In-memory implementation of DeviceStore.
//
// ## Crash Behavior
//
// - The paired identity is lost on restart
// - Every start after a restart requires pairing again
//
// ## When to Use
//
// - Testing environments
// - Throwaway sessions

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::device_store::{DeviceRecord, DeviceStore};

/// In-memory device store
///
/// # Example
///
/// ```rust,no_run
/// use wagw_core::store::MemoryDeviceStore;
/// use wagw_core::traits::DeviceStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDeviceStore::new();
///
///     let device = store.get_or_create_device().await?;
///     assert!(!device.is_paired());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceStore {
    inner: Arc<RwLock<Option<DeviceRecord>>>,
}

impl MemoryDeviceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding an already paired device
    pub fn paired(id: impl Into<String>) -> Self {
        let mut device = DeviceRecord::unpaired();
        device.pair(id);
        Self {
            inner: Arc::new(RwLock::new(Some(device))),
        }
    }

    /// Current device, if one was created
    pub async fn device(&self) -> Option<DeviceRecord> {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get_or_create_device(&self) -> Result<DeviceRecord, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.get_or_insert_with(DeviceRecord::unpaired).clone())
    }

    async fn save_device(&self, device: &DeviceRecord) -> Result<(), Error> {
        *self.inner.write().await = Some(device.clone());
        Ok(())
    }

    async fn delete_device(&self) -> Result<(), Error> {
        *self.inner.write().await = None;
        Ok(())
    }
}
