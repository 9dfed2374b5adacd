// # Device Store Trait
//
// Credential/device persistence. The protocol library owns the key material
// format; the gateway only needs to know whether a paired identity exists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Paired identity (the device JID); `None` until pairing completes
    pub id: Option<String>,
    /// Display name pushed by the account, if known
    #[serde(default)]
    pub push_name: Option<String>,
    /// When this device record was created
    pub created_at: DateTime<Utc>,
    /// When pairing completed
    #[serde(default)]
    pub paired_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// A fresh, unpaired device
    pub fn unpaired() -> Self {
        Self {
            id: None,
            push_name: None,
            created_at: Utc::now(),
            paired_at: None,
        }
    }

    /// Whether the device holds a paired identity
    pub fn is_paired(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Record a completed pairing
    pub fn pair(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.paired_at = Some(Utc::now());
    }
}

/// Trait for device store implementations
///
/// All methods must be safe to call concurrently.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Load the device, creating an unpaired one if none exists
    async fn get_or_create_device(&self) -> Result<DeviceRecord, crate::Error>;

    /// Persist the device
    async fn save_device(&self, device: &DeviceRecord) -> Result<(), crate::Error>;

    /// Wipe the device credentials (after logout)
    async fn delete_device(&self) -> Result<(), crate::Error>;
}
