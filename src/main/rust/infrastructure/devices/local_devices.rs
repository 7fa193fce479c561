use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::ports::{DeviceAccess, PermissionOutcome};

const DEFAULT_DEVICE_DIR: &str = "/dev";

/// Capture devices exposed as nodes on the local filesystem.
///
/// A numeric id `n` maps to `video{n}` in the device directory, an absolute
/// path is used as is. Capture is granted when the node can be opened for
/// reading.
#[derive(Debug, Clone)]
pub struct LocalDeviceAccess {
    device_dir: PathBuf,
}

impl LocalDeviceAccess {
    pub fn new() -> Self {
        Self::with_device_dir(DEFAULT_DEVICE_DIR)
    }

    pub fn with_device_dir(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    pub fn resolve(&self, device_id: &str) -> Option<PathBuf> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return None;
        }
        if device_id.starts_with('/') {
            return Some(PathBuf::from(device_id));
        }
        if device_id.chars().all(|c| c.is_ascii_digit()) {
            return Some(self.device_dir.join(format!("video{}", device_id)));
        }
        Some(self.device_dir.join(device_id))
    }
}

impl Default for LocalDeviceAccess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceAccess for LocalDeviceAccess {
    async fn request_capture(&self, device_id: &str) -> PermissionOutcome {
        let Some(path) = self.resolve(device_id) else {
            return PermissionOutcome::NotFound;
        };

        match tokio::fs::OpenOptions::new().read(true).open(&path).await {
            Ok(_) => {
                debug!(device = %path.display(), "Capture device available");
                PermissionOutcome::Granted
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => PermissionOutcome::NotFound,
            Err(e) => {
                warn!(device = %path.display(), error = %e, "Capture device refused");
                PermissionOutcome::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let devices = LocalDeviceAccess::new();
        assert_eq!(devices.resolve("0"), Some(PathBuf::from("/dev/video0")));
        assert_eq!(devices.resolve("/dev/video7"), Some(PathBuf::from("/dev/video7")));
        assert_eq!(devices.resolve("video2"), Some(PathBuf::from("/dev/video2")));
        assert_eq!(devices.resolve("  "), None);
    }

    #[tokio::test]
    async fn test_existing_node_is_granted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video0"), b"").unwrap();
        let devices = LocalDeviceAccess::with_device_dir(dir.path());

        assert_eq!(devices.request_capture("0").await, PermissionOutcome::Granted);
    }

    #[tokio::test]
    async fn test_missing_node_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let devices = LocalDeviceAccess::with_device_dir(dir.path());

        assert_eq!(devices.request_capture("3").await, PermissionOutcome::NotFound);
        assert_eq!(devices.request_capture("").await, PermissionOutcome::NotFound);
    }
}
