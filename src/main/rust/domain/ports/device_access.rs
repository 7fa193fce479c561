use async_trait::async_trait;

/// Outcome of asking for capture permission on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    NotFound,
}

/// Port for capture-device permission checks
#[async_trait]
pub trait DeviceAccess: Send + Sync {
    /// May wait on the user answering a permission prompt
    async fn request_capture(&self, device_id: &str) -> PermissionOutcome;
}
