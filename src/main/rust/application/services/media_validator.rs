use std::sync::Arc;

use crate::domain::errors::ValidationError;
use crate::domain::ports::{DeviceAccess, PermissionOutcome};
use crate::domain::value_objects::{MediaCandidate, MediaSource, UploadedFile};

const VIDEO_MIME_PREFIX: &str = "video/";

/// Checks a candidate media input before a session may start.
///
/// Validation has no side effects: it never opens a stream, and is safe to
/// call repeatedly or concurrently.
#[derive(Clone)]
pub struct MediaSourceValidator {
    devices: Arc<dyn DeviceAccess>,
    file_size_limit: Option<u64>,
}

impl MediaSourceValidator {
    pub fn new(devices: Arc<dyn DeviceAccess>, file_size_limit: Option<u64>) -> Self {
        Self {
            devices,
            file_size_limit,
        }
    }

    pub async fn validate(
        &self,
        candidate: &MediaCandidate,
    ) -> Result<MediaSource, ValidationError> {
        match candidate {
            MediaCandidate::File(file) => self.check_file(file)?,
            MediaCandidate::Device(device) => {
                match self.devices.request_capture(&device.device_id).await {
                    PermissionOutcome::Granted => {}
                    PermissionOutcome::Denied => {
                        return Err(ValidationError::DeviceUnavailable(format!(
                            "capture permission declined for {}",
                            device.device_id
                        )));
                    }
                    PermissionOutcome::NotFound => {
                        return Err(ValidationError::DeviceUnavailable(format!(
                            "no capture device {}",
                            device.device_id
                        )));
                    }
                }
            }
        }

        Ok(MediaSource::accepted(candidate.clone()))
    }

    fn check_file(&self, file: &UploadedFile) -> Result<(), ValidationError> {
        let mime = file.mime_type.trim().to_ascii_lowercase();
        if !mime.starts_with(VIDEO_MIME_PREFIX) {
            return Err(ValidationError::InvalidMediaType(file.mime_type.clone()));
        }

        if let Some(limit) = self.file_size_limit {
            if file.size_bytes > limit {
                return Err(ValidationError::FileTooLarge {
                    size: file.size_bytes,
                    limit,
                });
            }
        }

        Ok(())
    }
}
