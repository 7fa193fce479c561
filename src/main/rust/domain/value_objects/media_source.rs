use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Kind of media a session runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    UploadedFile,
    LiveDevice,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::UploadedFile => "uploaded_file",
            Self::LiveDevice => "live_device",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptor of a user-supplied video file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// Where the adapter reads the bytes from when uploading
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDevice {
    pub device_id: String,
}

/// Unchecked input handed to `start()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCandidate {
    File(UploadedFile),
    Device(LiveDevice),
}

impl MediaCandidate {
    pub fn file(
        name: impl Into<String>,
        size_bytes: u64,
        mime_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::File(UploadedFile {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            path: path.into(),
        })
    }

    pub fn device(device_id: impl Into<String>) -> Self {
        Self::Device(LiveDevice {
            device_id: device_id.into(),
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::File(_) => SourceKind::UploadedFile,
            Self::Device(_) => SourceKind::LiveDevice,
        }
    }
}

/// A validated media source. Only the validator constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MediaSource {
    UploadedFile(UploadedFile),
    LiveDevice(LiveDevice),
}

impl MediaSource {
    pub(crate) fn accepted(candidate: MediaCandidate) -> Self {
        match candidate {
            MediaCandidate::File(file) => Self::UploadedFile(file),
            MediaCandidate::Device(device) => Self::LiveDevice(device),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::UploadedFile(_) => SourceKind::UploadedFile,
            Self::LiveDevice(_) => SourceKind::LiveDevice,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::UploadedFile(file) => format!(
                "{} ({}, {} bytes)",
                file.name, file.mime_type, file.size_bytes
            ),
            Self::LiveDevice(device) => format!("device {}", device.device_id),
        }
    }
}
