use std::io;
use std::path::Path;

use crate::domain::value_objects::MediaCandidate;

/// Describe a file on disk as an upload candidate.
///
/// The MIME type is guessed from the extension unless `mime_override` is
/// given; unknown extensions come out as `application/octet-stream` and are
/// left for the validator to reject.
pub async fn describe_file(path: &Path, mime_override: Option<&str>) -> io::Result<MediaCandidate> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        ));
    }

    let mime_type = match mime_override {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(MediaCandidate::file(name, metadata.len(), mime_type, path))
}
