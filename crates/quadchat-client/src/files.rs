//! File intake for resource transfers.
//!
//! Reads the whole file into memory (transfers are whole-file only),
//! enforcing the size cap before anything is framed or sent.

use std::path::Path;

use bytes::Bytes;

use quadchat_shared::constants::MAX_FILE_SIZE;

use crate::error::ChatError;

/// A file read and described, ready to become a shared resource.
#[derive(Debug, Clone)]
pub struct FileIntake {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub payload: Bytes,
}

/// Read `path` fully into memory and infer its name and MIME-like type.
pub async fn read_for_transfer(path: impl AsRef<Path>) -> Result<FileIntake, ChatError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let data = tokio::fs::read(path).await?;
    if data.len() > MAX_FILE_SIZE {
        return Err(ChatError::FileTooLarge { size: data.len() });
    }

    let mime = mime_for_path(path).to_string();
    Ok(FileIntake {
        name,
        mime,
        size: data.len() as u64,
        payload: Bytes::from(data),
    })
}

/// MIME-like type string from the file extension. Unknown extensions fall
/// back to a generic binary type.
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[tokio::test]
    async fn test_read_for_transfer_names_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 2048])
            .unwrap();

        let intake = read_for_transfer(&path).await.unwrap();
        assert_eq!(intake.name, "notes.pdf");
        assert_eq!(intake.mime, "application/pdf");
        assert_eq!(intake.size, 2048);
        assert_eq!(intake.payload.len(), 2048);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_for_transfer(dir.path().join("absent.txt")).await;
        assert!(matches!(result, Err(ChatError::Io(_))));
    }

    #[test]
    fn test_mime_inference() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("report.pdf")), "application/pdf");
        assert_eq!(
            mime_for_path(Path::new("mystery.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            mime_for_path(Path::new("no_extension")),
            "application/octet-stream"
        );
    }
}
