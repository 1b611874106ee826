// File intake pipeline and image serving
//
// Untrusted multipart payloads pass an ordered set of hard gates before
// anything durable exists on disk: extension allow-list, content sniffing
// of the leading bytes, server-generated random filename, exclusive
// create, and a size-ceiled streamed copy. Any failure after the file is
// created removes the partial artifact before the error propagates.

use std::path::PathBuf;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, ApiResult};

/// How many leading bytes the sniffer looks at.
const SNIFF_LEN: usize = 512;

const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// True media type of a payload, determined from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// Classify the leading bytes as one of the two allowed image types.
/// Defeats extension spoofing: an executable renamed `photo.png` has
/// neither magic number.
pub fn sniff_image(head: &[u8]) -> Option<ImageKind> {
    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

    if head.starts_with(&PNG_MAGIC) {
        Some(ImageKind::Png)
    } else if head.starts_with(&JPEG_MAGIC) {
        Some(ImageKind::Jpeg)
    } else {
        None
    }
}

/// Check the client-declared filename against the extension allow-list,
/// returning the canonical lowercase extension. Necessary but
/// insufficient; sniffing is the real gate.
pub fn allowed_extension(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| allowed[1..] == ext)
}

/// Server-generated storage name: 16 bytes of cryptographic randomness,
/// hex-encoded, plus the validated extension. Collisions are
/// cryptographically negligible; exclusive create fails loudly if one
/// ever happens.
pub fn generate_storage_name(ext: &str) -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", hex::encode(bytes), ext)
}

/// A bare filename is safe when it cannot escape the storage root:
/// no traversal sequences, no path separators.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

/// Result of a successful intake.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Generated filename under the storage root. This, never the
    /// client-supplied name, is what gets persisted.
    pub filename: String,
    pub content_type: &'static str,
}

/// An image resolved for serving.
#[derive(Debug)]
pub struct ServedImage {
    pub content_type: &'static str,
    pub bytes: Bytes,
}

/// Validates and durably stores uploaded image files under a fixed,
/// trusted root. Explicitly constructed; no process-wide state.
pub struct FileIntake {
    root: PathBuf,
    max_bytes: usize,
}

impl FileIntake {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Request-body ceiling for upload routes: the payload limit plus
    /// headroom for multipart framing and the text fields.
    pub fn max_body_bytes(&self) -> usize {
        self.max_bytes + 64 * 1024
    }

    /// Run a multipart `file` field through the full pipeline and store
    /// it. On any failure nothing is left on disk.
    pub async fn store_field(&self, mut field: Field<'_>) -> ApiResult<StoredFile> {
        let client_name = field.file_name().unwrap_or_default().to_string();
        let ext = allowed_extension(&client_name)
            .ok_or_else(|| ApiError::forbidden("file type not allowed"))?;

        // Buffer just enough to sniff; the buffered head is replayed into
        // the copy so the full payload lands on disk.
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut overflow: Option<Bytes> = None;
        while head.len() < SNIFF_LEN {
            match field.chunk().await.map_err(multipart_error)? {
                Some(chunk) => {
                    let need = SNIFF_LEN - head.len();
                    if chunk.len() <= need {
                        head.extend_from_slice(&chunk);
                    } else {
                        head.extend_from_slice(&chunk[..need]);
                        overflow = Some(chunk.slice(need..));
                        break;
                    }
                }
                None => break,
            }
        }

        let kind =
            sniff_image(&head).ok_or_else(|| ApiError::forbidden("invalid file content"))?;

        fs::create_dir_all(&self.root)
            .await
            .context("create upload directory")?;

        let filename = generate_storage_name(ext);
        let path = self.root.join(&filename);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .context("create upload file")?;

        match copy_limited(&mut file, &head, overflow, &mut field, self.max_bytes).await {
            Ok(()) => Ok(StoredFile {
                filename,
                content_type: kind.mime(),
            }),
            Err(e) => {
                drop(file);
                if let Err(remove_err) = fs::remove_file(&path).await {
                    tracing::warn!(
                        file = %filename,
                        error = %remove_err,
                        "failed to remove partial upload"
                    );
                }
                Err(e)
            }
        }
    }

    /// Resolve a stored image for serving. The traversal check runs
    /// before any filesystem access, and the content type is re-sniffed
    /// on every read.
    pub async fn open(&self, filename: &str) -> ApiResult<ServedImage> {
        if !is_safe_filename(filename) {
            return Err(ApiError::validation("invalid filename"));
        }

        let path = self.root.join(filename);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::not_found("image not found"));
            }
            Err(e) => {
                return Err(ApiError::Internal(
                    anyhow::Error::new(e).context("read image"),
                ));
            }
        };

        let head = &bytes[..bytes.len().min(SNIFF_LEN)];
        let kind =
            sniff_image(head).ok_or_else(|| ApiError::forbidden("unsupported file type"))?;

        Ok(ServedImage {
            content_type: kind.mime(),
            bytes: bytes.into(),
        })
    }

    /// Best-effort removal of a stored file. Failures are logged, never
    /// surfaced; orphans are reclaimed out of band.
    pub async fn discard(&self, filename: &str) {
        if !is_safe_filename(filename) {
            return;
        }
        if let Err(e) = fs::remove_file(self.root.join(filename)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %filename, error = %e, "failed to remove stored file");
            }
        }
    }
}

/// Stream the payload to disk with an independent size ceiling, then
/// fsync. The ceiling is defense in depth against a lying Content-Length
/// or a mismatched outer body limit.
async fn copy_limited(
    file: &mut fs::File,
    head: &[u8],
    overflow: Option<Bytes>,
    field: &mut Field<'_>,
    max_bytes: usize,
) -> ApiResult<()> {
    let mut written = head.len() + overflow.as_ref().map_or(0, |b| b.len());
    if written > max_bytes {
        return Err(file_too_large());
    }

    file.write_all(head).await.context("write upload")?;
    if let Some(chunk) = overflow {
        file.write_all(&chunk).await.context("write upload")?;
    }

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len();
        if written > max_bytes {
            return Err(file_too_large());
        }
        file.write_all(&chunk).await.context("write upload")?;
    }

    file.flush().await.context("flush upload")?;
    file.sync_all().await.context("sync upload")?;
    Ok(())
}

fn file_too_large() -> ApiError {
    ApiError::validation("file too large")
}

fn multipart_error(err: MultipartError) -> ApiError {
    let msg = err.to_string();
    // the outer body limit surfaces as a length-limit read failure
    if msg.to_lowercase().contains("limit") {
        file_too_large()
    } else {
        ApiError::validation(format!("malformed multipart body: {msg}"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Minimal but genuine file headers.
    pub(crate) fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&[0u8; 17]);
        bytes
    }

    pub(crate) fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(&[0x00, 0x10]);
        bytes.extend_from_slice(b"JFIF\0");
        bytes.extend_from_slice(&[0u8; 32]);
        bytes
    }

    #[test]
    fn sniffing_classifies_real_headers() {
        assert_eq!(sniff_image(&png_bytes()), Some(ImageKind::Png));
        assert_eq!(sniff_image(&jpeg_bytes()), Some(ImageKind::Jpeg));
    }

    #[test]
    fn sniffing_rejects_non_images() {
        // PE executable header, GIF, empty, text
        assert_eq!(sniff_image(b"MZ\x90\x00executable"), None);
        assert_eq!(sniff_image(b"GIF89a"), None);
        assert_eq!(sniff_image(b""), None);
        assert_eq!(sniff_image(b"<html></html>"), None);
    }

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("photo.png"), Some(".png"));
        assert_eq!(allowed_extension("photo.PNG"), Some(".png"));
        assert_eq!(allowed_extension("photo.JpEg"), Some(".jpeg"));
        assert_eq!(allowed_extension("photo.jpg"), Some(".jpg"));
        assert_eq!(allowed_extension("payload.exe"), None);
        assert_eq!(allowed_extension("archive.png.zip"), None);
        assert_eq!(allowed_extension("no_extension"), None);
    }

    #[test]
    fn storage_names_are_hex_plus_extension_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let name = generate_storage_name(".png");
            let (stem, ext) = name.rsplit_once('.').unwrap();
            assert_eq!(ext, "png");
            assert_eq!(stem.len(), 32);
            assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(name), "generated a colliding storage name");
        }
    }

    #[test]
    fn traversal_sequences_are_unsafe() {
        assert!(is_safe_filename("abc123.png"));
        assert!(!is_safe_filename("../../etc/passwd"));
        assert!(!is_safe_filename("..evil.png"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename("..png.."));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn open_rejects_traversal_before_touching_disk() {
        // root that does not exist: a traversal must fail on the name
        // alone, never on the filesystem
        let intake = FileIntake::new("/nonexistent-root", 1024);
        let err = intake.open("../../etc/passwd").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn open_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let intake = FileIntake::new(dir.path(), 1024);
        let err = intake.open("0123456789abcdef0123456789abcdef.png").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn open_serves_valid_image_with_sniffed_type() {
        let dir = tempfile::tempdir().unwrap();
        let name = generate_storage_name(".png");
        std::fs::write(dir.path().join(&name), png_bytes()).unwrap();

        let intake = FileIntake::new(dir.path(), 1024);
        let served = intake.open(&name).await.unwrap();
        assert_eq!(served.content_type, "image/png");
        assert_eq!(&served.bytes[..], &png_bytes()[..]);
    }

    #[tokio::test]
    async fn open_refuses_tampered_content_despite_extension() {
        // valid name, disallowed bytes: forbidden on read
        let dir = tempfile::tempdir().unwrap();
        let name = generate_storage_name(".png");
        std::fs::write(dir.path().join(&name), b"MZ\x90\x00 not an image").unwrap();

        let intake = FileIntake::new(dir.path(), 1024);
        let err = intake.open(&name).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn discard_is_silent_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let intake = FileIntake::new(dir.path(), 1024);
        intake.discard("0123456789abcdef0123456789abcdef.png").await;
        intake.discard("../outside.png").await;
    }
}
