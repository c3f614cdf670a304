use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Directory holding request-scoped image uploads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

/// An uploaded image written to disk for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: PathBuf,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Files written for a single submission. Paths are recorded before any
/// bytes land on disk so [`UploadBatch::cleanup`] also removes partial
/// writes.
#[derive(Debug)]
pub struct UploadBatch {
    id: Uuid,
    base_path: PathBuf,
    images: Vec<StoredImage>,
}

impl UploadStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn begin(&self) -> UploadBatch {
        UploadBatch {
            id: Uuid::new_v4(),
            base_path: self.base_path.clone(),
            images: Vec::new(),
        }
    }

    /// Remove upload files a previous process left behind. Only regular
    /// files named like [`UploadBatch::create_file`] output are touched.
    pub async fn purge_orphans(&self) -> Result<usize, AppError> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if !entry.file_name().to_str().is_some_and(is_batch_file_name) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove orphaned upload"
                ),
            }
        }

        Ok(removed)
    }
}

impl UploadBatch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[StoredImage] {
        &self.images
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.images.iter().map(|i| i.path.clone()).collect()
    }

    /// Reserve a path for the next image and open it for writing.
    pub async fn create_file(
        &mut self,
        original_name: &str,
        mime_type: &str,
    ) -> Result<(usize, fs::File), AppError> {
        let index = self.images.len();
        let path = self.base_path.join(format!(
            "{}_{:02}.{}",
            self.id,
            index,
            extension_for(mime_type)
        ));

        self.images.push(StoredImage {
            path: path.clone(),
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            size: 0,
        });

        let file = fs::File::create(&path).await?;
        Ok((index, file))
    }

    pub fn record_size(&mut self, index: usize, size: u64) {
        if let Some(image) = self.images.get_mut(index) {
            image.size = size;
        }
    }

    /// Best-effort delete of every file in the batch. Failures are logged,
    /// never returned.
    pub async fn cleanup(self) {
        let mut removed = 0;
        for image in &self.images {
            match fs::remove_file(&image.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    batch_id = %self.id,
                    path = %image.path.display(),
                    error = %e,
                    "Failed to delete uploaded file"
                ),
            }
        }

        tracing::debug!(
            batch_id = %self.id,
            removed = removed,
            "Cleaned up uploaded files"
        );
    }
}

/// `<batch-uuid>_<index>.<ext>`
fn is_batch_file_name(name: &str) -> bool {
    let Some((batch_id, rest)) = name.split_once('_') else {
        return false;
    };
    let Some((index, extension)) = rest.split_once('.') else {
        return false;
    };

    Uuid::parse_str(batch_id).is_ok()
        && !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && !extension.is_empty()
        && extension.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "img",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn write(batch: &mut UploadBatch, name: &str, mime: &str, data: &[u8]) -> PathBuf {
        let (index, mut file) = batch.create_file(name, mime).await.unwrap();
        file.write_all(data).await.unwrap();
        file.flush().await.unwrap();
        batch.record_size(index, data.len() as u64);
        batch.images()[index].path.clone()
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("nested").join("uploads");

        let store = UploadStore::new(&dir).await.unwrap();
        assert!(store.base_path().is_dir());
    }

    #[tokio::test]
    async fn batch_files_are_unique_and_removed_on_cleanup() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path()).await.unwrap();

        let mut first = store.begin();
        let mut second = store.begin();
        let a = write(&mut first, "q1.png", "image/png", b"one").await;
        let b = write(&mut second, "q1.png", "image/png", b"two").await;

        assert_ne!(a, b);
        assert!(a.extension().is_some_and(|e| e == "png"));
        assert_eq!(first.images()[0].size, 3);
        assert_eq!(first.images()[0].original_name, "q1.png");

        first.cleanup().await;
        assert!(!a.exists());
        assert!(b.exists());

        second.cleanup().await;
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn cleanup_tolerates_files_already_gone() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path()).await.unwrap();

        let mut batch = store.begin();
        let path = write(&mut batch, "q.jpg", "image/jpeg", b"data").await;
        std::fs::remove_file(&path).unwrap();

        batch.cleanup().await;
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn purges_only_leftover_upload_files() {
        let root = TempDir::new().unwrap();
        let store = UploadStore::new(root.path()).await.unwrap();

        let mut crashed = store.begin();
        let first = write(&mut crashed, "q1.png", "image/png", b"x").await;
        let second = write(&mut crashed, "q2.jpg", "image/jpeg", b"y").await;

        std::fs::write(root.path().join("report.docx"), b"operator file").unwrap();
        std::fs::write(root.path().join("stale_00.png"), b"not ours").unwrap();
        std::fs::create_dir(root.path().join(format!("{}_00.png", Uuid::new_v4()))).unwrap();

        assert_eq!(store.purge_orphans().await.unwrap(), 2);
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(root.path().join("report.docx").exists());
        assert!(root.path().join("stale_00.png").exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 3);
    }

    #[test]
    fn recognises_batch_file_names() {
        let id = Uuid::new_v4();
        assert!(is_batch_file_name(&format!("{}_00.png", id)));
        assert!(is_batch_file_name(&format!("{}_59.img", id)));

        assert!(!is_batch_file_name("report.docx"));
        assert!(!is_batch_file_name("stale_00.png"));
        assert!(!is_batch_file_name(&format!("{}_00", id)));
        assert!(!is_batch_file_name(&format!("{}_ab.png", id)));
        assert!(!is_batch_file_name(&format!("{}.png", id)));
    }

    #[test]
    fn extensions_follow_mime_type() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("image/svg+xml"), "img");
    }
}
