//! Car photo storage. Uploads arrive as multipart bytes, get decoded and
//! re-encoded to JPEG, and land under the configured image directory as
//! `<car_id>.jpg`. Deleting a car removes its photo.

use image::ImageFormat;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("uploaded data is not a valid image: {0}")]
    Invalid(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image processing task failed")]
    Task,
}

#[derive(Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, car_id: i64) -> PathBuf {
        self.dir.join(format!("{}.jpg", car_id))
    }

    /// Decode the upload and persist it as JPEG. Decoding runs on a blocking
    /// thread, the write goes through tokio fs.
    pub async fn save(&self, car_id: i64, data: Vec<u8>) -> Result<(), ImageStoreError> {
        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ImageStoreError> {
            let img = image::load_from_memory(&data)?;
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
            Ok(buf)
        })
        .await
        .map_err(|_| ImageStoreError::Task)??;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(car_id), encoded).await?;
        info!("Stored image for car {}", car_id);
        Ok(())
    }

    pub async fn load(&self, car_id: i64) -> Option<Vec<u8>> {
        tokio::fs::read(self.path_for(car_id)).await.ok()
    }

    /// Remove a stored photo; a car that never had one is not an error.
    pub async fn delete(&self, car_id: i64) -> Result<(), ImageStoreError> {
        match tokio::fs::remove_file(self.path_for(car_id)).await {
            Ok(()) => {
                info!("Deleted image for car {}", car_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn store() -> ImageStore {
        let dir = std::env::temp_dir()
            .join("rental-system-tests")
            .join(uuid::Uuid::new_v4().to_string());
        ImageStore::new(dir)
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn save_reencodes_and_load_round_trips() {
        let store = store();
        store.save(42, png_bytes()).await.unwrap();

        let stored = store.load(42).await.expect("image should exist");
        let decoded = image::load_from_memory(&stored).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }

    #[tokio::test]
    async fn garbage_upload_is_rejected() {
        let store = store();
        let result = store.save(43, b"definitely not an image".to_vec()).await;
        assert!(matches!(result, Err(ImageStoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store.save(44, png_bytes()).await.unwrap();

        store.delete(44).await.unwrap();
        assert!(store.load(44).await.is_none());

        // Second delete hits a missing file and still succeeds
        store.delete(44).await.unwrap();
    }
}
