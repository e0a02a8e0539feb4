use careers_common::model::image::{ImageUpload, POST_IMAGE_DIR, StoredImage};
use rand::{Rng, distr::Alphanumeric};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// Route under which [`MediaStore`] files are served.
pub const MEDIA_PATH: &str = "/media";

const MAX_NAME_ATTEMPTS: usize = 16;

/// Uploaded files on the local filesystem.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the image under `post_images/`. An existing file is never
    /// overwritten; a random suffix is added to the name instead.
    pub async fn store_post_image(&self, image: &ImageUpload) -> std::io::Result<StoredImage> {
        let directory = self.root.join(POST_IMAGE_DIR);
        fs::create_dir_all(&directory).await?;

        let stem = image.sanitized_stem();
        let extension = image.format.extension();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}_{}.{extension}", random_suffix())
            };

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(directory.join(&file_name))
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            };
            file.write_all(&image.bytes).await?;
            file.flush().await?;

            let stored = StoredImage::new(format!("{POST_IMAGE_DIR}/{file_name}"));
            debug!(name = stored.name(), bytes = image.bytes.len(), "Stored image");
            return Ok(stored);
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {stem}.{extension}"),
        ))
    }

    /// Removes a stored image that ended up unreferenced. Failures are only logged.
    pub async fn discard(&self, image: &StoredImage) {
        match fs::remove_file(self.root.join(image.name())).await {
            Ok(()) => debug!(name = image.name(), "Discarded image"),
            Err(err) => warn!(name = image.name(), %err, "Could not discard image"),
        }
    }
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::server::media::{MEDIA_PATH, MediaStore};
    use careers_common::model::image::{ImageFormat, ImageUpload, MEDIA_URL};

    fn png(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_owned(),
            format: ImageFormat::Png,
            bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3],
        }
    }

    #[test]
    fn served_where_urls_point() {
        assert_eq!(MEDIA_URL, format!("{MEDIA_PATH}/"));
    }

    #[tokio::test]
    async fn names_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let store = MediaStore::new(root.path().to_owned());

        let first = store.store_post_image(&png("cat.png")).await.unwrap();
        let second = store.store_post_image(&png("cat.png")).await.unwrap();

        assert_eq!(first.name(), "post_images/cat.png");
        assert_ne!(first, second);
        assert!(second.name().starts_with("post_images/cat_"));

        let written = std::fs::read(root.path().join(second.name())).unwrap();
        assert_eq!(written, png("cat.png").bytes);
    }

    #[tokio::test]
    async fn discard_removes_the_file() {
        let root = tempfile::tempdir().unwrap();
        let store = MediaStore::new(root.path().to_owned());

        let stored = store.store_post_image(&png("dog.png")).await.unwrap();
        let path = root.path().join(stored.name());
        assert!(path.exists());

        store.discard(&stored).await;
        assert!(!path.exists());

        // Discarding twice is harmless.
        store.discard(&stored).await;
    }
}
