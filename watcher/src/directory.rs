use std::path::{Path, PathBuf};

use motion_diff_common::config::SourceConfig;
use motion_diff_common::frame::FrameBuffer;
use motion_diff_engine::source::{decode_frame, FrameSource, SourceError};
use tracing::{debug, info};

use crate::WatcherError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays the images of a directory in file-name order, looping forever.
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
    resize: bool,
}

impl DirectorySource {
    pub fn new(config: &SourceConfig, width: u32, height: u32) -> Result<Self, WatcherError> {
        if config.directory.is_empty() {
            return Err(WatcherError::MissingSetting("source.directory"));
        }
        let paths = list_images(Path::new(&config.directory))?;
        info!(directory = %config.directory, frames = paths.len(), "replaying image directory");
        Ok(Self {
            paths,
            next: 0,
            width,
            height,
            resize: config.resize,
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, WatcherError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| WatcherError::Directory(dir.display().to_string(), e))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(WatcherError::EmptyDirectory(dir.display().to_string()));
    }
    Ok(paths)
}

impl FrameSource for DirectorySource {
    async fn acquire_frame(&mut self) -> Result<FrameBuffer, SourceError> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "replaying frame");
        decode_frame(&bytes, self.width, self.height, self.resize)
    }

    fn name(&self) -> &str {
        "directory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, value: u8) {
        RgbaImage::from_pixel(4, 3, Rgba([value, value, value, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    fn source_config(dir: &Path) -> SourceConfig {
        SourceConfig {
            mode: "directory".into(),
            url: String::new(),
            directory: dir.display().to_string(),
            resize: true,
            timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn replays_in_name_order_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        write_png(dir.path(), "c.png", 30);
        std::fs::rename(dir.path().join("c.png"), dir.path().join("c.PNG")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = DirectorySource::new(&source_config(dir.path()), 4, 3).unwrap();
        assert_eq!(source.len(), 3);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let frame = source.acquire_frame().await.unwrap();
            seen.push(frame.pixel(0).unwrap().r);
        }
        assert_eq!(seen, vec![10, 20, 30, 10]);
    }

    #[tokio::test]
    async fn corrupt_image_is_a_cycle_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"garbage").unwrap();
        write_png(dir.path(), "b.png", 50);

        let mut source = DirectorySource::new(&source_config(dir.path()), 4, 3).unwrap();
        assert!(matches!(source.acquire_frame().await, Err(SourceError::Decode(_))));
        assert!(source.acquire_frame().await.is_ok());
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectorySource::new(&source_config(dir.path()), 4, 3),
            Err(WatcherError::EmptyDirectory(_))
        ));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            DirectorySource::new(&source_config(&missing), 4, 3),
            Err(WatcherError::Directory(..))
        ));
    }
}
