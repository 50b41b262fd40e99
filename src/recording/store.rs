use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use uuid::Uuid;

use crate::frame::RawFrame;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Scratch storage for frames between capture and export.
pub trait FrameStore: Send + Sync + 'static {
    fn save(&self, frame: RawFrame, path: &Path) -> Result<(), PersistError>;

    fn load(&self, path: &Path) -> Result<RawFrame, PersistError>;
}

/// Lossless PNG files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngStore;

impl FrameStore for PngStore {
    fn save(&self, frame: RawFrame, path: &Path) -> Result<(), PersistError> {
        let image = frame.into_rgba_image();
        let mut writer = BufWriter::new(File::create(path)?);
        image.write_to(&mut writer, ImageFormat::Png)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<RawFrame, PersistError> {
        let reader = BufReader::new(File::open(path)?);
        let image = image::load(reader, ImageFormat::Png)?.into_rgba8();
        Ok(RawFrame::from_rgba_image(image))
    }
}

/// Hands out unique scratch file names inside one directory.
#[derive(Debug, Clone)]
pub struct TempFiles {
    dir: PathBuf,
}

impl TempFiles {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!("capgif-{}.png", Uuid::new_v4()))
    }
}

impl Default for TempFiles {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}
