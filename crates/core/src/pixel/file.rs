use crate::pixel::{RasterError, RasterSource};
use image::RgbaImage;
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum Pending {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A user-supplied image, decoded on first read.
///
/// Single use: the encoded bytes are dropped as soon as they are read, and later reads
/// return [`RasterError::Consumed`].
#[derive(Debug)]
pub struct ImageFile {
    pending: Option<Pending>,
}

impl ImageFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            pending: Some(Pending::Path(path.as_ref().to_path_buf())),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            pending: Some(Pending::Bytes(bytes)),
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.pending.is_none()
    }
}

impl RasterSource for ImageFile {
    fn read_raster(&mut self) -> Result<RgbaImage, RasterError> {
        let bytes = match self.pending.take() {
            Some(Pending::Bytes(bytes)) => bytes,
            Some(Pending::Path(path)) => std::fs::read(&path)?,
            None => return Err(RasterError::Consumed),
        };
        let decoded = image::load_from_memory(&bytes)?;
        Ok(decoded.to_rgba8())
    }
}
