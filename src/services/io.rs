//! Image decoding service
//!
//! Keeps byte and file decoding out of the pipeline so the failure modes
//! (empty upload vs. unparsable bytes) stay distinct.

use crate::error::{PackshotError, Result};
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Service for turning uploaded bytes or files into pixel buffers
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an in-memory image, detecting the format from its content
    ///
    /// # Errors
    /// - `EmptyInput` for zero-length input
    /// - `Decode` when the bytes are not a supported image
    ///
    /// # Examples
    /// ```rust
    /// use packshot::services::ImageIOService;
    ///
    /// assert!(ImageIOService::decode_bytes(&[]).is_err());
    /// assert!(ImageIOService::decode_bytes(b"definitely not an image").is_err());
    /// ```
    pub fn decode_bytes(data: &[u8]) -> Result<DynamicImage> {
        if data.is_empty() {
            return Err(PackshotError::EmptyInput);
        }

        let image = image::load_from_memory(data).map_err(|e| PackshotError::decode(e.to_string()))?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PackshotError::decode(format!(
                "image has zero-sized dimensions {width}x{height}"
            )));
        }

        log::debug!("Decoded {} byte upload into {width}x{height} image", data.len());
        Ok(image)
    }

    /// Read a file and decode it
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `EmptyInput` / `Decode` as for [`ImageIOService::decode_bytes`]
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let data = Self::read_file(path)?;
        Self::decode_bytes(&data)
    }

    /// Read raw bytes from a file
    ///
    /// # Errors
    /// - `Io` naming the path when the file is missing or unreadable
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref).map_err(|e| PackshotError::file_io_error("read image file", path_ref, &e))
    }

    /// Write bytes to a file, creating the parent directory when needed
    ///
    /// # Errors
    /// - `Io` when the directory or file cannot be written
    pub fn write_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PackshotError::file_io_error("create output directory", parent, &e))?;
        }
        std::fs::write(path_ref, bytes).map_err(|e| PackshotError::file_io_error("write output", path_ref, &e))
    }

    /// PNG-encode an RGBA image in memory, the remover's wire format
    ///
    /// # Errors
    /// - `Image` when encoding fails
    pub fn encode_png_rgba(image: &image::RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
        Ok(buffer)
    }
}
