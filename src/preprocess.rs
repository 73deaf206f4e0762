//! Image preprocessing ahead of recognition.
//!
//! Produces a high-contrast black/white copy of the input: grayscale,
//! median denoise, 3x3 sharpen, adaptive threshold. Best-effort only: on
//! any failure the caller keeps using the original image.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageFormat, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::{filter3x3, median_filter};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::scratch::ScratchFile;

/// Center-weighted 3x3 sharpening kernel.
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Window radius for adaptive binarization (11x11 pixel window).
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

pub struct Preprocessor {
    config: Arc<ServiceConfig>,
}

impl Preprocessor {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Write an enhanced copy of `source` to a fresh scratch file.
    pub async fn enhance(&self, source: &Path) -> Result<ScratchFile, PipelineError> {
        let output = ScratchFile::allocate(&self.config.temp_dir, "processed", "png");
        let src = source.to_path_buf();
        let dst = output.path().to_path_buf();

        tokio::task::spawn_blocking(move || enhance_sync(&src, &dst))
            .await
            .map_err(|err| PipelineError::Encode(format!("preprocessing task failed: {err}")))??;

        Ok(output)
    }
}

fn enhance_sync(source: &Path, dest: &Path) -> Result<(), PipelineError> {
    let gray = decode_image(source)?.to_luma8();
    let denoised = median_filter(&gray, 1, 1);
    let sharpened = filter3x3::<Luma<u8>, f32, u8>(&denoised, &SHARPEN_KERNEL);
    let binarized = adaptive_threshold(&sharpened, ADAPTIVE_BLOCK_RADIUS);
    binarized
        .save(dest)
        .map_err(|err| PipelineError::Encode(err.to_string()))?;
    debug!("preprocessed {:?} -> {:?}", source, dest);
    Ok(())
}

/// Two-step decode: first by the file's declared extension, then by content
/// sniffing for files whose extension does not match the payload.
fn decode_image(path: &Path) -> Result<DynamicImage, PipelineError> {
    if let Ok(format) = ImageFormat::from_path(path) {
        let reader = BufReader::new(File::open(path)?);
        if let Ok(img) = image::load(reader, format) {
            return Ok(img);
        }
    }

    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| PipelineError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join("ocr-server-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// 64x64 checkerboard with enough structure for the filters to chew on.
    fn checkerboard() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Luma([230u8])
            } else {
                Luma([25u8])
            }
        })
    }

    #[test]
    fn test_enhance_produces_binary_image() {
        let dir = temp_dir();
        let src = ScratchFile::allocate(&dir, "in", "png");
        let dst = ScratchFile::allocate(&dir, "out", "png");
        checkerboard().save(src.path()).unwrap();

        enhance_sync(src.path(), dst.path()).unwrap();

        let processed = image::open(dst.path()).unwrap().to_luma8();
        assert_eq!(processed.dimensions(), (64, 64));
        assert!(processed.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        let dir = temp_dir();
        let src = ScratchFile::allocate(&dir, "garbage", "png");
        let dst = ScratchFile::allocate(&dir, "out", "png");
        std::fs::write(src.path(), b"definitely not an image").unwrap();

        assert!(enhance_sync(src.path(), dst.path()).is_err());
        assert!(!dst.path().exists());
    }

    #[test]
    fn test_decode_falls_back_to_content_sniffing() {
        let dir = temp_dir();
        // JPEG payload behind a .png name: the extension-driven attempt
        // fails, the sniffing fallback succeeds.
        let mislabeled = ScratchFile::allocate(&dir, "mislabeled", "png");
        checkerboard()
            .save_with_format(mislabeled.path(), ImageFormat::Jpeg)
            .unwrap();

        let decoded = decode_image(mislabeled.path()).unwrap();
        assert_eq!(decoded.to_luma8().dimensions(), (64, 64));
    }

    #[tokio::test]
    async fn test_enhance_cleans_up_with_its_guard() {
        let dir = temp_dir();
        let config = Arc::new(crate::config::test_config(&dir));
        let preprocessor = Preprocessor::new(config);

        let src = ScratchFile::allocate(&dir, "in", "png");
        checkerboard().save(src.path()).unwrap();

        let processed_path = {
            let processed = preprocessor.enhance(src.path()).await.unwrap();
            assert!(processed.path().exists());
            processed.path().to_path_buf()
        };
        assert!(!processed_path.exists());
    }

    #[tokio::test]
    async fn test_enhance_missing_file_is_an_error() {
        let dir = temp_dir();
        let config = Arc::new(crate::config::test_config(&dir));
        let preprocessor = Preprocessor::new(config);

        let missing = dir.join("does_not_exist.png");
        assert!(preprocessor.enhance(&missing).await.is_err());
    }
}
