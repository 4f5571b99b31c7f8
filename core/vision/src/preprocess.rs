// dermasense/core/vision/src/preprocess.rs

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::RgbImage;

use crate::types::VisionError;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode an uploaded payload into 8-bit RGB.
///
/// The format is sniffed from the bytes; the declared content type is not
/// trusted. Alpha and palette images are flattened to RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, VisionError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Fixed resize + normalise pipeline feeding the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    pub image_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(224)
    }
}

impl Preprocessor {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Produce a `[1, 3, size, size]` f32 tensor.
    ///
    /// The image is stretched to a square (aspect ratio is not kept) with
    /// bilinear filtering, scaled to [0, 1], then normalised per channel.
    pub fn to_tensor(&self, image: &RgbImage, device: &Device) -> Result<Tensor, VisionError> {
        let size = self.image_size;
        let resized = if image.width() as usize == size && image.height() as usize == size {
            image.clone()
        } else {
            image::imageops::resize(image, size as u32, size as u32, FilterType::Triangle)
        };

        let plane = size * size;
        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                data[c * plane + i] = (value - self.mean[c]) / self.std[c];
            }
        }

        let tensor = Tensor::from_vec(data, (1, 3, size, size), device)?;
        Ok(tensor)
    }
}
