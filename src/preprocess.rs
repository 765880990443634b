use crate::error::DecodeError;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{imageops, imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};

/// Side length of the square input the model was trained on.
pub const INPUT_SIZE: u32 = 150;

/// Decodes a base64 payload into a raster image. ASCII whitespace is
/// ignored so MIME-wrapped payloads are accepted.
pub fn decode_image(encoded: &str) -> Result<DynamicImage, DecodeError> {
    let image_data = if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact)?
    } else {
        STANDARD.decode(encoded)?
    };

    let image_reader =
        image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;

    Ok(image_reader.decode()?)
}

/// Builds the `(1, 150, 150, 3)` NHWC input tensor with values in `[0, 1]`.
///
/// Alpha is dropped before resizing, so an RGBA image yields exactly the
/// tensor of its RGB counterpart.
pub fn transform_image(image: &DynamicImage) -> Array<f32, Ix4> {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let size = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }

    input
}
