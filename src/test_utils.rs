use crate::{error::InferenceError, model_service::ModelService, preprocess::INPUT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::{arr2, Array, ArrayD, ErrorKind, Ix4, ShapeError};
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Binary classifier stand-in: scores `[1 - mean, mean]` over all input
/// values, so dark images land in class 0 and bright ones in class 1.
#[derive(Clone, Default)]
pub struct MockModelService {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl MockModelService {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelService for MockModelService {
    fn predict(&self, input: Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let size = INPUT_SIZE as usize;
        if self.fail || input.shape() != [1, size, size, 3] {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
        assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));

        let mean = input.mean().unwrap_or(0.0);
        Ok(arr2(&[[1.0 - mean, mean]]).into_dyn())
    }
}

pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
        width,
        height,
        Rgb(color),
    ))
}

pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> String {
    let mut image_data: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut image_data), format)
        .unwrap();
    STANDARD.encode(image_data)
}

pub fn wrap_lines(encoded: &str, width: usize) -> String {
    encoded
        .as_bytes()
        .chunks(width)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join("\r\n")
}
