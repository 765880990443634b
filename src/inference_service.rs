use crate::{
    error::{InferenceError, PredictionError},
    model_service::ModelService,
    preprocess::{decode_image, transform_image},
};
use ndarray::{ArrayD, Axis};
use std::sync::Arc;

/// Index of the highest score in the first batch entry. The first index
/// wins on ties and NaN never wins.
pub fn argmax(outputs: &ArrayD<f32>) -> Result<usize, InferenceError> {
    let scores = if outputs.ndim() > 1 {
        if outputs.shape()[0] == 0 {
            return Err(InferenceError::EmptyOutput);
        }
        outputs.index_axis(Axis(0), 0)
    } else {
        outputs.view()
    };

    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &score)| match best {
            Some((_, best_score)) if score > best_score => Some((index, score)),
            None if !score.is_nan() => Some((index, score)),
            _ => best,
        })
        .map(|(index, _)| index)
        .ok_or(InferenceError::EmptyOutput)
}

/// Runs the whole decode, preprocess, infer and classify chain.
pub fn classify<M: ModelService>(model: &M, encoded_image: &str) -> Result<usize, PredictionError> {
    let image = decode_image(encoded_image)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        "Preprocessing image"
    );
    let input = transform_image(&image);
    let outputs = model.predict(input)?;

    Ok(argmax(&outputs)?)
}

#[derive(Debug, Clone)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    /// Classifies one image on the blocking thread pool.
    pub async fn predict(&self, encoded_image: String) -> Result<usize, PredictionError> {
        let model_service = self.model_service.clone();
        let class_id =
            tokio::task::spawn_blocking(move || classify(&*model_service, &encoded_image))
                .await
                .map_err(InferenceError::from)??;

        tracing::info!("Prediction made: {}", class_id);
        Ok(class_id)
    }
}
