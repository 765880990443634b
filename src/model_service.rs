use crate::error::InferenceError;
use ndarray::{Array, ArrayD, Ix4};

/// A loaded model. Implementations must be safe to call from many threads
/// at once; inference is treated as a read of the model.
pub trait ModelService: Send + Sync + Clone + 'static {
    /// Runs the model on an NHWC batch and returns its raw scores.
    fn predict(&self, input: Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError>;
}
