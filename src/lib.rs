mod inference_service;
mod model_service;
mod ort_service;
mod preprocess;
mod routes;
mod server;

pub mod config;
pub mod error;
pub mod telemetry;

#[cfg(test)]
mod test_utils;

pub use inference_service::{argmax, classify, InferenceService};
pub use model_service::ModelService;
pub use ort_service::OrtModelService;
pub use preprocess::{decode_image, transform_image, INPUT_SIZE};
pub use routes::{ImageRequest, PredictionResponse};
pub use server::{build_router, start_server, HttpServer, SharedState};
