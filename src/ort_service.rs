use crate::{
    config::{ModelConfig, Validatable},
    error::{InferenceError, ModelLoadError},
    model_service::ModelService,
};
use ndarray::{Array, ArrayD, Ix4};
use ort::{
    execution_providers::ExecutionProviderDispatch,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[allow(clippy::vec_init_then_push, unused_mut)]
fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    providers.push(
        ort::execution_providers::TensorRTExecutionProvider::default()
            .with_engine_cache(true)
            .build(),
    );
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    providers
}

fn build_session(model_config: &ModelConfig) -> ort::Result<Session> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(execution_providers())?;
    if let Some(threads) = model_config.intra_threads {
        builder = builder.with_intra_threads(threads)?;
    }
    builder.commit_from_file(model_config.get_path())
}

/// Picks the configured output, or the model's first one, failing if the
/// graph has no such output.
fn resolve_output_name(session: &Session, configured: Option<&str>) -> Result<String, String> {
    let names: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
    match configured {
        Some(name) if names.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(format!(
            "model has no output named `{}` (available: {:?})",
            name, names
        )),
        None => names
            .first()
            .map(|name| name.to_string())
            .ok_or_else(|| "model declares no outputs".to_string()),
    }
}

/// Pool of ONNX Runtime sessions built from one model file. Requests are
/// spread round-robin; every session holds the same weights.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelLoadError> {
        model_config
            .validate()
            .map_err(ModelLoadError::InvalidConfig)?;

        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| build_session(model_config))
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|source| ModelLoadError::Session {
                path: model_config.get_path(),
                source,
            })?;

        let output_name =
            resolve_output_name(&sessions[0], model_config.output_name.as_deref())
                .map_err(ModelLoadError::InvalidConfig)?;

        tracing::info!(
            "Model loaded from {:?} into {} ONNX sessions, reading output `{}`",
            model_config.get_path(),
            num_instances,
            output_name
        );

        let sessions: Vec<_> = sessions
            .into_iter()
            .map(|session| Arc::new(Mutex::new(session)))
            .collect();

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| InferenceError::MissingOutput(self.output_name.clone()))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        Ok(ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())?)
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, input: Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        self.run_inference(&input)
    }
}
