use crate::{
    config::{Config, ServerConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};

#[derive(Clone)]
pub struct SharedState<M: ModelService> {
    pub inference_service: InferenceService<M>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router<M: ModelService>(state: SharedState<M>, max_body_bytes: usize) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model_service: impl ModelService,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let state = SharedState {
            inference_service: InferenceService::new(model_service),
            metrics: Arc::new(Metrics::new()?),
        };
        let router = build_router(state, config.max_body_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown")
        };
        self.run_until(shutdown).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        tracing::info!("Prediction service listening on {}", self.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Prediction service stopped");
        Ok(())
    }
}

/// Loads the model, then serves. A model that fails to load stops startup
/// before the listener is bound.
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let ort_model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to load model: {}", e);
            return Err(e.into());
        }
    };

    let server = HttpServer::new(ort_model_service, &config.server).await?;
    server.run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ModelConfig,
        routes::PredictionResponse,
        test_utils::{encode_image, solid_rgb, MockModelService},
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };
    use tower::ServiceExt;

    fn test_router(model_service: MockModelService, max_body_bytes: usize) -> Router {
        let state = SharedState {
            inference_service: InferenceService::new(model_service),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        build_router(state, max_body_bytes)
    }

    fn app() -> Router {
        test_router(MockModelService::default(), 1024 * 1024)
    }

    fn predict_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn image_body(image: &DynamicImage, format: ImageFormat) -> String {
        json!({ "image": encode_image(image, format) }).to_string()
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "running" }));
    }

    #[tokio::test]
    async fn test_health_check_ignores_model_state() {
        let response = test_router(MockModelService::failing(), 1024)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_success() {
        let body = image_body(&solid_rgb(150, 150, [0, 0, 0]), ImageFormat::Jpeg);
        let response = app()
            .oneshot(predict_request("/predict/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let prediction = json["prediction"].as_u64().unwrap();
        assert!(prediction < 2);
    }

    #[tokio::test]
    async fn test_predict_without_trailing_slash() {
        let body = image_body(&solid_rgb(150, 150, [255, 255, 255]), ImageFormat::Png);
        let response = app().oneshot(predict_request("/predict", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "prediction": 1 }));
    }

    #[tokio::test]
    async fn test_predict_invalid_image() {
        let body = json!({ "image": "invalid_base64_string" }).to_string();
        let response = app()
            .oneshot(predict_request("/predict/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Prediction failed" })
        );
    }

    #[tokio::test]
    async fn test_predict_model_failure_is_generic() {
        let body = image_body(&solid_rgb(150, 150, [0, 0, 0]), ImageFormat::Png);
        let response = test_router(MockModelService::failing(), 1024 * 1024)
            .oneshot(predict_request("/predict/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Prediction failed" })
        );
    }

    #[tokio::test]
    async fn test_predict_rgba_matches_rgb() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            120,
            90,
            Rgba([250, 250, 250, 40]),
        ));
        let rgb = solid_rgb(120, 90, [250, 250, 250]);

        let app = app();
        let rgba_response = app
            .clone()
            .oneshot(predict_request(
                "/predict/",
                image_body(&rgba, ImageFormat::Png),
            ))
            .await
            .unwrap();
        let rgb_response = app
            .oneshot(predict_request(
                "/predict/",
                image_body(&rgb, ImageFormat::Png),
            ))
            .await
            .unwrap();

        assert_eq!(rgba_response.status(), StatusCode::OK);
        let rgba_json: PredictionResponse =
            serde_json::from_value(body_json(rgba_response).await).unwrap();
        let rgb_json: PredictionResponse =
            serde_json::from_value(body_json(rgb_response).await).unwrap();
        assert_eq!(rgba_json.prediction, rgb_json.prediction);
    }

    #[tokio::test]
    async fn test_predict_missing_field_is_rejected() {
        let response = app()
            .oneshot(predict_request("/predict/", json!({}).to_string()))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_predict_body_limit() {
        let body = json!({ "image": "A".repeat(4096) }).to_string();
        let response = test_router(MockModelService::default(), 1024)
            .oneshot(predict_request("/predict/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = app();
        let body = json!({ "image": "invalid_base64_string" }).to_string();
        app.clone()
            .oneshot(predict_request("/predict/", body))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("predictions_total"));
    }

    #[tokio::test]
    async fn test_server_serves_until_shutdown() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_body_bytes: 1024,
        };
        let server = HttpServer::new(MockModelService::default(), &config)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            shutdown_rx.await.ok();
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#"{"status":"running"}"#));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_start_server_fails_without_model() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_body_bytes: 1024,
            },
            model: ModelConfig {
                model_dir: PathBuf::from("./no_such_dir"),
                onnx_file: "model.onnx".to_string(),
                num_instances: 1,
                intra_threads: None,
                output_name: None,
            },
            log_level: crate::config::LogLevel::Info,
            log_file: None,
        };

        assert!(start_server(config).await.is_err());
    }
}
