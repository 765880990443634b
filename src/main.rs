use image_classifier::{config, start_server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_configuration()?;
    telemetry::init_tracing(&config)?;

    start_server(config).await
}
