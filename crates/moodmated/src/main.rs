use anyhow::Result;
use moodmate_core::{classifier, MusicLibrary};
use moodmated::{server, spawn_engine, AppContext, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(
        model = %config.model_path.display(),
        music = %config.music_path.display(),
        "moodmated starting"
    );

    let predictor = classifier::load_or_simulate(&config.model_path);
    let library = MusicLibrary::load_or_empty(&config.music_path);

    let engine = spawn_engine(predictor, config.engine_queue)?;
    tracing::info!(
        backend = engine.backend().as_str(),
        songs = library.len(),
        "moodmated ready"
    );

    let ctx = AppContext::new(engine, library, &config);
    server::run(&config, ctx).await
}
