use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodmate_core::{classifier, preprocess, Emotion, MusicLibrary};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "moodmate", about = "MoodMate emotion and music diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the emotion in an image file and recommend songs
    Classify {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
        /// ONNX emotion model (default: next to the executable)
        #[arg(long)]
        model: Option<PathBuf>,
        /// Music library CSV (default: next to the executable)
        #[arg(long)]
        music: Option<PathBuf>,
    },
    /// Recommend songs for an emotion label (unknown labels mean Neutral)
    Recommend {
        /// Emotion label, e.g. "Happy"
        emotion: String,
        /// Music library CSV (default: next to the executable)
        #[arg(long)]
        music: Option<PathBuf>,
    },
    /// List emotion labels and their ids
    Labels,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { image, model, music } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let input = preprocess::normalize_bytes(&bytes)?;
            tracing::debug!(path = %image.display(), bytes = bytes.len(), "image normalized");

            let model = model.unwrap_or_else(moodmate_core::default_model_path);
            let mut predictor = classifier::load_or_simulate(&model);
            tracing::info!(
                backend = predictor.backend().as_str(),
                model = %model.display(),
                "classifier ready"
            );
            let scores = predictor.predict(&input)?;
            let prediction = classifier::interpret(&scores, predictor.backend())?;

            let library = load_library(music);
            let recommendation = library.recommend(prediction.emotion);

            let out = json!({
                "emotion": prediction.emotion,
                "confidence": prediction.confidence_percent(),
                "backend": prediction.backend,
                "scores": Emotion::ALL
                    .iter()
                    .zip(prediction.scores.iter())
                    .map(|(e, s)| (e.label().to_string(), json!(s)))
                    .collect::<serde_json::Map<_, _>>(),
                "selection": recommendation.selection,
                "songs": recommendation.songs,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Recommend { emotion, music } => {
            let library = load_library(music);
            let recommendation = library.recommend_for_label(&emotion);
            let out = json!({
                "selection": recommendation.selection,
                "songs": recommendation.songs,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Labels => {
            for emotion in Emotion::ALL {
                println!("{}  {}", emotion.id(), emotion);
            }
        }
    }

    Ok(())
}

fn load_library(path: Option<PathBuf>) -> MusicLibrary {
    let path = path.unwrap_or_else(moodmate_core::default_music_path);
    let library = MusicLibrary::load_or_empty(&path);
    tracing::info!(
        path = %path.display(),
        songs = library.len(),
        category_column = library.has_category_column(),
        "music library ready"
    );
    library
}
