use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_satellite::voice::{
    AplayPlayback, ArecordCapture, AudioCapture, AudioPlayback, ElevenLabsTts, PerplexityClient,
    QueryClient, SpeechSynthesizer,
};
use voice_satellite::{Config, Indicator, TurnOrchestrator, WakeListener};

/// Voice Satellite - wake-word voice assistant
#[derive(Parser)]
#[command(name = "satellite", version, about)]
struct Cli {
    /// Listener URI (overrides config), e.g. tcp://0.0.0.0:10700
    #[arg(long)]
    uri: Option<String>,

    /// Config file (defaults to ~/.config/voice-satellite/config.toml)
    #[arg(short, long, env = "SATELLITE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone and play the recording back
    TestAudio {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Ask the query service a question and print the cleaned answer
    TestQuery {
        /// Question to ask
        #[arg(default_value = "What is the capital of France?")]
        question: String,
    },
    /// Synthesize text and play it
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Run one turn now and print the outcome as JSON
    Turn,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_satellite=info",
        1 => "info,voice_satellite=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(uri) = cli.uri {
        config.listener.uri = uri;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestAudio { duration } => test_audio(&config, duration).await,
            Command::TestQuery { question } => test_query(&config, &question).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::Turn => run_turn(&config).await,
        };
    }

    let orchestrator = Arc::new(TurnOrchestrator::from_config(&config, Indicator::new())?);
    let listener = WakeListener::bind(&config.listener.uri, orchestrator).await?;

    tracing::info!(uri = %config.listener.uri, "voice satellite ready");

    // Run until interrupted
    listener
        .run(async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

/// Record then play back the recording
async fn test_audio(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Recording for {duration} seconds... Please speak something.");

    let capture = ArecordCapture::new(config.capture.clone());
    let recording = capture.capture(Duration::from_secs(duration)).await?;
    println!(
        "Captured {} bytes to {}",
        recording.size().await?,
        recording.path().display()
    );

    println!("\nPlaying back the recording...");
    let playback = AplayPlayback::new(config.playback.clone());
    playback.play(recording).await?;

    println!("\n---");
    println!("If you heard yourself, capture and playback are working!");
    println!("If not, check:");
    println!("  1. Run: arecord -l (to list capture devices)");
    println!("  2. Run: aplay -l (to list playback devices)");
    println!("  3. Set SATELLITE_CAPTURE_DEVICE to the right card");

    Ok(())
}

/// Ask one question and print the answer
async fn test_query(config: &Config, question: &str) -> anyhow::Result<()> {
    println!("Question: {question}");

    let client = PerplexityClient::new(&config.query)?;
    let answer = client.query(question).await?;

    println!("Answer: {answer}");
    Ok(())
}

/// Synthesize text and play it
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = ElevenLabsTts::new(&config.synthesis, config.playback.sample_rate)?;

    println!("Synthesizing speech...");
    let speech = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", speech.size().await?);

    println!("Playing audio...");
    AplayPlayback::new(config.playback.clone()).play(speech).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Run a single turn as if the wake word had been heard
async fn run_turn(config: &Config) -> anyhow::Result<()> {
    let orchestrator = TurnOrchestrator::from_config(config, Indicator::new())?;
    let outcome = orchestrator.handle_wake_word().await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
