use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sovra::voice::{
    AudioCapture, AudioPlayback, AudioSource, PLAYBACK_SAMPLE_RATE, SpeechToText, TextToSpeech,
    TtsSynthesizer, rms,
};
use sovra::{CommandInterpreter, Completer, CompletionClient, Config, SessionLoop, SpeakerController};

/// Sovra - always-listening voice co-host
#[derive(Parser)]
#[command(name = "sovra", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/sovra/config.toml)
    #[arg(short, long, env = "SOVRA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Start paused (questions ignored until the turn-on phrase)
    #[arg(long)]
    paused: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker {
        /// Stop the tone early after this many milliseconds
        #[arg(long)]
        cancel_after: Option<u64>,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Send one question to the completion endpoint and print the answer
    Ask {
        /// Question text
        question: String,
    },
    /// Show the configured voice commands
    Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,sovra=info",
        1 => "info,sovra=debug",
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

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.paused {
        config.session.start_enabled = false;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker { cancel_after } => test_speaker(cancel_after).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::Ask { question } => ask(&config, &question).await,
            Command::Commands => {
                print_commands(&config);
                Ok(())
            }
        };
    }

    print_commands(&config);
    listen(config).await
}

/// Run the listening loop until Ctrl+C
#[allow(clippy::future_not_send)]
async fn listen(config: Config) -> anyhow::Result<()> {
    let capture = AudioCapture::new(config.voice.sample_rate)?;
    let recognizer = SpeechToText::new(
        config.voice.stt_provider,
        config.stt_key(),
        config.voice.stt_model.clone(),
        config.voice.language.clone(),
    )?;
    let speaker = SpeakerController::new(Arc::new(synthesizer(&config)?));
    let completer = CompletionClient::new(&config.completion)?;
    let interpreter =
        CommandInterpreter::new(config.triggers.clone(), config.acknowledgements.clone());

    let session = SessionLoop::new(
        Box::new(capture),
        Arc::new(recognizer),
        Arc::new(completer),
        speaker,
        interpreter,
        config.session,
    );

    // Set up shutdown signal
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    tracing::info!("sovra online - press Ctrl+C to stop");
    session.run(shutdown).await?;
    tracing::info!("sovra stopped");

    Ok(())
}

fn synthesizer(config: &Config) -> anyhow::Result<TtsSynthesizer> {
    let tts = TextToSpeech::new(
        config.voice.tts_provider,
        config.tts_key(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
        config.voice.tts_model.clone(),
    )?;
    Ok(TtsSynthesizer::new(tts, AudioPlayback::new()?))
}

/// Print the voice commands for the configured triggers
fn print_commands(config: &Config) {
    let t = &config.triggers;
    println!("Voice commands:");
    println!("  \"{}\"  -> turn answering on", t.turn_on());
    println!("  \"{}\"  -> pause answering", t.pause());
    println!("  \"{}\"  -> stop speaking immediately", t.stop());
    println!(
        "  \"{prefix} ...\"  -> ask a question, e.g. \"{prefix} what is bitcoin?\"",
        prefix = t.wake_prefix()
    );
    println!();
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.voice.sample_rate)?;
    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        let samples = capture.capture_chunk(Duration::from_secs(1)).await?;
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your default input device and its levels.");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker(cancel_after: Option<u64>) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let cancel = CancellationToken::new();
    if let Some(ms) = cancel_after {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            cancel.cancel();
        });
    }

    let outcome = playback.play(samples, cancel).await?;
    println!("Playback ended: {outcome:?}");

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test TTS output through the speaker controller
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let speaker = SpeakerController::new(Arc::new(synthesizer(config)?));
    let request = speaker.speak(text);
    println!("Speaking (id {})...", request.id);
    speaker.wait_until_idle().await;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Ask one question without audio
async fn ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let client = CompletionClient::new(&config.completion)?;
    let answer = client.complete(question).await?;
    println!("{answer}");
    Ok(())
}
