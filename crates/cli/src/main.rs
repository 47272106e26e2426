#![deny(warnings)]

mod render;

use affectscope_core::config::{
    resolve_string_with_default, resolve_u32, EngineConfig, Env, RasterWidth, RefreshRate,
    SpeechLang, SpeechSettings, StdEnv, DEFAULT_RASTER_WIDTH, DEFAULT_REFRESH_HZ,
    DEFAULT_SPEECH_LANG, ENV_RASTER_WIDTH, ENV_REFRESH_HZ, ENV_SPEECH_LANG,
};
use affectscope_core::emotion::{EmotionVector, Lexicon};
use affectscope_core::pixel::{self, ImageFile};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "affectscope")]
#[command(about = "Heuristic affect estimation for text, images and live microphone input")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print machine-readable JSON instead of bar charts.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, env = ENV_REFRESH_HZ)]
    refresh_hz: Option<u32>,

    #[arg(long, global = true, env = ENV_RASTER_WIDTH)]
    raster_width: Option<u32>,

    #[arg(long, global = true, env = ENV_SPEECH_LANG)]
    speech_lang: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score text with the keyword lexicon (reads stdin when TEXT is omitted).
    Text { text: Option<String> },
    /// Score an image file from its colors.
    Image { path: PathBuf },
    /// Show a live microphone energy meter.
    Listen {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(&args, &env)?;

    tracing::info!(
        refresh_hz = cfg.refresh.hz,
        raster_width = cfg.raster_width.get(),
        speech_lang = %cfg.speech.lang.as_str(),
        "config loaded"
    );

    match args.command {
        Command::Text { text } => run_text(text, args.json),
        Command::Image { path } => run_image(&path, &cfg, args.json),
        Command::Listen { seconds } => run_listen(cfg, seconds, args.json).await,
    }
}

fn run_text(text: Option<String>, json: bool) -> anyhow::Result<()> {
    let text = match text {
        Some(t) => t,
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?,
    };
    let scores = Lexicon::default().score(&text);
    print_scores(&scores, json)
}

fn run_image(path: &std::path::Path, cfg: &EngineConfig, json: bool) -> anyhow::Result<()> {
    let mut file = ImageFile::open(path);
    let scores = pixel::try_score_raster(&mut file, cfg.raster_width.get())
        .with_context(|| format!("failed to score image {}", path.display()))?;
    print_scores(&scores, json)
}

fn print_scores(scores: &EmotionVector, json: bool) -> anyhow::Result<()> {
    if json {
        let out = serde_json::json!({
            "scores": scores,
            "dominant": scores.dominant(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for line in render::emotion_bars(scores) {
        println!("{line}");
    }
    println!("dominant: {}", scores.dominant());
    Ok(())
}

#[cfg(feature = "microphone")]
async fn run_listen(cfg: EngineConfig, seconds: u64, json: bool) -> anyhow::Result<()> {
    use affectscope_core::capture::{CaptureEvent, CpalDeviceProvider, StartOutcome};
    use affectscope_core::AffectEngine;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast::error::RecvError;

    const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

    let provider = Arc::new(CpalDeviceProvider::new(cfg.analyser_window));
    let mut engine = AffectEngine::new(cfg, provider);
    let mut events = engine.subscribe_audio();

    let handle = match engine.start_audio_capture().await {
        StartOutcome::Started(id) | StartOutcome::AlreadyRunning(id) => id,
        StartOutcome::Failed => {
            let mut reason = String::from("unknown error");
            while let Ok(ev) = events.try_recv() {
                if let CaptureEvent::StartFailed { reason: r } = ev {
                    reason = r;
                }
            }
            anyhow::bail!("microphone capture failed to start: {reason}");
        }
    };

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    let mut last_draw: Option<tokio::time::Instant> = None;
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            ev = events.recv() => match ev {
                Ok(CaptureEvent::Update(update)) => {
                    let now = tokio::time::Instant::now();
                    if last_draw.is_some_and(|t| now.duration_since(t) < REDRAW_INTERVAL) {
                        continue;
                    }
                    last_draw = Some(now);

                    if json {
                        let out = serde_json::json!({
                            "update": &update,
                            "transcript_emotion": update
                                .transcript
                                .as_ref()
                                .map(|_| update.transcript_emotion(engine.text_scorer())),
                        });
                        writeln!(stdout, "{}", serde_json::to_string(&out)?)?;
                    } else {
                        write!(stdout, "\r{}", render::energy_meter(update.energy))?;
                        stdout.flush()?;
                    }
                }
                Ok(CaptureEvent::StateChanged(state)) => {
                    tracing::debug!(%state, "audio capture state");
                }
                Ok(CaptureEvent::StartFailed { reason }) => {
                    tracing::warn!(%reason, "audio capture failed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "meter fell behind, skipping updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop_audio_capture(handle);
    if !json {
        writeln!(stdout)?;
    }
    Ok(())
}

#[cfg(not(feature = "microphone"))]
async fn run_listen(_cfg: EngineConfig, _seconds: u64, _json: bool) -> anyhow::Result<()> {
    anyhow::bail!("this build has no microphone support (enable the `microphone` feature)")
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: &Args, env: &impl Env) -> anyhow::Result<EngineConfig> {
    let refresh = RefreshRate::new(resolve_u32(
        args.refresh_hz,
        ENV_REFRESH_HZ,
        env,
        DEFAULT_REFRESH_HZ,
    )?)?;
    let raster_width = RasterWidth::new(resolve_u32(
        args.raster_width,
        ENV_RASTER_WIDTH,
        env,
        DEFAULT_RASTER_WIDTH,
    )?)?;
    let lang = SpeechLang::new(resolve_string_with_default(
        args.speech_lang.clone(),
        ENV_SPEECH_LANG,
        env,
        DEFAULT_SPEECH_LANG,
    ))?;

    Ok(EngineConfig {
        refresh,
        raster_width,
        speech: SpeechSettings {
            lang,
            ..SpeechSettings::default()
        },
        ..EngineConfig::default()
    })
}
