use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_session::{
    create_router, AppState, AudioInput, Config, ConversationSession, SessionDevices,
    SessionStatus, WavFileInput, WavFileOutput, WebSocketConnector,
};

/// Output rate used when the config does not force one
const DEFAULT_OUTPUT_RATE: u32 = 16_000;

#[derive(Parser)]
#[command(name = "voice-session", version, about = "Real-time voice conversation client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one conversation with WAV-file audio devices until Ctrl-C
    Run {
        /// Config file (extension optional)
        #[arg(short, long, default_value = "config/voice-session")]
        config: String,
        /// WAV file streamed as the microphone; listen-only when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// WAV file the agent's speech is written to
        #[arg(short, long, default_value = "agent-output.wav")]
        output: PathBuf,
    },
    /// Expose the HTTP control API
    Serve {
        #[arg(short, long, default_value = "config/voice-session")]
        config: String,
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long, default_value = "agent-output.wav")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Voice Session v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run {
            config,
            input,
            output,
        } => {
            let cfg = Config::load(&config)?;
            let (session, output) = build_session(&cfg, input, output)?;
            run_conversation(session).await?;
            output.finish()?;
            info!("Agent audio saved to {}", output.path().display());
        }
        Command::Serve {
            config,
            input,
            output,
        } => {
            let cfg = Config::load(&config)?;
            let (session, _output) = build_session(&cfg, input, output)?;
            serve(&cfg, session).await?;
        }
    }

    Ok(())
}

fn build_session(
    cfg: &Config,
    input: Option<PathBuf>,
    output: PathBuf,
) -> Result<(Arc<ConversationSession>, Arc<WavFileOutput>)> {
    let rate = cfg.audio.output_sampling_rate.unwrap_or(DEFAULT_OUTPUT_RATE);
    let output = Arc::new(WavFileOutput::create(output, rate, true)?);

    let input = input.map(|path| Box::new(WavFileInput::new(path)) as Box<dyn AudioInput>);
    if input.is_none() {
        info!("No input file given, running listen-only");
    }

    let devices = SessionDevices {
        input,
        output: output.clone(),
        connector: Arc::new(WebSocketConnector::new()),
        probe: Arc::new(cfg.runtime.engine),
    };

    let session = ConversationSession::new(
        cfg.conversation.clone(),
        cfg.audio.clone(),
        cfg.runtime.clone(),
        devices,
    );
    Ok((Arc::new(session), output))
}

async fn run_conversation(session: Arc<ConversationSession>) -> Result<()> {
    let mut updates = session.subscribe();

    session
        .start()
        .await
        .context("Failed to start conversation")?;

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping conversation");
                session.stop().await;
                break;
            }
            changed = updates.transcript.changed() => {
                if changed.is_err() {
                    break;
                }
                let transcript = updates.transcript.borrow_and_update().clone();
                if transcript.len() < printed {
                    printed = 0;
                }
                // The last entry may still be growing
                for entry in transcript.iter().skip(printed.saturating_sub(1)) {
                    println!("{:?}: {}", entry.speaker, entry.text);
                }
                printed = transcript.len();
            }
            changed = updates.status.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *updates.status.borrow_and_update();
                match status {
                    SessionStatus::Idle => {
                        info!("Conversation ended by remote");
                        break;
                    }
                    SessionStatus::Error => {
                        if let Some(e) = session.error() {
                            warn!("Conversation failed: {}", e);
                        }
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let stats = session.stats();
    info!(
        "Sent {} chunks, received {} chunks, {} transcript entries",
        stats.chunks_sent, stats.chunks_received, stats.transcript_entries
    );
    Ok(())
}

async fn serve(cfg: &Config, session: Arc<ConversationSession>) -> Result<()> {
    let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
    let app = create_router(AppState::new(session.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down HTTP server");
        })
        .await
        .context("HTTP server failed")?;

    session.stop().await;
    Ok(())
}
