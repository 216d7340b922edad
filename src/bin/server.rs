use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use log::info;

use subtitle_server::config::Settings;
use subtitle_server::server::{router, AppState};
use subtitle_server::transcription::{FfmpegTool, OpenAiBackend};

#[derive(Default, Debug, Copy, Clone, clap::ValueEnum)]
enum Level {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl From<Level> for log::LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::LevelFilter::Error,
            Level::Warn => log::LevelFilter::Warn,
            Level::Info => log::LevelFilter::Info,
            Level::Debug => log::LevelFilter::Debug,
            Level::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(name = "subtitle-server")]
#[command(version = "0.1.0")]
#[command(about = "Generate English SRT subtitles from uploaded audio/video", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = format!("127.0.0.1"))]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    #[arg(short, long, default_value_t = Level::Info)]
    #[clap(value_enum)]
    level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                chrono::Local::now().format("%H:%M:%S.%6f"),
                record.args()
            )
        })
        .filter(None, cli.level.into())
        .init();

    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    info!(
        "using speech model {} at {}",
        settings.openai_model, settings.openai_base_url
    );

    let state = AppState {
        backend: Arc::new(OpenAiBackend::new(&settings)),
        ffmpeg: Arc::new(FfmpegTool::new()),
    };

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
