use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cca_player::config::{DEFAULT_FOLDER, ONE_SHOT_VOLUME_STEP};
use cca_player::media::absolute_path;
use cca_player::{Controller, MediaSource, NetworkProvider, PlayerConfig, SessionRegistry};
use cca_server::{local_ip, ServerConfig, COVER_IMAGE, DEFAULT_PORT};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use url::Url;

mod cli;
mod console;
mod logging;

use logging::{init_logging, LoggingMode, LOG_FILE};

/// How long mDNS discovery listens for cast devices
pub(crate) const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Stream audio files to Chromecast Audio devices.
///
/// Without a command, starts the interactive player: a keyboard console plus
/// a browser control page served on `--port`.
#[derive(Parser, Debug)]
#[command(name = "stream2cca")]
#[command(about = "Stream audio to Chromecast (Audio)")]
#[command(version)]
pub struct Args {
    /// Device for one-shot commands (default: first audio device, then first group)
    #[arg(short = 'd', long = "device")]
    pub device: Option<String>,

    /// Playlist folder
    #[arg(short, long, default_value = DEFAULT_FOLDER)]
    pub folder: PathBuf,

    /// HTTP port for media files and the control page
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding the control page (default: `web/` next to the executable)
    #[arg(long)]
    pub web_dir: Option<PathBuf>,

    /// Logging mode (default: file for the interactive player, console otherwise)
    #[arg(long, value_enum)]
    pub log_mode: Option<LoggingMode>,

    #[command(subcommand)]
    pub command: Option<OneShot>,
}

/// One-shot commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum OneShot {
    /// List Chromecast Audio and group devices
    List,
    /// Follow the device's playback status
    Status,
    /// Play one file and wait for it to finish
    Playfile { file: PathBuf },
    /// Play the playlist folder shuffled, serving files until stopped
    Playfolder,
    Pause,
    Resume,
    Stop,
    /// Raise the volume by one step
    Volup,
    /// Lower the volume by one step
    Voldown,
    /// Set the volume, 0.0 to 1.0
    Setvol { level: f32 },
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow::anyhow!("Port must not be 0"));
        }

        if self.folder.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Playlist folder must not be empty"));
        }

        if let Some(OneShot::Setvol { level }) = self.command {
            if !(0.0..=1.0).contains(&level) {
                return Err(anyhow::anyhow!(
                    "Invalid volume {}. Specify a value in the range 0.0 to 1.0",
                    level
                ));
            }
        }

        Ok(())
    }

    fn logging_mode(&self) -> LoggingMode {
        self.log_mode.unwrap_or(match self.command {
            None => LoggingMode::File,
            Some(_) => LoggingMode::Console,
        })
    }
}

/// Paths and URLs derived from the arguments
#[derive(Debug, Clone)]
pub struct Config {
    pub device: Option<String>,
    pub folder: PathBuf,
    pub server: ServerConfig,
    pub media: MediaSource,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let folder = absolute_path(&args.folder).context("Invalid playlist folder")?;
        let web_dir = match &args.web_dir {
            Some(dir) => absolute_path(dir).context("Invalid web directory")?,
            None => default_web_dir()?,
        };

        let server = ServerConfig::new(&web_dir, &folder).with_port(args.port);
        let base_url = Url::parse(&format!("http://{}:{}/", local_ip(), args.port))
            .context("Invalid media base URL")?;
        // Web assets are served from the site root.
        let cover_url = base_url.join(COVER_IMAGE).context("Invalid cover URL")?;
        let media = MediaSource::new(base_url, server.serve_root())
            .with_cover(web_dir.join(COVER_IMAGE), cover_url);

        Ok(Self {
            device: args.device.clone(),
            folder,
            server,
            media,
        })
    }

    /// Player settings; one-shot volume commands take bigger steps
    pub fn player_config(&self, one_shot: bool) -> PlayerConfig {
        let config = PlayerConfig::new(self.media.clone()).with_default_folder(&self.folder);
        if one_shot {
            config.with_volume_step(ONE_SHOT_VOLUME_STEP)
        } else {
            config
        }
    }

    pub fn controller(&self, one_shot: bool) -> Controller {
        let provider = Arc::new(NetworkProvider::new(DISCOVERY_TIMEOUT));
        Controller::new(SessionRegistry::new(provider, self.player_config(one_shot)))
    }
}

/// `web/` next to the executable, else `./web`
fn default_web_dir() -> Result<PathBuf> {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("web")))
        .filter(|dir| dir.is_dir());

    match beside_exe {
        Some(dir) => Ok(absolute_path(&dir)?),
        None => Ok(absolute_path(Path::new("web"))?),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = init_logging(args.logging_mode(), Path::new(LOG_FILE)) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::from_args(args)?;
    info!(
        folder = %config.folder.display(),
        serve_root = %config.server.serve_root().display(),
        base_url = %config.media.base_url,
        "starting"
    );

    match &args.command {
        None => console::run(&config),
        Some(command) => cli::run(&config, command),
    }
}
