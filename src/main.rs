use anyhow::Result;
use clap::{Parser, Subcommand};
use parley::integration::{ParleyConfig, Session};
use parley::messages::{AudioClip, FileStorage, Role, Storage};
use parley::proxy::{HttpProxyClient, ProxyClientConfig};
use parley::server::{self, AppState, OpenAiCompatProvider};
use parley::ParleyError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Voice and text chat through hosted AI proxies")]
struct Cli {
    /// Config file (defaults to <data dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the persisted conversation
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the /api/chat and /api/transcribe proxy endpoints
    Serve {
        /// Address to listen on, overriding the config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chat interactively against a running proxy
    Chat {
        /// Proxy base URL, overriding the config
        #[arg(long)]
        proxy: Option<String>,
    },
    /// Print the persisted conversation history
    History,
    /// Clear the persisted conversation
    Clear {
        /// Only clear the context window, keeping the history
        #[arg(long)]
        context_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Serve { bind } => {
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            let provider = OpenAiCompatProvider::from_env(config.upstream.clone())?;
            let state = AppState::new(Arc::new(provider), &config.upstream);
            server::serve(state, &server_config).await?;
        }
        Command::Chat { proxy } => {
            let mut proxy_config = config.proxy.clone();
            if let Some(url) = proxy {
                proxy_config = ProxyClientConfig {
                    base_url: url,
                    ..proxy_config
                };
            }
            let session = open_session(&config, proxy_config)?;
            run_chat(&session).await?;
        }
        Command::History => {
            let session = open_session(&config, config.proxy.clone())?;
            for turn in session.history() {
                let marker = if turn.is_audio { " (voice)" } else { "" };
                println!(
                    "[{}] {}{}: {}",
                    turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    turn.role.label(),
                    marker,
                    turn.content
                );
            }
        }
        Command::Clear { context_only } => {
            let session = open_session(&config, config.proxy.clone())?;
            if context_only {
                session.clear_context();
            } else {
                session.reset();
            }
            println!("Cleared.");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ParleyConfig> {
    let mut config = match &cli.config {
        Some(path) => ParleyConfig::load(path)?,
        None => {
            let data_dir = cli
                .data_dir
                .clone()
                .unwrap_or_else(parley::integration::default_data_dir);
            ParleyConfig::load_or_default(&data_dir)
        }
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    config.validate()?;
    Ok(config)
}

fn open_session(config: &ParleyConfig, proxy_config: ProxyClientConfig) -> Result<Session> {
    let data_dir = config.resolve_data_dir();
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&data_dir)?);
    let client = Arc::new(HttpProxyClient::new(proxy_config)?);
    info!("Using session data in {}", data_dir.display());
    Ok(Session::new(
        config.session.clone(),
        storage,
        client.clone(),
        client,
    ))
}

const HELP: &str = "Commands: /audio <file>  /replay  /context  /clear-context  /clear  /quit";

async fn run_chat(session: &Session) -> Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) | ("/exit", _) => break,
            ("/help", _) => {
                println!("{}", HELP);
                continue;
            }
            ("/replay", _) => {
                match session.last_assistant_reply() {
                    Some(turn) => println!("Assistant: {}", turn.content),
                    None => println!("No reply yet."),
                }
                continue;
            }
            ("/context", _) => {
                for message in session.context() {
                    println!("  {}: {}", message.role.label(), message.content);
                }
                continue;
            }
            ("/clear-context", _) => {
                session.clear_context();
                println!("Context cleared.");
                continue;
            }
            ("/clear", _) => {
                session.reset();
                println!("Conversation cleared.");
                continue;
            }
            ("/audio", path) => match read_audio(Path::new(path.trim())).await {
                Ok(clip) => session.submit_audio(&clip).await,
                Err(e) => Err(e),
            },
            _ => session.submit_text(line).await,
        };

        match result {
            Ok(exchange) => {
                if exchange.user.is_audio {
                    println!("You said: {}", exchange.user.content);
                }
                println!("{}: {}", Role::Assistant.label(), exchange.reply());
            }
            Err(ParleyError::InvalidInput(msg)) => eprintln!("{}", msg),
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    Ok(())
}

async fn read_audio(path: &Path) -> std::result::Result<AudioClip, ParleyError> {
    if path.as_os_str().is_empty() {
        return Err(ParleyError::InvalidInput("Usage: /audio <file>".to_string()));
    }
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ParleyError::InvalidInput(format!("Cannot read {}: {}", path.display(), e)))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording.webm");
    Ok(AudioClip::new(data)
        .with_file_name(file_name)
        .with_mime_type(AudioClip::mime_for_extension(ext)))
}
