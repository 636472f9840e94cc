//! `pushsub` command line: query and change channel subscriptions against a
//! push-routing backend, or run an in-memory backend for local development.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    clap::{Args, Parser, Subcommand},
    pushsub_common::{Channel, ChannelRange, DeviceToken},
    pushsub_config::{ConnectionConfig, PushConfig},
    pushsub_core::{CallOptions, DetachedPlatform, PushService},
    pushsub_rpc::{MemoryBackend, RpcGateway, TcpConnector},
    tokio::net::TcpListener,
    tracing::info,
    tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser, Debug)]
#[command(name = "pushsub", author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to `$PUSHSUB_CONFIG`, then the user config dir).
    #[arg(long, global = true, env = "PUSHSUB_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an in-memory backend speaking the subscription protocol.
    Serve {
        #[arg(long, default_value = "127.0.0.1:4040")]
        bind: String,
    },
    /// Subscribe to a channel, or unsubscribe with `--off`.
    Set {
        #[command(flatten)]
        client: ClientArgs,
        channel: String,
        #[arg(long)]
        off: bool,
    },
    /// Show whether the device is subscribed to a channel.
    Status {
        #[command(flatten)]
        client: ClientArgs,
        channel: String,
    },
    /// List subscribed channels.
    List {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = ChannelRange::default().count)]
        count: u32,
    },
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Backend host; overrides the `[connection]` config section.
    #[arg(long, env = "PUSHSUB_SERVER")]
    server: Option<String>,

    #[arg(long, env = "PUSHSUB_PORT", default_value_t = 4040)]
    port: u16,

    /// Device token as hex.
    #[arg(long, env = "PUSHSUB_TOKEN")]
    token: String,
}

fn init_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("pushsub={0},pushsub_core={0},pushsub_rpc={0}", cli.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PushConfig> {
    match path {
        Some(path) => pushsub_config::load_from_path(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(pushsub_config::discover_and_load()),
    }
}

fn parse_hex_token(raw: &str) -> Result<DeviceToken> {
    let bytes = hex::decode(raw.trim()).context("device token must be hex")?;
    if bytes.is_empty() {
        bail!("device token must not be empty");
    }
    Ok(DeviceToken::new(bytes))
}

/// Build a configured service holding the given token.
fn client(config: PushConfig, args: &ClientArgs) -> Result<PushService> {
    let mut config = config;
    if let Some(server) = &args.server {
        let timeout = config
            .connection
            .as_ref()
            .map(ConnectionConfig::call_timeout);
        let mut connection = ConnectionConfig::new(server.as_str(), args.port);
        if let Some(timeout) = timeout {
            connection = connection.with_call_timeout(timeout);
        }
        config.connection = Some(connection);
    }
    if config.connection.is_none() {
        bail!("no backend configured; pass --server or add a [connection] section");
    }

    let service =
        PushService::with_config(config, Arc::new(TcpConnector), Arc::new(DetachedPlatform))?;
    service.on_token_registered(parse_hex_token(&args.token)?);
    Ok(service)
}

async fn serve(bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %listener.local_addr()?, "in-memory push backend listening");
    let backend: Arc<dyn RpcGateway> = Arc::new(MemoryBackend::new());
    pushsub_rpc::serve_until(listener, backend, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "pushsub");

    let config = load_config(cli.config.as_ref())?;
    let silent = CallOptions::silent();
    match &cli.command {
        Command::Serve { bind } => serve(bind).await?,
        Command::Set {
            client: args,
            channel,
            off,
        } => {
            let service = client(config, args)?;
            let channel = Channel::new(channel.as_str())?;
            service.set_subscription(&channel, !off, silent).await?;
            println!("{}", serde_json::json!({ "channel": channel, "subscribed": !off }));
        },
        Command::Status {
            client: args,
            channel,
        } => {
            let service = client(config, args)?;
            let channel = Channel::new(channel.as_str())?;
            let subscribed = service.subscription_status(&channel, silent).await?;
            println!("{}", serde_json::json!({ "channel": channel, "subscribed": subscribed }));
        },
        Command::List {
            client: args,
            offset,
            count,
        } => {
            let service = client(config, args)?;
            let channels = service
                .list_subscriptions(ChannelRange::new(*offset, *count), silent)
                .await?;
            println!("{}", serde_json::json!({ "channels": channels }));
        },
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_hex_tokens() {
        let token = parse_hex_token("DEADbeef").unwrap();
        assert_eq!(token.as_bytes(), [0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex_token("").is_err());
        assert!(parse_hex_token("abc").is_err());
        assert!(parse_hex_token("zz").is_err());
    }

    #[test]
    fn server_flag_overrides_config_target() {
        let args = ClientArgs {
            server: Some("push.example.com".into()),
            port: 4041,
            token: "0102".into(),
        };
        let service = client(PushConfig::default(), &args).unwrap();
        let connection = service.connection().unwrap();
        assert_eq!(connection.addr(), "push.example.com:4041");
        assert_eq!(service.current_token().unwrap().as_bytes(), [1, 2]);
    }

    #[test]
    fn missing_target_is_an_error() {
        let args = ClientArgs {
            server: None,
            port: 4040,
            token: "01".into(),
        };
        assert!(client(PushConfig::default(), &args).is_err());
    }
}
