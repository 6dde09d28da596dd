use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use authlink::config::NetworkConfig;
use authlink::error::{ProtocolError, Result};
use authlink::protocol::dispatcher::Dispatcher;
use authlink::protocol::handshake::sha256_hex;
use authlink::service::client::{Client, ClientSender, Inbound, MessageSink};
use authlink::transport::tcp::Server;
use authlink::utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept authenticated connections and acknowledge every frame.
    Serve(ServeArgs),
    /// Connect to a server and send frames interactively.
    Connect(ConnectArgs),
    /// Print a configuration file with every default filled in.
    ExampleConfig,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Address to bind, overriding the configuration. Port 0 picks a free port.
    #[arg(long)]
    listen: Option<String>,

    /// Extra credential as `name:password`; may be repeated.
    #[arg(long = "user", value_name = "NAME:PASSWORD")]
    users: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct ConnectArgs {
    /// Server address, overriding the configuration.
    #[arg(long)]
    server: Option<String>,

    /// Username; prompted for when omitted.
    #[arg(long)]
    username: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<NetworkConfig> {
    let mut config = match path {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve(args) => serve(config, args).await,
        Command::Connect(args) => connect(config, args).await,
        Command::ExampleConfig => {
            println!("{}", NetworkConfig::example_config());
            Ok(())
        }
    }
}

async fn serve(mut config: NetworkConfig, args: ServeArgs) -> Result<()> {
    init_logging(&config.logging);

    if let Some(listen) = args.listen {
        config.server.address = listen;
    }
    for user in &args.users {
        let (name, password) = user.split_once(':').ok_or_else(|| {
            ProtocolError::ConfigError(format!("Expected NAME:PASSWORD, got '{user}'"))
        })?;
        config
            .server
            .credentials
            .insert(name.to_string(), sha256_hex(password));
    }
    config.validate_strict()?;
    if config.server.credentials.is_empty() {
        warn!("No credentials configured; every handshake will be rejected");
    }

    let store = Arc::new(config.server.credential_store()?);
    let dispatcher = Dispatcher::new();
    dispatcher.register_all(|frame| {
        info!(kind = %frame.message_type(), content = %frame, "Message");
        Ok(())
    })?;

    let server = Server::bind(config, store).await?.with_dispatcher(dispatcher);
    server.run().await
}

struct Console;

impl MessageSink for Console {
    fn display(&mut self, inbound: &Inbound) {
        println!("{inbound}");
    }
}

type StdinLines = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut StdinLines, label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    match lines.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(ProtocolError::ConnectionClosed),
    }
}

async fn connect(mut config: NetworkConfig, args: ConnectArgs) -> Result<()> {
    init_logging(&config.logging);

    if let Some(server) = args.server {
        config.client.address = server;
    }
    config.validate_strict()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let username = match args.username {
        Some(username) => username,
        None => prompt(&mut lines, "Enter username: ").await?,
    };
    let password = prompt(&mut lines, "Enter password: ").await?;

    let client = match Client::connect(&config, &username, &password).await {
        Ok(client) => client,
        Err(ProtocolError::AuthenticationRejected(verdict)) => {
            println!("{verdict}");
            return Err(ProtocolError::AuthenticationRejected(verdict));
        }
        Err(e) => return Err(e),
    };
    println!("{}", client.verdict());

    let (sender, mut inbox) = client.into_parts();
    let receiver = tokio::spawn(async move {
        if let Err(e) = inbox.pump(&mut Console).await {
            println!("Connection error: {e}");
        }
    });

    let result = menu(&mut lines, &sender).await;
    drop(sender);
    receiver.abort();
    match result {
        Err(ProtocolError::ConnectionClosed) => Ok(()),
        other => other,
    }
}

async fn menu(lines: &mut StdinLines, sender: &ClientSender) -> Result<()> {
    loop {
        let choice = prompt(
            lines,
            "Choose message type (1=Text, 2=Command, 3=Data Packet): ",
        )
        .await?;
        let sent = match choice.as_str() {
            "1" => {
                let text = prompt(lines, "Enter text message: ").await?;
                sender.send_text(text).await
            }
            "2" => {
                let command = prompt(lines, "Enter command: ").await?;
                let parameter = prompt(lines, "Enter parameter: ").await?;
                sender.send_command(command, parameter).await
            }
            "3" => {
                let int_field = prompt(lines, "Enter data field 1 (integer): ").await?;
                let Ok(int_field) = int_field.parse::<u32>() else {
                    println!("Not an unsigned 32-bit integer");
                    continue;
                };
                let float_field = prompt(lines, "Enter data field 2 (float): ").await?;
                let Ok(float_field) = float_field.parse::<f64>() else {
                    println!("Not a number");
                    continue;
                };
                let text = prompt(lines, "Enter data field 3 (string): ").await?;
                sender.send_data_packet(int_field, float_field, text).await
            }
            _ => {
                println!("Unknown message type");
                continue;
            }
        };

        if let Err(e) = sent {
            println!("Send failed: {e}");
            if !sender.is_open() || e.is_disconnect() {
                return Ok(());
            }
        }
    }
}
