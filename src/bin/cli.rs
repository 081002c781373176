//! es-cli
//!
//! Command-line client for the event service: key management, offline
//! signing and verification, publishing and subscribing.

use clap::{Parser, Subcommand, ValueEnum};
use es_client::{
    crypto::codec,
    event::{self, Event, Filter},
    session::{Session, SessionConfig, DEFAULT_URL},
    KeyPair, PublicKey, SecretKey,
};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// es-cli: signed events over WebSocket
#[derive(Parser)]
#[command(name = "es-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen,

    /// Derive the public key of a secret key
    Pubkey {
        /// Secret key (hex or esec1...)
        secret: String,
    },

    /// Encode a hex key as bech32 text
    Encode {
        /// Which prefix to use
        #[arg(short, long, value_enum)]
        kind: KeyKind,

        /// Key bytes (hex)
        hex: String,
    },

    /// Decode bech32 text into prefix and hex
    Decode {
        /// Text such as epub1...
        text: String,
    },

    /// Sign an event read from a file or stdin
    Sign {
        /// Secret key (hex or esec1...)
        #[arg(short, long, env = "ES_SECRET_KEY", hide_env_values = true)]
        secret: String,

        /// Event JSON file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Verify a signed event read from a file or stdin
    Verify {
        /// Public key (hex or epub1...), default: the event's user
        #[arg(short, long)]
        pubkey: Option<String>,

        /// Event JSON file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Sign and publish an event
    Publish {
        /// Service URL
        #[arg(short, long, env = "ES_SERVER_URL")]
        url: Option<String>,

        /// Secret key (hex or esec1...)
        #[arg(short, long, env = "ES_SECRET_KEY", hide_env_values = true)]
        secret: String,

        /// File to attach as fileName/fileData
        #[arg(short, long)]
        attach: Option<PathBuf>,

        /// Event JSON file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Subscribe and print matching events
    Subscribe {
        /// Service URL
        #[arg(short, long, env = "ES_SERVER_URL")]
        url: Option<String>,

        /// Keep listening after stored events end
        #[arg(short, long)]
        keep_open: bool,

        /// Filters as JSON objects, one id each
        #[arg(required = true)]
        filters: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyKind {
    Secret,
    Public,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("es_client=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Pubkey { secret } => cmd_pubkey(&secret),
        Commands::Encode { kind, hex } => cmd_encode(kind, &hex),
        Commands::Decode { text } => cmd_decode(&text),
        Commands::Sign { secret, file } => cmd_sign(&secret, file.as_deref()),
        Commands::Verify { pubkey, file } => cmd_verify(pubkey.as_deref(), file.as_deref()),
        Commands::Publish {
            url,
            secret,
            attach,
            file,
        } => {
            let config = load_config(cli.config.as_deref(), url);
            cmd_publish(config, &secret, attach.as_deref(), file.as_deref()).await
        }
        Commands::Subscribe {
            url,
            keep_open,
            filters,
        } => {
            let config = load_config(cli.config.as_deref(), url);
            cmd_subscribe(config, keep_open, &filters).await
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_config(path: Option<&Path>, url: Option<String>) -> SessionConfig {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("Could not read {:?}: {}", path, e)));
            SessionConfig::from_json(&text)
                .unwrap_or_else(|e| fail(format!("Invalid config {:?}: {}", path, e)))
        }
        None => SessionConfig::new(DEFAULT_URL),
    };

    if let Some(url) = url {
        config.url = url;
    }
    config
}

fn load_keys(secret: &str) -> KeyPair {
    let secret = SecretKey::parse(secret.trim())
        .unwrap_or_else(|e| fail(format!("Invalid secret key: {}", e)));
    KeyPair::from_secret(&secret).unwrap_or_else(|e| fail(format!("Invalid secret key: {}", e)))
}

fn read_input(file: Option<&Path>) -> String {
    match file {
        Some(path) => fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Could not read {:?}: {}", path, e))),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .unwrap_or_else(|e| fail(format!("Could not read stdin: {}", e)));
            text
        }
    }
}

fn read_event(file: Option<&Path>) -> Event {
    serde_json::from_str(&read_input(file))
        .unwrap_or_else(|e| fail(format!("Invalid event: {}", e)))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => fail(e),
    }
}

fn cmd_keygen() {
    let keys = KeyPair::generate();
    let secret_text = keys.secret_key().to_bech32().unwrap_or_else(|e| fail(e));
    let public_text = keys.public_key().to_bech32().unwrap_or_else(|e| fail(e));

    println!("Secret key: {}", keys.secret_key().to_hex());
    println!("            {}", secret_text);
    println!("Public key: {}", keys.public_key().to_hex());
    println!("            {}", public_text);
    println!();
    println!("IMPORTANT: Keep the secret key private!");
}

fn cmd_pubkey(secret: &str) {
    let keys = load_keys(secret);
    let public_text = keys.public_key().to_bech32().unwrap_or_else(|e| fail(e));

    println!("{}", keys.public_key().to_hex());
    println!("{}", public_text);
}

fn cmd_encode(kind: KeyKind, hex: &str) {
    let text = match kind {
        KeyKind::Secret => SecretKey::from_hex(hex.trim()).and_then(|key| key.to_bech32()),
        KeyKind::Public => PublicKey::from_hex(hex.trim()).and_then(|key| key.to_bech32()),
    };
    println!("{}", text.unwrap_or_else(|e| fail(e)));
}

fn cmd_decode(text: &str) {
    let (prefix, data) = codec::decode(text.trim()).unwrap_or_else(|e| fail(e));
    println!("{}", prefix);
    println!("{}", hex::encode(data));
}

fn cmd_sign(secret: &str, file: Option<&Path>) {
    let keys = load_keys(secret);
    let unsigned = read_event(file);
    let signed = event::sign(&unsigned, &keys).unwrap_or_else(|e| fail(e));
    print_json(&signed);
}

fn cmd_verify(pubkey: Option<&str>, file: Option<&Path>) {
    let event = read_event(file);
    let valid = match pubkey {
        Some(key) => event::verify(&event, key.trim()),
        None => event::verify_author(&event),
    };

    if valid {
        println!("valid");
    } else {
        println!("invalid");
        std::process::exit(1);
    }
}

async fn cmd_publish(
    config: SessionConfig,
    secret: &str,
    attach: Option<&Path>,
    file: Option<&Path>,
) {
    let keys = load_keys(secret);
    let mut unsigned = read_event(file);

    if let Some(path) = attach {
        let contents =
            fs::read(path).unwrap_or_else(|e| fail(format!("Could not read {:?}: {}", path, e)));
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        unsigned = unsigned
            .with_attachment(&name, &contents)
            .unwrap_or_else(|e| fail(e));
        debug!("Attached {} ({} bytes)", name, contents.len());
    }

    let signed = event::sign(&unsigned, &keys).unwrap_or_else(|e| fail(e));

    let session = Session::new(config);
    session.connect().await.unwrap_or_else(|e| fail(e));

    let pending = session.publish(&signed).unwrap_or_else(|e| fail(e));
    info!("Published {} as {}", signed.id.as_deref().unwrap_or_default(), pending.id());

    let response = pending.response().await.unwrap_or_else(|e| fail(e));
    let mut frame = vec![
        serde_json::Value::String(response.kind),
        serde_json::Value::String(response.id),
        response.payload,
    ];
    frame.extend(response.extra);
    print_json(&frame);

    session.close().await;
}

async fn cmd_subscribe(config: SessionConfig, keep_open: bool, filters: &[String]) {
    let filters: Vec<Filter> = filters
        .iter()
        .map(|text| {
            serde_json::from_str(text)
                .unwrap_or_else(|e| fail(format!("Invalid filter {}: {}", text, e)))
        })
        .collect();

    let session = Session::new(config);
    session.connect().await.unwrap_or_else(|e| fail(e));

    let mut subscription = session.subscribe_all(&filters).unwrap_or_else(|e| fail(e));
    let mut open: HashSet<String> = subscription.ids().iter().cloned().collect();

    while let Some(frame) = subscription.next().await {
        if frame.is_eose() {
            info!("End of stored events for {}", frame.id);
            if keep_open {
                continue;
            }
            session.unsubscribe(&frame.id);
            open.remove(&frame.id);
            if open.is_empty() {
                break;
            }
            continue;
        }

        match frame.event() {
            Some(event) => {
                if !event::verify_author(&event) {
                    eprintln!("Warning: event {:?} failed verification", event.id);
                }
                print_json(&event);
            }
            None => print_json(&frame.payload),
        }
    }

    session.close().await;
}
