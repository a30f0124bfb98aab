use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use slcloud::config::Config;
use slcloud::resource::{self, LookupKey, LookupKind, Resolved, Resolver};
use slcloud::softlayer::auth::Credentials;
use slcloud::{format_sl_error, SlClient, SlError, VERSION};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Lifecycle client for SoftLayer infrastructure
#[derive(Parser, Debug)]
#[command(name = "slcloud", version, about, long_about = None)]
struct Args {
    /// SoftLayer username
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// SoftLayer API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// REST endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a lifecycle action on a resource
    Resource {
        /// Resource type, see `slcloud types`
        resource_type: String,
        /// create, read, update, delete, or a type specific action
        action: String,
        /// Resource id for everything but create
        #[arg(long)]
        id: Option<i64>,
        /// Parameters as inline JSON, or @path to a JSON or YAML file
        #[arg(long)]
        params: Option<String>,
    },
    /// Translate a name to an id or an id to a name
    Resolve {
        /// datacenter, routing_method, routing_type, health_check_type,
        /// location_group, termination_policy or timezone
        kind: String,
        /// Name, or numeric id
        key: String,
    },
    /// List resource types and their actions
    Types,
    /// Store the global options in the config file
    Configure,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("slcloud {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("slcloud").join("slcloud.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".slcloud").join("slcloud.log");
    }
    PathBuf::from("slcloud.log")
}

/// Inline JSON, or `@path` to a JSON / YAML document
fn parse_params(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };

    if let Some(path) = raw.strip_prefix('@') {
        let path = Path::new(path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameters from {:?}", path))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        return if is_json {
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {:?}", path))
        };
    }

    serde_json::from_str(raw).context("--params is not valid JSON")
}

/// One line per resource type: key, name, API service, actions
fn resource_type_lines() -> Vec<String> {
    resource::get_all_resource_keys()
        .into_iter()
        .filter_map(|key| {
            resource::get_resource(key).map(|def| {
                format!(
                    "{:<20} {:<30} {:<34} {}",
                    key,
                    def.display_name,
                    def.actions.join(","),
                    def.service
                )
            })
        })
        .collect()
}

fn build_client(args: &Args, config: &Config) -> Result<SlClient> {
    let credentials = Credentials::resolve(
        args.username.clone().or_else(|| config.effective_username()),
        args.api_key.clone().or_else(|| config.effective_api_key()),
    )?;
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.effective_endpoint());
    tracing::debug!("Using endpoint {} as {}", endpoint, credentials.username);
    SlClient::new(&endpoint, credentials)
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load();

    let output = match &args.command {
        Command::Types => {
            for line in resource_type_lines() {
                println!("{}", line);
            }
            return Ok(());
        },
        Command::Configure => {
            let mut config = config;
            if args.username.is_some() {
                config.username = args.username.clone();
            }
            if args.api_key.is_some() {
                config.api_key = args.api_key.clone();
            }
            if args.endpoint.is_some() {
                config.endpoint = args.endpoint.clone();
            }
            config.save()?;
            if let Some(path) = Config::config_path() {
                println!("Saved {}", path.display());
            }
            return Ok(());
        },
        Command::Resolve { kind, key } => {
            let kind = LookupKind::from_key(kind)
                .with_context(|| format!("Unknown lookup kind: {}", kind))?;
            let client = build_client(&args, &config)?;
            let key = LookupKey::parse(key);
            let resolved = Resolver::for_kind(&client, kind)?.resolve(&key).await?;
            let resolved = match resolved {
                Resolved::Id(id) => Value::from(id),
                Resolved::Name(name) => Value::from(name),
            };
            serde_json::json!({ "kind": kind.key(), "key": key.to_string(), "resolved": resolved })
        },
        Command::Resource {
            resource_type,
            action,
            id,
            params,
        } => {
            let params = parse_params(params.as_deref())?;
            let client = build_client(&args, &config)?;
            resource::execute_action(
                resource_type,
                action,
                &client,
                config.polling.timeouts(),
                *id,
                &params,
            )
            .await?
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level);

    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            match err.downcast_ref::<SlError>() {
                Some(sl_error) => eprintln!("Error: {}", format_sl_error(sl_error)),
                None => eprintln!("Error: {err:?}"),
            }
            1
        },
    };

    drop(log_guard);
    std::process::exit(code);
}
