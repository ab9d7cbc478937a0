use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tagsweep::bootstrap::{
    run_bootstrap, FileSchemaSource, ObjectStoreSchemaSource, PgStatementExecutor, SchemaSource,
};
use tagsweep::cloud::{BridgeConnector, BridgeHttp, CachedCredentials, CredentialSource, EnvCredentials};
use tagsweep::config::{Config, Environment};
use tagsweep::dispatch::{DescriptorAction, Dispatcher, DispatcherConfig, JobDescriptor};
use tagsweep::resource::Catalog;
use tagsweep::sink::{FanoutSink, JsonLinesSink, PostgresSink, Sink, StdoutSink};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Multi-account cloud resource discovery and tagging
#[derive(Parser, Debug)]
#[command(name = "tagsweep", version = tagsweep::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Provider bridge endpoint (overrides TAGSWEEP_BRIDGE_URL)
    #[arg(long, global = true)]
    bridge_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover resources and record them
    Discover(RunArgs),

    /// Apply or remove declared tags on discovered resources
    Tag {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        mode: TagMode,

        /// Declared tags, "k1:v1,k2:v2"
        #[arg(long)]
        tags: Option<String>,
    },

    /// Create the persistence schema
    Bootstrap(BootstrapArgs),

    /// List supported service:Type pairs
    Catalog,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Account ids, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "job")]
    accounts: Vec<String>,

    /// Regions, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "job")]
    regions: Vec<String>,

    /// service:Type targets, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "job")]
    targets: Vec<String>,

    /// Job descriptor file (YAML or JSON)
    #[arg(long)]
    job: Option<PathBuf>,

    /// Append outcomes as JSON lines to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also record outcomes in the database named by DB_* variables
    #[arg(long)]
    database: bool,

    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct TagMode {
    /// Add or overwrite the declared tags
    #[arg(long)]
    apply: bool,

    /// Remove the declared tag keys
    #[arg(long)]
    remove: bool,
}

#[derive(ClapArgs, Debug)]
struct BootstrapArgs {
    /// Schema object key in the module bucket
    #[arg(long, required_unless_present = "file", requires = "account")]
    key: Option<String>,

    /// Bucket holding the schema (defaults to MODULE_BUCKET)
    #[arg(long)]
    bucket: Option<String>,

    /// Account that owns the bucket
    #[arg(long)]
    account: Option<String>,

    /// Read the schema from a local file instead
    #[arg(long, conflicts_with = "key")]
    file: Option<PathBuf>,
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

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // RUST_LOG directives refine the --log-level default
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(log_file.is_none())
        .with_target(true)
        .with_thread_ids(false)
        .with_file(log_file.is_some())
        .with_line_number(log_file.is_some())
        .init();

    tracing::debug!("tagsweep {} started with log level: {:?}", tagsweep::VERSION, level);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file.as_ref())?;

    let config = Config::load();
    let env = Environment::from_env();
    let credentials: Arc<dyn CredentialSource> =
        Arc::new(CachedCredentials::new(Arc::new(EnvCredentials)));

    match args.command {
        Command::Catalog => print_catalog(),
        Command::Discover(run) => {
            run_job(&args.bridge_url, &config, &env, credentials, run, None).await
        }
        Command::Tag { run, mode, tags } => {
            let action = if mode.remove {
                DescriptorAction::Remove
            } else {
                DescriptorAction::Apply
            };
            run_job(
                &args.bridge_url,
                &config,
                &env,
                credentials,
                run,
                Some((action, tags)),
            )
            .await
        }
        Command::Bootstrap(bootstrap) => {
            bootstrap_schema(&args.bridge_url, &config, &env, credentials, bootstrap).await
        }
    }
}

fn print_catalog() -> Result<()> {
    let catalog = Catalog::builtin()?;
    for adapter in catalog.adapters() {
        let scope = if adapter.global {
            format!("global ({})", adapter.call_region("global"))
        } else {
            match &adapter.regions {
                Some(allowed) => format!("regional [{}]", allowed.join(", ")),
                None => "regional".to_string(),
            }
        };
        println!("{:<48} {}", adapter.label(), scope);
    }
    println!("{} resource types", catalog.len());
    Ok(())
}

fn connector(
    bridge_url: &Option<String>,
    config: &Config,
    env: &Environment,
    credentials: Arc<dyn CredentialSource>,
) -> Result<BridgeConnector> {
    let url = bridge_url
        .clone()
        .or_else(|| config.effective_bridge_url(env))
        .context("No provider bridge configured. Set TAGSWEEP_BRIDGE_URL or use --bridge-url")?;
    let http = BridgeHttp::new(&url, &config.http_settings())?;
    Ok(BridgeConnector::new(http, credentials))
}

/// Turn command-line arguments (or a job file) into a descriptor
fn descriptor_for(
    run: &RunArgs,
    tagging: Option<(DescriptorAction, Option<String>)>,
) -> Result<JobDescriptor> {
    let mut descriptor = match &run.job {
        Some(path) => JobDescriptor::from_path(path)?,
        None => JobDescriptor {
            accounts: run.accounts.clone(),
            regions: run.regions.clone(),
            targets: run.targets.clone(),
            action: DescriptorAction::Discover,
            tags: None,
        },
    };

    match tagging {
        Some((action, tags)) => {
            descriptor.action = action;
            if tags.is_some() {
                descriptor.tags = tags;
            }
        }
        None => descriptor.action = DescriptorAction::Discover,
    }

    Ok(descriptor)
}

async fn build_sink(
    run: &RunArgs,
    config: &Config,
    env: &Environment,
    credentials: &dyn CredentialSource,
) -> Result<Arc<dyn Sink>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if let Some(path) = run.output.as_ref().or(config.output.as_ref()) {
        let sink = JsonLinesSink::open(path).await?;
        tracing::info!("Appending outcomes to {}", sink.path().display());
        sinks.push(Arc::new(sink));
    }

    if run.database {
        let settings = env.database()?;
        let password = credentials.database_token(&settings).await?;
        let workers = run.workers.unwrap_or_else(|| config.effective_workers());
        let max_connections = u32::try_from(workers.clamp(1, 16)).unwrap_or(4);
        sinks.push(Arc::new(
            PostgresSink::connect(&settings.connection_url(&password), max_connections).await?,
        ));
    }

    Ok(match sinks.len() {
        0 => Arc::new(StdoutSink::new()),
        1 => sinks.remove(0),
        _ => Arc::new(FanoutSink::new(sinks)),
    })
}

async fn run_job(
    bridge_url: &Option<String>,
    config: &Config,
    env: &Environment,
    credentials: Arc<dyn CredentialSource>,
    run: RunArgs,
    tagging: Option<(DescriptorAction, Option<String>)>,
) -> Result<()> {
    let catalog = Arc::new(Catalog::builtin()?.clone());
    let job = descriptor_for(&run, tagging)?.into_job(&catalog)?;

    let connector = connector(bridge_url, config, env, credentials.clone())?;
    let sink = build_sink(&run, config, env, credentials.as_ref()).await?;

    let dispatcher_config = DispatcherConfig {
        workers: run
            .workers
            .filter(|n| *n > 0)
            .unwrap_or_else(|| config.effective_workers()),
        queue_size: config.effective_queue_size(),
    };
    let dispatcher = Dispatcher::new(catalog, Arc::new(connector), sink, dispatcher_config);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight work");
            signal.cancel();
        }
    });

    let report = dispatcher.run(&job, cancel).await;
    eprintln!("{}", report.summary());

    Ok(())
}

async fn bootstrap_schema(
    bridge_url: &Option<String>,
    config: &Config,
    env: &Environment,
    credentials: Arc<dyn CredentialSource>,
    args: BootstrapArgs,
) -> Result<()> {
    let settings = env.database()?;

    let source: Box<dyn SchemaSource> = match (args.file, args.key) {
        (Some(path), _) => Box::new(FileSchemaSource::new(path)),
        (None, Some(key)) => {
            let bucket = args
                .bucket
                .or_else(|| env.module_bucket.clone())
                .context("No schema bucket. Set MODULE_BUCKET or use --bucket")?;
            let account = args.account.context("--account is required with --key")?;
            let connector = connector(bridge_url, config, env, credentials.clone())?;
            Box::new(ObjectStoreSchemaSource::new(
                Arc::new(connector),
                account,
                env.effective_region(),
                bucket,
                key,
            ))
        }
        (None, None) => anyhow::bail!("Either --key or --file is required"),
    };

    let executor = PgStatementExecutor::connect(&settings, credentials.as_ref()).await?;
    let report = run_bootstrap(source.as_ref(), &executor).await?;

    for (statement, error) in &report.failed {
        eprintln!("FAILED: {}\n  {}", statement, error);
    }
    eprintln!(
        "bootstrap: {} applied, {} failed",
        report.applied.len(),
        report.failed.len()
    );

    Ok(())
}
