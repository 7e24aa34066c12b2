use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use course_harvest::{ChannelCatalog, Config, Discoverer, DiscoverySources, Ingestor, StorageManager, YouTubeClient};

fn cli() -> Command {
    Command::new("course-harvest")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Discover open courseware lecture material and ingest it into object storage")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("settings")
                .short('c')
                .long("settings")
                .value_name("FILE")
                .help("TOML settings file")
                .global(true),
        )
        .subcommand(
            Command::new("discover")
                .about("Crawl configured courses and channels, then write a discovery manifest")
                .arg(
                    Arg::new("sources")
                        .short('s')
                        .long("sources")
                        .value_name("SOURCE")
                        .help("Sources document (local path or s3:// URI), overrides CONFIG_FILE"),
                ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Ingest every resource of a discovery manifest")
                .arg(
                    Arg::new("discovery-file")
                        .value_name("DISCOVERY_FILE")
                        .help("Local path, s3:// URI, bucket key, or 'latest'")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("resolve-channel")
                .about("Print the channel id for a channel handle")
                .arg(Arg::new("handle").value_name("HANDLE").required(true)),
        )
        .subcommand(
            Command::new("check-storage")
                .about("Verify bucket access by listing objects")
                .arg(
                    Arg::new("prefix")
                        .short('p')
                        .long("prefix")
                        .value_name("PREFIX")
                        .help("Only list keys below this prefix"),
                ),
        )
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "course_harvest=debug,info"
    } else {
        "course_harvest=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let settings_path = matches.get_one::<String>("settings").map(PathBuf::from);
    let config = Config::load(settings_path.as_deref())?;

    match matches.subcommand() {
        Some(("discover", sub)) => discover(config, sub).await,
        Some(("ingest", sub)) => ingest(config, sub).await,
        Some(("resolve-channel", sub)) => resolve_channel(config, sub).await,
        Some(("check-storage", sub)) => check_storage(config, sub).await,
        _ => Err(anyhow!("unknown command")),
    }
}

async fn open_storage(config: &Config) -> Result<StorageManager> {
    config.validate()?;
    info!("{}", config.summary());
    Ok(StorageManager::new(&config.storage).await?)
}

async fn discover(mut config: Config, matches: &ArgMatches) -> Result<()> {
    if let Some(sources) = matches.get_one::<String>("sources") {
        config.discovery.sources_file = sources.clone();
    }
    let storage = open_storage(&config).await?;

    let sources = DiscoverySources::load(&storage, &config.discovery.sources_file).await?;
    if sources.is_empty() {
        warn!("⚠️ Sources document lists no courses or channels");
    }

    let start_time = std::time::Instant::now();
    let discoverer = Discoverer::from_config(&config, storage.clone())?;
    let report = discoverer.discover(&sources).await?;

    match &report.manifest_key {
        Some(key) => info!(
            "🎉 Discovered {} resources in {:.2}s -> {}",
            report.resources.len(),
            start_time.elapsed().as_secs_f64(),
            storage.uri(key)
        ),
        None => info!("Nothing new to discover"),
    }

    Ok(())
}

async fn ingest(config: Config, matches: &ArgMatches) -> Result<()> {
    let source = matches
        .get_one::<String>("discovery-file")
        .ok_or_else(|| anyhow!("DISCOVERY_FILE is required"))?;
    let storage = open_storage(&config).await?;

    let ingestor = Ingestor::from_config(&config, storage);
    let outcome = ingestor.run_from_source(source).await?;

    if outcome.job.num_failed > 0 {
        error!(
            "❌ {} of {} resources failed, see {}",
            outcome.job.num_failed, outcome.job.num_total, outcome.metadata_key
        );
    }

    Ok(())
}

async fn resolve_channel(config: Config, matches: &ArgMatches) -> Result<()> {
    let handle = matches
        .get_one::<String>("handle")
        .ok_or_else(|| anyhow!("HANDLE is required"))?;

    let client = YouTubeClient::new(&config.youtube)?;
    let catalog = ChannelCatalog::new(Arc::new(client), config.youtube.max_videos_per_playlist);
    let channel_id = catalog.resolve_channel_id(handle).await?;

    info!("Found channel_id {} for {}", channel_id, handle);
    println!("{}", channel_id);
    Ok(())
}

async fn check_storage(config: Config, matches: &ArgMatches) -> Result<()> {
    let storage = open_storage(&config).await?;
    let prefix = matches.get_one::<String>("prefix").map(String::as_str);

    let objects = storage.list(prefix).await?;
    info!("✅ Listed {} objects in {}", objects.len(), storage.uri(prefix.unwrap_or("")));
    for meta in objects.iter().take(20) {
        println!("{}\t{}\t{}", meta.location, meta.size, meta.last_modified.to_rfc3339());
    }
    if objects.len() > 20 {
        println!("... and {} more", objects.len() - 20);
    }

    Ok(())
}
