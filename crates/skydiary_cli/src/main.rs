//! `skydiary` command line entry point.
//!
//! # Responsibility
//! - Load `.env`, parse the command, bootstrap logging and storage.
//! - Wire the SQLite adapters, resolver and materializer together.
//!
//! # Invariants
//! - Logging is initialized before the database is opened.
//! - `run` exits only after every feed has drained on Ctrl-C.

use clap::{Parser, Subcommand};
use log::{info, warn};
use skydiary_core::config::LocalConfig;
use skydiary_core::model::post::Pagination;
use skydiary_core::{
    init_logging, open_shared_db, run_feeds, AppViewResolver, FirehoseConfig, LogSettings,
    MaterializeOutcome, MaterializerOptions, OfflineViewResolver, PostMaterializer,
    PostQueryService, RemoteViewResolver, SqlitePostRepository, SqlitePostTagRepository,
    SqliteTagRepository,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "skydiary",
    version,
    about = "Mirror one account's posts from a Jetstream feed into SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subscribe to every configured feed host until Ctrl-C.
    Run {
        /// Skip AppView lookups; posts are stored without embeds.
        #[arg(long)]
        offline: bool,
    },
    /// Materialize newline-delimited feed frames from a file.
    Replay {
        path: PathBuf,
        /// Skip AppView lookups; posts are stored without embeds.
        #[arg(long)]
        offline: bool,
    },
    /// Print every stored tag name.
    Tags,
    /// Print stored posts as JSON lines, newest first.
    Posts {
        /// Only posts linked to this tag (falls back to a `#tag` text match).
        #[arg(long, conflicts_with = "text")]
        tag: Option<String>,
        /// Only posts whose rendered text contains this substring.
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("skydiary: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command) -> CliResult<()> {
    match command {
        Command::Run { offline } => run(offline).await,
        Command::Replay { path, offline } => replay(path, offline).await,
        Command::Tags => tags(),
        Command::Posts {
            tag,
            text,
            page,
            limit,
        } => posts(tag, text, Pagination::new(page, limit)),
    }
}

async fn run(offline: bool) -> CliResult<()> {
    let config = FirehoseConfig::from_env()?;
    start_logging(&config.local)?;
    let (posts, links) = open_write_side(&config.local)?;
    let options = materializer_options(&config.local);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("event=shutdown_signal module=cli status=received"),
            Err(err) => warn!("event=shutdown_signal module=cli status=error error={err}"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(
        "event=mirror_start module=cli status=ok hosts={} offline={}",
        config.hosts.len(),
        offline
    );
    if offline {
        let materializer =
            PostMaterializer::with_options(posts, links, OfflineViewResolver, options);
        mirror(&config, materializer, shutdown_rx).await
    } else {
        let resolver =
            AppViewResolver::new(&config.local.appview_url, config.local.resolver_timeout)?;
        let materializer = PostMaterializer::with_options(posts, links, resolver, options);
        mirror(&config, materializer, shutdown_rx).await
    }
}

async fn mirror<V: RemoteViewResolver + 'static>(
    config: &FirehoseConfig,
    materializer: PostMaterializer<SqlitePostRepository, SqlitePostTagRepository, V>,
    shutdown: watch::Receiver<bool>,
) -> CliResult<()> {
    run_feeds(
        &config.hosts,
        &config.subscription_template(),
        Arc::new(materializer),
        shutdown,
    )
    .await?;
    Ok(())
}

async fn replay(path: PathBuf, offline: bool) -> CliResult<()> {
    let local = LocalConfig::from_env()?;
    start_logging(&local)?;
    let (posts, links) = open_write_side(&local)?;
    let options = materializer_options(&local);
    let frames = tokio::fs::read_to_string(&path).await?;

    let summary = if offline {
        let materializer =
            PostMaterializer::with_options(posts, links, OfflineViewResolver, options);
        replay_frames(&materializer, &frames).await
    } else {
        let resolver = AppViewResolver::new(&local.appview_url, local.resolver_timeout)?;
        let materializer = PostMaterializer::with_options(posts, links, resolver, options);
        replay_frames(&materializer, &frames).await
    };

    println!(
        "created={} deleted={} failed={}",
        summary.created, summary.deleted, summary.failed
    );
    Ok(())
}

#[derive(Debug, Default)]
struct ReplaySummary {
    created: usize,
    deleted: usize,
    failed: usize,
}

async fn replay_frames<V: RemoteViewResolver>(
    materializer: &PostMaterializer<SqlitePostRepository, SqlitePostTagRepository, V>,
    frames: &str,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for line in frames.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match materializer.process(line.as_bytes()).await {
            Ok(MaterializeOutcome::Created { .. }) => summary.created += 1,
            Ok(MaterializeOutcome::Deleted { removed }) => summary.deleted += removed,
            Err(_) => summary.failed += 1,
        }
    }
    summary
}

fn tags() -> CliResult<()> {
    let local = LocalConfig::from_env()?;
    start_logging(&local)?;
    for tag in read_side(&local)?.list_tags()? {
        println!("{}", tag.name);
    }
    Ok(())
}

fn posts(tag: Option<String>, text: Option<String>, pagination: Pagination) -> CliResult<()> {
    let local = LocalConfig::from_env()?;
    start_logging(&local)?;
    let service = read_side(&local)?;
    let page = match tag {
        Some(tag) => service.list_posts_by_tag_name(&tag, pagination)?,
        None => service.list_posts(pagination, text.as_deref())?,
    };

    for post in &page.items {
        println!("{}", serde_json::to_string(post)?);
    }
    eprintln!("{} of {} posts", page.items.len(), page.count);
    Ok(())
}

fn start_logging(local: &LocalConfig) -> CliResult<()> {
    let settings = LogSettings::resolve(local.log_level, local.log_dir.as_deref())?;
    init_logging(&settings)?;
    Ok(())
}

fn open_write_side(
    local: &LocalConfig,
) -> CliResult<(SqlitePostRepository, SqlitePostTagRepository)> {
    let conn = open_shared_db(&local.db_path)?;
    let posts = SqlitePostRepository::try_new(Arc::clone(&conn))?;
    let links = SqlitePostTagRepository::try_new(conn)?;
    Ok((posts, links))
}

fn read_side(
    local: &LocalConfig,
) -> CliResult<PostQueryService<SqlitePostRepository, SqliteTagRepository>> {
    let conn = open_shared_db(&local.db_path)?;
    let posts = SqlitePostRepository::try_new(Arc::clone(&conn))?;
    let tags = SqliteTagRepository::try_new(conn)?;
    Ok(PostQueryService::new(posts, tags))
}

fn materializer_options(local: &LocalConfig) -> MaterializerOptions {
    MaterializerOptions {
        delete_scope: local.delete_scope,
        ..MaterializerOptions::default()
    }
}
