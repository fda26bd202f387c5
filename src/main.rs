mod cli;
mod error;

use crate::cli::{Cli, Command, CommonArgs, ScanArgs, SearchArgs};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use dfind_config::Config;
use dfind_scan::{ErrorPolicy, Scanner};
use dfind_storage::{StorageDriver, Store};
use exn::ResultExt;
use futures::TryStreamExt;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let common = cli.command.common();
    let config = load_config(common);
    let verbose = common.verbose || config.as_ref().is_ok_and(|config| config.verbose);
    init_logging(verbose);

    let result = match config {
        Ok(config) => match &cli.command {
            Command::Scan(args) => scan(args, config).await,
            Command::Search(args) => search(args, config).await,
        },
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "Command failed");
            ExitCode::FAILURE
        },
    }
}

/// Logs go to stderr; stdout is reserved for search results.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn load_config(common: &CommonArgs) -> Result<Config> {
    let mut config = match &common.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .or_raise(|| ErrorKind::Config)?;
    if let Some(data_dir) = &common.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.verbose |= common.verbose;
    config.validate().or_raise(|| ErrorKind::Config)?;
    Ok(config)
}

async fn scan(args: &ScanArgs, mut config: Config) -> Result<()> {
    config.scan.follow_symlinks |= args.follow_symlinks;
    config.scan.one_filesystem |= args.one_filesystem;
    if args.keep_going {
        config.scan.on_error = ErrorPolicy::Skip;
    }

    tokio::fs::create_dir_all(&config.data_dir).await.or_raise(|| ErrorKind::Setup)?;
    let store = Store::open(&config.data_dir, false).await.or_raise(|| ErrorKind::Setup)?;
    let scanner = Scanner::new(&args.root, config.scan);

    let token = scanner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping scan");
            token.cancel();
        }
    });

    let summary = scanner.scan_insert(&store).await;
    store.close().await;
    let summary = summary.or_raise(|| ErrorKind::Scan)?;
    if summary.unreadable > 0 || summary.rejected > 0 {
        tracing::warn!(
            unreadable = summary.unreadable,
            rejected = summary.rejected,
            "Some entries were not indexed"
        );
    }
    Ok(())
}

async fn search(args: &SearchArgs, config: Config) -> Result<()> {
    let store = Store::open(&config.data_dir, true).await.or_raise(|| ErrorKind::Setup)?;
    let result = print_hits(&store, &args.pattern(), args.insensitive).await;
    store.close().await;
    result
}

async fn print_hits(store: &Store, pattern: &str, ignore_case: bool) -> Result<()> {
    let mut hits = store.search(pattern, ignore_case, false).await.or_raise(|| ErrorKind::Query)?;
    let mut stdout = std::io::stdout().lock();
    while let Some(hit) = hits.try_next().await.or_raise(|| ErrorKind::Query)? {
        if writeln!(stdout, "{}", hit.key).is_err() {
            // Reader went away (`dfind search foo | head`).
            hits.cancel();
            break;
        }
    }
    Ok(())
}
