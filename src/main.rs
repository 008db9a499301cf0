//! ru-export
//!
//! Exports query results or identifier lists from a rate-limited document
//! store to size-bounded CSV shards, pausing after pages whose request-unit
//! cost exceeds the configured threshold.
//!
//! # Usage
//!
//! ```bash
//! # One value per result document
//! ru-export --uri "$URI" --database sales --collection orders \
//!     query --query '[{"$project": {"_id": 0, "value": "$sku"}}]'
//!
//! # One row per identifier in a file
//! ru-export -c export.toml ids accounts.txt --batch-size 200
//! ```

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use ru_export::cli::{CliInterface, Commands};
use ru_export::config::Config;
use ru_export::connection::{ConnectionManager, sanitize_uri};
use ru_export::export::{
    CsvShardWriter, ExportSummary, IdReconcilingExport, IdSet, ProgressTracker, Projection,
    QuerySpec, ScalarExport,
};
use ru_export::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) if e.is_benign() => {
            println!("Nothing to export: {}", e);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}

/// Main application logic
///
/// 1. Parse command-line arguments and assemble the configuration
/// 2. Initialize logging
/// 3. Handle informational subcommands or run an export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(cli.config());

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let summary = match &cli.args().command {
        Commands::Query { .. } => run_query_export(cli.config()).await?,
        Commands::Ids { dry_run: true, .. } => return plan_id_export(cli.config()).await,
        Commands::Ids { .. } => run_id_export(cli.config()).await?,
        Commands::Config { .. } | Commands::Completion { .. } | Commands::Version => {
            return Ok(());
        }
    };

    println!("{}", summary);
    Ok(())
}

/// Scalar export of one query
async fn run_query_export(config: &Config) -> Result<ExportSummary> {
    config.validate()?;
    let query = QuerySpec::new(config.require_query()?);

    let mut manager = connect(config).await?;
    let store = manager.store()?;
    let mut sink =
        CsvShardWriter::create(config.shard_settings(), vec![config.export.value_header.clone()])
            .await?;

    let (token, ctrl_c) = cancel_on_ctrl_c();
    let result = ScalarExport::new(
        &store,
        query,
        config.export.value_field.clone(),
        config.page_options(),
        config.pacing(),
    )
    .with_progress(ProgressTracker::new(config.export.progress))
    .with_cancellation(token)
    .run(&mut sink)
    .await;

    ctrl_c.abort();
    manager.disconnect().await;
    result
}

/// Reconciling export of an identifier file
///
/// The identifier file is read before connecting, so an empty list finishes
/// without any store traffic.
async fn run_id_export(config: &Config) -> Result<ExportSummary> {
    config.validate()?;
    let id_file = config.require_id_file()?;
    let projection = Projection::new(config.projection.columns.clone())?;
    let ids = IdSet::load(id_file).await?.require_non_empty()?;

    let mut manager = connect(config).await?;
    let store = manager.store()?;
    let mut sink = CsvShardWriter::create(config.shard_settings(), projection.headers()).await?;

    let (token, ctrl_c) = cancel_on_ctrl_c();
    let mut export = IdReconcilingExport::new(
        &store,
        ids,
        projection,
        config.export.id_batch_size,
        config.page_options(),
        config.pacing(),
    );
    if let Some(query) = &config.export.ids_query {
        export = export.with_query(query.clone());
    }
    let result = export
        .with_progress(ProgressTracker::new(config.export.progress))
        .with_cancellation(token)
        .run(&mut sink)
        .await;

    ctrl_c.abort();
    manager.disconnect().await;
    result
}

/// `ids --dry-run`: report the batch plan without touching the store
async fn plan_id_export(config: &Config) -> Result<()> {
    config.validate()?;
    let id_file = config.require_id_file()?;
    let projection = Projection::new(config.projection.columns.clone())?;
    let ids = IdSet::load(id_file).await?;
    let batch_size = config.export.id_batch_size;

    println!("Identifier file: {}", id_file.display());
    println!("Distinct identifiers: {}", ids.len());
    println!(
        "Batches: {} of up to {} identifiers",
        ids.batch_count(batch_size),
        batch_size
    );
    println!("Columns: {}", projection.headers().join(", "));
    println!(
        "Batch query: {}",
        config
            .export
            .ids_query
            .clone()
            .unwrap_or_else(|| projection.default_ids_query())
    );
    Ok(())
}

async fn connect(config: &Config) -> Result<ConnectionManager> {
    info!(
        "Exporting from {}/{}.{}",
        sanitize_uri(&config.connection.uri),
        config.connection.database,
        config.connection.collection
    );
    let mut manager = ConnectionManager::new(config.connection.clone());
    manager.connect().await?;
    Ok(manager)
}

/// Token cancelled on the first Ctrl+C, plus the listener task to abort afterwards
///
/// A second Ctrl+C exits immediately with status 130.
fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let listener = token.clone();

    let handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to listen for Ctrl+C: {}", err);
            return;
        }
        warn!("Interrupted, stopping the export (press Ctrl+C again to exit now)");
        listener.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted twice, exiting");
            std::process::exit(130);
        }
    });

    (token, handle)
}

/// Initialize logging from the configured level
///
/// `RUST_LOG` takes precedence when set. Logs go to stderr so that stdout
/// only carries the run summary.
fn initialize_logging(config: &Config) {
    let level = LevelFilter::from_level(config.logging.level.to_tracing_level());
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ru_export::ExportError;

    #[tokio::test]
    async fn test_dry_run_needs_no_store() {
        let dir = tempfile::tempdir().unwrap();
        let id_file = dir.path().join("ids.txt");
        std::fs::write(&id_file, "a1\nA1\n# comment\n\nb2\n").unwrap();

        let mut config = Config::default();
        config.connection.uri = "mongodb://unreachable.invalid:1".into();
        config.connection.database = "db".into();
        config.connection.collection = "items".into();
        config.export.id_file = Some(id_file);

        plan_id_export(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_id_file_is_benign_without_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let id_file = dir.path().join("ids.txt");
        std::fs::write(&id_file, "\n# nothing here\n   \n").unwrap();

        let mut config = Config::default();
        config.connection.uri = "mongodb://unreachable.invalid:1".into();
        config.connection.database = "db".into();
        config.connection.collection = "items".into();
        config.export.id_file = Some(id_file);
        config.export.output_dir = dir.path().join("out");

        let err = run_id_export(&config).await.unwrap_err();
        assert!(err.is_benign());
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_empty_query_fails_before_connecting() {
        let mut config = Config::default();
        config.connection.database = "db".into();
        config.connection.collection = "items".into();

        let err = run_query_export(&config).await.unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }
}
