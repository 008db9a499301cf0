//! Command-line interface for ru-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Layering file, environment and argument settings into one [`Config`]
//! - The informational subcommands (`config`, `completion`, `version`)
//!
//! The export subcommands themselves are driven from `main`.

pub mod completion;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, ExportError, Result};

/// Request-unit aware bulk export to sharded CSV files
#[derive(Parser, Debug)]
#[command(
    name = "ru-export",
    version,
    about = "Export query results and identifier lists to CSV shards while staying under a request-unit budget",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Connection string of the document store
    #[arg(long, value_name = "URI", global = true)]
    pub uri: Option<String>,

    /// Database name
    #[arg(long, value_name = "NAME", global = true)]
    pub database: Option<String>,

    /// Collection (container) name
    #[arg(long, value_name = "NAME", global = true)]
    pub collection: Option<String>,

    /// Directory receiving the CSV shards
    #[arg(short = 'o', long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Shard file name prefix
    #[arg(long, value_name = "PREFIX", global = true)]
    pub prefix: Option<String>,

    /// Rows per shard, header included
    #[arg(long, value_name = "ROWS", global = true)]
    pub max_rows: Option<usize>,

    /// Page cost above which the next fetch is delayed
    #[arg(long, value_name = "RU", global = true)]
    pub ru_threshold: Option<f64>,

    /// Delay after an expensive page, in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub pacing_delay_ms: Option<u64>,

    /// Page size hint passed to the store
    #[arg(long, value_name = "ROWS", global = true)]
    pub page_size: Option<u32>,

    /// Parallelism hint passed to the store
    #[arg(long, value_name = "N", global = true)]
    pub max_concurrency: Option<u32>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Disable the progress spinner
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for ru-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export one value per result document of a query
    Query {
        /// Aggregation pipeline (JSON array) or filter (JSON object)
        #[arg(long, value_name = "JSON", conflicts_with = "query_file")]
        query: Option<String>,

        /// Read the query from a file
        #[arg(long, value_name = "FILE")]
        query_file: Option<PathBuf>,

        /// Field holding the exported value
        #[arg(long, value_name = "FIELD")]
        value_field: Option<String>,

        /// CSV header of the value column
        #[arg(long, value_name = "NAME")]
        header: Option<String>,
    },

    /// Export one row per identifier listed in a file
    Ids {
        /// File with one identifier per line
        #[arg(value_name = "ID_FILE")]
        id_file: Option<PathBuf>,

        /// Identifiers per store query
        #[arg(short = 'b', long, value_name = "N")]
        batch_size: Option<usize>,

        /// Custom batch query; must reference "@ids"
        #[arg(long, value_name = "JSON")]
        ids_query: Option<String>,

        /// Load and normalize identifiers, print the batch plan, then stop
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate the effective configuration
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        #[arg(value_name = "SHELL", value_enum)]
        shell: clap_complete::Shell,
    },

    /// Show version information
    Version,
}

/// CLI interface handler
pub struct CliInterface {
    args: CliArgs,
    config: Config,
}

impl CliInterface {
    /// Parse process arguments and assemble the configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Assemble the configuration for already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env()?;
        Self::apply_args_to_config(&mut config, &args)?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Handle the subcommands that do not run an export
    ///
    /// # Returns
    /// * `Result<bool>` - True if the subcommand was handled here
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(*shell);
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Commands::Query { .. } | Commands::Ids { .. } => Ok(false),
        }
    }

    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_connection_args(config, args);
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
        Self::apply_command_args(config, &args.command)
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.connection.uri = uri.clone();
        }
        if let Some(database) = &args.database {
            config.connection.database = database.clone();
        }
        if let Some(collection) = &args.collection {
            config.connection.collection = collection.clone();
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        let export = &mut config.export;
        if let Some(dir) = &args.output_dir {
            export.output_dir = dir.clone();
        }
        if let Some(prefix) = &args.prefix {
            export.file_prefix = prefix.clone();
        }
        if let Some(rows) = args.max_rows {
            export.max_rows_per_file = rows;
        }
        if let Some(threshold) = args.ru_threshold {
            export.ru_threshold = threshold;
        }
        if let Some(delay) = args.pacing_delay_ms {
            export.pacing_delay_ms = delay;
        }
        if let Some(size) = args.page_size {
            export.page_size = size;
        }
        if let Some(n) = args.max_concurrency {
            export.max_concurrency = n;
        }
        if args.no_progress || args.quiet {
            export.progress = false;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_command_args(config: &mut Config, command: &Commands) -> Result<()> {
        match command {
            Commands::Query {
                query,
                query_file,
                value_field,
                header,
            } => {
                if let Some(query) = query {
                    config.export.query = query.clone();
                }
                if let Some(path) = query_file {
                    config.export.query = std::fs::read_to_string(path).map_err(|e| {
                        ConfigError::InvalidValue {
                            field: "query_file".into(),
                            value: format!("{}: {}", path.display(), e),
                        }
                    })?;
                }
                if let Some(field) = value_field {
                    config.export.value_field = field.clone();
                }
                if let Some(header) = header {
                    config.export.value_header = header.clone();
                }
            }
            Commands::Ids {
                id_file,
                batch_size,
                ids_query,
                ..
            } => {
                if let Some(path) = id_file {
                    config.export.id_file = Some(path.clone());
                }
                if let Some(size) = batch_size {
                    config.export.id_batch_size = *size;
                }
                if let Some(query) = ids_query {
                    config.export.ids_query = Some(query.clone());
                }
            }
            Commands::Config { .. } | Commands::Completion { .. } | Commands::Version => {}
        }
        Ok(())
    }

    fn show_version(&self) {
        println!("ru-export version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if show || !validate {
            self.show_config()?;
        }
        if validate {
            self.validate_config()?;
        }
        Ok(())
    }

    fn validate_config(&self) -> Result<()> {
        println!("Validating configuration from {}", self.get_config_path().display());
        match self.config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                Ok(())
            }
            Err(e) => {
                println!("Configuration is invalid: {}", e);
                Err(ExportError::Config(e))
            }
        }
    }

    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.get_config_path().display());
        println!();

        let mut shown = self.config.clone();
        shown.connection.uri = crate::connection::sanitize_uri(&shown.connection.uri);
        println!("{}", shown.to_toml()?);
        Ok(())
    }

    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    fn empty_config_file() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(CliArgs::try_parse_from(["ru-export"]).is_err());
    }

    #[test]
    fn test_query_args() {
        let args = parse(&["ru-export", "query", "--query", "[]", "--value-field", "sku"]);
        match args.command {
            Commands::Query { query, value_field, .. } => {
                assert_eq!(query.as_deref(), Some("[]"));
                assert_eq!(value_field.as_deref(), Some("sku"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_query_and_query_file_conflict() {
        let result = CliArgs::try_parse_from([
            "ru-export", "query", "--query", "[]", "--query-file", "q.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["ru-export", "ids", "ids.txt", "--max-rows", "50", "-v", "--dry-run"]);
        assert_eq!(args.max_rows, Some(50));
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Ids { dry_run: true, .. }));
    }

    #[test]
    fn test_completion_shell_parsing() {
        let args = parse(&["ru-export", "completion", "zsh"]);
        assert!(matches!(
            args.command,
            Commands::Completion { shell: clap_complete::Shell::Zsh }
        ));
        assert!(CliArgs::try_parse_from(["ru-export", "completion", "tcsh"]).is_err());
    }

    #[test]
    fn test_args_override_file() {
        let mut file = empty_config_file();
        writeln!(
            file,
            "[connection]\ndatabase = \"from_file\"\ncollection = \"items\"\n\n[export]\nmax_rows_per_file = 10"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = parse(&[
            "ru-export", "-c", &path, "--database", "from_args", "ids", "list.txt", "-b", "25",
        ]);
        let cli = CliInterface::from_args(args).unwrap();
        let config = cli.config();

        assert_eq!(config.connection.database, "from_args");
        assert_eq!(config.connection.collection, "items");
        assert_eq!(config.export.max_rows_per_file, 10);
        assert_eq!(config.export.id_batch_size, 25);
        assert_eq!(config.export.id_file, Some(PathBuf::from("list.txt")));
    }

    #[test]
    fn test_query_file_is_read() {
        let mut query = NamedTempFile::new().unwrap();
        write!(query, "[{{\"$project\": {{\"value\": \"$sku\"}}}}]").unwrap();
        let config_file = empty_config_file();

        let args = parse(&[
            "ru-export",
            "-c",
            config_file.path().to_str().unwrap(),
            "query",
            "--query-file",
            query.path().to_str().unwrap(),
        ]);
        let cli = CliInterface::from_args(args).unwrap();
        assert!(cli.config().export.query.contains("$sku"));
    }

    #[test]
    fn test_missing_query_file_is_config_error() {
        let config_file = empty_config_file();
        let args = parse(&[
            "ru-export",
            "-c",
            config_file.path().to_str().unwrap(),
            "query",
            "--query-file",
            "/nonexistent/query.json",
        ]);
        assert!(matches!(
            CliInterface::from_args(args),
            Err(ExportError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_logging_and_progress_flags() {
        let config_file = empty_config_file();
        let path = config_file.path().to_str().unwrap();

        let cli =
            CliInterface::from_args(parse(&["ru-export", "-c", path, "-q", "version"])).unwrap();
        assert_eq!(cli.config().logging.level, LogLevel::Error);
        assert!(!cli.config().export.progress);

        let cli =
            CliInterface::from_args(parse(&["ru-export", "-c", path, "--vv", "version"])).unwrap();
        assert_eq!(cli.config().logging.level, LogLevel::Trace);
        assert!(cli.config().export.progress);
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let args = parse(&["ru-export", "-c", "/nonexistent/ru-export.toml", "version"]);
        assert!(matches!(
            CliInterface::from_args(args),
            Err(ExportError::Config(ConfigError::FileNotFound(_)))
        ));
    }
}
