//! Command-line entry point for the datatracker ingestion ledger.
//!
//! # Responsibility
//! - Parse run, migrate, rekey and registry-import commands.
//! - Wire filesystem collaborators into the core dispatcher.
//! - Map every outcome to a process exit code.
//!
//! # Invariants
//! - Configuration is validated before logging starts or any store is read.
//! - Exit code is 0 only for a clean run.

mod fs_collab;

use clap::{Args, Parser, Subcommand};
use datatracker_core::{
    backend_for, default_log_level, init_logging, logging_status, migrate, run_ingestion,
    BackendKind, Collaborators, Dispatcher, Ledger, Registry, RunConfig, SqliteLedgerBackend,
    EXIT_FAILURE, EXIT_SUCCESS,
};
use fs_collab::{AttachmentDirScanner, FsContainerInspector, StagingCopyConverter};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Datatracker - ledger-backed spatial data ingestion
#[derive(Parser, Debug)]
#[command(name = "datatracker")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory for rolling log files (defaults to ./logs)
    #[arg(long, env = "DATATRACKER_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "DATATRACKER_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Only echo errors to the terminal
    #[arg(long, global = true)]
    suppress: bool,
}

/// Ledger store locations shared by every command.
#[derive(Args, Debug)]
struct StoreArgs {
    /// CSV ledger file
    #[arg(long, env = "DATATRACKER_LEDGER_FILE")]
    ledger_file: Option<PathBuf>,

    /// SQLite ledger database
    #[arg(long, env = "DATATRACKER_DATABASE")]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest every input under a root directory
    Run {
        /// Ingestion root
        #[arg(long)]
        input: PathBuf,

        /// Output store receiving converted features
        #[arg(long)]
        output: PathBuf,

        /// Attachment destination (defaults to <output>_Attachments)
        #[arg(long)]
        attachments: Option<PathBuf>,

        /// Registry CSV with a "Project Number" column
        #[arg(long, env = "DATATRACKER_REGISTRY")]
        registry: Option<PathBuf>,

        /// Backend the ledger is loaded from
        #[arg(long, value_parser = parse_backend, default_value = "database")]
        load: BackendKind,

        /// Backend the ledger is saved to
        #[arg(long, value_parser = parse_backend, default_value = "database")]
        save: BackendKind,

        #[command(flatten)]
        store: StoreArgs,

        /// Skip inputs already fully processed by an earlier run
        #[arg(long)]
        resume: bool,

        /// Verbose per-input logging
        #[arg(long)]
        debug: bool,
    },

    /// Copy every ledger entry from one backend to the other
    Migrate {
        #[arg(long, value_parser = parse_backend)]
        from: BackendKind,

        #[arg(long, value_parser = parse_backend)]
        to: BackendKind,

        #[command(flatten)]
        store: StoreArgs,

        /// Rewrite rows already present in the target
        #[arg(long)]
        update: bool,
    },

    /// Move an entry to a different natural key under a fresh identifier
    Rekey {
        /// Identifier to supersede
        identifier: String,

        /// Natural key the replacement entry belongs to
        natural_key: String,

        /// Backend holding the ledger
        #[arg(long, value_parser = parse_backend, default_value = "database")]
        backend: BackendKind,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Load registry keys from CSV into the ledger database
    ImportRegistry {
        /// Registry CSV with a "Project Number" column
        registry: PathBuf,

        /// SQLite ledger database
        #[arg(long, env = "DATATRACKER_DATABASE")]
        database: PathBuf,
    },
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    BackendKind::parse(value)
        .ok_or_else(|| format!("unknown backend `{value}`, expected file or database"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match &cli.command {
        Commands::Run {
            input,
            output,
            attachments,
            registry,
            load,
            save,
            store,
            resume,
            debug,
        } => {
            let config = RunConfig {
                input: input.clone(),
                output_store: output.clone(),
                attachments_dir: attachments.clone(),
                ledger_file: store.ledger_file.clone(),
                database: store.database.clone(),
                registry: registry.clone(),
                load_from: *load,
                save_to: *save,
                resume: *resume,
                debug: *debug,
            };
            // Validation failures stop before any log file is created.
            match config.validate() {
                Ok(()) => with_logging(&cli, || Ok(run(&config))),
                Err(err) => {
                    eprintln!("datatracker: {err}");
                    EXIT_FAILURE
                }
            }
        }
        Commands::Migrate {
            from,
            to,
            store,
            update,
        } => with_logging(&cli, || {
            migrate_stores(*from, *to, store, *update).map(|()| EXIT_SUCCESS)
        }),
        Commands::Rekey {
            identifier,
            natural_key,
            backend,
            store,
        } => with_logging(&cli, || {
            rekey(identifier, natural_key, *backend, store).map(|()| EXIT_SUCCESS)
        }),
        Commands::ImportRegistry { registry, database } => with_logging(&cli, || {
            import_registry(registry, database).map(|()| EXIT_SUCCESS)
        }),
    };
    exit(code)
}

/// Starts logging, then runs `command` and maps its outcome to an exit code.
fn with_logging(cli: &Cli, command: impl FnOnce() -> Result<i32, String>) -> i32 {
    if let Err(err) = start_logging(cli) {
        eprintln!("datatracker: {err}");
        return EXIT_FAILURE;
    }
    match command() {
        Ok(code) => code,
        Err(message) => {
            error!("event=cli module=cli status=error error={message}");
            eprintln!("datatracker: {message}");
            EXIT_FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn start_logging(cli: &Cli) -> Result<(), String> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let dir = match &cli.log_dir {
        Some(dir) => absolute(dir)?,
        None => absolute(Path::new("logs"))?,
    };
    init_logging(level, &dir.to_string_lossy(), cli.suppress)?;
    if let Some((level, dir)) = logging_status() {
        info!(
            "event=cli module=cli status=start version={} level={} log_dir={}",
            env!("CARGO_PKG_VERSION"),
            level,
            dir.display()
        );
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| format!("cannot resolve working directory: {err}"))
}

fn run(config: &RunConfig) -> i32 {
    let backends = (
        config.backend(config.load_from),
        config.backend(config.save_to),
    );
    let (load_from, save_to) = match backends {
        (Ok(load_from), Ok(save_to)) => (load_from, save_to),
        (Err(err), _) | (_, Err(err)) => {
            error!("event=cli module=cli status=error error={err}");
            return EXIT_FAILURE;
        }
    };
    let registry = match load_registry(config) {
        Ok(registry) => registry,
        Err(message) => {
            error!("event=cli module=cli status=error error={message}");
            return EXIT_FAILURE;
        }
    };

    let context = config.context();
    let mut converter = StagingCopyConverter::new(&config.output_store, context.run_id.to_string());
    let mut inspector = FsContainerInspector;
    let mut attachments = AttachmentDirScanner;
    let mut dispatcher = Dispatcher::new(
        config.dispatch_settings(),
        &registry,
        context,
        Collaborators {
            converter: &mut converter,
            inspector: &mut inspector,
            attachments: &mut attachments,
        },
    );

    let mut ledger = Ledger::new();
    match run_ingestion(
        &mut ledger,
        load_from.as_ref(),
        save_to.as_ref(),
        &mut dispatcher,
        &context,
    ) {
        Ok(report) => {
            let summary = &report.summary;
            println!(
                "discovered={} skipped={} created={} reused={} duplicates={} converted={} failed={} unsupported={} attachments={} saved={} failed_rows={}",
                summary.discovered,
                summary.skipped,
                summary.created,
                summary.reused,
                summary.duplicates,
                summary.converted,
                summary.failed,
                summary.unsupported,
                summary.attachments,
                report.save.inserted + report.save.updated,
                report.save.failures.len()
            );
            report.exit_code()
        }
        Err(err) => {
            eprintln!("datatracker: {err}");
            err.exit_code()
        }
    }
}

/// Registry CSV when given, otherwise the keys stored in the database.
fn load_registry(config: &RunConfig) -> Result<Registry, String> {
    if let Some(path) = config.registry.as_deref() {
        return Registry::from_csv(path).map_err(|err| err.to_string());
    }
    if let Some(database) = config.database.as_deref() {
        if database.exists() {
            return SqliteLedgerBackend::new(database)
                .load_registry()
                .map_err(|err| err.to_string());
        }
    }
    warn!("event=registry module=cli status=warn reason=no_registry_source");
    Ok(Registry::empty())
}

fn migrate_stores(
    from: BackendKind,
    to: BackendKind,
    store: &StoreArgs,
    update: bool,
) -> Result<(), String> {
    if from == to {
        return Err(format!("source and target are both {from}"));
    }
    let load_from = backend_for(from, store.ledger_file.as_deref(), store.database.as_deref())
        .map_err(|err| err.to_string())?;
    let save_to = backend_for(to, store.ledger_file.as_deref(), store.database.as_deref())
        .map_err(|err| err.to_string())?;

    let report = migrate(load_from.as_ref(), save_to.as_ref(), update)
        .map_err(|err| err.to_string())?;
    println!(
        "inserted={} updated={} skipped={} failed_rows={}",
        report.inserted,
        report.updated,
        report.skipped,
        report.failures.len()
    );
    Ok(())
}

fn rekey(
    identifier: &str,
    natural_key: &str,
    kind: BackendKind,
    store: &StoreArgs,
) -> Result<(), String> {
    let backend = backend_for(kind, store.ledger_file.as_deref(), store.database.as_deref())
        .map_err(|err| err.to_string())?;

    let mut ledger = Ledger::new();
    ledger.load(backend.as_ref()).map_err(|err| err.to_string())?;
    let replacement = ledger
        .rekey(identifier, natural_key)
        .map_err(|err| err.to_string())?;
    let report = ledger
        .save(backend.as_ref(), true)
        .map_err(|err| err.to_string())?;
    if !report.is_clean() {
        return Err(format!(
            "{} ledger rows failed to save",
            report.failures.len()
        ));
    }
    println!("{identifier} -> {replacement}");
    Ok(())
}

fn import_registry(registry: &Path, database: &Path) -> Result<(), String> {
    let keys = Registry::from_csv(registry).map_err(|err| err.to_string())?;
    let inserted = SqliteLedgerBackend::new(database)
        .seed_registry(&keys)
        .map_err(|err| err.to_string())?;
    println!("registry_keys={} inserted={}", keys.len(), inserted);
    Ok(())
}
