//! sgsync - declarative security group reconciliation
//!
//! Reads a group spec (a JSON file or a stored spec name), compares it with the
//! live rules held by the provider, and reports or applies the difference.
//!
//! # Usage
//!
//! ```bash
//! sgsync audit web.json                       # Report drift, change nothing
//! sgsync update web                           # Apply the stored spec "web"
//! sgsync create web.json --format json        # Create the group, then populate it
//! sgsync dump sg-0123 --network-id vpc-1      # Print live rules as a spec
//! sgsync dump sg-0123 --network-id vpc-1 --save web
//! sgsync list                                 # Stored specs
//! sgsync history --count 5                    # Recent audit log entries
//! sgsync config --default-region eu-west-1
//! ```
//!
//! `audit`, `update` and `create` exit with a failure status unless the group
//! ends up in sync.

use clap::{Parser, Subcommand, ValueEnum};
use sgsync::audit::{self, AuditLog, EventType};
use sgsync::config::{self, AppConfig};
use sgsync::core::error::GatewayErrorPattern;
use sgsync::core::file_gateway::JsonFileGateway;
use sgsync::core::gateway::GatewayConfig;
use sgsync::core::specs::{SpecStore, load_spec_file};
use sgsync::{Error, GroupSpec, Reconciler, ReconciliationResult, utils, validators};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, warn};

#[derive(Parser)]
#[command(name = "sgsync", version, about = "Declarative security group reconciliation")]
struct Cli {
    /// Provider region (overrides the spec and the config)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Local group state document
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report how the group differs from the spec without changing it
    Audit {
        /// Spec file path or stored spec name
        spec: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Add missing and delete extra rules so the group matches the spec
    Update {
        /// Spec file path or stored spec name
        spec: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Create the group, then populate it from the spec
    Create {
        /// Spec file path or stored spec name
        spec: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the live rules of a group as a spec
    Dump {
        /// Security group id
        group_id: String,
        /// Network the spec should target
        #[arg(long)]
        network_id: String,
        /// Also store the spec under this name
        #[arg(long)]
        save: Option<String>,
    },
    /// List stored specs
    List,
    /// Show recent audit log entries
    History {
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },
    /// Show or change the persistent configuration
    Config {
        #[arg(long)]
        default_region: Option<String>,
        /// State document used when --state-file is not given
        #[arg(long)]
        default_state_file: Option<PathBuf>,
        #[arg(long)]
        audit_log: Option<bool>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Reconciling subcommands
#[derive(Clone, Copy)]
enum Mode {
    Audit,
    Update,
    Create,
}

impl Mode {
    fn event_type(self) -> EventType {
        match self {
            Mode::Audit => EventType::Audit,
            Mode::Update => EventType::Update,
            Mode::Create => EventType::Create,
        }
    }
}

/// Settings shared by every subcommand
struct Context {
    config: AppConfig,
    region: Option<String>,
    state_file: Option<PathBuf>,
}

impl Context {
    fn region_for(&self, spec_region: &str) -> String {
        self.config
            .resolve_region(self.region.as_deref(), spec_region)
            .to_string()
    }

    /// Opens the gateway and checks that its state document is readable.
    async fn gateway(&self, region: &str) -> Result<JsonFileGateway, Box<dyn std::error::Error>> {
        let path = self
            .config
            .state_path(self.state_file.as_deref())
            .ok_or("Cannot determine the data directory; pass --state-file")?;
        let gateway = JsonFileGateway::new(GatewayConfig::new(region, path));

        if let Err(e) = gateway.load().await {
            explain(&e);
            return Err(format!("Cannot read {}: {e}", gateway.state_path().display()).into());
        }
        Ok(gateway)
    }
}

fn main() -> ExitCode {
    let _ = utils::ensure_dirs();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    if let Some(mut log_path) = utils::get_state_dir() {
        log_path.push("sgsync.log");
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints a readable explanation for provider and state errors.
fn explain(error: &Error) {
    if !matches!(error, Error::Gateway { .. } | Error::Serialization(_) | Error::Io(_)) {
        return;
    }
    let translation = GatewayErrorPattern::match_error(&error.to_string());
    eprintln!("{}", translation.user_message);
    for suggestion in translation.suggestions {
        eprintln!("  - {suggestion}");
    }
}

async fn handle_cli(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let ctx = Context {
        config: config::load_config().await,
        region: cli.region,
        state_file: cli.state_file,
    };

    match cli.command {
        Commands::Audit { spec, format } => run_reconcile(&ctx, Mode::Audit, &spec, format).await,
        Commands::Update { spec, format } => run_reconcile(&ctx, Mode::Update, &spec, format).await,
        Commands::Create { spec, format } => run_reconcile(&ctx, Mode::Create, &spec, format).await,
        Commands::Dump {
            group_id,
            network_id,
            save,
        } => run_dump(&ctx, &group_id, &network_id, save.as_deref()).await,
        Commands::List => {
            let store = SpecStore::open_default()?;
            let names = store.list().await?;
            if names.is_empty() {
                println!("No stored specs in {}", store.dir().display());
            } else {
                println!("Stored specs:");
                for name in names {
                    println!("  {name}");
                }
            }
            Ok(true)
        }
        Commands::History { count } => {
            let log = AuditLog::new()?;
            let events = match log.read_recent(count).await {
                Ok(events) => events,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            if events.is_empty() {
                println!("No audit events recorded");
            }
            for event in events {
                println!(
                    "{} {:<6} {} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type.to_string(),
                    if event.success { "✓" } else { "✗" },
                    event.details
                );
            }
            Ok(true)
        }
        Commands::Config {
            default_region,
            default_state_file,
            audit_log,
        } => {
            let mut updated = ctx.config.clone();
            if let Some(region) = default_region {
                updated.default_region = region;
            }
            if let Some(path) = default_state_file {
                updated.state_file = Some(path);
            }
            if let Some(enabled) = audit_log {
                updated.audit_log_enabled = enabled;
            }
            if updated != ctx.config {
                config::save_config(&updated).await?;
            }
            println!("{}", serde_json::to_string_pretty(&updated)?);
            Ok(true)
        }
    }
}

/// Loads a spec from a file path, falling back to a stored spec name.
async fn resolve_spec(arg: &str) -> sgsync::Result<GroupSpec> {
    let path = Path::new(arg);
    if tokio::fs::try_exists(path).await? {
        return load_spec_file(path).await;
    }
    SpecStore::open_default()?.load(arg).await
}

async fn run_reconcile(
    ctx: &Context,
    mode: Mode,
    spec_arg: &str,
    format: OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut spec = resolve_spec(spec_arg).await?;
    for warning in validators::validate_group_spec(&spec)? {
        warn!("{}: {warning}", spec.name);
        eprintln!("warning: {warning}");
    }

    spec.region = ctx.region_for(&spec.region);
    let reconciler = Reconciler::new(ctx.gateway(&spec.region).await?);

    let result = match mode {
        Mode::Audit => reconciler.audit(&spec).await,
        Mode::Update => reconciler.update(&spec).await,
        Mode::Create => reconciler.create(&spec).await,
    };

    if ctx.config.audit_log_enabled {
        audit::log_reconcile(mode.event_type(), &spec.name, &result).await;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(mode, &spec, &result),
    }
    Ok(result.up_to_date)
}

/// Labels for `to_add` and `to_delete` entries.
fn change_labels(mode: Mode, up_to_date: bool) -> (&'static str, &'static str) {
    match mode {
        Mode::Audit => ("missing", "extra"),
        Mode::Update | Mode::Create if up_to_date => ("added", "deleted"),
        // Some apply calls failed; the lists hold every attempted change
        Mode::Update | Mode::Create => ("add attempted", "delete attempted"),
    }
}

fn print_result(mode: Mode, spec: &GroupSpec, result: &ReconciliationResult) {
    let Some(group_id) = &result.group_id else {
        match mode {
            Mode::Create => println!("✗ Could not create security group {}", spec.name),
            Mode::Audit | Mode::Update => {
                println!("✗ Security group {} not found in {}", spec.name, spec.region);
            }
        }
        return;
    };

    let status = match (mode, result.up_to_date) {
        (Mode::Audit, true) => "up to date",
        (Mode::Audit, false) => "drift detected",
        (_, true) => "reconciled",
        (_, false) => "some changes failed",
    };
    let mark = if result.up_to_date { "✓" } else { "✗" };
    println!("{mark} {} ({group_id}): {status}", spec.name);

    let (add_verb, delete_verb) = change_labels(mode, result.up_to_date);
    for rule in &result.to_add {
        println!("  + {rule}  ({add_verb})");
    }
    for rule in &result.to_delete {
        println!("  - {rule}  ({delete_verb})");
    }
}

async fn run_dump(
    ctx: &Context,
    group_id: &str,
    network_id: &str,
    save: Option<&str>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let region = ctx.region_for("");
    let reconciler = Reconciler::new(ctx.gateway(&region).await?);
    let dumped = reconciler.dump(group_id, network_id, &region).await;

    if ctx.config.audit_log_enabled {
        audit::log_dump(group_id, dumped.as_ref().map(|spec| spec.permissions.len())).await;
    }

    let Some(spec) = dumped else {
        eprintln!("✗ Security group {group_id} not found in {region}");
        return Ok(false);
    };

    println!("{}", serde_json::to_string_pretty(&spec)?);

    if let Some(name) = save {
        let path = SpecStore::open_default()?.save(name, &spec).await?;
        eprintln!("✓ Saved as '{name}' ({})", path.display());
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_labels() {
        assert_eq!(change_labels(Mode::Audit, false), ("missing", "extra"));
        assert_eq!(change_labels(Mode::Update, true), ("added", "deleted"));
        assert_eq!(
            change_labels(Mode::Update, false),
            ("add attempted", "delete attempted")
        );
        assert_eq!(
            change_labels(Mode::Create, false),
            ("add attempted", "delete attempted")
        );
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sgsync", "update", "web", "--region", "eu-west-1"]).unwrap();
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert!(matches!(cli.command, Commands::Update { .. }));
    }
}
