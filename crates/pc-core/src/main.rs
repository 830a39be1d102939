//! Process Cleanup Core - command-line entry point
//!
//! Commands:
//! - `run`: one cleanup pass
//! - `status`: read-only assessment of the current process table
//! - `watch`: periodic passes until interrupted
//! - `config`: show, validate and describe the policy

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use pc_common::{Error, OutputFormat, StructuredError, SCHEMA_VERSION};
use pc_config::{Policy, PolicyMode};
use pc_core::action::system_terminator;
use pc_core::collect::{default_source, InventorySource, StaticInventory};
use pc_core::config::{load_checked, PolicyStore};
use pc_core::daemon::{install_shutdown_handler, run_watch, WatchConfig};
use pc_core::exit_codes::ExitCode;
use pc_core::log_event;
use pc_core::logging::{event_names, init_logging, LogConfig, LogContext, LogFormat, Stage};
use pc_core::pass::{
    default_lock_path, Assessment, CancelFlag, CleanupReport, Orchestrator, PassLock, PassOptions,
};

/// Process Cleanup - reclaim CPU and memory from non-essential helpers
#[derive(Parser)]
#[command(name = "pc-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Policy file (overrides PC_POLICY and the config directories)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true, env = "PC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Pass lock file
    #[arg(long, global = true, env = "PC_LOCK_FILE")]
    lock_file: Option<PathBuf>,

    /// Append every report as one JSON line to this file
    #[arg(long, global = true, env = "PC_AUDIT_LOG")]
    audit_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cleanup pass
    Run(RunArgs),

    /// Show what a pass would see, without acting
    Status(StatusArgs),

    /// Run passes periodically until interrupted
    Watch(WatchArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Mode for this pass (off, conservative, balanced, aggressive)
    #[arg(long)]
    mode: Option<PolicyMode>,

    /// Run even when system load is below the activation thresholds
    #[arg(long)]
    force: bool,

    /// Decide but do not signal
    #[arg(long)]
    dry_run: bool,

    /// Replay a JSON process snapshot instead of reading the live table (always a dry run)
    #[arg(long)]
    inventory: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Mode to assess against
    #[arg(long)]
    mode: Option<PolicyMode>,

    /// Replay a JSON process snapshot instead of reading the live table
    #[arg(long)]
    inventory: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Seconds between passes
    #[arg(long, default_value_t = 120)]
    interval: u64,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Decide but do not signal
    #[arg(long)]
    dry_run: bool,

    /// Replay a JSON process snapshot instead of reading the live table (always a dry run)
    #[arg(long)]
    inventory: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved policy and where it came from
    Show,
    /// Validate a policy file (default: the resolved one)
    Validate { path: Option<PathBuf> },
    /// List modes with their thresholds
    Modes,
    /// Print the JSON schema of policy.json
    Schema,
}

fn main() {
    let cli = Cli::parse();

    let base = LogConfig::from_env(None, cli.global.log_format);
    let level = base.level.adjusted(cli.global.verbose, cli.global.quiet);
    init_logging(&base.with_level(level));

    let ctx = LogContext::current();
    let global = &cli.global;

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(global, &ctx, args),
        Commands::Status(args) => cmd_status(global, &ctx, args),
        Commands::Watch(args) => cmd_watch(global, &ctx, args),
        Commands::Config(args) => cmd_config(global, &ctx, args),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "pc-core", &mut std::io::stdout());
            Ok(ExitCode::Clean)
        }
        Commands::Version => print_version(global),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => output_error(global, &err),
    };
    std::process::exit(code.as_i32());
}

// ============================================================================
// Shared plumbing
// ============================================================================

fn load_store(global: &GlobalOpts, ctx: &LogContext) -> Result<PolicyStore, Error> {
    let loaded = load_checked(global.policy.as_deref())?;
    for clamped in &loaded.clamped {
        tracing::warn!(
            field = %clamped.field,
            from = clamped.from,
            to = clamped.to,
            "threshold out of range; clamped"
        );
    }
    if loaded.snapshot.policy_path.is_some() {
        log_event!(
            ctx,
            INFO,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "policy loaded",
            source = loaded.snapshot.policy_source.as_str(),
            config_id = loaded.snapshot.short_id()
        );
    } else {
        log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no policy file found; using built-in defaults"
        );
    }
    Ok(PolicyStore::new(loaded))
}

fn open_inventory(path: Option<&Path>) -> Result<Box<dyn InventorySource>, Error> {
    match path {
        Some(path) => Ok(Box::new(StaticInventory::from_file(path)?)),
        None => Ok(default_source()),
    }
}

fn lock_path(global: &GlobalOpts) -> PathBuf {
    global.lock_file.clone().unwrap_or_else(default_lock_path)
}

fn cancel_on_shutdown() -> CancelFlag {
    let cancel = CancelFlag::new();
    if let Err(err) = install_shutdown_handler(cancel.clone()) {
        tracing::warn!(error = %err, "could not install signal handlers");
    }
    cancel
}

/// Append one report to the audit log. Failures are logged, never fatal.
fn append_audit(global: &GlobalOpts, report: &CleanupReport) {
    let Some(path) = &global.audit_log else {
        return;
    };
    let write = || -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(report)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    };
    if let Err(err) = write() {
        tracing::warn!(path = %path.display(), error = %err, "audit log append failed");
    }
}

fn print_report(format: OutputFormat, report: &CleanupReport) -> Result<(), Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(report)?),
        OutputFormat::Md => print!("{}", report.render_markdown()),
        OutputFormat::Summary => println!("{}", report.summary_line()),
        OutputFormat::Exitcode => {}
    }
    Ok(())
}

fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    let code = ExitCode::for_error(err);
    if global.format.is_machine() {
        let structured = StructuredError::from(err).with_context("exit_code", code.as_i32());
        eprintln!("{}", structured.to_json());
        return code;
    }
    match global.format {
        OutputFormat::Summary => eprintln!("error: {err}"),
        OutputFormat::Md => eprintln!("{}", err.format_human()),
        _ => {}
    }
    code
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_run(global: &GlobalOpts, ctx: &LogContext, args: &RunArgs) -> Result<ExitCode, Error> {
    let store = load_store(global, ctx)?;
    let inventory = open_inventory(args.inventory.as_deref())?;
    let terminator = system_terminator(&store.policy().guardrails);
    let _lock = PassLock::acquire(&lock_path(global))?;

    let orchestrator = Orchestrator::new(store.policy().clone(), inventory.as_ref(), &terminator)?
        .with_cancel(cancel_on_shutdown())
        .with_log_context(ctx.clone())
        .with_config_id(store.snapshot().short_id());

    let report = orchestrator.run_pass(PassOptions {
        mode: args.mode,
        force: args.force,
        dry_run: args.dry_run,
    });
    append_audit(global, &report);
    print_report(global.format, &report)?;
    Ok(ExitCode::for_report(&report))
}

fn cmd_status(global: &GlobalOpts, ctx: &LogContext, args: &StatusArgs) -> Result<ExitCode, Error> {
    let store = load_store(global, ctx)?;
    let inventory = open_inventory(args.inventory.as_deref())?;
    let terminator = system_terminator(&store.policy().guardrails);
    let orchestrator = Orchestrator::new(store.policy().clone(), inventory.as_ref(), &terminator)?
        .with_log_context(ctx.clone());

    let assessment = orchestrator.assess(args.mode)?;
    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&assessment)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&assessment)?),
        OutputFormat::Md => print!("{}", render_assessment(&assessment)),
        OutputFormat::Summary => println!(
            "{}: cpu {:.1}%, mem {:.1}%, {} processes ({} protected), pass would {}",
            assessment.mode,
            assessment.load.cpu_percent,
            assessment.load.memory_percent,
            assessment.process_count,
            assessment.protected_count,
            if assessment.would_run { "run" } else { "be gated" }
        ),
        OutputFormat::Exitcode => {}
    }
    Ok(ExitCode::Clean)
}

fn render_assessment(a: &Assessment) -> String {
    let mut out = String::new();
    out.push_str("# Process Cleanup status\n\n");
    out.push_str(&format!("- Mode: {}\n", a.mode));
    out.push_str(&format!(
        "- System load: cpu {:.1}%, memory {:.1}%\n",
        a.load.cpu_percent, a.load.memory_percent
    ));
    out.push_str(&format!(
        "- A pass would {}\n",
        if a.would_run { "run" } else { "be gated" }
    ));
    out.push_str(&format!(
        "- Processes: {} ({} protected)\n",
        a.process_count, a.protected_count
    ));
    for (reason, count) in &a.by_reason {
        out.push_str(&format!("  - {reason}: {count}\n"));
    }
    out.push_str("\n| PID | Command | Category | CPU % | Mem % | Score | Status |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for row in &a.top_consumers {
        let score = row
            .score
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "-".to_string());
        let status = match (row.protected, row.killability) {
            (Some(reason), _) => format!("protected({reason})"),
            (None, _) if row.safe_sweep => "safe_sweep".to_string(),
            (None, Some(k)) if k.is_killable() => "killable".to_string(),
            _ => "monitored".to_string(),
        };
        out.push_str(&format!(
            "| {} | {} | {} | {:.1} | {:.1} | {} | {} |\n",
            row.pid,
            row.command.replace('|', "\\|"),
            row.category,
            row.cpu_percent,
            row.memory_percent,
            score,
            status
        ));
    }
    out
}

fn cmd_watch(global: &GlobalOpts, ctx: &LogContext, args: &WatchArgs) -> Result<ExitCode, Error> {
    let mut store = load_store(global, ctx)?;
    let inventory = open_inventory(args.inventory.as_deref())?;
    let terminator = system_terminator(&store.policy().guardrails);
    let cancel = cancel_on_shutdown();

    let mut orchestrator =
        Orchestrator::new(store.policy().clone(), inventory.as_ref(), &terminator)?
            .with_cancel(cancel.clone())
            .with_log_context(ctx.clone())
            .with_config_id(store.snapshot().short_id());

    let mut config = WatchConfig::from_guardrails(
        &store.policy().guardrails,
        Duration::from_secs(args.interval.max(1)),
    );
    config.max_ticks = args.max_ticks;
    config.dry_run = args.dry_run;
    config.lock_path = Some(lock_path(global));

    // A pretty-printed stream is unreadable; watch emits one report per line.
    let format = match global.format {
        OutputFormat::Json => OutputFormat::Jsonl,
        other => other,
    };
    let policy_path = global.policy.clone();

    let state = run_watch(
        &mut orchestrator,
        &config,
        ctx,
        |orch| {
            if let Ok(true) = store.reload(policy_path.as_deref(), ctx) {
                let id = store.snapshot().short_id().to_string();
                if let Err(err) = orch.set_policy(store.policy().clone(), Some(id)) {
                    tracing::warn!(error = %err, "reloaded policy not applied");
                }
            }
        },
        |report| {
            append_audit(global, report);
            if let Err(err) = print_report(format, report) {
                tracing::warn!(error = %err, "report output failed");
            }
        },
    );

    tracing::debug!(
        ticks = state.ticks,
        passes = state.passes_run,
        terminated = state.total_terminated,
        "watch finished"
    );
    if cancel.is_cancelled() {
        Ok(ExitCode::Interrupted)
    } else {
        Ok(ExitCode::Clean)
    }
}

fn cmd_config(global: &GlobalOpts, ctx: &LogContext, args: &ConfigArgs) -> Result<ExitCode, Error> {
    match &args.command {
        ConfigCommands::Show => config_show(global, ctx),
        ConfigCommands::Validate { path } => config_validate(global, path.as_deref()),
        ConfigCommands::Modes => config_modes(global, ctx),
        ConfigCommands::Schema => {
            let schema = schemars::schema_for!(Policy);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::Clean)
        }
    }
}

fn config_show(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode, Error> {
    let store = load_store(global, ctx)?;
    let snapshot = store.snapshot();
    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "source": {
            "path": &snapshot.policy_path,
            "source": &snapshot.policy_source,
            "hash": &snapshot.policy_hash,
            "using_defaults": snapshot.policy_path.is_none(),
            "config_id": snapshot.short_id(),
        },
        "policy": store.policy(),
    });

    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&response)?),
        OutputFormat::Summary => println!(
            "config: mode={} source={} id={}",
            store.policy().mode,
            snapshot.policy_path.as_deref().unwrap_or("built-in defaults"),
            snapshot.short_id()
        ),
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# pc-core config show");
            println!();
            match &snapshot.policy_path {
                Some(path) => {
                    println!("Source: {} ({})", path, snapshot.policy_source);
                    println!("Hash: {}", snapshot.policy_hash.as_deref().unwrap_or("n/a"));
                }
                None => println!("Source: **built-in defaults** (no policy.json found)"),
            }
            let s = &snapshot.summary;
            println!("Mode: {}", s.mode);
            println!("Matching: {:?}", s.matching);
            println!(
                "Patterns: {} never-kill, {} allowlist, {} helpers, {} safe-sweep",
                s.never_kill_count, s.allowlist_count, s.background_helper_count, s.safe_sweep_count
            );
            println!(
                "Guardrails: {} terminations per pass, {} ms grace",
                s.max_terminations_per_pass, s.grace_ms
            );
        }
    }
    Ok(ExitCode::Clean)
}

fn config_validate(global: &GlobalOpts, path: Option<&Path>) -> Result<ExitCode, Error> {
    let loaded = load_checked(path.or(global.policy.as_deref()))?;
    let clamped: Vec<serde_json::Value> = loaded
        .clamped
        .iter()
        .map(|c| serde_json::json!({ "field": c.field, "from": c.from, "to": c.to }))
        .collect();
    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "status": "valid",
        "path": &loaded.snapshot.policy_path,
        "using_defaults": loaded.snapshot.policy_path.is_none(),
        "config_id": loaded.snapshot.short_id(),
        "clamped": clamped,
    });

    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(&response)?),
        OutputFormat::Summary => println!("config validate: OK ({})", loaded.snapshot.short_id()),
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# Configuration Validation");
            println!();
            println!("Status: valid");
            match &loaded.snapshot.policy_path {
                Some(p) => println!("Policy: {p}"),
                None => println!("Policy: using built-in defaults"),
            }
            for c in &loaded.clamped {
                println!("Clamped: {} {} -> {}", c.field, c.from, c.to);
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn config_modes(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode, Error> {
    let store = load_store(global, ctx)?;
    let policy = store.policy();
    let rows: Vec<serde_json::Value> = PolicyMode::all()
        .iter()
        .map(|&mode| {
            let activation = policy.thresholds.for_mode(mode);
            serde_json::json!({
                "mode": mode,
                "active": mode == policy.mode,
                "cpu_percent": activation.map(|t| t.cpu_percent),
                "memory_percent": activation.map(|t| t.memory_percent),
                "individual_cpu_threshold": policy.individual_cpu_threshold.for_mode(mode),
            })
        })
        .collect();

    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Jsonl => {
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Summary | OutputFormat::Md => {
            println!("| Mode | Activation CPU % | Activation Mem % | Process CPU % |");
            println!("|---|---|---|---|");
            for &mode in PolicyMode::all() {
                let marker = if mode == policy.mode { " (active)" } else { "" };
                let (cpu, mem) = match policy.thresholds.for_mode(mode) {
                    Some(t) => (format!("{:.0}", t.cpu_percent), format!("{:.0}", t.memory_percent)),
                    None => ("manual only".to_string(), "manual only".to_string()),
                };
                println!(
                    "| {}{} | {} | {} | {:.0} |",
                    mode,
                    marker,
                    cpu,
                    mem,
                    policy.individual_cpu_threshold.for_mode(mode)
                );
            }
        }
    }
    Ok(ExitCode::Clean)
}

fn print_version(global: &GlobalOpts) -> Result<ExitCode, Error> {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "pc_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string_pretty(&version_info)?);
        }
        OutputFormat::Exitcode => {}
        _ => {
            println!("pc-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
    Ok(ExitCode::Clean)
}
