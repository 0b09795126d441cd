//! Strata CLI entrypoint.
//!
//! This is the main entrypoint for the strata command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use strata::addrs::ResourceAddress;
use strata::cli::{Cli, Commands, OutputFormatter, PlanSource, RunArgs, StateCommands};
use strata::config::{parse_var_assignments, variables_from_env, ConfigParser, Configuration};
use strata::engine::{state_rm, Engine, PlanOptions};
use strata::error::{ApplyError, ConfigError, PlanError, Result, StateError};
use strata::graph::GraphMode;
use strata::planner::{is_plan_file, load_plan, save_plan, Plan, PlanMode};
use strata::state::{LocalStateStore, StateStore};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.exit_code() == 0 {
                eprintln!("{e}");
            } else {
                eprintln!("Error: {e}");
                if e.is_stale_plan() {
                    eprintln!("Run \"strata plan\" again to make a new plan.");
                } else if e.is_retryable() {
                    eprintln!("Try again once the other operation has finished.");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, waiting for running operations to finish");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Plan {
            path,
            destroy,
            refresh,
            refresh_only,
            out,
            run,
        } => {
            let mode = if destroy {
                PlanMode::Destroy
            } else if refresh_only {
                PlanMode::RefreshOnly
            } else {
                PlanMode::Normal
            };
            cmd_plan(&path, PlanOptions { mode, refresh }, out.as_deref(), &run, &formatter, &cancel).await
        }
        Commands::Apply {
            path,
            config_dir,
            auto_approve,
            run,
        } => cmd_apply(&path, &config_dir, auto_approve, &run, &formatter, &cancel).await,
        Commands::Destroy {
            path,
            auto_approve,
            run,
        } => cmd_destroy(&path, auto_approve, &run, &formatter, &cancel).await,
        Commands::Refresh { path, run } => cmd_refresh(&path, &run, &formatter, &cancel).await,
        Commands::Validate { path } => cmd_validate(&path, &formatter),
        Commands::Show { planfile } => cmd_show(&planfile, &formatter).await,
        Commands::Graph { path, destroy, state } => cmd_graph(&path, destroy, state.as_deref()).await,
        Commands::State { path, state, command } => {
            cmd_state(&path, state.as_deref(), command, &formatter).await
        }
    }
}

/// Compute and show a plan.
async fn cmd_plan(
    path: &Path,
    options: PlanOptions,
    out: Option<&Path>,
    run: &RunArgs,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let engine = build_engine(path, run)?;
    let plan = engine.plan(options, cancel).await?;

    let source = match out {
        Some(out) if !plan.has_errors() && plan.has_changes() => {
            save_plan(&plan, out).await?;
            PlanSource::Saved(out)
        }
        Some(out) => {
            debug!("Not saving a plan without changes to {}", out.display());
            PlanSource::NotSaved(out)
        }
        None => PlanSource::Unsaved,
    };
    emit(&formatter.format_plan(&plan, source))?;

    if plan.has_errors() {
        return Err(PlanError::HasErrors {
            count: plan.diagnostics.error_count(),
        }
        .into());
    }
    Ok(())
}

/// Apply a saved plan, or plan and apply a configuration.
async fn cmd_apply(
    path: &Path,
    config_dir: &Path,
    auto_approve: bool,
    run: &RunArgs,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    if is_plan_file(path) {
        info!("Applying saved plan: {}", path.display());
        let plan = load_plan(path).await?;
        let engine = build_engine(config_dir, run)?;
        return execute(&engine, &plan, formatter, cancel).await;
    }

    let engine = build_engine(path, run)?;
    let plan = engine.plan(PlanOptions::default(), cancel).await?;
    confirm_and_execute(&engine, &plan, auto_approve, formatter, cancel).await
}

/// Plan a destroy and apply it.
async fn cmd_destroy(
    path: &Path,
    auto_approve: bool,
    run: &RunArgs,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let engine = build_engine(path, run)?;
    let options = PlanOptions {
        mode: PlanMode::Destroy,
        refresh: true,
    };
    let plan = engine.plan(options, cancel).await?;
    confirm_and_execute(&engine, &plan, auto_approve, formatter, cancel).await
}

/// Refresh state from reality.
async fn cmd_refresh(
    path: &Path,
    run: &RunArgs,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let engine = build_engine(path, run)?;
    let outcome = engine.refresh(cancel).await?;
    emit(&formatter.format_refresh(&outcome))?;
    outcome.check()
}

/// Validate configuration.
fn cmd_validate(path: &Path, formatter: &OutputFormatter) -> Result<()> {
    let engine = build_engine(path, &RunArgs::default())?;
    info!("Validating configuration: {}", path.display());
    let diagnostics = engine.validate()?;

    if !diagnostics.is_empty() {
        emit(&formatter.format_diagnostics(&diagnostics))?;
    }
    if diagnostics.has_errors() {
        return Err(ConfigError::validation_general(format!(
            "{} error(s) found",
            diagnostics.error_count()
        ))
        .into());
    }

    let config = engine.config();
    emit(&formatter.success("The configuration is valid."))?;
    if !formatter.is_json() {
        eprintln!("\nConfiguration summary:");
        eprintln!("  Files: {}", config.files.len());
        eprintln!("  Modules: {}", config.modules().len());
        eprintln!(
            "  Resources: {}",
            config.modules().iter().map(|m| m.resources.len()).sum::<usize>()
        );
    }
    Ok(())
}

/// Render a saved plan.
async fn cmd_show(planfile: &Path, formatter: &OutputFormatter) -> Result<()> {
    let plan = load_plan(planfile).await?;
    emit(&formatter.format_plan(&plan, PlanSource::File(planfile)))
}

/// Print the dependency graph.
async fn cmd_graph(path: &Path, destroy: bool, state: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let store = open_store(&config, state)?;
    let engine = Engine::new(config, store).with_env_variables(variables_from_env());
    let mode = if destroy { GraphMode::Destroy } else { GraphMode::Plan };
    let (graph, diagnostics) = engine.graph(mode).await?;
    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
    }
    emit(&graph.to_dot())
}

/// State management commands.
async fn cmd_state(
    path: &Path,
    state: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let store: Arc<dyn StateStore> = match state {
        Some(state) => open_store(&Configuration::default(), Some(state))?,
        None => open_store(&load_config(path)?, None)?,
    };
    debug!("Using {} state at {}", store.backend_type(), store.location());

    match command {
        StateCommands::List => {
            let state = store.load().await?.unwrap_or_default();
            emit(&formatter.format_state_list(&state))?;
        }
        StateCommands::Show { address } => {
            let address = parse_address(&address)?;
            let state = store.load().await?.unwrap_or_default();
            let record = state.get(&address).ok_or_else(|| StateError::ResourceNotFound {
                address: address.to_string(),
            })?;
            emit(&formatter.format_record(record))?;
        }
        StateCommands::Rm { address } => {
            let address = parse_address(&address)?;
            state_rm(store.as_ref(), &address).await?;
            emit(&formatter.success(&format!("Removed {address} from state")))?;
        }
        StateCommands::Unlock { force } => {
            if !force {
                return Err(ConfigError::validation(
                    "Unlocking removes a lock another process may hold; pass --force to confirm",
                    "force",
                )
                .into());
            }
            match store.force_unlock().await? {
                Some(lock) => emit(&formatter.success(&format!("Removed {lock}")))?,
                None => eprintln!("State is not locked."),
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Shows a plan, asks for confirmation, and applies it.
async fn confirm_and_execute(
    engine: &Engine,
    plan: &Plan,
    auto_approve: bool,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    emit(&formatter.format_plan(plan, PlanSource::Unsaved))?;
    if plan.has_errors() {
        return Err(PlanError::HasErrors {
            count: plan.diagnostics.error_count(),
        }
        .into());
    }
    if !plan.has_changes() {
        return Ok(());
    }

    if !auto_approve {
        let confirmed = if plan.mode == PlanMode::Destroy {
            prompt("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ")?.trim() == "destroy"
        } else {
            prompt("Do you want to apply this plan? [y/N]: ")?
                .trim()
                .eq_ignore_ascii_case("y")
        };
        if !confirmed {
            return Err(ApplyError::Declined.into());
        }
    }

    execute(engine, plan, formatter, cancel).await
}

/// Applies a plan and reports the outcome.
async fn execute(
    engine: &Engine,
    plan: &Plan,
    formatter: &OutputFormatter,
    cancel: &CancellationToken,
) -> Result<()> {
    let outcome = engine.apply(plan, cancel).await?;
    emit(&formatter.format_apply(&outcome, plan.mode == PlanMode::Destroy))?;
    outcome.check()
}

/// Reads one line from stdin after printing `message`.
fn prompt(message: &str) -> Result<String> {
    eprint!("{message}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input)
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}

/// Loads a configuration directory and its `.env` file.
fn load_config(path: &Path) -> Result<Configuration> {
    let base = if path.is_file() {
        path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    } else {
        path.to_path_buf()
    };
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;
    parser.load(path)
}

/// Picks the state store: an explicit path, then the backend block, then the
/// default location. An explicit path must exist.
fn open_store(config: &Configuration, explicit: Option<&Path>) -> Result<Arc<dyn StateStore>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(StateError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        return Ok(Arc::new(LocalStateStore::with_state_path(path)));
    }
    let store = match config.backend.as_ref().and_then(|b| b.path.as_ref()) {
        Some(path) => LocalStateStore::with_state_path(config.dir.join(path)),
        None => LocalStateStore::in_dir(&config.dir),
    };
    Ok(Arc::new(store))
}

/// Loads configuration and builds an engine for it.
fn build_engine(path: &Path, run: &RunArgs) -> Result<Engine> {
    let config = load_config(path)?;
    let store = open_store(&config, run.state.as_deref())?;
    debug!("Using {} state at {}", store.backend_type(), store.location());
    Ok(Engine::new(config, store)
        .with_variables(parse_var_assignments(&run.vars)?)
        .with_env_variables(variables_from_env())
        .with_parallelism(run.parallelism))
}

fn parse_address(input: &str) -> Result<ResourceAddress> {
    input
        .parse()
        .map_err(|e: strata::addrs::AddressParseError| ConfigError::validation(e.to_string(), "address").into())
}
