//! vmkit CLI entry point.
//!
//! Subcommands:
//! - install: provision a development VM from a profile
//! - ports: free development server ports
//! - monitor: CPU, memory, disk and network snapshot with alerts
//! - config / completions / version

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vmkit_common::{format_error_human, Error, OutputFormat, Result, RunId};
use vmkit_core::config::{
    load_config, load_settings_from_file, ConfigOptions, ResolvedConfig, MAX_INTERVAL_SECS,
    MAX_PORT_RANGE,
};
use vmkit_core::exit_codes::ExitCode;
use vmkit_core::install::{
    resolve_modules, InstallModule, InstallOptions, Installer, Profile, SystemShell,
};
use vmkit_core::log_event;
use vmkit_core::logging::{
    event_names, get_host_id, init_logging, LogConfig, LogContext, LogLevel, Stage,
};
use vmkit_core::monitor::{run_monitor, MonitorOptions, Sampler, Thresholds};
use vmkit_core::prompt::{AssumeYes, Confirm, TerminalPrompt};
use vmkit_core::style::Palette;

#[derive(Parser)]
#[command(name = "vmkit")]
#[command(author, version, about = "Development VM toolkit: installer, port killer, resource monitor", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides VMKIT_CONFIG and the XDG location)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install development tools, coding agents and config templates
    Install(InstallArgs),

    /// Find and stop processes listening on development ports
    Ports(PortsArgs),

    /// Show CPU, memory, disk and network usage
    Monitor(MonitorArgs),

    /// Inspect and validate configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print version information
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Install(_) => "install",
            Commands::Ports(_) => "ports",
            Commands::Monitor(_) => "monitor",
            Commands::Config(_) => "config",
            Commands::Completions { .. } => "completions",
            Commands::Version => "version",
        }
    }
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// agent (core + agents), full (every module) or custom
    #[arg(value_enum, default_value_t = Profile::Agent)]
    profile: Profile,

    /// Answer yes to every prompt
    #[arg(short = 'y', long)]
    non_interactive: bool,

    /// Skip tools that are already installed
    #[arg(short, long)]
    skip_existing: bool,

    /// Modules for the custom profile
    #[arg(long, value_enum, value_delimiter = ',')]
    modules: Vec<InstallModule>,

    /// Print the plan without installing or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Home directory that receives config templates
    #[arg(long, env = "VMKIT_HOME", value_name = "DIR")]
    home: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PortsArgs {
    /// Kill without asking
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// Only this port
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..), conflicts_with = "range")]
    port: Option<u16>,

    /// Ports per family, starting at each base port
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=MAX_PORT_RANGE as i64))]
    range: Option<u16>,

    /// Report listeners without killing them
    #[arg(long)]
    list: bool,

    /// Print the port report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Keep sampling until Ctrl+C
    #[arg(short, long)]
    continuous: bool,

    /// Print only alerts; exit 4 when a threshold is reached
    #[arg(short, long)]
    alert: bool,

    /// JSON output
    #[arg(short, long, conflicts_with = "simple")]
    json: bool,

    /// One-line output
    #[arg(short, long)]
    simple: bool,

    /// Seconds between samples (default from config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS))]
    interval: Option<u64>,

    /// Stop after N samples
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), requires = "continuous")]
    count: Option<u64>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show {
        /// JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Validate a config file (default: the resolved one)
    Validate {
        /// File to validate
        path: Option<PathBuf>,
    },
    /// Print where the config file is looked up
    Path,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = LogLevel::from_flags(cli.global.quiet, cli.global.verbose);
    init_logging(&LogConfig::resolve(cli_level).plain(!std::io::stderr().is_terminal()));

    let ctx = LogContext::new(RunId::new().to_string(), get_host_id());
    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_STARTED,
        Stage::Init,
        "run started",
        command = cli.command.name(),
        version = env!("CARGO_PKG_VERSION")
    );

    let global = &cli.global;
    let result = match &cli.command {
        Commands::Install(args) => run_install(global, args, &ctx),
        Commands::Ports(args) => run_ports(global, args, &ctx),
        Commands::Monitor(args) => run_monitor_command(global, args, &ctx),
        Commands::Config(args) => run_config(global, args, &ctx),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "vmkit", &mut io::stdout());
            Ok(ExitCode::Clean)
        }
        Commands::Version => {
            println!("vmkit {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => report_error(&e, global, &ctx),
    };
    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Init,
        "run finished",
        exit_code = exit_code.as_i32()
    );
    std::process::exit(exit_code.as_i32());
}

/// Print a fatal error on stderr and pick the exit code.
fn report_error(err: &Error, global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    let code = ExitCode::for_error(err);
    if code.is_internal_error() {
        log_event!(
            ctx,
            ERROR,
            event_names::INTERNAL_ERROR,
            Stage::Init,
            "internal error",
            error = err.to_string().as_str(),
            code = err.code()
        );
    }
    let use_color = !global.no_color
        && std::env::var_os("NO_COLOR").is_none()
        && io::stderr().is_terminal();
    eprintln!("{}", format_error_human(err, use_color));
    code
}

fn resolve_config(global: &GlobalOpts, ctx: &LogContext) -> Result<ResolvedConfig> {
    let options = ConfigOptions {
        config_path: global.config.clone(),
    };
    let resolved = match load_config(&options) {
        Ok(resolved) => resolved,
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::CONFIG_ERROR,
                Stage::Init,
                "config rejected",
                error = e.to_string().as_str()
            );
            return Err(e.into());
        }
    };
    match &resolved.source_path {
        Some(path) => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "config loaded",
            path = path.display().to_string().as_str()
        ),
        None => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no config file, using defaults",
            searched = resolved.config_path.display().to_string().as_str()
        ),
    }
    Ok(resolved)
}

// ============================================================================
// install
// ============================================================================

fn run_install(global: &GlobalOpts, args: &InstallArgs, ctx: &LogContext) -> Result<ExitCode> {
    let config = resolve_config(global, ctx)?;

    let modules = match resolve_modules(args.profile, &args.modules, !args.non_interactive) {
        Ok(modules) => modules,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::ArgsError);
        }
    };
    let home = args.home.clone().or_else(dirs::home_dir).ok_or_else(|| {
        Error::PreconditionFailed("cannot determine the home directory; pass --home".into())
    })?;

    let options = InstallOptions {
        skip_existing: args.skip_existing,
        dry_run: args.dry_run,
        assume_yes: args.non_interactive,
        home,
        use_sudo: config.settings.install.use_sudo,
    };
    let palette = Palette::detect(global.no_color);
    let mut shell = SystemShell::new(&config.settings.install);
    let mut prompt = TerminalPrompt;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let names: Vec<&str> = modules.iter().map(|m| m.as_str()).collect();
    writeln!(
        out,
        "{} profile: {}",
        palette.bold(&args.profile.to_string()),
        names.join(", ")
    )?;

    let report = Installer::new(&mut shell, &mut prompt, &mut out, ctx, options)
        .with_palette(palette)
        .run(&modules)?;

    Ok(if report.has_failures() {
        ExitCode::PartialFail
    } else {
        ExitCode::Clean
    })
}

// ============================================================================
// ports
// ============================================================================

#[cfg(unix)]
fn run_ports(global: &GlobalOpts, args: &PortsArgs, ctx: &LogContext) -> Result<ExitCode> {
    use vmkit_core::action::{SignalConfig, SignalRunner};
    use vmkit_core::collect::ToolRunner;
    use vmkit_core::ports::report::format_summary_line;
    use vmkit_core::ports::{
        default_probe, has_failures, target_ports, KillOptions, PortKiller, PortSelection,
        PortSummary, PortsRun,
    };

    let config = resolve_config(global, ctx)?;
    let settings = &config.settings.ports;
    let selection = PortSelection::from_args(args.port, args.range, settings)?;
    let ports = target_ports(&selection);

    let probe = default_probe(ToolRunner::with_defaults())?;
    let signaller = SignalRunner::new(SignalConfig::from(settings));
    let mut prompt: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalPrompt)
    };

    // With --json the per-port lines go to stderr and stdout carries the report
    let (mut human, palette): (Box<dyn Write>, Palette) = if args.json {
        (Box::new(io::stderr()), Palette::plain())
    } else {
        (Box::new(io::stdout().lock()), Palette::detect(global.no_color))
    };

    let options = KillOptions {
        assume_yes: args.yes,
        list_only: args.list,
    };
    let reports = PortKiller::new(
        probe.as_ref(),
        &signaller,
        prompt.as_mut(),
        human.as_mut(),
        ctx,
    )
    .with_palette(palette)
    .with_options(options)
    .run(&ports)?;

    let failed = has_failures(&reports);
    let summary = PortSummary::from_reports(&reports);
    if args.json {
        let run = PortsRun {
            run_id: ctx.run_id.clone(),
            ports: reports,
            summary,
        };
        drop(human);
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        writeln!(human, "\n{}", format_summary_line(&summary))?;
    }

    Ok(if failed {
        ExitCode::PartialFail
    } else {
        ExitCode::Clean
    })
}

#[cfg(not(unix))]
fn run_ports(_global: &GlobalOpts, _args: &PortsArgs, _ctx: &LogContext) -> Result<ExitCode> {
    Err(Error::UnsupportedPlatform(
        "the port killer needs Unix signals".into(),
    ))
}

// ============================================================================
// monitor
// ============================================================================

#[cfg(target_os = "linux")]
fn live_sampler(settings: vmkit_core::config::MonitorSettings) -> Result<Box<dyn Sampler>> {
    use vmkit_core::collect::{ProcNet, SystemReader, ToolRunner};
    use vmkit_core::monitor::LiveSampler;

    let reader = SystemReader::new("/proc", ToolRunner::with_defaults());
    Ok(Box::new(LiveSampler::new(reader, ProcNet::default(), settings)))
}

#[cfg(not(target_os = "linux"))]
fn live_sampler(_settings: vmkit_core::config::MonitorSettings) -> Result<Box<dyn Sampler>> {
    Err(Error::UnsupportedPlatform(
        "the resource monitor reads /proc and needs Linux".into(),
    ))
}

fn run_monitor_command(
    global: &GlobalOpts,
    args: &MonitorArgs,
    ctx: &LogContext,
) -> Result<ExitCode> {
    let config = resolve_config(global, ctx)?;
    let settings = config.settings.monitor;

    let options = MonitorOptions {
        format: OutputFormat::from_flags(args.json, args.simple),
        alert_only: args.alert,
        continuous: args.continuous,
        interval: Duration::from_secs(args.interval.unwrap_or(settings.interval_secs)),
        count: args.count,
        thresholds: Thresholds::from(&settings),
    };
    let palette = if options.format.is_machine() {
        Palette::plain()
    } else {
        Palette::detect(global.no_color)
    };
    let sampler = live_sampler(settings)?;

    let stop = Arc::new(AtomicBool::new(false));
    if options.continuous {
        let flag = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "could not install Ctrl+C handler");
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run_monitor(sampler.as_ref(), &options, &palette, &mut out, &stop, ctx)?;

    Ok(if args.alert && summary.alert_raised && !summary.interrupted {
        ExitCode::AlertRaised
    } else {
        ExitCode::Clean
    })
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs, ctx: &LogContext) -> Result<ExitCode> {
    match &args.command {
        ConfigCommands::Show { json } => {
            let config = resolve_config(global, ctx)?;
            let source = config
                .source_path
                .as_ref()
                .map(|p| p.display().to_string());
            if *json {
                let doc = serde_json::json!({
                    "source": source,
                    "config_path": config.config_path.display().to_string(),
                    "settings": &config.settings,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!(
                    "# source: {}",
                    source.as_deref().unwrap_or("built-in defaults")
                );
                print!("{}", config.settings.to_toml_string()?);
            }
            Ok(ExitCode::Clean)
        }
        ConfigCommands::Validate { path } => {
            let checked = match path {
                Some(path) => {
                    load_settings_from_file(path)?;
                    path.display().to_string()
                }
                None => {
                    let config = resolve_config(global, ctx)?;
                    match config.source_path {
                        Some(p) => p.display().to_string(),
                        None => "built-in defaults".to_string(),
                    }
                }
            };
            let palette = Palette::detect(global.no_color);
            println!("{} {}: valid", palette.ok(), checked);
            Ok(ExitCode::Clean)
        }
        ConfigCommands::Path => {
            let config = resolve_config(global, ctx)?;
            println!("{}", config.config_path.display());
            Ok(ExitCode::Clean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn modules_parse_as_comma_list() {
        let cli = Cli::try_parse_from([
            "vmkit",
            "install",
            "custom",
            "--modules",
            "core,modern_cli",
            "-y",
        ])
        .unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.profile, Profile::Custom);
                assert_eq!(
                    args.modules,
                    vec![InstallModule::Core, InstallModule::ModernCli]
                );
                assert!(args.non_interactive);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn port_range_is_bounded() {
        assert!(Cli::try_parse_from(["vmkit", "ports", "-r", "20"]).is_ok());
        assert!(Cli::try_parse_from(["vmkit", "ports", "-r", "21"]).is_err());
        assert!(Cli::try_parse_from(["vmkit", "ports", "-r", "0"]).is_err());
        assert!(Cli::try_parse_from(["vmkit", "ports", "-p", "3000", "-r", "2"]).is_err());
    }

    #[test]
    fn monitor_count_requires_continuous() {
        assert!(Cli::try_parse_from(["vmkit", "monitor", "--count", "2"]).is_err());
        assert!(Cli::try_parse_from(["vmkit", "monitor", "-c", "--count", "2"]).is_ok());
        assert!(Cli::try_parse_from(["vmkit", "monitor", "-j", "-s"]).is_err());
    }
}
