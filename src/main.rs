use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use powerdown::{PowerdownApp, PowerdownConfig, ShutdownRequest, Trigger};

#[derive(Parser, Debug)]
#[command(name = "powerdown")]
#[command(about = "Ordered shutdown and reboot sequencer")]
#[command(version)]
#[command(long_about = "Quiesces the subsystems of a device in a fixed order before \
powering it off or rebooting it. Every phase is bounded by a deadline, so an \
unresponsive subsystem delays the power action but never prevents it.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "powerdown.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Log power actions instead of performing them
    #[arg(long, help = "Run the full sequence but only log the final power action")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Append logs to a file in addition to stderr")]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the sequence and power off
    Shutdown,
    /// Run the sequence and reboot
    Reboot {
        /// Reason handed to the kernel, e.g. "recovery"
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Finish a sequence interrupted by a restart
    Resume,
    /// Wait for SIGPWR or SIGUSR1 and run the matching sequence
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", PowerdownConfig::default().to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting powerdown v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match PowerdownConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if args.dry_run {
        config.terminal.dry_run = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let command = match args.command.clone() {
        Some(command) => command,
        None => {
            eprintln!("No command given, see --help");
            std::process::exit(2);
        }
    };

    let app = PowerdownApp::new(config).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    match command {
        Command::Shutdown => {
            run_sequence(&app, ShutdownRequest::shutdown()).await?;
        }
        Command::Reboot { reason } => {
            run_sequence(&app, ShutdownRequest::reboot(reason)).await?;
        }
        Command::Resume => {
            if !app.resume().await? {
                info!("Nothing to resume");
            }
        }
        Command::Watch => match app.watch().await? {
            Some(report) => info!(
                "Sequence {} finished, timed out phases: {:?}",
                report.sequence_id,
                report.timed_out()
            ),
            None => info!("Stopped watching"),
        },
    }

    Ok(())
}

async fn run_sequence(app: &PowerdownApp, request: ShutdownRequest) -> Result<()> {
    match app.run(request, Trigger::Command).await? {
        Some(report) => {
            let timed_out = report.timed_out();
            if !timed_out.is_empty() {
                warn!("Phases that hit their deadline: {:?}", timed_out);
            }
            // Reaching this point means the power action returned
            warn!("Sequence {} returned without cutting power", report.sequence_id);
        }
        None => info!("A shutdown sequence is already running"),
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("powerdown={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // The file sink flushes on its own thread; the guard must live until exit
    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name"))?;
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or(std::path::Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
