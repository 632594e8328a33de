use std::{
    process::{self, ExitCode},
    sync::Arc,
    time::SystemTime,
};

use chrono::{DateTime, Local};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

mod command;
mod config;
mod handlers;
mod idle;
mod listeners;
mod logging;
mod stream;
mod supervisor;
mod types;
mod wayland;

use command::MonitorFilter;
use config::{Config, ListenerPlan};
use handlers::HandlerRegistry;
use supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run handlers on Hyprland, Sway, logind and idle events", long_about = None)]
struct Args {
    /// Path to the JSON config file (defaults to $XDG_CONFIG_HOME/easyland/config.json)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon (default)
    Run,
    /// Print monitors reported by the compositor
    Monitors {
        #[arg(value_enum)]
        compositor: Compositor,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print the system hostname
    Hostname,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Compositor {
    Sway,
    Hyprland,
}

#[derive(ClapArgs, Debug)]
struct FilterArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    make: Option<String>,
    #[arg(long)]
    model: Option<String>,
}

impl From<FilterArgs> for MonitorFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            name: args.name,
            description: args.description,
            make: args.make,
            model: args.model,
        }
    }
}

fn print_monitors(compositor: Compositor, filter: MonitorFilter) -> anyhow::Result<()> {
    let monitors = match compositor {
        Compositor::Sway => command::sway_get_all_monitors()?,
        Compositor::Hyprland => command::hyprland_get_all_monitors()?,
    };

    if filter.is_empty() {
        println!("{}", serde_json::to_string_pretty(&monitors)?);
        return Ok(());
    }
    match command::find_monitor(&monitors, &filter) {
        Some(monitor) => println!("{}", serde_json::to_string_pretty(monitor)?),
        None => anyhow::bail!("No monitor matches the given filter"),
    }
    Ok(())
}

/// Resolves, loads and validates the config. Nothing has started when this
/// fails.
fn prepare(config_arg: Option<&str>) -> anyhow::Result<(ListenerPlan, HandlerRegistry)> {
    let config_path = config::resolve_config_path(config_arg)?;
    info!("Loading configuration from {}", config_path.display());
    let config = Config::load(&config_path)?;
    let plan = config.plan()?;
    let registry = HandlerRegistry::from_commands(&config.handlers);
    Ok((plan, registry))
}

fn describe_last_event(at: Option<SystemTime>) -> String {
    match at {
        Some(at) => format!(
            "Last Hyprland event at {}",
            DateTime::<Local>::from(at).format("%Y-%m-%d %H:%M:%S")
        ),
        None => "No Hyprland event received".to_string(),
    }
}

async fn run_daemon(config_arg: Option<&str>) -> anyhow::Result<ExitCode> {
    let (plan, registry) = match prepare(config_arg) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("{:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    info!("Loaded {} handler(s)", registry.len());

    let mut supervisor = Supervisor::start(plan, Arc::new(registry));
    info!("Started {} listener(s)", supervisor.worker_count());

    // Workers sit in blocking reads that a runtime shutdown would wait on, so
    // every exit from here on leaves through `process::exit` after killing the
    // listener processes.
    tokio::select! {
        result = supervisor.wait() => match result {
            Err(exit) => {
                error!("{}", exit);
                info!("{}", describe_last_event(supervisor.last_event()));
                supervisor.shutdown();
                process::exit(1);
            }
            Ok(()) => warn!("All listeners stopped, waiting for interrupt"),
        },
        signal = tokio::signal::ctrl_c() => signal?,
    }
    if supervisor.worker_count() == 0 {
        tokio::signal::ctrl_c().await?;
    }

    info!("Exiting...");
    supervisor.shutdown();
    process::exit(0);
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let subcommand = args.command.unwrap_or(Commands::Run);

    if matches!(subcommand, Commands::Run) {
        match logging::default_log_path() {
            Ok(path) => logging::init(Some(&path)),
            Err(e) => {
                logging::init(None);
                warn!("Logging to stderr only: {:#}", e);
            }
        }
    } else {
        logging::init(None);
    }

    match subcommand {
        Commands::Run => run_daemon(args.config.as_deref()).await,
        Commands::Monitors { compositor, filter } => {
            print_monitors(compositor, filter.into())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hostname => match command::hostname() {
            Some(hostname) => {
                println!("{hostname}");
                Ok(ExitCode::SUCCESS)
            }
            None => anyhow::bail!("Could not determine hostname"),
        },
    }
}
