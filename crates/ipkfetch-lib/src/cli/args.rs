use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber;

#[derive(Debug, Clone)]
pub enum Command {
    Sync {
        config_path: String,
        root: Option<String>,
        deploy_dir: Option<String>,
        year: Option<i32>,
        parallelism: Option<usize>,
        report_path: Option<String>,
    },
    Resolve {
        config_path: String,
        index_path: Option<String>,
        packages: Vec<String>,
        show_fields: bool,
    },
}

pub struct Args {
    pub command: Command,
    pub log_level: Level,
}

#[derive(Debug, Parser)]
#[command(
    name = "ipkfetch",
    version,
    about = "Fetch cross-compilation toolchain and deploy libraries from an ipk package feed"
)]
struct Cli {
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Sets the level of verbosity",
        action = ArgAction::Count,
        global = true
    )]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Download and unpack the build set into the root and the deploy set into the deploy directory
    Sync {
        #[arg(
            short = 'c',
            long = "config",
            value_name = "FILE",
            help = "Sets a custom config file",
            default_value = "ipkfetch.yaml"
        )]
        config: String,

        #[arg(
            short = 'r',
            long = "root",
            value_name = "DIR",
            help = "Overrides the toolchain root (default: ~/wpilib/<year>/roborio/arm-frc<year>-linux-gnueabi)"
        )]
        root: Option<String>,

        #[arg(
            short = 'd',
            long = "deploy-dir",
            value_name = "DIR",
            help = "Overrides the deploy directory, which is emptied on every run (default: ./extra_libs)"
        )]
        deploy_dir: Option<String>,

        #[arg(
            short = 'y',
            long = "year",
            value_name = "YEAR",
            help = "Season year used in the default root path (default: current year)"
        )]
        year: Option<i32>,

        #[arg(
            short = 'j',
            long = "parallelism",
            value_name = "N",
            help = "Overrides the number of simultaneous downloads"
        )]
        parallelism: Option<usize>,

        #[arg(
            long = "report",
            value_name = "FILE",
            help = "Writes a JSON summary of the run"
        )]
        report: Option<String>,
    },

    /// Print the download URL of each package without downloading it
    Resolve {
        #[arg(
            short = 'c',
            long = "config",
            value_name = "FILE",
            help = "Sets a custom config file",
            default_value = "ipkfetch.yaml"
        )]
        config: String,

        #[arg(
            short = 'i',
            long = "index",
            value_name = "FILE",
            help = "Uses a local Packages file instead of fetching it from the repository"
        )]
        index: Option<String>,

        #[arg(long = "fields", help = "Also prints every index field of each package")]
        show_fields: bool,

        #[arg(value_name = "PACKAGE", required = true)]
        packages: Vec<String>,
    },
}

pub fn parse_args() -> Args {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy()
                .add_directive("hyper_util=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap()),
        )
        .init();

    let command = match cli.command {
        CliCommand::Sync {
            config,
            root,
            deploy_dir,
            year,
            parallelism,
            report,
        } => Command::Sync {
            config_path: config,
            root,
            deploy_dir,
            year,
            parallelism,
            report_path: report,
        },
        CliCommand::Resolve {
            config,
            index,
            show_fields,
            packages,
        } => Command::Resolve {
            config_path: config,
            index_path: index,
            packages,
            show_fields,
        },
    };

    Args { command, log_level }
}
