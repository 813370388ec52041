use std::path::PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use anyhow::{Context, Result};

use opskit::app::{daily_csv_path, App, BgpOverrides, QrOverrides};
use opskit::bgp::SamplingMode;
use opskit::services::dashboard_metrics::parse_target_date;
use opskit::utils::time_window::{parse_day, parse_instant};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// BGP announcement and upstream checks against RIPEstat
    Bgp {
        #[command(flatten)]
        target: TargetArgs,

        #[command(subcommand)]
        command: BgpCommand,
    },
    /// CloudVision dashboard scraping and export
    Dashboard {
        #[command(subcommand)]
        command: DashboardCommand,
    },
    /// Generate a coloured QR code PNG
    Qr {
        #[arg(long)]
        text: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        fill: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long)]
        box_size: Option<u32>,
    },
    /// Convert a FortiGate log file (or a folder of them) to CSV
    Fortigate {
        /// .log/.txt file or directory
        path: PathBuf,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Address block to check, e.g. 102.217.0.0/22
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Origin ASN of the prefix
    #[arg(long, global = true)]
    origin_asn: Option<String>,

    /// Watched upstream as NAME=ASN (repeatable)
    #[arg(long = "upstream", global = true)]
    upstreams: Vec<String>,
}

#[derive(Subcommand)]
enum BgpCommand {
    /// Active paths and upstreams at one instant (UTC)
    CheckAt {
        /// YYYY-MM-DD HH:MM:SS
        #[arg(long)]
        at: String,
        /// Print only the Yes/No summary line
        #[arg(long)]
        brief: bool,
    },
    /// Per-day upstream presence over a date range
    Daily {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, value_enum, default_value_t = Mode::EventDriven)]
        mode: Mode,
        /// CSV output file
        #[arg(long, conflicts_with = "csv_dir")]
        csv: Option<PathBuf>,
        /// Directory for data_<from>_to_<to>.csv
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// Announced-prefix check for the origin and watched upstreams
    Announced {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Print (and optionally open) the BGPlay page for a date range
    PlayUrl {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand)]
enum DashboardCommand {
    /// Scrape min/max statistics for the configured reports
    Stats {
        /// Target day, M/D/YYYY or YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Trigger the raw-data CSV export for a device interface
    Export {
        #[arg(long)]
        hostname: String,
        #[arg(long, default_value = "Ethernet1")]
        interface: String,
    },
    /// Trigger the raw-data export of every `[[dashboard.exports]]` link for a day
    ExportBatch {
        /// Target day, M/D/YYYY or YYYY-MM-DD
        #[arg(long)]
        date: String,
    },
    /// List inventory devices
    Inventory,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    EverySecond,
    EventDriven,
}

impl From<Mode> for SamplingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::EverySecond => SamplingMode::EverySecond,
            Mode::EventDriven => SamplingMode::EventDriven,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_file.as_ref());

    log::debug!("Starting opskit v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool, log_file: Option<&PathBuf>) {
    let log_level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log_level);

    if let Some(path) = log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                // Fall back to stderr if the log file can't be opened
                eprintln!("Cannot open log file {}: {}", path.display(), e);
            }
        }
    }

    builder.init();
}

fn run(cli: Cli) -> Result<()> {
    let app = App::new(cli.config).context("loading configuration")?;

    match cli.command {
        Commands::Bgp { target, command } => {
            let overrides = BgpOverrides {
                prefix: target.prefix,
                origin_asn: target.origin_asn,
                upstreams: target.upstreams,
            };
            let target = app.bgp_target(&overrides)?;

            match command {
                BgpCommand::CheckAt { at, brief } => {
                    app.bgp_check_at(&target, parse_instant(&at)?, brief)?;
                }
                BgpCommand::Daily { from, to, mode, csv, csv_dir } => {
                    let (from, to) = (parse_day(&from)?, parse_day(&to)?);
                    let csv_path = csv.or_else(|| csv_dir.map(|dir| daily_csv_path(&dir, from, to)));
                    app.bgp_daily(&target, from, to, mode.into(), csv_path.as_deref())?;
                }
                BgpCommand::Announced { from, to } => {
                    app.bgp_announced(&target, parse_day(&from)?, parse_day(&to)?)?;
                }
                BgpCommand::PlayUrl { from, to, open } => {
                    app.bgp_play_url(&target, parse_day(&from)?, parse_day(&to)?, open)?;
                }
            }
        }
        Commands::Dashboard { command } => match command {
            DashboardCommand::Stats { date, out_dir } => {
                app.dashboard_stats(parse_target_date(&date)?, &out_dir)?;
            }
            DashboardCommand::Export { hostname, interface } => {
                app.dashboard_export(&hostname, &interface)?;
            }
            DashboardCommand::ExportBatch { date } => {
                let outcomes = app.dashboard_export_batch(parse_target_date(&date)?)?;
                if outcomes.iter().all(|o| !o.succeeded) {
                    anyhow::bail!("none of the {} export links succeeded", outcomes.len());
                }
            }
            DashboardCommand::Inventory => {
                app.dashboard_inventory()?;
            }
        },
        Commands::Qr { text, output, fill, background, box_size } => {
            app.qr(&text, &output, &QrOverrides { fill, background, box_size })?;
        }
        Commands::Fortigate { path } => {
            // shells on Windows sometimes hand over the surrounding quotes
            let path = PathBuf::from(path.to_string_lossy().trim_matches(|c: char| c == '"' || c == '\''));
            app.fortigate(&path)?;
        }
    }

    Ok(())
}
