use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use fleetgrid::{
    AggregateReport, AggregatorBuilder, Config, JsonLinesSource, ReportSink, SqliteStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run configuration (TOML, or JSON with a .json extension)
    config: PathBuf,

    /// Replay the parameters recorded for this report id
    #[arg(long, value_name = "REPORT_ID", requires = "database")]
    reuse: Option<u64>,

    /// Read events from a JSON-lines file. With --database, the database only
    /// supplies reused parameters and stores the report
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// SQLite database holding gpsdata and the report tables
    #[arg(long, value_name = "DB")]
    database: Option<PathBuf>,

    /// Do not record the report even if the configuration asks for it
    #[arg(long)]
    no_record: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetgrid=info,info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut store = match &args.database {
        Some(path) => Some(
            SqliteStore::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => None,
    };

    if let Some(report_id) = args.reuse {
        let Some(store) = store.as_mut() else {
            bail!("--reuse needs --database");
        };
        let parameters = store.load_parameters(report_id)?;
        parameters.apply_to(&mut config);
        info!("reusing parameters of report {}", report_id);
    }
    if args.no_record {
        config.record_report = false;
    }

    let aggregator = AggregatorBuilder::new().config(config).build()?;
    let now = Utc::now();

    let result = match (&args.events, store.as_mut()) {
        (Some(path), _) => {
            let mut source = JsonLinesSource::new(path);
            aggregator.run(&mut source, now)
        }
        (None, Some(store)) => aggregator.run(store, now),
        (None, None) => bail!("no event source: pass --events or --database"),
    };

    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_empty_input() => {
            warn!("{}", e);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&report);

    if aggregator.config().record_report {
        match store.as_mut() {
            Some(store) => {
                let report_id = aggregator.record(store, &report, args.reuse, now)?;
                println!("Report ID: {}", report_id);
            }
            None => info!("no database given, report not recorded"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &AggregateReport) {
    println!(
        "{:>10} {:>12} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "cell", "ref_lat", "ref_long", "opp_lat", "opp_long", "local", "unicast", "bcast",
        "mcast", "ack"
    );
    for cell in &report.cells {
        println!(
            "{:>10} {:>12.6} {:>12.6} {:>12.6} {:>12.6} {:>8} {:>8} {:>8} {:>8} {:>8}",
            cell.index.to_string(),
            cell.reference.y(),
            cell.reference.x(),
            cell.opposite.y(),
            cell.opposite.x(),
            cell.local,
            cell.unicast,
            cell.broadcast,
            cell.multicast,
            cell.ack
        );
    }

    let summary = report.summary();
    println!(
        "Total: {} events in {} cells (local {}, unicast {}, broadcast {}, multicast {}, ack {})",
        summary.total(),
        summary.cells,
        summary.local,
        summary.unicast,
        summary.broadcast,
        summary.multicast,
        summary.ack
    );
    if let (Some(unicast), Some(broadcast), Some(multicast), Some(ack)) = (
        summary.unicast_pct,
        summary.broadcast_pct,
        summary.multicast_pct,
        summary.ack_pct,
    ) {
        println!(
            "Relative to local: unicast {:.2}%, broadcast {:.2}%, multicast {:.2}%, ack {:.2}%",
            unicast, broadcast, multicast, ack
        );
    }
    info!(
        "{} rows seen, {} outside boundary, {} motionless, {} pruned offline",
        report.stats.rows_seen,
        report.stats.outside_boundary,
        report.stats.motionless,
        report.stats.pruned_offline
    );
}
