//! V2I Replay CLI
//!
//! Replays a scenario or a recorded track file as V2I status messages over
//! UDP, or simulates the run offline against a virtual clock.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use v2i_core::{
    Pacing, RunCoordinator, RunInput, RunParameters, RunSummary, SampleLog, SampleObserver, UnitOutcome,
};
use v2i_env::{Endpoint, TokioContext, UdpTransportFactory};
use v2i_sim::{
    load_scenario, load_tracks, FanoutObserver, LinkConditions, LoggingObserver, ReplaySimulator, SampleExport,
    SimulationMetrics,
};

/// V2I trajectory replay CLI
#[derive(Parser, Debug)]
#[command(name = "v2i-sim")]
#[command(about = "Replay vehicle trajectories as V2I status messages", long_about = None)]
struct Args {
    /// Scenario file (JSON) to replay
    #[arg(long, conflicts_with = "tracks", required_unless_present = "tracks")]
    scenario: Option<PathBuf>,

    /// Recorded track file (JSON) to replay
    #[arg(long)]
    tracks: Option<PathBuf>,

    /// Destination host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Destination UDP port
    #[arg(short, long, default_value = "26789")]
    port: u16,

    /// Sample period in milliseconds
    #[arg(long, default_value = "100")]
    period_ms: u64,

    /// Play each route once instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Track window start (0-100)
    #[arg(long, default_value = "0")]
    window_start: f64,

    /// Track window end (0-100)
    #[arg(long, default_value = "100")]
    window_end: f64,

    /// Send signal requests alongside basic status
    #[arg(long)]
    srm: bool,

    /// Requester role carried by signal requests
    #[arg(long, default_value = "14")]
    role: i32,

    /// Basic status messages between signal requests
    #[arg(long, default_value = "10")]
    bsm_per_srm: u32,

    /// Send vehicle-body status alongside basic status
    #[arg(long)]
    vbm: bool,

    /// Flag every vehicle as alerting
    #[arg(long)]
    alert_all: bool,

    /// Use distance pacing with this many meters per step
    #[arg(long)]
    resolution: Option<f64>,

    /// Stop after this many seconds (offline: per-unit horizon, default 60)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Simulate offline instead of sending
    #[arg(long)]
    simulate: bool,

    /// Seed for simulated link loss
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Simulated loss rate (0.0 - 1.0)
    #[arg(long, default_value = "0")]
    loss: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output
    #[arg(long)]
    json: bool,

    /// Export emitted samples to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Args {
    fn parameters(&self) -> RunParameters {
        let pacing = match self.resolution {
            Some(meters) => Pacing::Resolution { meters },
            None => Pacing::Frequency,
        };
        let mut params = RunParameters::default()
            .with_endpoint(Endpoint::new(self.host.clone(), self.port))
            .with_period_ms(self.period_ms)
            .with_loop(!self.no_loop)
            .with_window(self.window_start, self.window_end)
            .with_body_status(self.vbm)
            .with_alert_all(self.alert_all)
            .with_pacing(pacing);
        if self.srm {
            params = params.with_signal_requests(self.role, self.bsm_per_srm);
        }
        params
    }

    fn input(&self) -> anyhow::Result<(RunInput, String)> {
        if let Some(path) = &self.scenario {
            let route = load_scenario(path)?;
            return Ok((RunInput::Scenario(Arc::new(route)), path.display().to_string()));
        }
        if let Some(path) = &self.tracks {
            let tracks = load_tracks(path)?;
            return Ok((RunInput::Tracks(Arc::new(tracks)), path.display().to_string()));
        }
        bail!("either --scenario or --tracks is required")
    }
}

/// Resolves on ctrl-c (`true`) or once `limit` has passed (`false`).
async fn shutdown_signal(limit: Option<Duration>) -> bool {
    let timer = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            true
        }
        _ = timer => false,
    }
}

async fn run_live(
    params: RunParameters,
    input: RunInput,
    observer: Arc<dyn SampleObserver>,
    limit: Option<Duration>,
) -> anyhow::Result<RunSummary> {
    let coordinator =
        RunCoordinator::new(TokioContext::shared(), UdpTransportFactory, observer).with_parameters(params);
    let handle = coordinator.start_run(input)?;
    info!(run = %handle.run_id, units = handle.units, "replaying, ctrl-c to stop");

    let join = handle.join();
    tokio::pin!(join);

    let summary = tokio::select! {
        summary = &mut join => summary,
        interrupted = shutdown_signal(limit) => {
            if interrupted {
                info!("interrupted, stopping units");
                coordinator.request_exit();
            } else {
                info!("duration reached, stopping units");
                coordinator.request_stop();
            }
            join.await
        }
    };
    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    if !args.json {
        info!("V2I Replay v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let params = args.parameters();
    let (input, source) = args.input()?;

    let samples = Arc::new(SampleLog::new());
    let mut fanout = FanoutObserver::new().with(samples.clone());
    if args.verbose {
        fanout = fanout.with(Arc::new(LoggingObserver));
    }
    let observer: Arc<dyn SampleObserver> = Arc::new(fanout);

    let (summary, metrics): (RunSummary, Option<SimulationMetrics>) = if args.simulate {
        let conditions = LinkConditions::default().with_loss(args.loss);
        let result = ReplaySimulator::new(params)
            .with_seed(args.seed)
            .with_conditions(conditions)
            .with_duration(args.duration.unwrap_or(60.0))
            .with_observer(observer)
            .run(&input)
            .await?;
        (result.summary, Some(result.metrics))
    } else {
        let limit = args.duration.map(|secs| Duration::from_secs_f64(secs.max(0.0)));
        (run_live(params, input, observer, limit).await?, None)
    };

    if let Some(path) = &args.export {
        let mut export = SampleExport::new(&source);
        export.extend_from_log(&samples);
        export.finalize(summary.clone());
        export
            .write_to_file(path)
            .with_context(|| format!("failed to write export to {}", path.display()))?;
        info!("Exported {} samples to {}", export.sample_count(), path.display());
    }

    let faulted = summary.count(UnitOutcome::Faulted);

    if args.json {
        let output = serde_json::json!({
            "run_id": summary.run_id.to_string(),
            "source": source,
            "simulated": args.simulate,
            "units": summary.reports.len(),
            "skipped_vehicles": summary.skipped_vehicles,
            "completed": summary.count(UnitOutcome::Completed),
            "stopped": summary.count(UnitOutcome::Stopped),
            "faulted": faulted,
            "basic_sent": summary.basic_sent(),
            "signal_requests_sent": summary.signal_requests_sent(),
            "body_sent": summary.body_sent(),
            "send_failures": summary.send_failures(),
            "metrics": metrics,
            "reports": summary.reports,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "{} units | {} basic | {} signal requests | {} body | {} send failures",
            summary.reports.len(),
            summary.basic_sent(),
            summary.signal_requests_sent(),
            summary.body_sent(),
            summary.send_failures()
        );
        if !summary.skipped_vehicles.is_empty() {
            warn!("Skipped vehicles without a full segment: {:?}", summary.skipped_vehicles);
        }
        if let Some(metrics) = &metrics {
            info!(
                "{} frames delivered, {} lost, basic interval {}-{} ms",
                metrics.frames_delivered, metrics.frames_lost, metrics.min_interval_ms, metrics.max_interval_ms
            );
        }
    }

    if faulted > 0 {
        error!("{} units faulted", faulted);
        bail!("{} of {} units faulted", faulted, summary.reports.len());
    }
    Ok(())
}
