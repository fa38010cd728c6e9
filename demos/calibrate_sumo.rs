//! Calibrate a traffic-simulator stand-in over the full car/bus parameter set.
//!
//! A real objective would write the candidate into a SUMO vehicle-type file
//! inside the evaluation workspace, run the scenario, and compare the
//! recorded speed/acceleration/headway distributions against a reference
//! dataset. Here the "simulator" is synthetic: each statistic's divergence
//! is the normalised distance of a handful of parameters from a hidden
//! ground truth, plus a little noise and an occasional crash.
//!
//! Run with: `RUST_LOG=calibrate=debug cargo run --example calibrate_sumo -- 300`

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;
use std::result::Result;

use calibrate::log::JournalLog;
use calibrate::prelude::*;
use tracing_subscriber::EnvFilter;

const BOUNDS: [(&str, f64, f64); 28] = [
    ("car_tau_mean", 0.5, 4.0),
    ("car_tau_std", 0.0, 10.0),
    ("bus_tau_mean", 0.5, 4.0),
    ("bus_tau_std", 0.0, 10.0),
    ("car_acc", 0.2, 4.0),
    ("car_dcc", 0.2, 4.0),
    ("bus_acc", 0.2, 4.0),
    ("bus_dcc", 0.2, 4.0),
    ("car_sigma", 0.0, 1.0),
    ("car_lcSigma", 0.0, 1.0),
    ("bus_sigma", 0.0, 1.0),
    ("bus_lcSigma", 0.0, 1.0),
    ("car_v_mean", 8.0, 26.0),
    ("car_v_std", 0.0, 20.0),
    ("bus_v_mean", 8.0, 26.0),
    ("bus_v_std", 0.0, 20.0),
    ("car_lcSublane", 0.0, 1.0),
    ("bus_lcSublane", 0.0, 1.0),
    ("car_lcPushy", 0.0, 1.0),
    ("bus_lcPushy", 0.0, 1.0),
    ("car_lcSpeedGainRight", 0.0, 5.0),
    ("bus_lcSpeedGainRight", 0.0, 5.0),
    ("car_lcAssertive", 1.0, 100.0),
    ("bus_lcAssertive", 1.0, 100.0),
    ("car_lcCooperative", 0.0, 1.0),
    ("bus_lcCooperative", 0.0, 1.0),
    ("car_lcLookaheadLeft", 2.0, 100.0),
    ("bus_lcLookaheadLeft", 2.0, 100.0),
];

/// Parameters that drive each compared statistic.
const STATISTICS: [(&str, &[&str]); 4] = [
    ("speed", &["car_v_mean", "car_v_std", "bus_v_mean", "bus_v_std"]),
    ("acceleration", &["car_acc", "car_dcc", "bus_acc", "bus_dcc", "car_sigma"]),
    ("headway", &["car_tau_mean", "car_tau_std", "bus_tau_mean"]),
    (
        "lane_change",
        &["car_lcPushy", "car_lcAssertive", "car_lcCooperative", "car_lcSpeedGainRight"],
    ),
];

struct SyntheticSimulator {
    space: SearchSpace,
    truth: BTreeMap<&'static str, f64>,
}

impl SyntheticSimulator {
    fn new(space: SearchSpace) -> Self {
        let mut rng = fastrand::Rng::with_seed(2024);
        let truth = BOUNDS
            .iter()
            .map(|&(name, low, high)| (name, low + rng.f64() * (high - low)))
            .collect();
        Self { space, truth }
    }
}

impl Objective for SyntheticSimulator {
    type Error = String;

    fn evaluate(&self, candidate: &Candidate, ctx: &EvalContext) -> Result<Score, String> {
        if let Some(dir) = ctx.workspace() {
            let vtype: String = candidate
                .iter()
                .map(|(name, value)| format!("{name}=\"{value}\" "))
                .collect();
            fs::write(dir.join("vtypes.add.xml"), format!("<vType {vtype}/>\n"))
                .map_err(|e| e.to_string())?;
        }

        // Simulated run time and the odd simulator crash.
        std::thread::sleep(Duration::from_millis(fastrand::u64(5..25)));
        if fastrand::f64() < 0.03 {
            return Err("sumo exited with status 139".into());
        }

        let mut divergences = Vec::with_capacity(STATISTICS.len());
        for (_statistic, params) in STATISTICS {
            let mut sum = 0.0;
            for &name in params {
                let value = candidate.get(name).ok_or_else(|| format!("missing {name}"))?;
                let bounds = self.space.bounds(name).ok_or_else(|| format!("unknown {name}"))?;
                let truth = self.truth.get(name).copied().unwrap_or_default();
                sum += ((value - truth) / (bounds.high - bounds.low)).powi(2);
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = sum / params.len() as f64;
            divergences.push(mean.sqrt() + fastrand::f64() * 0.01);
        }
        Ok(Score::Vector(divergences))
    }

    fn max_retries(&self) -> usize {
        1
    }
}

fn main() -> calibrate::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("calibrate=info")),
        )
        .init();

    let budget = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(200);

    let space = BOUNDS
        .iter()
        .fold(SearchSpace::builder(), |b, &(name, low, high)| {
            b.param(name, low, high)
        })
        .build()?;

    let scratch = std::env::temp_dir().join("calibrate_sumo_demo");
    let journal = scratch.join("merge_run.jsonl");
    fs::create_dir_all(&scratch).map_err(|e| calibrate::Error::Storage(e.to_string()))?;

    let scheduler = Scheduler::builder(SyntheticSimulator::new(space.clone()))
        .model(RandomSearch::new(space))
        .log(JournalLog::new(&journal))
        .workers(8)
        .budget(budget)
        .precision(3)
        .poll_interval(Duration::from_millis(250))
        .workspace(WorkspaceConfig::new(scratch.join("runs")))
        .build()?;

    let report = scheduler.run()?;

    println!(
        "Stopped ({:?}) after issuing {} candidates: {} registered, {} failed, {} duplicates",
        report.stop_reason,
        report.issued,
        report.observations.len(),
        report.failed,
        report.duplicates,
    );
    if let Some(best) = report.best() {
        println!("Best fitness {:.4} (ticket {}):", best.fitness, best.id);
        for (name, value) in best.candidate.iter() {
            println!("  {name:<22} {value}");
        }
    }
    println!("Journal: {}", journal.display());

    Ok(())
}
