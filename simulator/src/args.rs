use clap::Parser;
use serde::Serialize;
use sqlite_broker::QueryEncoding;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic sqlite-broker simulator")]
pub(crate) struct Args {
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Simulated callers submitting work.
    #[arg(long, default_value_t = 8)]
    pub(crate) callers: usize,
    /// On-disk database slots; slot 0 is always an in-memory database.
    #[arg(long, default_value_t = 3)]
    pub(crate) files: usize,
    #[arg(long, default_value_t = 0.02)]
    pub(crate) close_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) batch_rate: f64,
    #[arg(long, default_value_t = 0.01)]
    pub(crate) options_rate: f64,
    /// Row shape queries start out with; `options_rate` flips it during the run.
    #[arg(long, value_enum, default_value = "columns")]
    pub(crate) encoding: QueryEncoding,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    /// Replies a caller may leave outstanding before it must await one.
    #[arg(long, default_value_t = 6)]
    pub(crate) max_pending: usize,
    /// Directory for the on-disk slots. Defaults to a seed-named directory under the system
    /// temp dir.
    #[arg(long)]
    pub(crate) dir: Option<PathBuf>,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    /// Log every simulated step, not just the summary.
    #[arg(long)]
    pub(crate) verbose: bool,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) callers: usize,
    pub(crate) files: usize,
    pub(crate) close_rate: f64,
    pub(crate) batch_rate: f64,
    pub(crate) options_rate: f64,
    pub(crate) encoding: QueryEncoding,
    pub(crate) sleep_rate: f64,
    pub(crate) max_pending: usize,
    pub(crate) dir: PathBuf,
    pub(crate) log: Option<PathBuf>,
    pub(crate) verbose: bool,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let seed = args.seed.unwrap_or_else(random_seed);
        let mut config = SimConfig {
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            iterations: args.iterations,
            seed,
            callers: args.callers.max(1),
            files: args.files,
            close_rate: clamp_rate(args.close_rate),
            batch_rate: clamp_rate(args.batch_rate),
            options_rate: clamp_rate(args.options_rate),
            encoding: args.encoding,
            sleep_rate: clamp_rate(args.sleep_rate),
            max_pending: args.max_pending.max(1),
            dir: args
                .dir
                .unwrap_or_else(|| std::env::temp_dir().join(format!("sqlite-broker-sim-{seed}"))),
            log: args.log,
            verbose: args.verbose,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }

        config
    }

    /// Total database slots, the in-memory one included.
    pub(crate) fn slots(&self) -> usize {
        self.files + 1
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(5_000);
        self.duration_ms = None;
        self.callers = 4;
        self.files = 2;
        self.close_rate = 0.02;
        self.batch_rate = 0.05;
        self.sleep_rate = 0.05;
        self.max_pending = 4;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(200_000);
        self.duration_ms = None;
        self.callers = 48;
        self.files = 6;
        self.close_rate = 0.03;
        self.batch_rate = 0.08;
        self.options_rate = 0.02;
        self.sleep_rate = 0.08;
        self.max_pending = 12;
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rate_limits_bounds() {
        assert_eq!(clamp_rate(-1.0), 0.0);
        assert_eq!(clamp_rate(2.0), 1.0);
        assert_eq!(clamp_rate(0.5), 0.5);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn presets_override_flags() {
        let args = Args::parse_from([
            "simulator",
            "--seed",
            "7",
            "--callers",
            "2",
            "--encoding",
            "map-list",
            "--stress",
        ]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.encoding, QueryEncoding::MapList);
        assert_eq!(config.seed, 7);
        assert_eq!(config.callers, 48);
        assert_eq!(config.slots(), 7);
        assert!(config.dir.ends_with("sqlite-broker-sim-7"));
    }
}
