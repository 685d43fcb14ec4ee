use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use console::style;
use cpucachesim::config::{CacheConfig, Config};
use cpucachesim::stats::{AccessKind, Level, PerLocation, Summary};
use cpucachesim::variable::{Poller, DEFAULT_POLL_INTERVAL};
use cpucachesim::{trace, Simulator};
use itertools::Itertools;
use serde::Serialize;
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Replays a memory access trace through a simulated cache hierarchy")]
pub struct Options {
    #[clap(help = "trace file, one access per line")]
    pub trace: PathBuf,

    #[clap(long = "config", help = "cache hierarchy configuration (YAML)")]
    pub config: Option<PathBuf>,

    #[clap(long = "i1", help = "I1 cache as <size>,<associativity>,<line size>")]
    pub i1: Option<CacheConfig>,

    #[clap(long = "d1", help = "D1 cache as <size>,<associativity>,<line size>")]
    pub d1: Option<CacheConfig>,

    #[clap(long = "ll", help = "LL cache as <size>,<associativity>,<line size>")]
    pub ll: Option<CacheConfig>,

    #[clap(long = "word-size", help = "granularity of spatial usage tracking in bytes")]
    pub word_size: Option<u64>,

    #[clap(long = "varinfo", help = "variable listing written by the traced program")]
    pub varinfo: Option<PathBuf>,

    #[clap(
        long = "poll-every",
        help = "accesses between attempts to load the variable listing",
        default_value_t = DEFAULT_POLL_INTERVAL
    )]
    pub poll_every: u64,

    #[clap(long = "json", help = "write per location statistics as JSON")]
    pub json: Option<PathBuf>,

    #[clap(long = "csv", help = "write per location statistics as CSV")]
    pub csv: Option<PathBuf>,
}

impl Options {
    fn config(&self) -> eyre::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path)
                .wrap_err_with(|| format!("failed to read config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(i1) = self.i1 {
            config.i1 = i1;
        }
        if let Some(d1) = self.d1 {
            config.d1 = d1;
        }
        if let Some(ll) = self.ll {
            config.ll = ll;
        }
        if let Some(word_size) = self.word_size {
            config.word_size = word_size;
        }
        config.validate()?;
        Ok(config)
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn print_summary(sim: &Simulator, summary: &Summary) {
    for level in Level::iter() {
        let cache = sim.cache(level);
        println!(
            "{:<4} {} ({} sets)",
            style(format!("{level}:")).bold(),
            cache,
            cache.geometry().num_sets
        );
    }
    println!();

    for kind in AccessKind::iter() {
        let counters = summary.counters(kind);
        if counters.accesses == 0 {
            continue;
        }
        println!(
            "{} {:>12}",
            style(format!("{kind} refs:")).cyan(),
            counters.accesses
        );
        let l1 = if kind.is_instruction() { "I1" } else { "D1" };
        for (name, misses, causes) in [
            (l1, counters.l1_misses, counters.l1_causes),
            ("LL", counters.ll_misses, counters.ll_causes),
        ] {
            println!(
                "  {name} misses: {misses:>12} ({:>5.2}%)  compulsory {} conflict {} capacity {}",
                percent(misses, counters.accesses),
                causes.compulsory,
                causes.conflict,
                causes.capacity,
            );
        }
    }
    println!();

    for (level, histogram) in summary.evictions.iter() {
        if histogram.total() == 0 {
            continue;
        }
        let bins = histogram
            .bins()
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(bin, count)| format!("{}:{count}", bin + 1))
            .join(" ");
        println!(
            "{} {bins}",
            style(format!("{level} evictions by words used:")).dim(),
        );
    }
    if !sim.variables().is_empty() {
        println!("{}", style("variables:").bold());
        for var in sim.variables().iter() {
            println!("  {var}");
        }
    }
}

fn write_csv_rows<R, T>(writer: impl std::io::Write, rows: R) -> eyre::Result<()>
where
    R: IntoIterator<Item = T>,
    T: Serialize,
{
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(false)
        .from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn write_stats(options: &Options, stats: &PerLocation) -> eyre::Result<()> {
    if let Some(ref path) = options.json {
        let writer = utils::fs::open_writable(path)?;
        serde_json::to_writer_pretty(writer, stats)?;
        log::info!("wrote JSON statistics to {}", path.display());
    }
    if let Some(ref path) = options.csv {
        write_csv_rows(utils::fs::open_writable(path)?, stats.flatten())?;
        log::info!("wrote CSV statistics to {}", path.display());
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let options = Options::parse();
    let config = options.config()?;
    let mut sim = Simulator::new(config)?;

    let mut poller = options
        .varinfo
        .as_ref()
        .map(|path| Poller::new(path, options.poll_every));

    let start = std::time::Instant::now();
    let reader = utils::fs::open_readable(&options.trace)?;
    let num_accesses = trace::replay(reader, &mut sim, poller.as_mut())
        .wrap_err_with(|| format!("failed to replay {}", options.trace.display()))?;

    // listing may have been written after the last poll
    if let Some(ref mut poller) = poller {
        poller.poll(sim.variables_mut());
    }
    sim.finish()?;
    log::info!(
        "simulated {num_accesses} accesses in {:?}",
        start.elapsed()
    );

    let summary = sim.stats().reduce();
    print_summary(&sim, &summary);
    write_stats(&options, sim.stats())?;
    Ok(())
}
