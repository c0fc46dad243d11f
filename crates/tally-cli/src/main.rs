//! Tally CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tally_calc::{
    BatchScheduler, Cached, Calculation, Count, EnvironmentConfig, EstimationCalculation,
    EstimationLoader, Estimator, Histogram, Parallelized, StatisticalUncertainty,
    TreeUncertainty, UncertaintyCalculation, WeightUncertainty, combine_uncertainty_bands,
    count_uncertainty, ratio_uncertainty_band, uncertainty_band,
};
use tally_core::{CacheBackend, Uncertainty};
use tally_data::{DataLoader, JsonLoader};
use tally_model::{
    AnalysisConfig, Distribution, DistributionLoader, Process, ProcessLoader, Region, RegionLoader,
};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - cached, batched event counting and histogramming")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Analysis configuration (YAML: processes, regions, distributions, estimations)
    #[arg(short, long)]
    analysis: PathBuf,

    /// Environment configuration (YAML: cache, backend). Defaults apply if omitted.
    #[arg(short, long)]
    environment: Option<PathBuf>,

    /// Processes to evaluate (repeatable). Defaults to all configured.
    #[arg(short, long = "process")]
    processes: Vec<String>,

    /// Regions to evaluate (repeatable). Defaults to all configured.
    #[arg(short, long = "region")]
    regions: Vec<String>,

    /// Estimations to evaluate alongside the processes (repeatable).
    /// Defaults to all configured.
    #[arg(long = "estimation")]
    estimations: Vec<String>,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Weighted event counts
    Count {
        #[command(flatten)]
        inputs: Inputs,

        /// Also report the statistical uncertainty of each count
        #[arg(long)]
        stat: bool,
    },

    /// Binned distributions
    Histogram {
        #[command(flatten)]
        inputs: Inputs,

        /// Distributions to fill (repeatable). Defaults to all configured.
        #[arg(short, long = "distribution")]
        distributions: Vec<String>,
    },

    /// Combined uncertainty band of a 1-D distribution
    Band {
        #[command(flatten)]
        inputs: Inputs,

        /// Distribution to fill
        #[arg(short, long)]
        distribution: String,

        /// Weight variation NAME:UP_WEIGHT:DOWN_WEIGHT (repeatable)
        #[arg(long = "weight-variation", value_parser = parse_variation)]
        weight_variations: Vec<VariationArg>,

        /// Tree variation NAME:UP_TREE:DOWN_TREE (repeatable)
        #[arg(long = "tree-variation", value_parser = parse_variation)]
        tree_variations: Vec<VariationArg>,

        /// Leave the statistical term out of the band
        #[arg(long)]
        no_stat: bool,
    },

    /// Print version information
    Version,
}

#[derive(Debug, Clone)]
struct VariationArg {
    name: String,
    up: String,
    down: String,
}

fn parse_variation(s: &str) -> std::result::Result<VariationArg, String> {
    let parts: Vec<&str> = s.splitn(3, ':').collect();
    match parts.as_slice() {
        [name, up, down] if !name.is_empty() && !up.is_empty() && !down.is_empty() => {
            Ok(VariationArg { name: name.to_string(), up: up.to_string(), down: down.to_string() })
        }
        _ => Err(format!("expected NAME:UP:DOWN, got '{s}'")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Count { inputs, stat } => cmd_count(&inputs, stat),
        Commands::Histogram { inputs, distributions } => cmd_histogram(&inputs, &distributions),
        Commands::Band { inputs, distribution, weight_variations, tree_variations, no_stat } => {
            cmd_band(&inputs, &distribution, &weight_variations, &tree_variations, !no_stat)
        }
        Commands::Version => {
            println!("tally {}", tally_core::VERSION);
            Ok(())
        }
    }
}

/// What a result row is evaluated for: a configured process, or an
/// estimation of one.
struct Target {
    name: String,
    process: Process,
    estimator: Option<Arc<dyn Estimator>>,
}

impl Target {
    /// `calc` as evaluated for this target.
    fn calculation(&self, calc: &Arc<dyn Calculation>) -> Arc<dyn Calculation> {
        match &self.estimator {
            None => Arc::clone(calc),
            Some(e) => Arc::new(EstimationCalculation::new(Arc::clone(e), Arc::clone(calc))),
        }
    }

    /// `uncertainty` as evaluated for this target.
    fn uncertainty(&self, uncertainty: &Arc<dyn UncertaintyCalculation>) -> Arc<dyn Calculation> {
        match &self.estimator {
            None => uncertainty.clone(),
            Some(e) => {
                Arc::new(EstimationCalculation::for_uncertainty(Arc::clone(e), Arc::clone(uncertainty)))
            }
        }
    }

    fn row(&self, region: &Region) -> serde_json::Value {
        serde_json::json!({
            "process": self.name,
            "estimated": self.estimator.is_some(),
            "region": region.label(),
        })
    }
}

/// Everything a command needs: configuration, selected inputs and the
/// execution environment.
struct Session {
    config: Arc<AnalysisConfig>,
    targets: Vec<Target>,
    regions: Vec<Region>,
    loader: Arc<dyn DataLoader>,
    store: Arc<dyn CacheBackend>,
    scheduler: Arc<BatchScheduler>,
}

impl Session {
    fn open(inputs: &Inputs) -> Result<Self> {
        tracing::info!(path = %inputs.analysis.display(), "loading analysis");
        let config = Arc::new(
            AnalysisConfig::load(&inputs.analysis)
                .with_context(|| format!("loading {}", inputs.analysis.display()))?,
        );
        let env = EnvironmentConfig::load(inputs.environment.as_deref())?;

        let process_loader = ProcessLoader::new(Arc::clone(&config));
        let region_loader = RegionLoader::new(Arc::clone(&config));
        let estimation_loader = EstimationLoader::new(Arc::clone(&config));
        let process_names = selected(&inputs.processes, process_loader.names());
        let region_names = selected(&inputs.regions, region_loader.names());
        let estimation_names = selected(&inputs.estimations, estimation_loader.names());

        let mut targets = Vec::new();
        for name in &process_names {
            let process = process_loader.load(name)?;
            targets.push(Target { name: name.clone(), process, estimator: None });
        }
        for name in &estimation_names {
            let e = estimation_loader.load(name)?;
            targets.push(Target { name: e.name, process: e.process, estimator: Some(e.estimator) });
        }
        let regions =
            region_names.iter().map(|n| region_loader.load(n)).collect::<tally_core::Result<_>>()?;

        let base_dir = inputs.analysis.parent().unwrap_or(Path::new(".")).to_path_buf();
        let loader: Arc<dyn DataLoader> = Arc::new(JsonLoader::new().with_base_dir(base_dir));
        let scheduler = Arc::new(env.scheduler());
        tracing::info!(backend = scheduler.backend_name(), cache = ?env.cache, "environment ready");
        Ok(Self { config, targets, regions, loader, store: env.persistent_cache(), scheduler })
    }

    /// Wrap a leaf calculation in the persistent cache and the scheduler.
    fn wrap<C: tally_calc::Parallelizable + 'static>(&self, calc: C) -> Arc<dyn Calculation> {
        Arc::new(Parallelized::new(
            Cached::new(calc, Arc::clone(&self.store)),
            Arc::clone(&self.scheduler),
        ))
    }

    fn distribution(&self, name: &str) -> Result<Distribution> {
        Ok(DistributionLoader::new(Arc::clone(&self.config)).load(name)?)
    }

    fn pairs(&self) -> impl Iterator<Item = (&Target, &Region)> {
        self.targets.iter().flat_map(|t| self.regions.iter().map(move |r| (t, r)))
    }
}

fn selected<'a>(requested: &[String], configured: impl Iterator<Item = &'a str>) -> Vec<String> {
    if requested.is_empty() {
        configured.map(str::to_string).collect()
    } else {
        requested.to_vec()
    }
}

fn cmd_count(inputs: &Inputs, stat: bool) -> Result<()> {
    let session = Session::open(inputs)?;
    let count = session.wrap(Count::new(Arc::clone(&session.loader)));
    let statistical: Arc<dyn UncertaintyCalculation> =
        Arc::new(StatisticalUncertainty::new(Arc::clone(&count)));

    let rows = session.scheduler.evaluate(|| {
        let mut rows = Vec::new();
        for (t, r) in session.pairs() {
            let p = &t.process;
            let n = t.calculation(&count).call(p, r)?.as_scalar()?;
            let mut row = t.row(r);
            row["count"] = serde_json::json!(n);
            if stat {
                let u = t.uncertainty(&statistical).call(p, r)?;
                let (up, down) = count_uncertainty(n, u.as_uncertainty()?)?;
                row["stat_up"] = serde_json::json!(up);
                row["stat_down"] = serde_json::json!(down);
            }
            rows.push(row);
        }
        Ok(rows)
    })?;
    tracing::info!(results = rows.len(), "counts complete");

    write_json(inputs.output.as_ref(), serde_json::json!({ "counts": rows }))
}

fn cmd_histogram(inputs: &Inputs, distributions: &[String]) -> Result<()> {
    let session = Session::open(inputs)?;
    let names = selected(distributions, DistributionLoader::new(Arc::clone(&session.config)).names());
    let histograms = names
        .iter()
        .map(|n| {
            let d = session.distribution(n)?;
            Ok((n.clone(), session.wrap(Histogram::new(Arc::clone(&session.loader), d))))
        })
        .collect::<Result<Vec<_>>>()?;

    let rows = session.scheduler.evaluate(|| {
        let mut rows = Vec::new();
        for (t, r) in session.pairs() {
            for (name, h) in &histograms {
                let m = t.calculation(h).call(&t.process, r)?;
                let mut row = t.row(r);
                row["distribution"] = serde_json::json!(name);
                row["measurement"] = serde_json::to_value(m.as_measurement()?)?;
                rows.push(row);
            }
        }
        Ok(rows)
    })?;
    tracing::info!(results = rows.len(), "histograms complete");

    write_json(inputs.output.as_ref(), serde_json::json!({ "histograms": rows }))
}

fn cmd_band(
    inputs: &Inputs,
    distribution: &str,
    weight_variations: &[VariationArg],
    tree_variations: &[VariationArg],
    include_statistical: bool,
) -> Result<()> {
    let session = Session::open(inputs)?;
    let d = session.distribution(distribution)?;
    let histogram = session.wrap(Histogram::new(Arc::clone(&session.loader), d));

    let mut sources: Vec<Arc<dyn UncertaintyCalculation>> = Vec::new();
    for v in weight_variations {
        sources.push(Arc::new(WeightUncertainty::new(&v.name, &v.up, &v.down, Arc::clone(&histogram))));
    }
    for v in tree_variations {
        sources.push(Arc::new(TreeUncertainty::new(&v.name, &v.up, &v.down, Arc::clone(&histogram))));
    }
    if sources.is_empty() && !include_statistical {
        anyhow::bail!("no uncertainty sources: add --weight-variation/--tree-variation or drop --no-stat");
    }

    let rows = session.scheduler.evaluate(|| {
        let mut rows = Vec::new();
        for (t, r) in session.pairs() {
            let p = &t.process;
            let nominal = t.calculation(&histogram).call(p, r)?;
            let nominal = nominal.as_measurement()?;
            let mut bands = Vec::new();
            for s in &sources {
                let u = t.uncertainty(s).call(p, r)?;
                bands.push(uncertainty_band(nominal, u.as_uncertainty()?, false)?);
            }
            if include_statistical {
                bands.push(uncertainty_band(nominal, &Uncertainty::default(), true)?);
            }
            let band = combine_uncertainty_bands(&bands, Some(nominal), None)?;
            let ratio = ratio_uncertainty_band(nominal, &band)?;
            let mut row = t.row(r);
            row["distribution"] = serde_json::json!(distribution);
            row["sources"] = serde_json::json!(sources.iter().map(|s| s.name()).collect::<Vec<_>>());
            row["band"] = serde_json::to_value(&band)?;
            row["ratio"] = serde_json::to_value(&ratio)?;
            rows.push(row);
        }
        Ok(rows)
    })?;
    tracing::info!(results = rows.len(), "bands complete");

    write_json(inputs.output.as_ref(), serde_json::json!({ "bands": rows }))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variations() {
        let v = parse_variation("jes:jes_up:jes_down").unwrap();
        assert_eq!((v.name.as_str(), v.up.as_str(), v.down.as_str()), ("jes", "jes_up", "jes_down"));
        let w = parse_variation("sf:w*sf:w*(2-sf)").unwrap();
        assert_eq!(w.down, "w*(2-sf)");
        assert!(parse_variation("jes:up").is_err());
        assert!(parse_variation("::").is_err());
    }

    #[test]
    fn selection_defaults_to_configured() {
        let configured = ["a", "b"];
        assert_eq!(selected(&[], configured.iter().copied()), vec!["a", "b"]);
        assert_eq!(selected(&["b".to_string()], configured.iter().copied()), vec!["b"]);
    }
}
