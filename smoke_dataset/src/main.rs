// Command-line driver: plans a batch of smoke-over-background sets, draws the
// per-set look (scale, opacity, speed) at random and runs the batch.
//
// Usage:
//   smoke_dataset --smoke-dir clips/smoke --background-dir clips/background \
//                 --root dataset --set 50 --save-mask --save-bbox

use anyhow::{Context, bail};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smoke_synth::config::{SetConfig, SkyDetectorKind, SynthConfig};
use smoke_synth::{
    DirectoryWriter, FrameSource, GradientSkyDetector, ImageSequenceSource, ParallelPipeline, SetBuilder, SetJob,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Share of sets (or backgrounds, in all-pairs mode) written to the train split.
const TRAIN_FRACTION: f64 = 0.8;

#[derive(Parser, Debug)]
#[command(name = "smoke_dataset", about = "Synthesize a labeled smoke dataset")]
struct Args {
    /// Number of random sets to build; 0 builds every smoke x background pair.
    #[arg(long = "set", default_value_t = 0)]
    sets: usize,

    /// Also write the binary occupancy mask of every sample.
    #[arg(long)]
    save_mask: bool,

    /// Also write a YOLO bounding-box label for every sample.
    #[arg(long)]
    save_bbox: bool,

    /// Directory holding one subdirectory of frames per smoke clip.
    #[arg(long, default_value = "smoke")]
    smoke_dir: PathBuf,

    /// Directory holding one subdirectory of frames per background clip.
    #[arg(long, default_value = "background")]
    background_dir: PathBuf,

    /// Output dataset root.
    #[arg(long, default_value = "dataset")]
    root: PathBuf,

    /// Seed for every random draw; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; defaults apply to every missing field.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sets built concurrently; overrides the configuration.
    #[arg(long)]
    workers: Option<usize>,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(false))
            .with(env_filter)
            .init();
    }
}

/// Draws the look of one set on top of the configured defaults.
fn draw_set_config<R: Rng>(base: &SetConfig, train: bool, rng: &mut R) -> SetConfig {
    SetConfig {
        fx: rng.random_range(1..=9) as f64 / 10.0,
        fy: rng.random_range(1..=9) as f64 / 10.0,
        opacity: rng.random_range(4..=10) as f64 / 10.0,
        smoke_speed: rng.random_range(3..=10),
        train,
        ..base.clone()
    }
}

/// The first `floor(total * TRAIN_FRACTION)` indices train, the rest validate.
fn is_train(index: usize, total: usize) -> bool {
    index < (total as f64 * TRAIN_FRACTION) as usize
}

/// Pairs clips into jobs: `sets` random pairs, or every pair when `sets == 0`.
fn plan_jobs<R: Rng>(
    sets: usize,
    smoke: &[Arc<dyn FrameSource>],
    backgrounds: &[Arc<dyn FrameSource>],
    base: &SetConfig,
    rng: &mut R,
) -> Vec<SetJob> {
    let mut jobs = Vec::new();
    if sets > 0 {
        for set_index in 0..sets {
            let smoke_clip = smoke[rng.random_range(0..smoke.len())].clone();
            let background = backgrounds[rng.random_range(0..backgrounds.len())].clone();
            let config = draw_set_config(base, is_train(set_index, sets), rng);
            jobs.push(SetJob {
                set_index,
                smoke: smoke_clip,
                background,
                config,
                seed: rng.random(),
            });
        }
    } else {
        for (bg_index, background) in backgrounds.iter().enumerate() {
            for smoke_clip in smoke {
                let config = draw_set_config(base, is_train(bg_index, backgrounds.len()), rng);
                jobs.push(SetJob {
                    set_index: jobs.len(),
                    smoke: smoke_clip.clone(),
                    background: background.clone(),
                    config,
                    seed: rng.random(),
                });
            }
        }
    }
    jobs
}

fn discover(dir: &Path, size_max: u32) -> anyhow::Result<Vec<Arc<dyn FrameSource>>> {
    let clips = ImageSequenceSource::discover(dir, size_max)
        .with_context(|| format!("listing clips in {}", dir.display()))?;
    if clips.is_empty() {
        bail!("no clip directories found in {}", dir.display());
    }
    Ok(clips.into_iter().map(|c| Arc::new(c) as Arc<dyn FrameSource>).collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SynthConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => SynthConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.set.save_mask |= args.save_mask;
    config.set.save_bbox |= args.save_bbox;
    config.validate().context("invalid configuration")?;

    if config.detector == SkyDetectorKind::Depth {
        bail!("the depth sky detector needs a depth estimator, and none is linked into this binary");
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, sets = args.sets, workers = config.workers, "planning batch");
    let mut rng = StdRng::seed_from_u64(seed);

    let smoke = discover(&args.smoke_dir, config.set.size_max_smoke)?;
    let backgrounds = discover(&args.background_dir, config.set.size_max_bg)?;
    let jobs = plan_jobs(args.sets, &smoke, &backgrounds, &config.set, &mut rng);

    let writer = DirectoryWriter::create(&args.root)
        .with_context(|| format!("creating dataset layout under {}", args.root.display()))?;
    let builder = SetBuilder::new(
        Arc::new(GradientSkyDetector::new(config.sky.clone())),
        Arc::new(writer),
        config.poisson.clone(),
    );
    let pipeline = ParallelPipeline::new(builder, config.workers);

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current frame pairs");
            cancel.cancel();
        }
    });

    let (_, summary) = pipeline.run(jobs).await;
    info!(
        completed = summary.completed,
        skipped = summary.skipped,
        images = summary.images_written,
        labels = summary.labels_written,
        root = %args.root.display(),
        "dataset written"
    );
    if summary.failed > 0 {
        bail!("{} set(s) failed", summary.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoke_synth::{Frame, SynthResult};

    struct NamedClip(&'static str);

    impl FrameSource for NamedClip {
        fn name(&self) -> String {
            self.0.to_string()
        }

        fn frames(&self) -> SynthResult<Vec<Frame>> {
            Ok(Vec::new())
        }
    }

    fn clips(names: &[&'static str]) -> Vec<Arc<dyn FrameSource>> {
        names.iter().map(|&n| Arc::new(NamedClip(n)) as Arc<dyn FrameSource>).collect()
    }

    #[test]
    fn random_sets_split_by_index() {
        let mut rng = StdRng::seed_from_u64(1);
        let jobs = plan_jobs(10, &clips(&["s0", "s1"]), &clips(&["b0"]), &SetConfig::default(), &mut rng);
        assert_eq!(jobs.len(), 10);
        let train: Vec<bool> = jobs.iter().map(|j| j.config.train).collect();
        assert_eq!(train.iter().filter(|&&t| t).count(), 8);
        assert!(train[..8].iter().all(|&t| t));
        for job in &jobs {
            assert!((0.1..=0.9).contains(&job.config.fx));
            assert!((0.4..=1.0).contains(&job.config.opacity));
            assert!((3..=10).contains(&job.config.smoke_speed));
        }
    }

    #[test]
    fn small_batches_keep_a_validation_split() {
        for (total, expected_train) in [(1, 0), (2, 1), (3, 2), (4, 3), (5, 4), (6, 4)] {
            let mut rng = StdRng::seed_from_u64(total as u64);
            let jobs = plan_jobs(total, &clips(&["s0"]), &clips(&["b0"]), &SetConfig::default(), &mut rng);
            let train: Vec<bool> = jobs.iter().map(|j| j.config.train).collect();
            let expected: Vec<bool> = (0..total).map(|i| i < expected_train).collect();
            assert_eq!(train, expected, "{total} sets");
        }
    }

    #[test]
    fn all_pairs_split_by_background() {
        let mut rng = StdRng::seed_from_u64(2);
        let backgrounds = clips(&["b0", "b1", "b2", "b3", "b4"]);
        let jobs = plan_jobs(0, &clips(&["s0", "s1"]), &backgrounds, &SetConfig::default(), &mut rng);
        assert_eq!(jobs.len(), 10);
        let indices: Vec<usize> = jobs.iter().map(|j| j.set_index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
        // Backgrounds 0..4 train, background 4 val.
        assert!(jobs[..8].iter().all(|j| j.config.train));
        assert!(jobs[8..].iter().all(|j| !j.config.train && j.background.name() == "b4"));
    }
}
