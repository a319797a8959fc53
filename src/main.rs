use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use lodestar::io::directory::DirectoryFetcher;
use lodestar::resources::clock::SystemClock;
use lodestar::resources::loaders::LoaderRegistry;
use lodestar::resources::{ResourceEntry, ResourceScheduler, ResourceState};
use lodestar::scene;
use lodestar::settings::{CliArgs, SchedulerSettings};
use lodestar_files::effect::types::EffectFile;
use lodestar_files::graph::types::ObjectGraph;
use log::{error, info, warn};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let settings = SchedulerSettings::load(&args)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let fetcher = DirectoryFetcher::new(&args.data_dir, runtime.handle().clone());
    let loaders = LoaderRegistry::with_defaults(Arc::new(scene::registry()));

    let mut scheduler = ResourceScheduler::new(settings, Arc::new(fetcher), Arc::new(SystemClock::new()), loaders);
    scheduler.register_prefix("res", "");
    for mapping in &args.prefixes {
        scheduler.register_prefix(&mapping.prefix, mapping.directory.clone());
    }

    let handles = args
        .paths
        .iter()
        .map(|path| scheduler.request(path))
        .collect::<Vec<_>>();

    let frame_time = Duration::from_secs_f64(args.frame_time.max(0.0));
    let mut ticks = 0;
    while scheduler.is_loading() && ticks < args.max_ticks {
        scheduler.tick();
        ticks += 1;
        std::thread::sleep(frame_time);
    }

    if scheduler.is_loading() {
        warn!(
            "Still loading after {} ticks ({} fetches pending, {} decodes queued)",
            ticks,
            scheduler.pending_count(),
            scheduler.queued_count()
        );
    }

    let mut failed = 0;
    for handle in &handles {
        let Some(entry) = scheduler.entry(handle.path()) else {
            continue;
        };

        match entry.state() {
            ResourceState::Prepared => info!("{}: {}", entry.path(), describe(entry)),
            ResourceState::Errored => {
                failed += 1;
                if let Some(err) = entry.error() {
                    error!("{}: {}", entry.path(), err);
                }
            }
            state => warn!("{}: still {:?}", entry.path(), state),
        }
    }

    if failed > 0 {
        bail!("{} of {} resources failed to load", failed, handles.len());
    }
    Ok(())
}

fn describe(entry: &ResourceEntry) -> String {
    if let Some(graph) = entry.payload_as::<ObjectGraph>() {
        return format!(
            "object graph with {} objects, {} referenced paths",
            graph.len(),
            graph.paths().len()
        );
    }

    if let Some(effect) = entry.payload_as::<EffectFile>() {
        return format!(
            "effect v{} with {} permutations and {} variants",
            effect.version(),
            effect.permutations().len(),
            effect.offsets().len()
        );
    }

    if let Some(bytes) = entry.payload_as::<Vec<u8>>() {
        return format!("{} bytes", bytes.len());
    }

    if let Some(text) = entry.payload_as::<String>() {
        return format!("{} characters of text", text.chars().count());
    }

    if let Some(json) = entry.payload_as::<serde_json::Value>() {
        return format!("json {}", json);
    }

    "prepared".to_string()
}
