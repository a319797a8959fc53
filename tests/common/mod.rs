#![allow(dead_code)]

use std::sync::Arc;

use lodestar::io::FetchedData;
use lodestar::io::memory::MemoryFetcher;
use lodestar::resources::clock::ManualClock;
use lodestar::resources::loaders::{LoaderRegistry, RawLoader, ResourceLoader};
use lodestar::resources::{Payload, ResourceScheduler};
use lodestar::scene;
use lodestar::settings::SchedulerSettings;
use lodestar_files::ParserError;

pub const CDN: &str = "https://cdn.test/res";

pub fn url(path: &str) -> String {
    format!("{}/{}", CDN, path)
}

/// Raw bytes, but every decode costs `cost` seconds of the manual clock.
pub struct SlowLoader {
    pub clock: Arc<ManualClock>,
    pub cost: f64,
}

impl ResourceLoader for SlowLoader {
    fn decode(&self, path: &str, data: FetchedData) -> Result<Payload, ParserError> {
        self.clock.advance(self.cost);
        RawLoader.decode(path, data)
    }
}

/// Fails for every path.
pub struct BrokenLoader;

impl ResourceLoader for BrokenLoader {
    fn decode(&self, path: &str, _data: FetchedData) -> Result<Payload, ParserError> {
        Err(ParserError::FormatError {
            reason: format!("{} is broken", path),
        })
    }
}

pub struct Harness {
    pub fetcher: Arc<MemoryFetcher>,
    pub clock: Arc<ManualClock>,
    pub scheduler: ResourceScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SchedulerSettings::default())
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        let fetcher = Arc::new(MemoryFetcher::new());
        let clock = Arc::new(ManualClock::new());

        let mut loaders = LoaderRegistry::with_defaults(Arc::new(scene::registry()));
        loaders
            .register(
                &["slow"],
                Arc::new(SlowLoader {
                    clock: clock.clone(),
                    cost: 0.02,
                }),
            )
            .register(&["bad"], Arc::new(BrokenLoader));

        let mut scheduler = ResourceScheduler::new(settings, fetcher.clone(), clock.clone(), loaders);
        scheduler.register_prefix("res", CDN);

        Harness {
            fetcher,
            clock,
            scheduler,
        }
    }

    /// Advances the clock by `dt` and ticks.
    pub fn tick(&mut self, dt: f64) {
        self.clock.advance(dt);
        self.scheduler.tick();
    }
}
