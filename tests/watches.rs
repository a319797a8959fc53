mod common;

use std::sync::{Arc, Mutex};

use common::{Harness, url};
use futures::FutureExt;
use lodestar::resources::ResourceState;
use lodestar::resources::watch::WatchOutcome;
use lodestar::scene::{Effect, TextureParameter};
use lodestar::settings::SchedulerSettings;
use lodestar_files::graph::types::ObjectGraph;
use lodestar_files::graph::writer::GraphWriter;

fn effect_graph() -> Vec<u8> {
    let mut w = GraphWriter::new();
    w.object(1, "Tr2Effect", |w| {
        w.property("name").string("hull");
        w.property("effectFilePath").string("res:/FX/hull.bin");
        w.property("parameters").list_header(1);
        w.object(2, "TriTextureParameter", |w| {
            w.property("name").string("DiffuseMap");
            w.property("resourcePath").string("res:/texture/missing.bin");
        });
    });
    w.into_bytes()
}

#[test_log::test]
fn watches_complete_once_every_dependency_settled() -> anyhow::Result<()> {
    let mut h = Harness::new();
    h.fetcher.insert(url("ship/hull.black"), effect_graph());
    h.fetcher.insert(url("fx/hull.bin"), vec![1, 2, 3, 4]);

    let graph = h.scheduler.fetch_object::<ObjectGraph>("res:/ship/hull.black");
    h.tick(0.016);
    let graph = graph.now_or_never().expect("prepared in the first tick")?;

    let effect = graph.root_as::<Effect>().expect("root is an effect");
    let texture = graph
        .get_as::<TextureParameter>(effect.parameters["DiffuseMap"])
        .expect("texture parameter");
    assert_eq!(texture.resource_path.as_str(), "res:/texture/missing.bin");

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let mut signal = h
        .scheduler
        .watch_with_progress(&*graph, move |settled, total| sink.lock().unwrap().push((settled, total)));
    let handles = graph
        .paths()
        .iter()
        .map(|path| h.scheduler.request(path))
        .collect::<Vec<_>>();

    assert!(h.scheduler.is_watched("res:/fx/hull.bin"));
    assert_eq!(h.scheduler.state("res:/texture/missing.bin"), Some(ResourceState::Errored));
    assert_eq!(signal.try_outcome(), None);

    h.tick(0.016);
    assert_eq!(h.scheduler.state("res:/fx/hull.bin"), Some(ResourceState::Prepared));
    assert_eq!(signal.try_outcome(), Some(WatchOutcome::Completed));
    assert_eq!(*progress.lock().unwrap(), vec![(2, 2)]);
    assert_eq!(h.scheduler.watch_count(), 0);
    assert_eq!(handles.len(), 2);
    Ok(())
}

#[test_log::test]
fn progress_is_reported_as_resources_settle() {
    let mut h = Harness::with_settings(SchedulerSettings {
        max_prepare_time: 0.0,
        ..Default::default()
    });
    h.fetcher.insert(url("a.bin"), vec![0]);
    h.fetcher.insert(url("b.bin"), vec![0]);

    let paths = ["res:/a.bin", "res:/b.bin"];
    let _handles = paths.iter().map(|path| h.scheduler.request(path)).collect::<Vec<_>>();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let mut signal = h
        .scheduler
        .watch_with_progress(&paths[..], move |settled, total| sink.lock().unwrap().push((settled, total)));

    h.tick(0.016);
    assert_eq!(signal.try_outcome(), None);
    h.tick(0.016);
    assert_eq!(signal.try_outcome(), Some(WatchOutcome::Completed));
    assert_eq!(*progress.lock().unwrap(), vec![(1, 2), (2, 2)]);
}

#[test_log::test]
fn watches_time_out() {
    let mut h = Harness::with_settings(SchedulerSettings {
        max_watched_time: 10.0,
        ..Default::default()
    });
    h.fetcher.insert(url("a.bin"), vec![0]);
    h.fetcher.set_paused(true);

    let handle = h.scheduler.request("res:/a.bin");
    let mut signal = h.scheduler.watch(&handle);

    h.tick(5.0);
    assert_eq!(signal.try_outcome(), None);
    h.tick(6.0);
    assert_eq!(signal.try_outcome(), Some(WatchOutcome::TimedOut));

    // Timing out only stops the waiting, the load goes on.
    h.fetcher.set_paused(false);
    h.tick(0.016);
    assert_eq!(h.scheduler.state("res:/a.bin"), Some(ResourceState::Prepared));
}

#[test_log::test]
fn unwatching_resolves_immediately() {
    let mut h = Harness::new();
    h.fetcher.set_paused(true);
    h.fetcher.insert(url("a.bin"), vec![0]);
    h.fetcher.insert(url("b.bin"), vec![0]);

    let a = h.scheduler.request("res:/a.bin");
    let b = h.scheduler.request("res:/b.bin");
    let mut by_id = h.scheduler.watch(&a);
    let mut by_object = h.scheduler.watch(&b);
    let mut everything = h.scheduler.watch(&["res:/a.bin", "res:/b.bin"][..]);

    assert!(h.scheduler.unwatch(by_id.id()));
    assert!(!h.scheduler.unwatch(by_id.id()));
    assert_eq!(by_id.try_outcome(), Some(WatchOutcome::Unwatched));

    assert_eq!(h.scheduler.unwatch_object(&b), 1);
    assert_eq!(by_object.try_outcome(), Some(WatchOutcome::Unwatched));

    h.tick(0.016);
    assert_eq!(everything.try_outcome(), None);
    h.scheduler.purge_watched();
    assert_eq!(
        everything.now_or_never(),
        Some(WatchOutcome::Unwatched)
    );

    // The fetches were never touched.
    assert_eq!(h.scheduler.pending_count(), 2);
}

#[test_log::test]
fn watched_resources_survive_purges() {
    let mut h = Harness::with_settings(SchedulerSettings {
        purge_time: 0,
        auto_purge: false,
        ..Default::default()
    });
    h.fetcher.insert(url("a.bin"), vec![0]);
    h.fetcher.insert(url("b.bin"), vec![0]);
    h.fetcher.insert(url("c.bin"), vec![0]);

    drop(h.scheduler.request("res:/a.bin"));
    drop(h.scheduler.request("res:/b.bin"));
    h.fetcher.set_paused(true);
    let _c = h.scheduler.request("res:/c.bin");
    // c stays pending, so the watch over b and c stays active.
    let _signal = h.scheduler.watch(&["res:/b.bin", "res:/c.bin"][..]);

    h.tick(0.0);
    h.tick(1.5);
    assert_eq!(h.scheduler.active_frame(), 1);

    let purged = h.scheduler.purge_inactive();
    assert_eq!(purged, vec!["res:/a.bin".to_string()]);
    assert!(h.scheduler.entry("res:/b.bin").is_some());
}

#[test_log::test]
fn watching_requests_the_missing_dependencies() -> anyhow::Result<()> {
    let mut h = Harness::new();
    h.fetcher.insert(url("ship/hull.black"), effect_graph());
    h.fetcher.insert(url("fx/hull.bin"), vec![1, 2, 3, 4]);

    let graph = h.scheduler.fetch_object::<ObjectGraph>("res:/ship/hull.black");
    h.tick(0.016);
    let graph = graph.now_or_never().expect("prepared in the first tick")?;
    assert!(h.scheduler.entry("res:/fx/hull.bin").is_none());

    h.fetcher.set_paused(true);
    let mut signal = h.scheduler.watch(&*graph);
    assert_eq!(h.fetcher.calls(), 3);
    assert_eq!(h.scheduler.state("res:/fx/hull.bin"), Some(ResourceState::Requested));

    h.tick(0.016);
    assert_eq!(signal.try_outcome(), None);
    // The watch holds the entries, nobody else does.
    assert_eq!(h.scheduler.entry("res:/fx/hull.bin").unwrap().ref_count(), 1);

    h.fetcher.set_paused(false);
    h.tick(0.016);
    assert_eq!(h.scheduler.state("res:/fx/hull.bin"), Some(ResourceState::Prepared));
    assert_eq!(signal.try_outcome(), Some(WatchOutcome::Completed));
    Ok(())
}
