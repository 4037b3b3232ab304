use anyhow::Result;
use log::info;
use std::thread;
use std::time::Duration;
use tracktor::test_stuff::DetectionGen;
use tracktor::trackers::options::TrackerBuilder;
use tracktor::worker::{TrackingWorker, WorkerOptions};

const PERIOD: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    env_logger::init();

    let tracker = TrackerBuilder::new(1)
        .confirmation_threshold(5)
        .stale_timeout(1.0)
        .build()?;

    let source = DetectionGen::new(1, PERIOD.as_secs_f32(), 0.05)
        .object(-30.0, 0.0, 4.0, 0.5)
        .object(10.0, 10.0, -1.0, -2.0)
        .object(0.0, -20.0, 0.0, 3.0);

    let mut worker = TrackingWorker::new(
        tracker,
        source,
        WorkerOptions {
            min_period: Some(PERIOD),
            ..Default::default()
        },
    );
    worker.start()?;

    let reader = worker.handle();
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        let snapshot = reader.current();
        for t in snapshot.tracking() {
            eprintln!(
                "step {:>4} track {:?}: position ({:>7.2}, {:>7.2}), velocity ({:>5.2}, {:>5.2})",
                snapshot.sequence, t.track_id, t.x, t.y, t.vx, t.vy
            );
        }
    }

    worker.stop();
    info!(
        "Stopped, reader sees {} tracks",
        reader.current().tracks.len()
    );
    Ok(())
}
