use filetime::FileTime;
use rustthumb::monitor::{BackgroundFileMonitor, WatchState};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;

const POLL: Duration = Duration::from_millis(25);
const DEBOUNCE: Duration = Duration::from_millis(200);
// Scheduling noise on loaded CI machines.
const SLACK: Duration = Duration::from_millis(400);

#[test]
fn test_burst_of_touches_fires_once() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("photo.jpg");
    fs::write(&file, b"x").unwrap();
    filetime::set_file_mtime(&file, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let fired: Arc<Mutex<Vec<(PathBuf, Instant)>>> = Arc::default();
    let mut monitor = BackgroundFileMonitor::new(POLL, DEBOUNCE).unwrap();
    let sink = Arc::clone(&fired);
    monitor
        .add_directory(dir.path(), move |path| {
            sink.lock().unwrap().push((path.to_path_buf(), Instant::now()));
        })
        .unwrap();

    // Five touches within 100ms.
    for i in 1..=5_i64 {
        filetime::set_file_mtime(&file, FileTime::from_unix_time(2_000_000_000 + i, 0)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }
    let last_touch = Instant::now();

    let give_up = last_touch + DEBOUNCE + POLL + SLACK;
    while fired.lock().unwrap().is_empty() && Instant::now() < give_up {
        monitor.dispatch_timeout(Duration::from_millis(10));
    }
    // Anything else would have arrived well within another window.
    let quiet_until = Instant::now() + DEBOUNCE * 2;
    while Instant::now() < quiet_until {
        monitor.dispatch_timeout(Duration::from_millis(10));
    }

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 1, "expected exactly one callback");
    let (path, at) = &fired[0];
    assert_eq!(path, &fs::canonicalize(dir.path()).unwrap());
    assert!(at.duration_since(last_touch) <= DEBOUNCE + POLL + SLACK);

    monitor.shutdown();
}

#[test]
fn test_new_file_is_detected() {
    let dir = tempdir().unwrap();
    let count = Arc::new(Mutex::new(0_usize));
    let monitor = BackgroundFileMonitor::new(POLL, Duration::from_millis(50)).unwrap();
    let sink = Arc::clone(&count);
    monitor
        .add_directory(dir.path(), move |_| *sink.lock().unwrap() += 1)
        .unwrap();

    fs::write(dir.path().join("new.png"), b"fresh").unwrap();
    // Directory mtime granularity can be coarse; force a visible change.
    filetime::set_file_mtime(
        dir.path().join("new.png"),
        FileTime::from_unix_time(3_000_000_000, 0),
    )
    .unwrap();

    let give_up = Instant::now() + Duration::from_secs(3);
    while *count.lock().unwrap() == 0 && Instant::now() < give_up {
        monitor.dispatch_timeout(Duration::from_millis(20));
    }
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_independent_directories_fire_independently() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    fs::write(a.path().join("one.txt"), b"1").unwrap();
    fs::write(b.path().join("two.txt"), b"2").unwrap();

    let fired: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
    let monitor = BackgroundFileMonitor::new(POLL, Duration::from_millis(60)).unwrap();
    for dir in [a.path(), b.path()] {
        let sink = Arc::clone(&fired);
        monitor
            .add_directory(dir, move |p| sink.lock().unwrap().push(p.to_path_buf()))
            .unwrap();
    }
    assert_eq!(monitor.watched().len(), 2);

    filetime::set_file_mtime(a.path().join("one.txt"), FileTime::from_unix_time(3_100_000_000, 0))
        .unwrap();

    let give_up = Instant::now() + Duration::from_secs(3);
    while fired.lock().unwrap().is_empty() && Instant::now() < give_up {
        monitor.dispatch_timeout(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(200));
    monitor.dispatch_pending();

    let fired = fired.lock().unwrap();
    assert_eq!(fired.as_slice(), &[fs::canonicalize(a.path()).unwrap()]);
    assert_eq!(monitor.state_of(b.path()), Some(WatchState::Idle));
}

#[test]
fn test_unwatched_directory_stays_silent() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), b"1").unwrap();
    let count = Arc::new(Mutex::new(0_usize));
    let monitor = BackgroundFileMonitor::new(POLL, Duration::from_millis(40)).unwrap();
    let sink = Arc::clone(&count);
    monitor
        .add_directory(dir.path(), move |_| *sink.lock().unwrap() += 1)
        .unwrap();
    assert!(monitor.remove_directory(dir.path()));
    assert!(!monitor.remove_directory(dir.path()));

    filetime::set_file_mtime(dir.path().join("f.txt"), FileTime::from_unix_time(3_200_000_000, 0))
        .unwrap();
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(monitor.dispatch_pending(), 0);
    assert_eq!(*count.lock().unwrap(), 0);
    assert!(monitor.watched().is_empty());
}
