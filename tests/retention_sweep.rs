use fleetwarden::supervisor::RetentionSweeper;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

fn write_aged(path: &Path, age: Duration) {
    std::fs::write(path, b"not really an image").unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

fn sweeper(dirs: &[&Path]) -> RetentionSweeper {
    RetentionSweeper::new(
        dirs.iter().map(|d| d.to_path_buf()).collect(),
        &["png".to_string(), "jpg".to_string(), "webp".to_string()],
        Duration::from_secs(20 * 60),
        Duration::from_secs(60),
    )
}

#[test]
fn expired_images_are_deleted_and_fresh_ones_kept() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_aged(&a, Duration::from_secs(25 * 60));
    write_aged(&b, Duration::from_secs(5 * 60));

    let report = sweeper(&[dir.path()]).sweep_once(SystemTime::now());

    assert!(!a.exists());
    assert!(b.exists());
    assert_eq!(report.scanned, 2);
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.deleted[0].path, a);
    assert!(report.bytes_freed() > 0);
}

#[test]
fn other_extensions_and_subdirectories_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let old = Duration::from_secs(3 * 3600);

    let workflow = dir.path().join("workflow.json");
    write_aged(&workflow, old);
    let upper = dir.path().join("SHOUTY.PNG");
    write_aged(&upper, old);

    let nested = dir.path().join("batch");
    std::fs::create_dir(&nested).unwrap();
    let nested_image = nested.join("deep.png");
    write_aged(&nested_image, old);

    let report = sweeper(&[dir.path()]).sweep_once(SystemTime::now());

    assert!(workflow.exists());
    assert!(nested_image.exists());
    assert!(!upper.exists());
    assert_eq!(report.deleted.len(), 1);
}

#[test]
fn second_sweep_finds_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(&dir.path().join("a.jpg"), Duration::from_secs(3600));
    write_aged(&dir.path().join("b.jpg"), Duration::from_secs(60));
    let sweeper = sweeper(&[dir.path()]);

    let first = sweeper.sweep_once(SystemTime::now());
    let second = sweeper.sweep_once(SystemTime::now());

    assert_eq!(first.deleted.len(), 1);
    assert!(second.deleted.is_empty());
    assert_eq!(second.scanned, 1);
}

#[test]
fn missing_directory_does_not_stop_the_sweep() {
    let present = tempfile::tempdir().unwrap();
    let gone = present.path().join("never-created");
    let stale = present.path().join("stale.webp");
    write_aged(&stale, Duration::from_secs(3600));

    let report = sweeper(&[gone.as_path(), present.path()]).sweep_once(SystemTime::now());

    assert_eq!(report.missing_dirs, vec![gone]);
    assert!(!stale.exists());
    assert!(report.failed.is_empty());
}

#[test]
fn eligibility_is_judged_against_the_sweep_time() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("c.png");
    write_aged(&image, Duration::from_secs(10 * 60));
    let sweeper = sweeper(&[dir.path()]);

    let now = SystemTime::now();
    assert!(sweeper.sweep_once(now).deleted.is_empty());
    assert!(image.exists());

    let later = now + Duration::from_secs(15 * 60);
    assert_eq!(sweeper.sweep_once(later).deleted.len(), 1);
    assert!(!image.exists());
}

#[tokio::test]
async fn async_sweep_runs_off_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    write_aged(&dir.path().join("a.png"), Duration::from_secs(3600));

    let report = sweeper(&[dir.path()]).sweep_now().await;

    assert_eq!(report.deleted.len(), 1);
}
