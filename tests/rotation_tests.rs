use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use redirect_logger::config::{Seconds, HOUR};
use redirect_logger::time_rotate::{bucket_start, bucket_tag};
use redirect_logger::{Logger, Metadata, Rotate, RotatePolicy, SizeRotate, TimeRotate};
use tempfile::tempdir;

/// 2023-11-14 22:13:20 UTC.
const NOW: i64 = 1_700_000_000;
const H: i64 = HOUR as i64;

fn touch(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

fn alias_target(alias: &Path) -> PathBuf {
    fs::read_link(alias).expect("alias should be a symlink")
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn test_probe_lists_matching_files() {
    let dir = tempdir().unwrap();
    let policy = RotatePolicy::builder().base(dir.path()).name("app").build();

    touch(&dir.path().join("app.0.log"), "");
    touch(&dir.path().join("app.2024-01-01_05.log"), "");
    touch(&dir.path().join("app..log"), "");
    touch(&dir.path().join("app.log"), "");
    touch(&dir.path().join("other.0.log"), "");
    touch(&dir.path().join("app.0.txt"), "");
    fs::create_dir(dir.path().join("app.9.log")).unwrap();

    let mut tags = policy.probe();
    tags.sort();
    assert_eq!(tags, vec!["0".to_string(), "2024-01-01_05".to_string()]);
    assert!(!policy.alias().exists(), "Probing should unlink the alias");
    assert!(dir.path().join("other.0.log").exists());
}

#[test]
fn test_policy_defaults() {
    let policy = RotatePolicy::builder().name("app").build();
    assert_eq!(policy.base(), Path::new("."));
    assert_eq!(policy.ext(), "log");
    assert_eq!(policy.max_files(), 6);
    assert_eq!(policy.buf_size(), 1024 * 1024);
    assert_eq!(policy.alias(), Path::new("./app.log"));

    let policy = RotatePolicy::builder().name("app").max_files(0).build();
    assert_eq!(policy.max_files(), 1);
}

#[test]
fn test_size_rotation_wraps_around() {
    let dir = tempdir().unwrap();
    let rotate = SizeRotate::builder()
        .base(dir.path())
        .name("app")
        .max_files(3)
        .buf_size(64)
        .size(10)
        .build();
    let alias = rotate.policy().alias().to_path_buf();
    let mut logger = Logger::new(rotate).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(0));
    assert_eq!(alias_target(&alias), Path::new("app.0.log"));

    logger.log(b"1234", 0).unwrap();
    assert_eq!(logger.rotation().written(), 4);
    logger.log(b"567890", 0).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(1));
    assert_eq!(logger.rotation().written(), 0);
    assert_eq!(fs::read_to_string(dir.path().join("app.0.log")).unwrap(), "1234567890");
    assert_eq!(alias_target(&alias), Path::new("app.1.log"));

    logger.log(b"abcdefghij", 0).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(2));
    assert_eq!(fs::read_to_string(dir.path().join("app.1.log")).unwrap(), "abcdefghij");

    logger.log(b"klmnopqrst", 0).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(0), "Slots should wrap modulo max_files");
    assert_eq!(fs::read_to_string(dir.path().join("app.2.log")).unwrap(), "klmnopqrst");
    assert_eq!(fs::read_to_string(dir.path().join("app.0.log")).unwrap(), "", "Reused slot should be truncated");

    logger.log(b"x", 0).unwrap();
    drop(logger);
    assert_eq!(fs::read_to_string(dir.path().join("app.0.log")).unwrap(), "x");
    assert_eq!(file_names(dir.path()), vec!["app.0.log", "app.1.log", "app.2.log", "app.log"]);
}

#[test]
fn test_size_rotation_resumes_partial_file() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("app.1.log"), "hello");

    let rotate = SizeRotate::builder()
        .base(dir.path())
        .name("app")
        .max_files(3)
        .size(100)
        .build();
    let mut logger = Logger::new(rotate).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(1));
    assert_eq!(logger.rotation().written(), 5, "Existing bytes count towards the threshold");

    logger.log(b"xyz", 0).unwrap();
    assert_eq!(logger.rotation().written(), 8);
    drop(logger);
    assert_eq!(fs::read_to_string(dir.path().join("app.1.log")).unwrap(), "helloxyz");
}

#[test]
fn test_size_rotation_skips_full_file() {
    let dir = tempdir().unwrap();
    let full = "x".repeat(100);
    touch(&dir.path().join("app.0.log"), &full);

    let rotate = SizeRotate::builder()
        .base(dir.path())
        .name("app")
        .max_files(3)
        .size(100)
        .build();
    let logger = Logger::new(rotate).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(1));
    assert_eq!(logger.rotation().written(), 0);
    drop(logger);
    assert_eq!(fs::read_to_string(dir.path().join("app.0.log")).unwrap(), full);
}

#[test]
fn test_size_rotation_resumes_most_recent_slot() {
    let dir = tempdir().unwrap();
    let older = dir.path().join("app.0.log");
    let newer = dir.path().join("app.2.log");
    touch(&older, "old");
    touch(&newer, "new");
    let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
    File::options()
        .write(true)
        .open(&older)
        .unwrap()
        .set_modified(an_hour_ago)
        .unwrap();

    let rotate = SizeRotate::builder()
        .base(dir.path())
        .name("app")
        .max_files(3)
        .size(100)
        .build();
    let logger = Logger::new(rotate).unwrap();
    assert_eq!(logger.rotation().active_slot(), Some(2));
    assert_eq!(logger.rotation().written(), 3);
}

#[test]
fn test_size_rotation_removes_foreign_files() {
    let dir = tempdir().unwrap();
    for name in ["app.x.log", "app.7.log", "app.01.log", "app.log", "other.txt"] {
        touch(&dir.path().join(name), "junk");
    }

    let rotate = SizeRotate::builder()
        .base(dir.path())
        .name("app")
        .max_files(3)
        .build();
    assert_eq!(rotate.slot_path(2), Some(dir.path().join("app.2.log").as_path()));
    assert_eq!(rotate.slot_path(3), None);
    let logger = Logger::new(rotate).unwrap();
    drop(logger);

    assert_eq!(file_names(dir.path()), vec!["app.0.log", "app.log", "other.txt"]);
    assert!(fs::symlink_metadata(dir.path().join("app.log")).unwrap().file_type().is_symlink());
}

#[test]
fn test_size_spill_does_not_account_triggering_write() {
    let dir = tempdir().unwrap();
    let mut rotate = SizeRotate::builder().base(dir.path()).name("app").size(10).build();

    assert!(!rotate.spill(Metadata { size: 9, seconds: 0 }));
    assert!(rotate.spill(Metadata { size: 1, seconds: 0 }));
    assert_eq!(rotate.written(), 9);
}

#[test]
fn test_time_span_snaps_to_ladder() {
    let dir = tempdir().unwrap();
    let rotate = TimeRotate::builder()
        .base(dir.path())
        .name("t")
        .span(90 * 60)
        .build_at(NOW);
    assert_eq!(rotate.span(), 2 * H);
    assert_eq!(rotate.current_bucket(), bucket_start(NOW, 2 * H));

    let rotate = TimeRotate::builder()
        .base(dir.path())
        .name("t")
        .span_seconds(Seconds::parse("30d").unwrap())
        .build_at(NOW);
    assert_eq!(rotate.span(), 7 * 24 * H);
}

#[test]
fn test_time_spill_advances_one_span_at_a_time() {
    let dir = tempdir().unwrap();
    let mut rotate = TimeRotate::builder().base(dir.path()).name("t").build_at(NOW);
    let start = rotate.current_bucket();
    let span = rotate.span();

    assert!(!rotate.spill(Metadata { size: 1, seconds: start + span }));

    let late = start + 5 * span + 1;
    let mut rotations = 0;
    while rotate.spill(Metadata { size: 1, seconds: late }) {
        rotations += 1;
        assert_eq!(rotate.current_bucket(), start + rotations * span);
    }
    assert_eq!(rotations, 5);
}

#[test]
fn test_time_rotation_retains_max_files() {
    let dir = tempdir().unwrap();
    let rotate = TimeRotate::builder()
        .base(dir.path())
        .name("t")
        .max_files(3)
        .build_at(NOW);
    let start = rotate.current_bucket();
    let policy = rotate.policy().clone();
    let mut logger = Logger::new(rotate).unwrap();

    for k in 1..=3 {
        logger.log(b"x", start + k * H + 1).unwrap();
    }
    assert_eq!(logger.rotation().current_bucket(), start + 3 * H);

    let expected: Vec<PathBuf> = (1..=3).map(|k| policy.path(&bucket_tag(start + k * H))).collect();
    let retained: Vec<PathBuf> = logger.rotation().retained().map(Path::to_path_buf).collect();
    assert_eq!(retained, expected);
    assert!(!policy.path(&bucket_tag(start)).exists(), "Oldest bucket should be evicted");

    let newest = expected[2].file_name().unwrap();
    assert_eq!(alias_target(policy.alias()), Path::new(newest));
}

#[test]
fn test_time_rotation_reconciles_directory() {
    let dir = tempdir().unwrap();
    let policy = RotatePolicy::builder()
        .base(dir.path())
        .name("t")
        .max_files(3)
        .build();
    let start = bucket_start(NOW, H);
    let tagged = |t: i64| policy.path(&bucket_tag(t));

    touch(&tagged(start), "old\n");
    touch(&tagged(start - H), "");
    touch(&tagged(start - 2 * H), "");
    touch(&tagged(start - 3 * H), "");
    touch(&tagged(start - 10 * H), "");
    touch(&tagged(start + 5 * H), "");
    touch(&policy.path("garbage"), "");

    let rotate = TimeRotate::at(policy.clone(), HOUR, NOW);
    let retained: Vec<PathBuf> = rotate.retained().map(Path::to_path_buf).collect();
    assert_eq!(retained, vec![tagged(start - 2 * H), tagged(start - H)]);
    assert!(!tagged(start - 3 * H).exists(), "Buckets past retention should be deleted");
    assert!(!tagged(start - 10 * H).exists());
    assert!(!policy.path("garbage").exists());
    assert!(tagged(start + 5 * H).exists(), "Future buckets are left alone");

    let mut logger = Logger::new(rotate).unwrap();
    assert_eq!(logger.rotation().retained().count(), 3);
    logger.log(b"new\n", NOW).unwrap();
    drop(logger);
    assert_eq!(fs::read_to_string(tagged(start)).unwrap(), "old\nnew\n");
}

#[test]
fn test_time_rotation_evicts_surplus_leftovers() {
    let dir = tempdir().unwrap();
    let policy = RotatePolicy::builder()
        .base(dir.path())
        .name("t")
        .max_files(2)
        .build();
    let span = 2 * H;
    let start = bucket_start(NOW, span);
    let tagged = |t: i64| policy.path(&bucket_tag(t));
    for k in 1..=3 {
        touch(&tagged(start - k * H), "");
    }

    let rotate = TimeRotate::at(policy.clone(), span as u64, NOW);
    let retained: Vec<PathBuf> = rotate.retained().map(Path::to_path_buf).collect();
    assert_eq!(retained, vec![tagged(start - H)]);
    assert!(!tagged(start - 2 * H).exists());
    assert!(!tagged(start - 3 * H).exists());
}
