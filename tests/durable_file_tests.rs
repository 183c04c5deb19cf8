use std::fs;

use redirect_logger::DurableFile;
use tempfile::tempdir;

#[test]
fn test_small_writes_stay_buffered() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffered.log");
    let mut file = DurableFile::open(&path, 16, false).unwrap();

    file.write(b"abc").unwrap();
    assert_eq!(file.buffered(), 3);
    assert_eq!(fs::read(&path).unwrap(), b"", "Nothing should reach the file before a flush");

    file.flush().unwrap();
    assert_eq!(file.buffered(), 0);
    assert_eq!(fs::read(&path).unwrap(), b"abc");
}

#[test]
fn test_write_that_does_not_fit_bypasses_buffer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bypass.log");
    let mut file = DurableFile::open(&path, 4, false).unwrap();

    file.write(b"ab").unwrap();
    file.write(b"cdefgh").unwrap();

    assert_eq!(file.buffered(), 0, "Oversized writes must not be re-buffered");
    assert_eq!(fs::read(&path).unwrap(), b"abcdefgh", "Buffered bytes must precede the direct write");
}

#[test]
fn test_exact_fit_is_buffered() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fit.log");
    let mut file = DurableFile::open(&path, 4, false).unwrap();

    file.write(b"ab").unwrap();
    file.write(b"cd").unwrap();
    assert_eq!(file.buffered(), 4);
    assert_eq!(file.capacity(), 4);
}

#[test]
fn test_drop_flushes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.log");
    {
        let mut file = DurableFile::open(&path, 1024, false).unwrap();
        file.write(b"line one\n").unwrap();
        file.write(b"line two\n").unwrap();
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline two\n");
}

#[test]
fn test_append_keeps_existing_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("append.log");
    fs::write(&path, "old\n").unwrap();

    let mut file = DurableFile::open(&path, 64, true).unwrap();
    file.write(b"new\n").unwrap();
    drop(file);

    assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
}

#[test]
fn test_truncate_discards_existing_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("truncate.log");
    fs::write(&path, "old\n").unwrap();

    let mut file = DurableFile::open(&path, 64, false).unwrap();
    file.write(b"new\n").unwrap();
    drop(file);

    assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
}

#[test]
fn test_unopenable_path_falls_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("nested.log");

    let file = DurableFile::open(&path, 64, false).unwrap();
    assert!(file.is_fallback(), "An unopenable path should fall back to stdout");
    assert!(!path.exists());
}

#[test]
fn test_regular_open_is_not_fallback() {
    let dir = tempdir().unwrap();
    let file = DurableFile::open(&dir.path().join("ok.log"), 64, false).unwrap();
    assert!(!file.is_fallback());
}
