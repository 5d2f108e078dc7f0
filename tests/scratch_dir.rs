//! Scratch directory lifecycle against the real filesystem.

use std::fs;
use std::path::Path;

use testkit_rs::ScratchDir;

#[test]
fn full_lifecycle_with_written_artifacts() {
    let mut dir = ScratchDir::new();
    dir.set_up().unwrap();

    let root = dir.path().unwrap().to_path_buf();
    assert!(root.is_dir());
    assert!(fs::read_dir(&root).unwrap().next().is_none());

    let mut written = Vec::new();
    for i in 0..8u8 {
        let path = dir.temp_filepath(&format!("artifact-{i}.bin"));
        fs::write(&path, vec![i; 1024]).unwrap();
        written.push(path);
    }

    let report = dir.tear_down();
    assert_eq!(report.failed, 0);
    // The written files plus the root directory itself.
    assert_eq!(report.removed, written.len() + 1);
    for path in &written {
        assert!(!Path::new(path).exists());
    }
    assert!(!root.exists());
}

#[test]
fn filepath_matches_string_concatenation() {
    let mut dir = ScratchDir::new();
    dir.set_up().unwrap();
    assert_eq!(
        dir.temp_filepath("x.bin"),
        format!("{}x.bin", dir.temp_dir())
    );
    dir.tear_down();
}
