use std::fs;
use std::path::Path;

use tempfile::TempDir;
use vaultmove_scan::{IgnoreRuleSet, SizeAnalyzer};

fn write(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_ignore_patterns_applied() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"hello");
    write(dir.path(), "a.tmp", b"scratch");
    write(dir.path(), "cache/x/y.bin", b"cached bytes");

    let rules = IgnoreRuleSet::new(["*.tmp", "cache/**"]).unwrap();
    let result = SizeAnalyzer::new().analyze(dir.path(), &rules);

    assert_eq!(result.file_count, 1);
    assert_eq!(result.ignored_count, 2);
    assert_eq!(result.total_bytes, 5);
}

#[test]
fn test_analysis_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for i in 0..25 {
        write(dir.path(), &format!("d{}/f{i}.dat", i % 4), &vec![b'x'; i * 10]);
    }
    write(dir.path(), "skip/me.log", b"log");

    let rules = IgnoreRuleSet::parse("# logs\nskip/**\n").unwrap();
    let analyzer = SizeAnalyzer::new();
    let first = analyzer.analyze(dir.path(), &rules);
    let second = analyzer.analyze(dir.path(), &rules);

    assert_eq!(first.file_count, 25);
    assert_eq!(first.file_count, second.file_count);
    assert_eq!(first.total_bytes, second.total_bytes);
    assert_eq!(first.ignored_count, second.ignored_count);
}

#[test]
fn test_relative_paths_match_from_folder_root() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("cache");
    write(&folder, "keep.txt", b"1");
    write(&folder, "build/out.o", b"22");

    // The folder's own name is not part of the relative path.
    let rules = IgnoreRuleSet::new(["/cache/**", "/build/**"]).unwrap();
    let result = SizeAnalyzer::new().analyze(&folder, &rules);

    assert_eq!(result.file_count, 1);
    assert_eq!(result.ignored_count, 1);
    assert_eq!(result.total_bytes, 1);
}
