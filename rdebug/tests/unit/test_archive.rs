//! Archive codec tests

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use rdebug::filesys::archive::{pack, parse_excludes, unpack, DEFAULT_EXCLUDES};

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Relative path (with `/`) to contents of every file under `root`
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(key, fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn sample_project(root: &Path) {
    write(root, "pom.xml", b"<project/>");
    write(root, "app/pom.xml", b"<project><parent/></project>");
    write(root, "app/src/main/java/com/acme/Main.java", b"class Main {}");
    write(root, "app/src/main/resources/empty.txt", b"");
    write(root, "app/target/classes/Main.class", b"\xca\xfe\xba\xbe");
    write(root, ".git/HEAD", b"ref: refs/heads/main");
    write(root, "lib/data.bin", &(0..=255u8).cycle().take(70_000).collect::<Vec<_>>());
}

#[test]
fn test_roundtrip_without_excludes() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    sample_project(src.path());

    let data = pack(src.path(), &HashSet::new()).unwrap();
    let files = unpack(&data, dst.path()).unwrap();

    let expected = snapshot(src.path());
    assert_eq!(files, expected.len());
    assert_eq!(snapshot(dst.path()), expected);
}

#[test]
fn test_excluded_names_skipped_at_every_depth() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    sample_project(src.path());
    write(src.path(), "target/root.jar", b"jar");

    let data = pack(src.path(), &parse_excludes(DEFAULT_EXCLUDES)).unwrap();
    unpack(&data, dst.path()).unwrap();

    let unpacked = snapshot(dst.path());
    assert!(unpacked.contains_key("app/src/main/java/com/acme/Main.java"));
    for path in unpacked.keys() {
        assert!(
            !path.split('/').any(|segment| segment == "target" || segment == ".git"),
            "{} should have been excluded",
            path
        );
    }
}

#[test]
fn test_exclusion_is_exact_name_match() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "targets/keep.txt", b"keep");
    write(src.path(), "my-target/keep.txt", b"keep");
    write(src.path(), "target", b"a file named target");

    let data = pack(src.path(), &parse_excludes("target")).unwrap();
    unpack(&data, dst.path()).unwrap();

    let keys: Vec<_> = snapshot(dst.path()).into_keys().collect();
    assert_eq!(keys, vec!["my-target/keep.txt", "targets/keep.txt"]);
}

#[test]
fn test_empty_tree_roundtrip() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let data = pack(src.path(), &HashSet::new()).unwrap();
    assert!(!data.is_empty());
    assert_eq!(unpack(&data, dst.path()).unwrap(), 0);
}
