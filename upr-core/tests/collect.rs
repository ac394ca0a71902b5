use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use upr_core::collect::{clean_path, collect, object_key, UploadGroup};

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"artifact").unwrap();
}

#[test]
fn parent_segments_become_up_in_object_keys() {
    assert_eq!(object_key(Path::new("a/../b/file.txt")), "a/up/b/file.txt");
    assert_eq!(
        object_key(Path::new("../../dist/app.tar.gz")),
        "up/up/dist/app.tar.gz"
    );
    assert_eq!(object_key(Path::new("/var/log/build.log")), "var/log/build.log");
}

#[test]
fn clean_path_drops_current_dir_segments() {
    assert_eq!(clean_path(Path::new("./a/./b.txt")), PathBuf::from("a/b.txt"));
    assert_eq!(clean_path(Path::new("a//b.txt")), PathBuf::from("a/b.txt"));
    assert_eq!(clean_path(Path::new("./")), PathBuf::from("."));
    assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
}

#[test]
fn directory_walk_returns_only_regular_files() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("dist");
    touch(&root.join("a.txt"));
    touch(&root.join("nested/deeper/b.bin"));
    fs::create_dir_all(root.join("empty")).unwrap();

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(root.join("nested"), root.join("linked-dir")).unwrap();
    }

    let group = collect(root.to_str().unwrap());

    let mut names: Vec<_> = group.iter().map(|(_, item)| item.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["a.txt".to_string(), "b.bin".to_string()]);
    for (_, item) in group.iter() {
        assert!(item.path.is_file(), "{:?} should be a regular file", item.path);
        assert!(item.url.is_none());
    }
}

#[test]
fn comma_separated_entries_are_merged_and_deduplicated() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    touch(&root.join("logs/one.log"));
    touch(&root.join("logs/two.log"));
    touch(&root.join("report.html"));

    let raw = format!(
        "{logs}, {one} ,{report},{missing},",
        logs = root.join("logs").display(),
        one = root.join("logs/./one.log").display(),
        report = root.join("report.html").display(),
        missing = root.join("does-not-exist").display(),
    );
    let group = collect(&raw);

    assert_eq!(group.len(), 3, "one.log must be collected once");
    let groups = group.groups();
    assert_eq!(groups.len(), 2);
    let logs_dir = root.join("logs").display().to_string();
    let logs = groups.iter().find(|g| g.dir == logs_dir).expect("logs group");
    assert_eq!(logs.items.len(), 2);
}

#[test]
fn groups_are_ordered_by_directory() {
    let mut group = UploadGroup::new();
    group.insert(PathBuf::from("zeta/z.txt")).unwrap();
    group.insert(PathBuf::from("alpha/a.txt")).unwrap();
    group.insert(PathBuf::from("top.txt")).unwrap();
    assert!(group.insert(PathBuf::from("alpha/a.txt")).is_none());

    let dirs: Vec<_> = group.groups().iter().map(|g| g.dir.to_string()).collect();
    assert_eq!(dirs, vec![".", "alpha", "zeta"]);
    assert_eq!(group.uploaded(), 0);
}

#[test]
fn unknown_paths_yield_an_empty_group() {
    let group = collect("definitely/not/here.txt");
    assert!(group.is_empty());
}

#[cfg(unix)]
#[test]
fn unreadable_files_are_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let root = tmp.path().join("dist");
    touch(&root.join("ok.txt"));
    let locked = root.join("locked.txt");
    touch(&locked);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Running as root: permissions are not enforced.
        return;
    }

    let walked = collect(root.to_str().unwrap());
    let direct = collect(locked.to_str().unwrap());

    let names: Vec<_> = walked.iter().map(|(_, item)| item.name.clone()).collect();
    assert_eq!(names, vec!["ok.txt".to_string()]);
    assert!(direct.is_empty());
}
