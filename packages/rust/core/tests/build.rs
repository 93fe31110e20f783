//! End-to-end builds over temporary source trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;

use filesmith_core::{
    BoxError, Concurrency, FileMap, FileRecord, Filesmith, FilesmithError, IgnoreRule, Plugin,
};

#[derive(Debug, thiserror::Error)]
#[error("Break!")]
struct Broken;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small site with nesting and front matter.
fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src, "index.md", "---\ntitle: A Title\n---\nbody");
    write(&src, "about.md", "about");
    write(&src, "blog/one.md", "---\ndraft: true\n---\none");
    write(&src, "blog/two.md", "two");
    write(&src, "blog/2024/three.md", "three");
    write(&src, "assets/style.css", "body {}");
    dir
}

/// Relative path → contents for every file under `root`.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(Result::unwrap)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn set_key(key: &'static str) -> Plugin {
    Plugin::sync(move |files, _| {
        for record in files.values_mut() {
            record.insert(key, true);
        }
        Ok(())
    })
    .named(key)
}

fn require_key(key: &'static str) -> Plugin {
    Plugin::sync(move |files, _| {
        if files.values().all(|record| record.get(key).is_some()) {
            Ok(())
        } else {
            Err(format!("missing key {key}").into())
        }
    })
    .named(format!("require-{key}"))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn front_matter_becomes_record_keys() {
    let dir = fixture();
    let smith = Filesmith::new(dir.path()).unwrap();
    let files = smith.read().await.unwrap();

    let index = &files["index.md"];
    assert_eq!(index.get("title"), Some(&json!("A Title")));
    assert_eq!(index.contents, b"body");
    assert_eq!(files["blog/one.md"].get("draft"), Some(&json!(true)));
}

#[tokio::test]
async fn disabled_front_matter_keeps_original_bytes() {
    let dir = fixture();
    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.set_frontmatter(false);
    let files = smith.read().await.unwrap();

    let index = &files["index.md"];
    assert!(index.get("title").is_none());
    assert_eq!(index.contents, b"---\ntitle: A Title\n---\nbody");
}

#[tokio::test]
async fn ignore_list_is_live_and_ordered() {
    let dir = fixture();
    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.ignore("x");
    assert_eq!(smith.ignores()[0].as_pattern(), Some("x"));

    smith.ignores_mut().clear();
    smith.ignores_mut().push("assets".into());
    let files = smith.read().await.unwrap();
    assert!(!files.keys().any(|k| k.starts_with("assets/")));
}

#[tokio::test]
async fn predicates_never_see_pruned_descendants() {
    let dir = fixture();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.ignore(IgnoreRule::predicate(move |path, stats| {
        log.lock().unwrap().push(path.to_path_buf());
        stats.is_dir && path == Path::new("blog")
    }));
    let files = smith.read().await.unwrap();

    assert!(!files.keys().any(|k| k.starts_with("blog/")));
    let seen = seen.lock().unwrap();
    assert!(seen.contains(&PathBuf::from("blog")));
    assert!(!seen.iter().any(|p| p.starts_with("blog") && p != Path::new("blog")));
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directories_are_read_as_directories() {
    let dir = fixture();
    let shared = dir.path().join("shared");
    write(&shared, "partial.html", "<p>shared</p>");
    std::os::unix::fs::symlink(&shared, dir.path().join("src/partials")).unwrap();

    let smith = Filesmith::new(dir.path()).unwrap();
    let files = smith.read().await.unwrap();
    assert_eq!(files["partials/partial.html"].contents, b"<p>shared</p>");
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plugin_order_is_significant() {
    let mut files = FileMap::new();
    files.insert("a.md".into(), FileRecord::new("a"));

    let mut smith = Filesmith::new("/work").unwrap();
    smith
        .run_with(&mut files.clone(), &[set_key("two"), require_key("two")])
        .await
        .unwrap();

    let err = smith
        .run_with(&mut files, &[require_key("two"), set_key("two")])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing key two");
}

#[tokio::test]
async fn conventions_mix_in_one_pipeline() {
    let dir = fixture();
    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith
        .use_plugin(Plugin::sync(|files, smith| {
            files.retain(|_, record| record.get("draft") != Some(&json!(true)));
            smith.metadata_mut().insert("count".into(), json!(files.len()));
            Ok(())
        }))
        .use_plugin(Plugin::callback(|files, smith, done| {
            let count = smith.metadata()["count"].clone();
            if let Some(record) = files.remove("about.md") {
                files.insert("about/index.md".into(), record.with("count", count));
            }
            tokio::spawn(async move { done.ok() });
        }))
        .use_plugin(Plugin::deferred(|files, smith| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                let count = smith.metadata().get("count").cloned().unwrap_or_default();
                files.insert("summary.txt".into(), FileRecord::new(count.to_string()));
                smith.metadata_mut().insert("finished".into(), json!(true));
                Ok::<(), BoxError>(())
            })
        }));

    let files = smith.process().await.unwrap();
    assert!(!files.contains_key("blog/one.md"));
    assert!(files.contains_key("about/index.md"));
    assert_eq!(files["about/index.md"].get("count"), Some(&json!(5)));
    assert_eq!(files["summary.txt"].contents, b"5");
    assert_eq!(smith.metadata()["finished"], json!(true));
}

async fn assert_failure_stops_pipeline(failing: Plugin) {
    let dir = fixture();
    let later = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&later);

    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.use_plugin(failing).use_plugin(Plugin::sync(move |_, _| {
        *flag.lock().unwrap() = true;
        Ok(())
    }));

    let err = smith.build().await.unwrap_err();
    assert_eq!(err.to_string(), "Break!");
    assert!(err.as_plugin().unwrap().downcast_ref::<Broken>().is_some());
    assert!(!*later.lock().unwrap());
    assert!(!dir.path().join("build").exists());
}

#[tokio::test]
async fn thrown_error_stops_pipeline() {
    assert_failure_stops_pipeline(Plugin::sync(|_, _| Err(Broken.into()))).await;
}

#[tokio::test]
async fn signalled_error_stops_pipeline() {
    assert_failure_stops_pipeline(Plugin::callback(|_, _, done| done.fail(Broken))).await;
}

#[tokio::test]
async fn rejected_future_stops_pipeline() {
    assert_failure_stops_pipeline(Plugin::deferred(|_, _| {
        Box::pin(async { Err::<(), BoxError>(Broken.into()) })
    }))
    .await;
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

#[tokio::test]
async fn output_is_independent_of_concurrency() {
    let dir = fixture();
    let mut trees = Vec::new();

    for (dest, concurrency) in [
        ("out-1", Concurrency::limited(1).unwrap()),
        ("out-3", Concurrency::limited(3).unwrap()),
        ("out-all", Concurrency::Unbounded),
    ] {
        let mut smith = Filesmith::new(dir.path()).unwrap();
        smith.set_destination(dest).set_concurrency_limit(concurrency);
        smith.build().await.unwrap();
        trees.push(snapshot(&dir.path().join(dest)));
    }

    assert_eq!(trees[0].len(), 6);
    assert_eq!(trees[0], trees[1]);
    assert_eq!(trees[1], trees[2]);
}

#[tokio::test]
async fn clean_build_removes_unrelated_files() {
    let dir = fixture();
    write(&dir.path().join("build"), "stale/old.html", "old");

    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.build().await.unwrap();

    let tree = snapshot(&dir.path().join("build"));
    assert!(!tree.contains_key(Path::new("stale/old.html")));
    assert_eq!(tree[Path::new("index.md")], b"body");
}

#[tokio::test]
async fn unclean_build_merges_into_destination() {
    let dir = fixture();
    write(&dir.path().join("build"), "stale/old.html", "old");

    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.set_clean(false);
    smith.build().await.unwrap();

    let tree = snapshot(&dir.path().join("build"));
    assert!(tree.contains_key(Path::new("stale/old.html")));
    assert!(tree.contains_key(Path::new("blog/2024/three.md")));
}

#[cfg(unix)]
#[tokio::test]
async fn permissions_survive_a_build() {
    use std::os::unix::fs::PermissionsExt;

    let dir = fixture();
    let script = dir.path().join("src/run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o777)).unwrap();

    let mut smith = Filesmith::new(dir.path()).unwrap();
    let files = smith.build().await.unwrap();
    assert_eq!(files["run.sh"].mode.as_deref(), Some("0777"));

    let mode = fs::metadata(dir.path().join("build/run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o777);
}

#[tokio::test]
async fn build_returns_the_written_map() {
    let dir = fixture();
    let mut smith = Filesmith::new(dir.path()).unwrap();
    smith.use_plugin(Plugin::sync(|files, _| {
        files.insert("extra.txt".into(), FileRecord::new("added"));
        Ok(())
    }));
    let files = smith.build().await.unwrap();

    assert!(files.contains_key("extra.txt"));
    assert_eq!(
        fs::read(dir.path().join("build/extra.txt")).unwrap(),
        b"added"
    );
}

#[tokio::test]
async fn invalid_front_matter_fails_the_build() {
    let dir = fixture();
    write(&dir.path().join("src"), "broken.md", "---\nfoo: [unclosed\n---\n");

    let mut smith = Filesmith::new(dir.path()).unwrap();
    let err = smith.build().await.unwrap_err();
    match err {
        FilesmithError::FrontMatter { path, .. } => assert!(path.ends_with("broken.md")),
        other => panic!("unexpected error: {other}"),
    }
}
