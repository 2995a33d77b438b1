//! Session close: commit, push, and clean up against local bare remotes.

mod common;

use common::Fixture;
use gitstore_kernel::{FinalizeStage, GitError, StoreError};

// ============================================================================
// Successful close
// ============================================================================

#[test]
fn test_close_commits_and_pushes_writes() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("index.html", "v1")], "initial");

    let (store, transport) = fx.open_counting(&fx.host.locator("site.git", None, ""));
    store.write_bytes("index.html", b"v2").unwrap();
    store.write_bytes("news/today.html", b"news").unwrap();
    store.close().unwrap();

    assert_eq!(site.read_file("master", "index.html").as_deref(), Some("v2"));
    assert_eq!(site.read_file("master", "news/today.html").as_deref(), Some("news"));
    assert_eq!(site.commit_count("master"), 2);
    assert_eq!(
        site.head_message("master").as_deref(),
        Some("Site deployed by gitstore")
    );
    assert_eq!(transport.pushes(), 1);
    assert_eq!(fx.work_entries(), 0, "working copy should be deleted");
    assert!(store.cache().is_empty());
}

#[test]
fn test_close_records_deletions() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("keep.txt", "k"), ("drop.txt", "d")], "initial");

    let store = fx.open(&fx.host.locator("site.git", None, ""));
    std::fs::remove_file(store.local_path("drop.txt").unwrap()).unwrap();
    store.close().unwrap();

    assert!(site.read_file("master", "drop.txt").is_none());
    assert_eq!(site.read_file("master", "keep.txt").as_deref(), Some("k"));
}

#[test]
fn test_close_uses_configured_commit_message() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("a.txt", "a")], "initial");

    let config = gitstore_kernel::StoreConfig {
        commit_message: "Publish docs".into(),
        ..fx.config()
    };
    let store = gitstore_kernel::GitStore::open(
        &fx.host.locator("site.git", None, ""),
        gitstore_kernel::Credentials::anonymous(),
        config,
    )
    .unwrap();
    store.write_bytes("a.txt", b"b").unwrap();
    store.close().unwrap();

    assert_eq!(site.head_message("master").as_deref(), Some("Publish docs"));
}

#[test]
fn test_close_creates_missing_branch_on_remote() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("README.md", "source")], "initial");

    let store = fx.open(&fx.host.locator("site.git", Some("gh-pages"), ""));
    store.write_bytes("index.html", b"<h1>docs</h1>").unwrap();
    store.close().unwrap();

    assert_eq!(
        site.read_file("gh-pages", "index.html").as_deref(),
        Some("<h1>docs</h1>")
    );
    assert!(site.read_file("gh-pages", "README.md").is_none());
    assert_eq!(site.commit_count("gh-pages"), 1);
    assert_eq!(site.commit_count("master"), 1, "master must be untouched");
}

#[test]
fn test_close_pushes_into_empty_remote() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");

    let store = fx.open(&fx.host.locator("site.git", None, ""));
    store.write_bytes("index.html", b"first").unwrap();
    store.close().unwrap();

    assert_eq!(site.read_file("master", "index.html").as_deref(), Some("first"));
}

#[test]
fn test_close_pushes_every_touched_repository() {
    let fx = Fixture::new();
    let foo = fx.host.create("foo.git");
    let bar = fx.host.create("bar.git");
    foo.commit_files("master", &[("a.txt", "a")], "initial");
    bar.commit_files("master", &[("b.txt", "b")], "initial");

    let store = fx.open(&fx.host.locator("foo.git", None, ""));
    store.write_bytes("../bar.git/c.txt", b"c").unwrap();
    store.close().unwrap();

    assert_eq!(bar.read_file("master", "c.txt").as_deref(), Some("c"));
    assert_eq!(bar.commit_count("master"), 2);
    assert_eq!(foo.commit_count("master"), 1, "nothing changed in foo");
    assert!(foo.read_file("master", "c.txt").is_none());
}

// ============================================================================
// Nothing to do
// ============================================================================

#[test]
fn test_unchanged_repository_skips_commit_and_push() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    let before = site.commit_files("master", &[("index.html", "v1")], "initial");

    let (store, transport) = fx.open_counting(&fx.host.locator("site.git", None, ""));
    assert_eq!(store.read_to_vec("index.html").unwrap(), b"v1");
    store.close().unwrap();

    assert_eq!(site.branch_head("master"), Some(before));
    assert_eq!(transport.pushes(), 0);
    assert_eq!(fx.work_entries(), 0);
}

#[test]
fn test_rewriting_identical_content_is_not_a_change() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    let before = site.commit_files("master", &[("index.html", "v1")], "initial");

    let store = fx.open(&fx.host.locator("site.git", None, ""));
    store.write_bytes("index.html", b"v1").unwrap();
    store.close().unwrap();

    assert_eq!(site.branch_head("master"), Some(before));
}

#[test]
fn test_close_without_operations_is_noop() {
    let fx = Fixture::new();
    fx.host.create("site.git");
    let (store, transport) = fx.open_counting(&fx.host.locator("site.git", None, ""));

    store.close().unwrap();
    assert_eq!(transport.clones(), 0);
    assert_eq!(transport.pushes(), 0);
}

#[test]
fn test_close_twice_is_noop() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("a.txt", "a")], "initial");

    let (store, transport) = fx.open_counting(&fx.host.locator("site.git", None, ""));
    store.write_bytes("b.txt", b"b").unwrap();
    store.close().unwrap();
    store.close().unwrap();

    assert_eq!(site.commit_count("master"), 2);
    assert_eq!(transport.pushes(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_rejected_push_is_reported_and_others_still_finalize() {
    let fx = Fixture::new();
    let foo = fx.host.create("foo.git");
    let bar = fx.host.create("bar.git");
    foo.commit_files("master", &[("a.txt", "a")], "initial");
    bar.commit_files("master", &[("b.txt", "b")], "initial");

    let store = fx.open(&fx.host.locator("foo.git", None, ""));
    store.write_bytes("a.txt", b"ours").unwrap();
    store.write_bytes("../bar.git/c.txt", b"c").unwrap();

    let bar_dir = store
        .cache()
        .get(&bar.address(), "master", &gitstore_kernel::Credentials::anonymous())
        .unwrap()
        .local_directory()
        .to_path_buf();

    // Someone else pushes to foo while the session is open.
    let theirs = foo.commit_files("master", &[("a.txt", "theirs")], "concurrent change");

    let err = store.close().unwrap_err();
    assert_eq!(err.addresses(), vec![foo.address().as_str()]);

    let failure = &err.failures[0];
    assert_eq!(failure.stage, FinalizeStage::Push);
    assert!(
        matches!(failure.source, GitError::Rejected { .. } | GitError::Git(_)),
        "unexpected source: {:?}",
        failure.source
    );
    let retained = failure.retained.as_ref().expect("failed working copy is kept");
    assert_eq!(
        std::fs::read_to_string(retained.join("a.txt")).unwrap(),
        "ours"
    );

    assert_eq!(foo.branch_head("master"), Some(theirs), "foo was not overwritten");
    assert_eq!(bar.read_file("master", "c.txt").as_deref(), Some("c"));
    assert!(!bar_dir.exists(), "successful working copy is deleted");

    let message = err.to_string();
    assert!(message.contains(&foo.address()), "{message}");
    assert!(!message.contains(&bar.address()), "{message}");
}

#[test]
fn test_finalize_error_converts_into_store_error() {
    let fx = Fixture::new();
    let site = fx.host.create("site.git");
    site.commit_files("master", &[("a.txt", "a")], "initial");

    let store = fx.open(&fx.host.locator("site.git", None, ""));
    store.write_bytes("a.txt", b"ours").unwrap();
    site.commit_files("master", &[("a.txt", "theirs")], "concurrent change");

    let err: StoreError = store.close().unwrap_err().into();
    assert!(matches!(err, StoreError::Finalize(_)));
}
