//! End-to-end Clone/Update against real repositories on the local filesystem.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use gitmirror_core::{LabelKind, RepositoryConfig};
use gitmirror_sync::{
    Git2Backend, RetryPolicy, StatusTable, SyncOutcome, SyncWorker, Syncable, TriggerOutcome,
};
use tempfile::TempDir;

fn init_upstream(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).expect("init upstream")
}

fn commit_file(repo: &Repository, name: &str, contents: &str) -> Oid {
    let workdir = repo.workdir().expect("workdir");
    std::fs::write(workdir.join(name), contents).expect("write file");

    let mut index = repo.index().expect("index");
    index.add_path(Path::new(name)).expect("add");
    index.write().expect("write index");
    let tree = repo.find_tree(index.write_tree().expect("tree")).expect("find tree");

    let sig = Signature::now("Mirror Test", "mirror@example.com").expect("sig");
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, name, &tree, &parents)
        .expect("commit")
}

fn annotate(repo: &Repository, name: &str, commit: Oid) -> Oid {
    let target = repo.find_object(commit, None).expect("object");
    let sig = Signature::now("Mirror Test", "mirror@example.com").expect("sig");
    repo.tag(name, &target, &sig, "release", true).expect("tag")
}

fn mirror_config(upstream: &Path, checkout: &Path, label: &str, kind: LabelKind) -> RepositoryConfig {
    RepositoryConfig {
        url: upstream.display().to_string(),
        path: "/upstream".to_string(),
        directory: checkout.to_path_buf(),
        label: label.to_string(),
        label_kind: kind,
        remote: "origin".to_string(),
        secret: String::new(),
        ssh_private_key: None,
        ssh_passphrase: None,
        trigger: Some(checkout.with_extension("trigger")),
    }
}

fn retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 1,
        delay: Duration::from_millis(1),
    }
}

fn checkout_head(checkout: &Path) -> Oid {
    Repository::open(checkout)
        .expect("open checkout")
        .head()
        .expect("head")
        .peel_to_commit()
        .expect("commit")
        .id()
}

#[tokio::test]
async fn branch_mirror_follows_new_commits() {
    let dir = TempDir::new().unwrap();
    let upstream_dir = dir.path().join("upstream");
    let checkout = dir.path().join("checkout");
    let upstream = init_upstream(&upstream_dir);
    let first = commit_file(&upstream, "README", "one");

    let repo = Arc::new(mirror_config(&upstream_dir, &checkout, "main", LabelKind::Branch));
    let worker = SyncWorker::new(Git2Backend, StatusTable::new());

    let cloned = worker.clone_repo(repo.clone()).await;
    assert!(
        matches!(cloned, SyncOutcome::Cloned { trigger: TriggerOutcome::Created }),
        "got {cloned:?}"
    );
    assert_eq!(checkout_head(&checkout), first);

    let second = commit_file(&upstream, "README", "two");
    let updated = worker.update_repo(repo.clone(), retry()).await;
    assert!(
        matches!(updated, SyncOutcome::Updated { commit, .. } if commit == second),
        "got {updated:?}"
    );
    assert_eq!(checkout_head(&checkout), second);
    assert_eq!(
        std::fs::read_to_string(checkout.join("README")).unwrap(),
        "two"
    );

    let again = worker.update_repo(repo, retry()).await;
    assert!(matches!(again, SyncOutcome::AlreadyUpToDate), "got {again:?}");
}

#[tokio::test]
async fn local_edits_are_discarded_by_update() {
    let dir = TempDir::new().unwrap();
    let upstream_dir = dir.path().join("upstream");
    let checkout = dir.path().join("checkout");
    let upstream = init_upstream(&upstream_dir);
    commit_file(&upstream, "index.html", "v1");

    let repo = Arc::new(mirror_config(&upstream_dir, &checkout, "main", LabelKind::Branch));
    let worker = SyncWorker::new(Git2Backend, StatusTable::new());
    assert!(!worker.clone_repo(repo.clone()).await.is_failure());

    std::fs::write(checkout.join("index.html"), "hand edited").unwrap();
    commit_file(&upstream, "index.html", "v2");

    let updated = worker.update_repo(repo, retry()).await;
    assert!(matches!(updated, SyncOutcome::Updated { .. }), "got {updated:?}");
    assert_eq!(
        std::fs::read_to_string(checkout.join("index.html")).unwrap(),
        "v2"
    );
}

#[tokio::test]
async fn annotated_tag_mirror_resolves_to_commit() {
    let dir = TempDir::new().unwrap();
    let upstream_dir = dir.path().join("upstream");
    let checkout = dir.path().join("checkout");
    let upstream = init_upstream(&upstream_dir);
    let first = commit_file(&upstream, "app.txt", "1.0");
    annotate(&upstream, "stable", first);
    commit_file(&upstream, "app.txt", "1.1-dev");

    let repo = Arc::new(mirror_config(&upstream_dir, &checkout, "stable", LabelKind::Tag));
    let worker = SyncWorker::new(Git2Backend, StatusTable::new());

    let cloned = worker.clone_repo(repo.clone()).await;
    assert!(!cloned.is_failure(), "got {cloned:?}");
    assert_eq!(checkout_head(&checkout), first, "checks out the tag, not main");

    let second = commit_file(&upstream, "app.txt", "1.1");
    let tag_object = annotate(&upstream, "stable", second);
    assert_ne!(tag_object, second);

    let updated = worker.update_repo(repo, retry()).await;
    assert!(
        matches!(updated, SyncOutcome::Updated { commit, .. } if commit == second),
        "got {updated:?}"
    );
    assert_eq!(checkout_head(&checkout), second);
}

#[tokio::test]
async fn clone_of_missing_upstream_fails() {
    let dir = TempDir::new().unwrap();
    let checkout = dir.path().join("checkout");
    let repo = Arc::new(mirror_config(
        &dir.path().join("nowhere"),
        &checkout,
        "main",
        LabelKind::Branch,
    ));
    let worker = SyncWorker::new(Git2Backend, StatusTable::new());

    let outcome = worker.clone_repo(repo.clone()).await;

    assert!(outcome.is_failure(), "got {outcome:?}");
    assert!(!checkout.with_extension("trigger").exists());
}
