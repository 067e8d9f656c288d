use super::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("has parent")).expect("should create dirs");
    fs::write(path, contents).expect("should write file");
}

fn extensions(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(10),
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

#[test]
fn sources_are_classified() {
    assert_eq!(
        RepositorySource::parse("https://github.com/org/repo.git"),
        RepositorySource::Remote("https://github.com/org/repo.git".to_string())
    );
    assert_eq!(
        RepositorySource::parse("git@github.com:org/repo.git"),
        RepositorySource::Remote("git@github.com:org/repo.git".to_string())
    );
    assert_eq!(
        RepositorySource::parse(" ./repo "),
        RepositorySource::Local(PathBuf::from("./repo"))
    );
}

#[test]
fn discovery_filters_and_sorts() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path();
    write(root, "src/b.py", "def b():\n    pass\n");
    write(root, "src/a.py", "def a():\n    pass\n");
    write(root, "web/app.JS", "function app() {}\n");
    write(root, "README.md", "# readme\n");
    write(root, "node_modules/dep/index.js", "function dep() {}\n");
    write(root, "build/gen.py", "def gen():\n    pass\n");
    write(root, ".gitignore", "build/\n");

    let discovery = discover_files(
        root,
        &extensions(&["py", "js"]),
        &extensions(&["node_modules"]),
        1024,
    );

    let labels: Vec<String> = discovery
        .files
        .iter()
        .map(|p| relative_label(root, p))
        .collect();
    assert_eq!(labels, vec!["src/a.py", "src/b.py", "web/app.JS"]);
    assert!(discovery.skipped.is_empty());
    assert_eq!(discovery.discovered(), 3);
}

#[test]
fn oversized_files_become_warnings() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path();
    write(root, "small.py", "x = 1\n");
    write(root, "big.py", &"y = 2\n".repeat(100));

    let discovery = discover_files(root, &extensions(&["py"]), &[], 64);

    assert_eq!(discovery.files.len(), 1);
    assert_eq!(discovery.skipped.len(), 1);
    assert_eq!(discovery.skipped[0].path, "big.py");
    assert!(discovery.skipped[0].reason.contains("64 byte limit"));
    assert_eq!(discovery.discovered(), 2);
}

#[tokio::test]
async fn local_sources_are_used_in_place() {
    let temp = TempDir::new().expect("temp dir");
    let checkouts = temp.path().join("checkouts");

    let workspace = prepare(
        &temp.path().display().to_string(),
        "local",
        &checkouts,
        &fast_policy(),
    )
    .await
    .expect("local directory should resolve");

    assert!(!workspace.is_checkout());
    assert!(workspace.root().is_dir());
    drop(workspace);
    assert!(temp.path().exists());
}

#[tokio::test]
async fn missing_local_source_is_unreachable() {
    let temp = TempDir::new().expect("temp dir");
    let result = prepare(
        &temp.path().join("nope").display().to_string(),
        "missing",
        &temp.path().join("checkouts"),
        &fast_policy(),
    )
    .await;

    assert!(matches!(result, Err(ReviewError::RepositoryUnreachable(_))));
}

#[tokio::test]
async fn remote_sources_are_cloned_and_cleaned_up() {
    let temp = TempDir::new().expect("temp dir");
    let origin = temp.path().join("origin");
    write(&origin, "lib.py", "def helper():\n    return 1\n");

    let repo = git2::Repository::init(&origin).expect("should init repository");
    let mut index = repo.index().expect("index");
    index
        .add_path(Path::new("lib.py"))
        .expect("should stage file");
    index.write().expect("should write index");
    let tree_id = index.write_tree().expect("should write tree");
    let tree = repo.find_tree(tree_id).expect("tree");
    let signature = git2::Signature::now("Test", "test@example.com").expect("signature");
    repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .expect("should commit");

    let checkouts = temp.path().join("checkouts");
    let url = format!("file://{}", origin.display());
    let workspace = prepare(&url, "remote", &checkouts, &fast_policy())
        .await
        .expect("clone should succeed");

    assert!(workspace.is_checkout());
    assert!(workspace.root().join("lib.py").is_file());
    drop(workspace);

    let leftovers = fs::read_dir(&checkouts).expect("checkouts dir").count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn unreachable_remote_leaves_nothing_behind() {
    let temp = TempDir::new().expect("temp dir");
    let checkouts = temp.path().join("checkouts");
    let url = format!("file://{}", temp.path().join("no-such-repo").display());

    let result = prepare(&url, "gone", &checkouts, &fast_policy()).await;

    assert!(matches!(result, Err(ReviewError::RepositoryUnreachable(_))));
    let leftovers = fs::read_dir(&checkouts).expect("checkouts dir").count();
    assert_eq!(leftovers, 0);
}
