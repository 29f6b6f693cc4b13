//! Route-level tests driving the assembled router, plus end-to-end smart
//! HTTP scenarios against a real listener.

use std::io::Read;
use std::path::Path;
use std::process::Command;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::prelude::{BASE64_STANDARD, Engine as _};
use tempfile::TempDir;
use tower::ServiceExt;

//================================================================================================
// Fixtures
//================================================================================================

fn run_git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// A repo root holding `owner1/repo1` with a small history.
fn repo_root() -> TempDir {
    let root = TempDir::new().unwrap();
    let repo = root.path().join("owner1/repo1");
    std::fs::create_dir_all(&repo).unwrap();

    run_git(&repo, &["init", "-q"]);
    run_git(&repo, &["checkout", "-q", "-b", "main"]);
    run_git(&repo, &["config", "user.name", "Test User"]);
    run_git(&repo, &["config", "user.email", "test@example.com"]);

    std::fs::write(repo.join("README.md"), "# readme\n").unwrap();
    std::fs::create_dir_all(repo.join("sub/sub")).unwrap();
    std::fs::write(repo.join("sub/sub/some_file.txt"), "nested content\n").unwrap();
    std::fs::write(repo.join("sub/other.txt"), "more\n").unwrap();
    run_git(&repo, &["add", "."]);
    run_git(&repo, &["commit", "-q", "-m", "initial"]);

    run_git(&repo, &["checkout", "-q", "-b", "branch/with_slash"]);
    std::fs::write(repo.join("README.md"), "# readme on a branch\n").unwrap();
    run_git(&repo, &["commit", "-q", "-am", "branch edit"]);
    run_git(&repo, &["checkout", "-q", "main"]);

    root
}

fn test_config(root: &TempDir) -> config::Config {
    config::Config {
        app_title: "localhub".to_string(),
        repo_root: root.path().to_path_buf(),
        subdomain_mapping: config::SubdomainMapping {
            enable: true,
            base_domains: vec!["localtest.me".to_string()],
        },
        logs: config::Logs {
            req_log_format: "none".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn test_router(root: &TempDir) -> Router {
    localhub::server::Server::new(test_config(root))
        .into_router()
        .unwrap()
}

async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    get_with_host(router, uri, "localhost").await
}

async fn get_with_host(
    router: &Router,
    uri: &str,
    host: &str,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::HOST, host)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

//================================================================================================
// Raw content
//================================================================================================

#[tokio::test]
async fn raw_file_on_main() {
    let root = repo_root();
    let router = test_router(&root);
    let blob_sha = run_git(&root.path().join("owner1/repo1"), &[
        "rev-parse",
        "main:README.md",
    ]);

    let (status, headers, body) = get(&router, "/raw/owner1/repo1/main/README.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"# readme\n");
    assert_eq!(headers[header::ETAG], blob_sha.as_str());
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "max-age=0, private, must-revalidate"
    );
}

#[tokio::test]
async fn raw_tolerates_redundant_slashes() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) = get(&router, "/raw/owner1/repo1/main/sub/sub//some_file.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"nested content\n");
}

#[tokio::test]
async fn raw_rejects_wrong_case() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) = get(&router, "/raw/owner1/repo1/main/rEaDmE.md").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"not found.");
}

#[tokio::test]
async fn raw_resolves_branches_containing_slashes() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) =
        get(&router, "/raw/owner1/repo1/branch/with_slash/README.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"# readme on a branch\n");

    // The same blob must resolve through the commit sha spelling.
    let sha = run_git(&root.path().join("owner1/repo1"), &[
        "rev-parse",
        "branch/with_slash",
    ]);
    let (status, _, via_sha) = get(&router, &format!("/raw/owner1/repo1/{sha}/README.md")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(via_sha, body);
}

#[tokio::test]
async fn raw_infix_route_matches_prefix_route() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) = get(&router, "/owner1/repo1/raw/main/README.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"# readme\n");
}

#[tokio::test]
async fn raw_serves_uncommitted_only_at_head() {
    let root = repo_root();
    std::fs::write(root.path().join("owner1/repo1/scratch.txt"), "dirty\n").unwrap();
    let router = test_router(&root);

    let (status, _, body) = get(&router, "/raw/owner1/repo1/main/scratch.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"dirty\n");

    let (status, _, _) =
        get(&router, "/raw/owner1/repo1/branch/with_slash/scratch.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//================================================================================================
// API
//================================================================================================

#[tokio::test]
async fn blob_rejects_malformed_shas() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, _) =
        get(&router, "/api/repos/owner1/repo1/git/blobs/01020304050607").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn contents_and_blob_round_trip() {
    let root = repo_root();
    let router = test_router(&root);

    let (status, _, body) = get(&router, "/api/repos/owner1/repo1/contents/README.md").await;
    assert_eq!(status, StatusCode::OK);
    let contents: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(contents["type"], "file");
    assert_eq!(contents["name"], "README.md");
    assert_eq!(contents["encoding"], "base64");

    let sha = contents["sha"].as_str().unwrap();
    let (status, _, body) =
        get(&router, &format!("/api/repos/owner1/repo1/git/blobs/{sha}")).await;
    assert_eq!(status, StatusCode::OK);
    let blob: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(blob["sha"], sha);
    let decoded = BASE64_STANDARD
        .decode(blob["content"].as_str().unwrap().trim_end())
        .unwrap();
    assert_eq!(decoded, b"# readme\n");
}

#[tokio::test]
async fn contents_lists_directories_as_arrays() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) = get(&router, "/api/repos/owner1/repo1/contents/sub").await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let entries = listing.as_array().expect("directory listing is an array");
    assert_eq!(entries.len(), 2);
    let dir = entries
        .iter()
        .find(|e| e["type"] == "dir")
        .expect("nested dir entry");
    assert_eq!(dir["size"], 0);
    assert_eq!(dir["download_url"], serde_json::Value::Null);
}

#[tokio::test]
async fn contents_unknown_ref_names_the_ref() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) =
        get(&router, "/api/repos/owner1/repo1/contents/README.md?ref=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(err["message"], "No commit found for the ref ghost");
}

#[tokio::test]
async fn tree_recursion_counts() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) =
        get(&router, "/api/repos/owner1/repo1/git/trees/main?recursive=1").await;
    assert_eq!(status, StatusCode::OK);
    let tree: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let entries = tree["tree"].as_array().unwrap();
    assert_eq!(entries.len(), 5);
    let blobs = entries.iter().filter(|e| e["type"] == "blob").count();
    let trees = entries.iter().filter(|e| e["type"] == "tree").count();
    assert_eq!(blobs, 3);
    assert_eq!(trees, 2);

    // Without the flag only the root level comes back.
    let (_, _, body) = get(&router, "/api/repos/owner1/repo1/git/trees/main").await;
    let tree: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(tree["tree"].as_array().unwrap().len(), 2);
    assert_eq!(tree["truncated"], false);
}

#[tokio::test]
async fn commits_carry_the_documented_shape() {
    let root = repo_root();
    let router = test_router(&root);
    let (status, _, body) = get(&router, "/api/repos/owner1/repo1/commits").await;
    assert_eq!(status, StatusCode::OK);
    let commits: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let commits = commits.as_array().unwrap();
    assert_eq!(commits.len(), 1);
    let commit = &commits[0];
    assert_eq!(commit["node_id"], "not implemented");
    assert_eq!(commit["commit"]["author"]["email"], "test@example.com");
    assert_eq!(commit["commit"]["comment_count"], 0);
    assert_eq!(commit["commit"]["verification"]["verified"], false);
    assert!(
        commit["commit"]["author"]["date"]
            .as_str()
            .unwrap()
            .ends_with('Z')
    );
    assert!(
        commit["author"]["avatar_url"]
            .as_str()
            .unwrap()
            .contains("gravatar.com/avatar/")
    );

    // Filtering on a path that only changed once keeps one commit.
    let (_, _, body) = get(&router, "/api/repos/owner1/repo1/commits?path=README.md").await;
    let filtered: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(filtered.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn archive_redirects_point_at_codeload() {
    let root = repo_root();
    let router = test_router(&root);

    let (status, headers, _) = get(&router, "/api/repos/owner1/repo1/zipball/main").await;
    assert_eq!(status, StatusCode::FOUND);
    assert!(
        headers[header::LOCATION]
            .to_str()
            .unwrap()
            .ends_with("/codeload/owner1/repo1/zip/main")
    );

    // No ref: the default branch fills in.
    let (status, headers, _) = get(&router, "/api/repos/owner1/repo1/tarball").await;
    assert_eq!(status, StatusCode::FOUND);
    assert!(
        headers[header::LOCATION]
            .to_str()
            .unwrap()
            .ends_with("/codeload/owner1/repo1/tar.gz/main")
    );

    // The HTML-shaped archive URL behaves the same.
    let (status, headers, _) = get(&router, "/owner1/repo1/archive/main.tar.gz").await;
    assert_eq!(status, StatusCode::FOUND);
    assert!(
        headers[header::LOCATION]
            .to_str()
            .unwrap()
            .ends_with("/codeload/owner1/repo1/tar.gz/main")
    );
}

//================================================================================================
// Archives
//================================================================================================

#[tokio::test]
async fn codeload_zip_contains_the_tree() {
    let root = repo_root();
    // A dirty file must not leak into a committed archive of a non-HEAD ref.
    std::fs::write(root.path().join("owner1/repo1/scratch.txt"), "dirty\n").unwrap();
    let router = test_router(&root);

    let (status, headers, body) =
        get(&router, "/codeload/owner1/repo1/zip/branch/with_slash").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=owner1-repo1-"));
    assert!(disposition.ends_with(".zip"));

    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(body)).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"README.md".to_string()));
    assert!(!names.contains(&"scratch.txt".to_string()));

    let mut readme = String::new();
    zip.by_name("README.md")
        .unwrap()
        .read_to_string(&mut readme)
        .unwrap();
    assert_eq!(readme, "# readme on a branch\n");
}

#[tokio::test]
async fn codeload_archives_are_idempotent() {
    let root = repo_root();
    let router = test_router(&root);

    let (_, _, first) = get(&router, "/codeload/owner1/repo1/tar.gz/branch/with_slash").await;
    let (_, _, second) = get(&router, "/codeload/owner1/repo1/tar.gz/branch/with_slash").await;
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn codeload_snapshot_includes_dirty_files() {
    let root = repo_root();
    std::fs::write(root.path().join("owner1/repo1/scratch.txt"), "dirty\n").unwrap();
    let router = test_router(&root);

    let (status, headers, body) = get(&router, "/codeload/owner1/repo1/tar.gz/main").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/x-gzip");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("SNAPSHOT")
    );

    let mut names = Vec::new();
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(std::io::Cursor::new(body)));
    for entry in tar.entries().unwrap() {
        names.push(
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .to_string(),
        );
    }
    assert!(names.iter().any(|n| n == "scratch.txt"));
    assert!(!names.iter().any(|n| n.starts_with(".git/")));
}

//================================================================================================
// Subdomain mapping
//================================================================================================

#[tokio::test]
async fn subdomains_map_onto_path_prefixes() {
    let root = repo_root();
    let router = test_router(&root);

    let (status, _, direct) =
        get(&router, "/codeload/owner1/repo1/zip/branch/with_slash").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, mapped) = get_with_host(
        &router,
        "/owner1/repo1/zip/branch/with_slash",
        "codeload.localtest.me",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(direct, mapped);
}

#[tokio::test]
async fn mapped_requests_emit_localhost_urls() {
    let root = repo_root();
    let router = test_router(&root);

    let (status, _, body) = get_with_host(
        &router,
        "/repos/owner1/repo1/contents/README.md",
        "api.localtest.me",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let contents: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(
        contents["url"]
            .as_str()
            .unwrap()
            .starts_with("http://localhost:5000/")
    );
}

//================================================================================================
// HTML stubs
//================================================================================================

#[tokio::test]
async fn html_stubs_resolve_like_the_repository() {
    let root = repo_root();
    let router = test_router(&root);

    let (status, headers, _) = get(&router, "/owner1/repo1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    let (status, _, _) = get(&router, "/owner1/repo1/blob/main/README.md").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(&router, "/owner1/repo1/blob/main/missing.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&router, "/owner1/no-such-repo").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//================================================================================================
// Smart HTTP end to end
//================================================================================================

#[tokio::test]
async fn smart_http_clone_and_push() {
    let root = repo_root();
    let bare = root.path().join("owner1/bare");
    std::fs::create_dir_all(&bare).unwrap();
    run_git(&bare, &["init", "-q", "--bare"]);

    let mut config = test_config(&root);
    config.listen.http.port = 0;
    config.listen.http.host = "127.0.0.1".to_string();
    let started = localhub::server::Server::new(config).start().await.unwrap();
    let port = started.http_port;

    let work = TempDir::new().unwrap();
    tokio::task::spawn_blocking(move || {
        let clone_url = format!("http://127.0.0.1:{port}/owner1/repo1.git");
        let out = Command::new("git")
            .current_dir(work.path())
            .args(["clone", "-q", &clone_url, "cloned"])
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "clone failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        let readme = std::fs::read(work.path().join("cloned/README.md")).unwrap();
        assert_eq!(readme, b"# readme\n");

        // Push the history into the bare repository.
        let push_url = format!("http://127.0.0.1:{port}/owner1/bare.git");
        let out = Command::new("git")
            .current_dir(work.path().join("cloned"))
            .args(["push", "-q", &push_url, "main"])
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "push failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    })
    .await
    .unwrap();

    let advertised = run_git(&bare, &["rev-parse", "main"]);
    let source = run_git(&root.path().join("owner1/repo1"), &["rev-parse", "main"]);
    assert_eq!(advertised, source);
}
