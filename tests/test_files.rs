use beacon::config::StaticFilesConfig;
use beacon::files::StaticFiles;
use beacon::http::request::{Method, Request};

fn webroot() -> (tempfile::TempDir, StaticFiles) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    std::fs::write(dir.path().join("app.css"), "body {}").unwrap();

    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();

    let files = StaticFiles::new(&StaticFilesConfig {
        root: dir.path().to_string_lossy().into_owned(),
        index: "index.html".to_string(),
    });
    (dir, files)
}

fn get(path: &str) -> Request {
    beacon::http::request::RequestBuilder::new()
        .method(Method::GET)
        .path(path)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_serves_file_with_caching_headers() {
    let (_dir, files) = webroot();

    let resp = files.serve(&get("/app.css")).await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_deref(), Some(&b"body {}"[..]));
    assert_eq!(resp.header("Content-Type"), Some("text/css"));
    assert_eq!(resp.header("Cache-Control"), Some("private, max-age=3600"));
    assert!(resp.header("Last-Modified").is_some());

    // CRC32-derived quoted ETag
    let etag = resp.header("ETag").unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert_eq!(etag.len(), 10);
}

#[tokio::test]
async fn test_etag_is_stable_per_content() {
    let (_dir, files) = webroot();

    let first = files.serve(&get("/app.css")).await;
    let second = files.serve(&get("/app.css")).await;
    assert_eq!(first.header("ETag"), second.header("ETag"));
}

#[tokio::test]
async fn test_directory_resolves_to_index() {
    let (_dir, files) = webroot();

    let resp = files.serve(&get("/")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_deref(), Some(&b"<h1>home</h1>"[..]));

    let resp = files.serve(&get("/docs")).await;
    assert_eq!(resp.body.as_deref(), Some(&b"<h1>docs</h1>"[..]));
}

#[tokio::test]
async fn test_missing_file_is_404() {
    let (_dir, files) = webroot();

    let resp = files.serve(&get("/nope.html")).await;
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let (dir, files) = webroot();

    // A real file one level above the webroot
    let parent = dir.path().parent().unwrap();
    let secret = parent.join("beacon-test-secret.txt");
    std::fs::write(&secret, "secret").unwrap();

    let name = secret.file_name().unwrap().to_string_lossy();
    let resp = files.serve(&get(&format!("/../{name}"))).await;
    assert_eq!(resp.status, 404);

    std::fs::remove_file(&secret).ok();
}

#[tokio::test]
async fn test_unknown_extension_is_binary() {
    let (dir, files) = webroot();
    std::fs::write(dir.path().join("blob.dat"), [0u8, 1, 2]).unwrap();

    let resp = files.serve(&get("/blob.dat")).await;
    assert_eq!(resp.header("Content-Type"), Some("application/octet-stream"));
}
