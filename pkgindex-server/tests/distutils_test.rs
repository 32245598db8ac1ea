//! HTTP tests for the distutils action endpoint.

mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use common::{basic_auth, create_test_setup, submit_form, upload_form};
use pkgindex_core::classifiers::import_classifiers;

#[tokio::test]
async fn test_register_release() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/pypi")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(submit_form("foo", "1.0"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "release registered");
    assert_eq!(
        setup.state.queries.package_releases("foo", false).await.unwrap(),
        vec!["1.0"]
    );
}

#[tokio::test]
async fn test_upload_stores_file_and_serves_it() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(upload_form("foo", "1.0", "foo-1.0.tar.gz", b"tarball bytes"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "upload accepted");

    let saved = setup.temp_dir.path().join("packages/foo/1.0/foo-1.0.tar.gz");
    assert_eq!(std::fs::read(saved).unwrap(), b"tarball bytes");

    let download = setup.server.get("/packages/foo/1.0/foo-1.0.tar.gz").await;
    assert_eq!(download.status_code(), StatusCode::OK);
    assert_eq!(download.as_bytes().as_ref(), b"tarball bytes");
}

#[tokio::test]
async fn test_duplicate_upload_is_bad_request() {
    let setup = create_test_setup().await;

    setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(upload_form("foo", "1.0", "foo-1.0.tar.gz", b"bytes"))
        .await
        .assert_status_ok();

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(upload_form("foo", "1.0", "foo-1.0.tar.gz", b"bytes"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "That file has already been uploaded...");
}

#[tokio::test]
async fn test_same_filename_in_two_releases() {
    let setup = create_test_setup().await;

    for (version, data) in [("1.0", b"first zip"), ("2.0", b"other zip")] {
        let response = setup
            .server
            .post("/")
            .add_header("Authorization", basic_auth("alice", "secret"))
            .multipart(upload_form("foo", version, "foo.zip", data))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), "upload accepted");
    }

    let first = setup.server.get("/packages/foo/1.0/foo.zip").await;
    assert_eq!(first.as_bytes().as_ref(), b"first zip");
    let second = setup.server.get("/packages/foo/2.0/foo.zip").await;
    assert_eq!(second.as_bytes().as_ref(), b"other zip");
}

#[tokio::test]
async fn test_content_without_filename_is_rejected() {
    let setup = create_test_setup().await;

    let form = submit_form("foo", "1.0").add_part("content", Part::bytes(b"zip".to_vec()));
    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "The content part must carry a filename");
    assert!(setup.state.queries.list_packages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traversal_version_is_rejected() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(upload_form("foo", "..", "foo.zip", b"zip"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(setup.state.queries.list_packages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_get_challenge() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .multipart(submit_form("foo", "1.0"))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header("www-authenticate").to_str().unwrap(),
        "Basic realm=\"pypi\""
    );

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "wrong"))
        .multipart(submit_form("foo", "1.0"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_owner_is_forbidden() {
    let setup = create_test_setup().await;

    setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(submit_form("foo", "1.0"))
        .await
        .assert_status_ok();

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("bob", "secret"))
        .multipart(submit_form("foo", "2.0"))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "You are not an owner/maintainer of foo");
}

#[tokio::test]
async fn test_urlencoded_register() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .form(&[
            (":action", "submit"),
            ("metadata_version", "1.1"),
            ("name", "bar"),
            ("version", "0.1"),
            ("classifiers", "Topic :: Utilities"),
        ])
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "release registered");
}

#[tokio::test]
async fn test_unsupported_content_type_fails_shape_check() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .content_type("application/json")
        .bytes(r#"{"name": "foo"}"#.into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Only post requests are supported");
}

#[tokio::test]
async fn test_get_submit_fails_shape_check() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .get("/")
        .add_query_param(":action", "submit")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Only post requests are supported");
}

#[tokio::test]
async fn test_unsupported_action() {
    let setup = create_test_setup().await;

    let response = setup
        .server
        .post("/")
        .multipart(MultipartForm::new().add_text(":action", "doc_upload"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Unsupported action: doc_upload");
}

#[tokio::test]
async fn test_traversal_filename_is_rejected() {
    let setup = create_test_setup().await;

    let form = MultipartForm::new()
        .add_text(":action", "file_upload")
        .add_text("metadata_version", "1.0")
        .add_text("name", "foo")
        .add_text("version", "1.0")
        .add_part("content", Part::bytes(b"x".to_vec()).file_name(".."));

    let response = setup
        .server
        .post("/")
        .add_header("Authorization", basic_auth("alice", "secret"))
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(setup.state.queries.list_packages().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_classifiers() {
    let setup = create_test_setup().await;
    import_classifiers(&setup.state.pool, ["Topic :: Utilities", "Framework :: Flask"])
        .await
        .unwrap();

    let response = setup
        .server
        .get("/pypi")
        .add_query_param(":action", "list_classifiers")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "Framework :: Flask\nTopic :: Utilities");

    let response = setup
        .server
        .post("/")
        .multipart(MultipartForm::new().add_text(":action", "list_classifiers"))
        .await;
    assert_eq!(response.text(), "Framework :: Flask\nTopic :: Utilities");
}

#[tokio::test]
async fn test_banner() {
    let setup = create_test_setup().await;

    let response = setup.server.get("/").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("package index"));
}
