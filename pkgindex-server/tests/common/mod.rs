//! Common test utilities and helpers

#![allow(dead_code)]

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pkgindex_core::test_utils::create_test_db;
use pkgindex_server::config::{Config, UserAccount};
use pkgindex_server::rpc::codec::{parse_method_response, render_method_call};
use pkgindex_server::rpc::{Fault, MethodCall, Value};
use pkgindex_server::{create_app, sha256_hash, AppState};
use tempfile::TempDir;

pub struct TestSetup {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub server: TestServer,
}

fn account(username: &str, password: &str) -> UserAccount {
    UserAccount {
        username: username.to_string(),
        password_sha256: sha256_hash(password.as_bytes()),
        full_name: format!("{username} tester"),
        email: format!("{username}@example.org"),
    }
}

/// Server on an in-memory database with users `alice` and `bob`
/// (password `secret`).
pub async fn create_test_setup() -> TestSetup {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::default();
    config.security.users = vec![account("alice", "secret"), account("bob", "secret")];

    let pool = create_test_db().await;
    let state = AppState::new(pool, config, temp_dir.path().to_path_buf());
    let server = TestServer::new(create_app(state.clone())).expect("should create test server");

    TestSetup {
        temp_dir,
        state,
        server,
    }
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{username}:{password}"))
    )
}

/// Multipart `submit` form for `name` `version`.
pub fn submit_form(name: &str, version: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text(":action", "submit")
        .add_text("metadata_version", "1.0")
        .add_text("name", name)
        .add_text("version", version)
        .add_text("summary", format!("{name} summary"))
}

/// Multipart `file_upload` form carrying `filename`.
pub fn upload_form(name: &str, version: &str, filename: &str, data: &[u8]) -> MultipartForm {
    MultipartForm::new()
        .add_text(":action", "file_upload")
        .add_text("metadata_version", "1.0")
        .add_text("name", name)
        .add_text("version", version)
        .add_text("summary", format!("{name} summary"))
        .add_text("filetype", "sdist")
        .add_text("pyversion", "")
        .add_text("md5_digest", "0123456789abcdef")
        .add_part(
            "content",
            Part::bytes(data.to_vec())
                .file_name(filename)
                .mime_type("application/octet-stream"),
        )
}

/// POST an XML-RPC call and decode the response.
pub async fn rpc_call(
    server: &TestServer,
    method: &str,
    params: Vec<Value>,
) -> Result<Value, Fault> {
    let body = render_method_call(&MethodCall {
        method: method.to_string(),
        params,
    });

    let response = server
        .post("/pypi")
        .add_header("host", "index.example.com:3080")
        .content_type("text/xml")
        .bytes(body.into())
        .await;
    response.assert_status_ok();

    parse_method_response(&response.text()).expect("response should be a methodResponse")
}
