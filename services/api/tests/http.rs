//! End-to-end tests of the HTTP surface, driven through the router with a scripted
//! generation service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_lib::{
    adapters::MemoryUserRepository,
    config::Config,
    web::{
        self,
        state::{AppState, SessionRegistry},
    },
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use manuscript_core::{
    ConversionGateway, CredentialStore, GenerationRequest, GenerationService, PortResult,
    TemplateName, TemplateStore,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "manuscript-boundary";

/// Answers proofread prompts with one finding and everything else with a numbered draft.
#[derive(Default)]
struct FakeGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationService for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if request.max_output_tokens == manuscript_core::prompts::PROOFREAD_MAX_TOKENS {
            Ok("1. 校閲：「試合」の表記を確認".to_string())
        } else {
            Ok(format!("draft {}", n))
        }
    }
}

struct FakeTemplates;

#[async_trait]
impl TemplateStore for FakeTemplates {
    async fn load(&self, name: TemplateName) -> PortResult<String> {
        Ok(format!("rules from {}", name.file_name()))
    }
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        log_level: tracing::Level::INFO,
        prompts_path: PathBuf::from("./prompts"),
        openai_api_key: Some("test-key".to_string()),
        openai_api_base: None,
        generation_model: "test-model".to_string(),
        generation_timeout: Duration::from_secs(5),
        users_file: None,
        users_seed: None,
        session_ttl: chrono::Duration::hours(1),
        cors_origin: None,
    }
}

async fn app(with_generation: bool) -> Router {
    let credentials = CredentialStore::open(Arc::new(MemoryUserRepository::default()))
        .await
        .unwrap();
    let gateway = with_generation.then(|| {
        Arc::new(ConversionGateway::new(
            Arc::new(FakeGenerator::default()),
            Arc::new(FakeTemplates),
        ))
    });
    web::router(Arc::new(AppState {
        config: Arc::new(test_config()),
        credentials: Arc::new(credentials),
        gateway,
        sessions: Arc::new(SessionRegistry::new(chrono::Duration::hours(1))),
    }))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare_request(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(uri: &str, cookie: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Logs in and returns the `session=<id>` pair to send back.
async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn default_admin_can_log_in_and_see_the_session() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/session", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["username"], "admin");
    assert_eq!(session["role"], "admin");
    assert_eq!(session["page"], "main");
    assert_eq!(session["generation_enabled"], true);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let app = app(true).await;
    let mut messages = Vec::new();
    for (username, password) in [("admin", "wrong"), ("nobody", "admin123")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "username": username, "password": password }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        messages.push(body_text(response).await);
    }
    assert_eq!(messages[0], messages[1]);

    let blank = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "username": "", "password": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = app(true).await;
    let response = app
        .clone()
        .oneshot(Request::get("/workflows/markdown").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn convert_without_generation_key_is_unavailable() {
    let app = app(false).await;
    let cookie = login(&app, "admin", "admin123").await;
    let response = app
        .clone()
        .oneshot(multipart_request(
            "/workflows/markdown/convert",
            &cookie,
            &[("text", "本文")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let session = body_json(
        app.clone()
            .oneshot(bare_request("GET", "/session", &cookie))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(session["generation_enabled"], false);
}

#[tokio::test]
async fn convert_proofread_revise_and_download() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/workflows/markdown/convert",
            &cookie,
            &[
                ("text", "試合は三対一で終わった。"),
                ("reporter_name", "山田"),
                ("proofread", "true"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let converted = body_json(response).await;
    assert_eq!(converted["workflow"]["phase"], "proofread");
    assert_eq!(converted["workflow"]["result"], "draft 1");
    assert_eq!(converted["proofread"]["issue_count"], 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/workflows/markdown/revise",
            Some(cookie.as_str()),
            json!({ "request": "見出しを短く" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let revised = body_json(response).await;
    assert_eq!(revised["result"], "draft 3");
    assert_eq!(revised["phase"], "converted");
    assert_eq!(revised["revision_history"], json!(["見出しを短く"]));

    let response = app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/workflows/markdown/download/result",
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename*=UTF-8''article_"));
    assert!(disposition.ends_with(".txt"));
    assert_eq!(body_text(response).await, "draft 3");

    // The revision dropped the report.
    let response = app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/workflows/markdown/download/report",
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The Q&A workflow is untouched.
    let qa = body_json(
        app.clone()
            .oneshot(bare_request("GET", "/workflows/qa", &cookie))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(qa["phase"], "idle");
}

#[tokio::test]
async fn convert_proofreads_unless_switched_off() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/workflows/markdown/convert",
            &cookie,
            &[("text", "試合は三対一で終わった。")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let converted = body_json(response).await;
    assert_eq!(converted["proofread"]["issue_count"], 1);
    assert_eq!(converted["workflow"]["phase"], "proofread");

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/workflows/qa/convert",
            &cookie,
            &[("text", "Q: 調子は？ A: 良いです。"), ("proofread", "false")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let converted = body_json(response).await;
    assert_eq!(converted["proofread"], Value::Null);
    assert_eq!(converted["workflow"]["phase"], "converted");
}

#[tokio::test]
async fn convert_requires_a_manuscript() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;
    let response = app
        .clone()
        .oneshot(multipart_request(
            "/workflows/qa/convert",
            &cookie,
            &[("text", "   ")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clear_resets_the_workflow_and_bumps_the_generation() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;
    app.clone()
        .oneshot(multipart_request(
            "/workflows/qa/convert",
            &cookie,
            &[("text", "Q: 調子は？ A: 良いです。")],
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(bare_request("POST", "/workflows/qa/clear", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["input_generation"], 1);

    let qa = body_json(
        app.clone()
            .oneshot(bare_request("GET", "/workflows/qa", &cookie))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(qa["phase"], "idle");
    assert_eq!(qa["result"], Value::Null);
}

#[tokio::test]
async fn unknown_workflow_kind_is_not_found() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;
    let response = app
        .clone()
        .oneshot(bare_request("GET", "/workflows/poetry", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn account_administration() {
    let app = app(true).await;
    let admin = login(&app, "admin", "admin123").await;

    let create = |username: &str| {
        json_request(
            "POST",
            "/admin/users",
            Some(admin.as_str()),
            json!({ "username": username, "display_name": "佐藤", "password": "pw" }),
        )
    };
    assert_eq!(
        app.clone().oneshot(create("sato")).await.unwrap().status(),
        StatusCode::CREATED
    );
    assert_eq!(
        app.clone().oneshot(create("sato")).await.unwrap().status(),
        StatusCode::CONFLICT
    );

    let users = body_json(
        app.clone()
            .oneshot(bare_request("GET", "/admin/users", &admin))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(users.as_array().unwrap().len(), 2);

    // A regular user is kept out of the admin surface.
    let user = login(&app, "sato", "pw").await;
    let response = app
        .clone()
        .oneshot(bare_request("GET", "/admin/users", &user))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/session/page",
            Some(user.as_str()),
            json!({ "page": "admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The protected administrator survives a delete.
    let response = app
        .clone()
        .oneshot(bare_request("DELETE", "/admin/users/admin", &admin))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], false);
    let response = app
        .clone()
        .oneshot(bare_request("DELETE", "/admin/users/sato", &admin))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], true);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = app(true).await;
    let cookie = login(&app, "admin", "admin123").await;

    let response = app
        .clone()
        .oneshot(bare_request("POST", "/auth/logout", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("Max-Age=0"));

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/session", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
