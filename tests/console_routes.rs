#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use dekanat::app::{AppState, router};
use dekanat::config::Config;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn console(server: &MockServer) -> Router {
    let config = Config::from_lookup(|key| match key {
        "DEKANAT_API_URL" => Some(format!("{}/api/v1/", server.uri())),
        _ => None,
    });
    router(AppState::new(config).expect("state builds"))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router is infallible")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn mount_institutes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/institutes/getAll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Физфак", "email": "a@x.com", "phone": "+1"},
            {"id": 2, "name": "Мехмат", "email": "b@x.com", "phone": "+2"}
        ])))
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"email": "admin@x.com"},
            "token": "t"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"authority": "ADMIN"}])))
        .mount(server)
        .await;
}

fn login_form(encoded_from: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "email=admin%40x.com&password=pw&from={encoded_from}"
        )))
        .unwrap()
}

async fn login_as_admin(app: &Router, server: &MockServer) -> String {
    mount_login(server).await;

    let response = send(app, login_form("%2Fstudents")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/students");

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn anonymous_pages_redirect_with_origin() {
    let server = MockServer::start().await;
    let app = console(&server);

    assert_eq!(send(&app, get("/")).await.status(), StatusCode::OK);
    let response = send(&app, get("/institutes")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("roles.includes(\"ADMIN\")"));
    assert!(html.contains("add.hidden = !isAdmin"));

    let response = send(&app, get("/students?page=2")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?from=%2Fstudents%3Fpage%3D2");
}

#[tokio::test]
async fn anonymous_api_calls_are_rejected_except_the_showcase() {
    let server = MockServer::start().await;
    mount_institutes(&server).await;
    let app = console(&server);

    let response = send(&app, get("/api/entities/students")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let create = Request::builder()
        .method("POST")
        .uri("/api/entities/institutes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(send(&app, create).await.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, get("/api/entities/institutes?search=%D0%BC%D0%B5%D1%85")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let table = json_body(response).await;
    assert_eq!(table["title"], "Институты");
    assert_eq!(table["page"]["filteredTotal"], 1);
    assert_eq!(table["page"]["rows"][0]["name"], "Мехмат");
}

#[tokio::test]
async fn session_endpoint_reports_visible_navigation() {
    let server = MockServer::start().await;
    let app = console(&server);

    let info = json_body(send(&app, get("/api/session")).await).await;
    assert_eq!(info["identity"], Value::Null);
    let labels: Vec<&str> = info["nav"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["Главная", "Институты"]);
}

#[tokio::test]
async fn admin_forms_are_validated_before_the_backend() {
    let server = MockServer::start().await;
    mount_institutes(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/institutes/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(
            {"id": 3, "name": "Химфак", "email": "c@x.com", "phone": "+79990000000"}
        )))
        .expect(1)
        .mount(&server)
        .await;
    let app = console(&server);
    let cookie = login_as_admin(&app, &server).await;

    let post = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/api/entities/institutes")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie.as_str())
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = send(
        &app,
        post(json!({"name": "мехмат", "email": "bad", "phone": "123"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let errors = json_body(response).await;
    assert!(errors["fields"]["name"].is_string());
    assert!(errors["fields"]["email"].is_string());
    assert!(errors["fields"]["phone"].is_string());

    let response = send(
        &app,
        post(json!({"name": "Химфак", "email": "c@x.com", "phone": "+79990000000"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = json_body(response).await;
    assert_eq!(saved["record"]["id"], 3);
}

#[tokio::test]
async fn delete_clamps_the_page() {
    let server = MockServer::start().await;
    mount_institutes(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/institutes/9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = console(&server);
    let cookie = login_as_admin(&app, &server).await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/entities/institutes/9?size=1&page=4")
        .header(header::COOKIE, cookie.as_str())
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let table = json_body(response).await;
    assert_eq!(table["state"]["pageIndex"], 1);
    assert_eq!(table["page"]["rows"][0]["name"], "Физфак");
}

#[tokio::test]
async fn login_ignores_unsafe_return_locations() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let app = console(&server);

    for from in ["%2F%09%2Fevil.example", "%2Fa%0Ab", "%2F%2Fevil.example"] {
        let response = send(&app, login_form(from)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "from={from}");
        assert_eq!(location(&response), "/", "from={from}");
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }
}

#[tokio::test]
async fn form_pages_and_their_data_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/students/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "person": {"surname": "Иванов", "name": "Иван", "patronymic": "Иванович", "phone": "+70000000"},
            "yearStarted": 2020,
            "financialForm": "BUDGET"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/job-titles/getAll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Доцент"}])))
        .mount(&server)
        .await;
    let app = console(&server);

    let response = send(&app, get("/students/create")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?from=%2Fstudents%2Fcreate");

    let cookie = login_as_admin(&app, &server).await;
    let with_cookie = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie.as_str())
            .body(Body::empty())
            .unwrap()
    };

    for page in ["/students/create", "/employees/new", "/kafedras/3"] {
        let response = send(&app, with_cookie(page)).await;
        assert_eq!(response.status(), StatusCode::OK, "{page}");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("id=\"editor\""), "{page}");
        assert!(!html.contains("innerHTML"), "{page}");
    }

    let student = json_body(send(&app, with_cookie("/api/entities/students/5")).await).await;
    assert_eq!(student["person"]["surname"], "Иванов");

    let titles = json_body(send(&app, with_cookie("/api/job-titles")).await).await;
    assert_eq!(titles[0]["name"], "Доцент");
}
