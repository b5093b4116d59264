#![cfg(feature = "web")]

use dekanat::api::{AdminApi, AuthApi, EntityStore, RestClient, mutate_then_refresh};
use dekanat::entity::InstituteDraft;
use dekanat::error::ConsoleError;
use dekanat::session::ROLE_ADMIN;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RestClient {
    RestClient::new(&format!("{}/api/v1", server.uri())).expect("client builds")
}

fn institute_json(id: i64, name: &str) -> serde_json::Value {
    json!({"id": id, "name": name, "email": "a@x.com", "phone": "+79990000000"})
}

#[tokio::test]
async fn lists_institutes_from_get_all() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/institutes/getAll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            institute_json(1, "Физфак"),
            institute_json(2, "Мехмат"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let institutes = client(&server).institutes().list().await.unwrap();
    let names: Vec<&str> = institutes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Физфак", "Мехмат"]);
}

#[tokio::test]
async fn login_reads_roles_from_me_with_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({"email": "admin@x.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"email": "admin@x.com"},
            "token": "t-123"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .and(header("authorization", "Bearer t-123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"authority": "ADMIN"}, {"authority": "REGISTERED"}])),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let outcome = client.login("admin@x.com", "secret").await.unwrap();
    assert_eq!(outcome.identity.email, "admin@x.com");
    assert!(outcome.identity.has_role(ROLE_ADMIN));
    assert_eq!(outcome.identity.roles.len(), 2);
    assert_eq!(client.token().as_deref(), Some("t-123"));
}

#[tokio::test]
async fn error_statuses_map_to_console_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/institutes/create"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Институт уже существует"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/institutes/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/users"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/institutes/3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Нельзя удалить институт"))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client
        .institutes()
        .create(&InstituteDraft::default())
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Институт уже существует");

    let err = client.institutes().get(7).await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound));

    let err = client.list_users().await.unwrap_err();
    assert!(matches!(err, ConsoleError::Unauthorized));

    let err = client.institutes().delete(3).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Rejected { status: 500, .. }));
    assert_eq!(err.user_message(), "Нельзя удалить институт");
}

#[tokio::test]
async fn update_sends_the_id_with_the_form() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/institutes/5"))
        .and(body_json(json!({
            "id": 5,
            "name": "Мехмат",
            "email": "a@x.com",
            "phone": "+79990000000"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(institute_json(5, "Мехмат")))
        .expect(1)
        .mount(&server)
        .await;

    let draft = InstituteDraft {
        name: "Мехмат".into(),
        email: "a@x.com".into(),
        phone: "+79990000000".into(),
    };
    let updated = client(&server).institutes().update(5, &draft).await.unwrap();
    assert_eq!(updated.id, 5);
}

#[tokio::test]
async fn refresh_waits_for_a_successful_mutation() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/institutes/1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/institutes/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/institutes/getAll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([institute_json(2, "Мехмат")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = client(&server).institutes();
    let ((), rows) = mutate_then_refresh(&store, store.delete(1)).await.unwrap();
    assert_eq!(rows.len(), 1);

    let failed = mutate_then_refresh(&store, store.delete(2)).await;
    assert!(matches!(failed, Err(ConsoleError::Rejected { status: 500, .. })));
}

#[tokio::test]
async fn role_changes_post_email_and_role() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/add_role"))
        .and(body_json(json!({"email": "s@x.com", "role": "TUTOR"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["ADMIN", "TUTOR"])))
        .mount(&server)
        .await;

    let client = client(&server);
    client.add_role("s@x.com", "TUTOR").await.unwrap();
    assert_eq!(client.list_roles().await.unwrap(), vec!["ADMIN", "TUTOR"]);
}
