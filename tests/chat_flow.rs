use chat_to_notion_lib::bridge::BridgeCore;
use chat_to_notion_lib::db::Database;
use chat_to_notion_lib::form::{FieldUpdate, FormSession, HttpBackend};
use chat_to_notion_lib::models::{AppSettings, PropertyValue, SaveConfigPayload, SubmissionPhase};
use chat_to_notion_lib::notion::NotionClient;
use chat_to_notion_lib::shell::{wait_for_backend, EmbeddedBackend};
use chat_to_notion_lib::vault::CredentialVault;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _dir: TempDir,
    notion: MockServer,
    server: EmbeddedBackend,
    client: Arc<HttpBackend>,
}

fn database_body() -> Value {
    json!({
        "object": "database",
        "id": "db-1",
        "title": [{ "plain_text": "Chats" }],
        "description": [],
        "properties": {
            "Name": { "id": "title", "type": "title", "title": {} },
            "Created": { "id": "c1", "type": "date", "date": {} },
            "Priority": {
                "id": "p1",
                "type": "select",
                "select": { "options": [{ "name": "Low" }, { "name": "Med" }, { "name": "High" }] }
            },
            "Notes": { "id": "n1", "type": "rich_text", "rich_text": {} },
            "Tag": { "id": "t1", "type": "rich_text", "rich_text": {} }
        }
    })
}

async fn harness() -> Harness {
    let notion = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/db-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_body()))
        .mount(&notion)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "object": "error",
            "status": 404,
            "code": "object_not_found",
            "message": "Could not find database with ID: missing."
        })))
        .mount(&notion)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::new(&dir.path().join("flow.sqlite")).expect("db"));
    let settings = AppSettings {
        notion_api_base_url: format!("{}/v1", notion.uri()),
        ..AppSettings::default()
    };
    let notion_client = Arc::new(NotionClient::new(&settings).expect("notion client"));
    let bridge = Arc::new(BridgeCore::with_parts(
        db,
        CredentialVault::new([9; 32]),
        notion_client,
        dir.path().to_path_buf(),
    ));

    let server = EmbeddedBackend::start(bridge, SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("start backend");
    let client = Arc::new(HttpBackend::new(server.base_url(), Duration::from_secs(5)).expect("client"));
    wait_for_backend(client.as_ref(), Duration::from_millis(10), 20)
        .await
        .expect("backend ready");

    Harness {
        _dir: dir,
        notion,
        server,
        client,
    }
}

fn session(harness: &Harness) -> FormSession {
    let settings = AppSettings {
        validation_debounce_ms: 5,
        ..AppSettings::default()
    };
    FormSession::new(harness.client.clone(), &settings)
}

async fn configured_session(harness: &Harness) -> FormSession {
    let session = session(harness);
    session
        .save_config(SaveConfigPayload {
            api_key: "secret_integration_token".to_string(),
            database_id: "db-1".to_string(),
            label: Some("Work".to_string()),
        })
        .await
        .expect("save config");
    session
}

fn named(id: &str, name: &str, value: &str) -> (String, FieldUpdate) {
    (
        id.to_string(),
        FieldUpdate {
            name: Some(name.to_string()),
            value: Some(PropertyValue::Text(value.to_string())),
            ..FieldUpdate::default()
        },
    )
}

#[tokio::test]
async fn saving_credentials_activates_configuration_and_loads_schema() {
    let harness = harness().await;
    let session = configured_session(&harness).await;

    let snapshot = session.snapshot();
    assert!(snapshot.active_config_id.is_some());
    assert!(snapshot.schema_error.is_none());
    let names: Vec<&str> = snapshot.properties.iter().map(|property| property.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    for expected in ["Priority", "Notes", "Tag"] {
        assert!(names.contains(&expected), "{names:?}");
    }

    let configs = session.list_configs().await.expect("configs");
    assert_eq!(configs.len(), 1);
    assert!(configs[0].is_active);
    assert!(configs[0].has_api_key);
    assert_eq!(configs[0].title_property.as_deref(), Some("Name"));
    assert_eq!(configs[0].date_property.as_deref(), Some("Created"));
    harness.server.stop().await.expect("stop");
}

#[tokio::test]
async fn invalid_credentials_are_reported_with_detail() {
    let harness = harness().await;
    let session = session(&harness);

    let error = session
        .save_config(SaveConfigPayload {
            api_key: "secret_integration_token".to_string(),
            database_id: "missing".to_string(),
            label: None,
        })
        .await
        .expect_err("database does not exist");
    assert!(error.message().starts_with("Invalid Notion credentials:"), "{error}");
    assert!(error.message().contains("Could not find database"), "{error}");
    assert!(session.active_config_id().is_none());
}

#[tokio::test]
async fn selected_properties_survive_a_reload() {
    let harness = harness().await;
    let session = configured_session(&harness).await;

    session.set_property_selected("Priority", true).expect("select");
    session.set_property_selected("Notes", false).expect("deselect");
    let saved = session.snapshot().selected_properties;
    session.save_selected_properties().await.expect("save");

    let reloaded = FormSession::new(harness.client.clone(), &AppSettings::default());
    let snapshot = reloaded.activate(None).await.expect("activate");
    assert_eq!(snapshot.selected_properties, saved);
    assert_eq!(snapshot.visible_properties, vec!["Priority".to_string()]);
}

#[tokio::test]
async fn unknown_dynamic_field_never_reaches_notion() {
    let harness = harness().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "page-x" })))
        .expect(0)
        .mount(&harness.notion)
        .await;
    let session = configured_session(&harness).await;
    session.set_content("User: is Mood a column?");

    let id = session.add_dynamic_field().expect("field");
    let (id, update) = named(&id, "Mood", "curious");
    assert!(session.update_dynamic_field(&id, update));

    let result = session.submit().await;
    assert!(!result.success);
    assert_eq!(result.missing_properties, vec!["Mood".to_string()]);
    assert!(result.error.expect("error").contains("Mood"));
    assert_eq!(session.snapshot().missing_properties, vec!["Mood".to_string()]);
    assert_eq!(session.progress().phase, SubmissionPhase::Idle);
}

#[tokio::test]
async fn submission_creates_page_and_resets_form() {
    let harness = harness().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page", "id": "page-42" })))
        .expect(1)
        .mount(&harness.notion)
        .await;
    let session = configured_session(&harness).await;

    session.set_property_selected("Priority", true).expect("select");
    assert!(session.set_value("Priority", "High").valid);
    let id = session.add_dynamic_field().expect("field");
    let (id, update) = named(&id, "Tag", "rust");
    session.update_dynamic_field(&id, update);
    session.persist_dynamic_fields().await.expect("persist");
    session.set_content("User: How do lifetimes work?\nAssistant: They describe borrows.");
    session.set_date(Some("2025-02-03".to_string()));

    let result = session.submit().await;
    assert!(result.success, "{:?}", result.error);
    let message = result.message.expect("message");
    assert!(message.starts_with("Chat sent to Notion successfully"), "{message}");
    assert!(message.contains("Date: 2025-02-03"), "{message}");

    let snapshot = session.snapshot();
    assert_eq!(snapshot.content, "");
    assert_eq!(snapshot.date, None);
    assert_eq!(snapshot.progress.progress, 0);
    assert!(snapshot.property_values["Priority"].is_empty());
    assert_eq!(snapshot.dynamic_fields[0].name, "Tag");
    assert!(snapshot.dynamic_fields[0].value.is_empty());

    let requests = harness.notion.received_requests().await.expect("recording enabled");
    let page = requests
        .iter()
        .find(|request| request.method.as_str() == "POST" && request.url.path() == "/v1/pages")
        .expect("page request");
    let body: Value = page.body_json().expect("json body");
    assert_eq!(body["parent"]["database_id"], "db-1");
    assert_eq!(body["properties"]["Name"]["title"][0]["text"]["content"], "How do lifetimes work?");
    assert_eq!(body["properties"]["Created"]["date"]["start"], "2025-02-03");
    assert_eq!(body["properties"]["Priority"]["select"]["name"], "High");
    assert_eq!(body["properties"]["Tag"]["rich_text"][0]["text"]["content"], "rust");

    let reloaded = FormSession::new(harness.client.clone(), &AppSettings::default());
    let restored = reloaded.activate(None).await.expect("activate");
    assert_eq!(restored.dynamic_fields.len(), 1);
    assert_eq!(restored.dynamic_fields[0].name, "Tag");
}

#[tokio::test]
async fn remote_validation_flags_unknown_options() {
    let harness = harness().await;
    let session = configured_session(&harness).await;
    session.set_property_selected("Priority", true).expect("select");
    session.set_property_selected("Notes", true).expect("select");
    session.set_value("Priority", "Urgent");
    session.set_value("Notes", "fine");

    let summary = session.validate_remote().await.expect("latest request");
    assert_eq!(summary.total, 2);
    assert_eq!(summary.invalid, 1);
    let remote = session.snapshot().remote_validation;
    assert!(remote["Priority"]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("Valid options: Low, Med, High")));
    assert!(remote["Notes"].valid);
}
