use super::schema::{parse_database, DatabaseSchema};
use super::NotionApi;
use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// reqwest-backed Notion REST client. The API key is passed per call since
/// every configuration carries its own integration token.
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: Client,
    base_url: String,
    notion_version: String,
}

#[derive(Debug, Deserialize)]
struct NotionErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

impl NotionClient {
    pub fn new(settings: &AppSettings) -> AppResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.notion_api_base_url.trim_end_matches('/').to_string(),
            notion_version: settings.notion_version.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, api_key: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(api_key)
            .header("Notion-Version", &self.notion_version)
    }

    async fn checked(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<NotionErrorBody>(&body) {
            Ok(NotionErrorBody {
                message: Some(message), ..
            }) => message,
            Ok(NotionErrorBody { code: Some(code), .. }) => code,
            _ => format!("HTTP {}: {}", status.as_u16(), body),
        };
        tracing::debug!(status = status.as_u16(), "notion request rejected");
        Err(AppError::Notion(message))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn retrieve_database(&self, api_key: &str, database_id: &str) -> AppResult<DatabaseSchema> {
        let response = self
            .request(Method::GET, &format!("databases/{}", database_id.trim()), api_key)
            .send()
            .await?;
        let raw: Value = Self::checked(response).await?.json().await?;
        Ok(parse_database(&raw))
    }

    async fn create_page(
        &self,
        api_key: &str,
        database_id: &str,
        properties: Map<String, Value>,
        children: Vec<Value>,
    ) -> AppResult<String> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
            "children": children,
        });
        let response = self.request(Method::POST, "pages", api_key).json(&body).send().await?;
        let created: CreatedPage = Self::checked(response).await?.json().await?;
        Ok(created.id)
    }

    async fn append_blocks(&self, api_key: &str, block_id: &str, children: Vec<Value>) -> AppResult<()> {
        let response = self
            .request(Method::PATCH, &format!("blocks/{}/children", block_id), api_key)
            .json(&json!({ "children": children }))
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::NotionClient;
    use crate::errors::AppError;
    use crate::models::{AppSettings, PropertyType};
    use crate::notion::NotionApi;
    use serde_json::{json, Map};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> NotionClient {
        let settings = AppSettings {
            notion_api_base_url: format!("{}/v1", server.uri()),
            ..AppSettings::default()
        };
        NotionClient::new(&settings).expect("client")
    }

    #[tokio::test]
    async fn retrieve_database_sends_auth_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/db-1"))
            .and(header("authorization", "Bearer secret_key"))
            .and(header("notion-version", "2022-06-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "db-1",
                "title": [{ "plain_text": "Chats" }],
                "properties": { "Name": { "id": "title", "type": "title", "title": {} } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let schema = client_for(&server)
            .await
            .retrieve_database("secret_key", "db-1")
            .await
            .expect("schema");
        assert_eq!(schema.title, "Chats");
        assert_eq!(schema.properties[0].property_type, PropertyType::Title);
    }

    #[tokio::test]
    async fn error_bodies_become_notion_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/missing"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "object": "error",
                "status": 401,
                "code": "unauthorized",
                "message": "API token is invalid."
            })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .await
            .retrieve_database("bad", "missing")
            .await
            .expect_err("should fail");
        match error {
            AppError::Notion(message) => assert_eq!(message, "API token is invalid."),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_page_posts_parent_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(body_partial_json(json!({ "parent": { "database_id": "db-1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page", "id": "page-9" })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/v1/blocks/page-9/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let page_id = client
            .create_page("k", "db-1", Map::new(), vec![json!({ "type": "paragraph" })])
            .await
            .expect("page");
        assert_eq!(page_id, "page-9");
        client
            .append_blocks("k", &page_id, vec![json!({ "type": "paragraph" })])
            .await
            .expect("append");
    }
}
