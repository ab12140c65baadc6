//! HTTP implementation of the spreadsheet backend
//!
//! Talks to the row-store REST service with bearer auth: the configured API
//! key is exchanged for a short-lived session token whose expiry is read
//! from the token's `exp` claim. A direct-quota limiter caps the outbound
//! request rate as the last line of quota defense, independent of the
//! gateway's per-class throttler.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;

use super::SheetsBackend;
use crate::config::BackendSettings;
use crate::error::{ApiError, Result};
use crate::models::{InventoryRow, OrderColumn, OrderRow, SheetMetadata};

/// Hard ceiling on outbound requests per second
const RATE_LIMIT_PER_SECOND: u32 = 2;

/// Refresh the session token this many minutes before it expires
const TOKEN_REFRESH_MARGIN_MINUTES: i64 = 5;

/// Tab holding order rows
const ORDERS_TAB: &str = "Orders";

/// Tab holding inventory rows
const INVENTORY_TAB: &str = "Inventory";

/// Decode base64url (URL-safe base64 without padding)
fn base64_decode_url(input: &str) -> std::result::Result<Vec<u8>, String> {
    use base64::{Engine as _, engine::general_purpose};

    // Base64url uses - instead of + and _ instead of /
    let standard_b64 = input.replace('-', "+").replace('_', "/");

    let padding = match standard_b64.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => return Err("Invalid base64url length".to_string()),
    };

    let padded = format!("{}{}", standard_b64, padding);

    general_purpose::STANDARD
        .decode(&padded)
        .map_err(|e| e.to_string())
}

/// Session token with expiry decoded from its `exp` claim
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Internal authentication state
#[derive(Debug, Clone)]
struct AuthState {
    api_key: Option<String>,
    token: Option<String>,
    token_expires_at: Option<chrono::DateTime<Utc>>,
}

/// Row-store REST client
pub struct HttpSheetsBackend {
    http: HttpClient,
    base_url: String,
    spreadsheet_id: String,
    attachments_folder_id: Option<String>,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    auth_state: Arc<RwLock<AuthState>>,
}

impl HttpSheetsBackend {
    /// Create a backend client from connection settings.
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let spreadsheet_id = settings.require_spreadsheet_id()?.to_string();

        let http = HttpClient::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id,
            attachments_folder_id: settings.attachments_folder_id.clone(),
            rate_limiter,
            auth_state: Arc::new(RwLock::new(AuthState {
                api_key: settings.api_key.clone(),
                token: None,
                token_expires_at: None,
            })),
        })
    }

    /// Set the session token and expiry
    async fn set_token(&self, token: SessionToken) {
        let mut state = self.auth_state.write().await;
        state.token = Some(token.token);
        state.token_expires_at = Some(token.expires_at);
    }

    /// Check if the token is expired or will expire soon
    async fn is_token_expired(&self) -> bool {
        let state = self.auth_state.read().await;
        match state.token_expires_at {
            None => true,
            Some(expires_at) => {
                let buffer = chrono::Duration::minutes(TOKEN_REFRESH_MARGIN_MINUTES);
                expires_at - buffer < Utc::now()
            }
        }
    }

    /// Get the current session token, refreshing if necessary
    async fn get_valid_token(&self) -> Result<String> {
        if self.is_token_expired().await {
            let api_key = {
                let state = self.auth_state.read().await;
                state.api_key.clone().ok_or(ApiError::Unauthorized)?
            };

            let token = self.authenticate(&api_key).await?;
            self.set_token(token).await;
        }

        let state = self.auth_state.read().await;
        state.token.clone().ok_or_else(|| ApiError::Unauthorized.into())
    }

    /// Exchange the API key for a session token
    async fn authenticate(&self, api_key: &str) -> Result<SessionToken> {
        self.rate_limiter.until_ready().await;

        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
        }

        #[derive(Deserialize)]
        struct TokenClaims {
            exp: i64, // Unix timestamp
        }

        let url = format!("{}/auth/token", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("X-ApiKey", api_key)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized.into());
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to read response: {}", e)))?;

        let token_response: TokenResponse = serde_json::from_str(&response_text).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse token response: {}. Body was: {}",
                e, response_text
            ))
        })?;

        // Token format: header.payload.signature; expiry lives in the payload
        let parts: Vec<&str> = token_response.token.split('.').collect();
        if parts.len() != 3 {
            return Err(ApiError::InvalidToken.into());
        }

        let payload_bytes = base64_decode_url(parts[1]).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to decode token payload: {}", e))
        })?;

        let claims: TokenClaims = serde_json::from_slice(&payload_bytes).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse token payload: {}", e))
        })?;

        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
            ApiError::InvalidResponse("Invalid token expiration timestamp".to_string())
        })?;

        Ok(SessionToken {
            token: token_response.token,
            expires_at,
        })
    }

    /// Make an authenticated API request
    fn request<'a, T: DeserializeOwned + 'a>(
        &'a self,
        method: reqwest::Method,
        path: &'a str,
        body: Option<serde_json::Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send + 'a>> {
        Box::pin(async move { self.request_inner(method, path, body).await })
    }

    /// Internal request implementation
    async fn request_inner<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let token = self.get_valid_token().await?;

        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", format!("Bearer {}", token));
        if let Some(ref body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::from)?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let data = response.json::<T>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(data)
            }
            StatusCode::UNAUTHORIZED => {
                // Session token may have been revoked; refresh once and retry
                let api_key = {
                    let state = self.auth_state.read().await;
                    state.api_key.clone()
                };

                if let Some(api_key) = api_key {
                    let token = self.authenticate(&api_key).await?;
                    self.set_token(token).await;

                    return Box::pin(self.request_inner(method, path, body)).await;
                }
                Err(ApiError::Unauthorized.into())
            }
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden.into()),
            StatusCode::NOT_FOUND => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Resource not found".to_string());
                Err(ApiError::NotFound(error_msg).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(std::time::Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Bad request".to_string());
                Err(ApiError::BadRequest(error_msg).into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(ApiError::ServerError(error_msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }

    fn tab_rows_path(&self, tab: &str) -> String {
        format!("/spreadsheets/{}/tabs/{}/rows", self.spreadsheet_id, tab)
    }
}

#[derive(Deserialize)]
struct RowsResponse<R> {
    rows: Vec<R>,
}

#[async_trait]
impl SheetsBackend for HttpSheetsBackend {
    async fn fetch_inventory_rows(&self) -> Result<Vec<InventoryRow>> {
        let path = self.tab_rows_path(INVENTORY_TAB);
        let response: RowsResponse<InventoryRow> =
            self.request(reqwest::Method::GET, &path, None).await?;
        Ok(response.rows)
    }

    async fn fetch_order_rows(&self) -> Result<Vec<OrderRow>> {
        let path = self.tab_rows_path(ORDERS_TAB);
        let response: RowsResponse<OrderRow> =
            self.request(reqwest::Method::GET, &path, None).await?;
        Ok(response.rows)
    }

    async fn append_order_row(&self, values: &[String]) -> Result<()> {
        let path = format!(
            "/spreadsheets/{}/tabs/{}/rows:append",
            self.spreadsheet_id, ORDERS_TAB
        );
        let body = json!({ "values": values });
        let _: serde_json::Value = self
            .request(reqwest::Method::POST, &path, Some(body))
            .await?;
        Ok(())
    }

    async fn update_order_cells(
        &self,
        row_number: u32,
        updates: &[(OrderColumn, String)],
    ) -> Result<()> {
        let path = format!(
            "/spreadsheets/{}/tabs/{}/cells:batchUpdate",
            self.spreadsheet_id, ORDERS_TAB
        );
        let cells: Vec<serde_json::Value> = updates
            .iter()
            .map(|(column, value)| {
                json!({
                    "row": row_number,
                    "column": column.index(),
                    "value": value,
                })
            })
            .collect();
        let body = json!({ "updates": cells });
        let _: serde_json::Value = self
            .request(reqwest::Method::POST, &path, Some(body))
            .await?;
        Ok(())
    }

    async fn upload_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct UploadResponse {
            #[serde(rename = "webViewLink")]
            web_view_link: String,
        }

        self.rate_limiter.until_ready().await;

        let token = self.get_valid_token().await?;

        let metadata = json!({
            "name": filename,
            "mimeType": "image/jpeg",
            "folderId": self.attachments_folder_id.clone(),
        });

        let form = reqwest::multipart::Form::new()
            .text("metadata", metadata.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(filename.to_string())
                    .mime_str("image/jpeg")
                    .map_err(|e| ApiError::BadRequest(format!("Invalid file part: {}", e)))?,
            );

        let url = format!("{}/files", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Upload failed".to_string());
            return Err(match status {
                StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
                StatusCode::FORBIDDEN => ApiError::Forbidden,
                StatusCode::BAD_REQUEST => ApiError::BadRequest(detail),
                status if status.is_server_error() => ApiError::ServerError(detail),
                _ => ApiError::InvalidResponse(format!("Unexpected status: {}", status)),
            }
            .into());
        }

        let upload: UploadResponse = response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse upload response: {}", e))
        })?;

        if upload.web_view_link.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Upload returned no web link".to_string(),
            )
            .into());
        }

        Ok(upload.web_view_link)
    }

    async fn sheet_metadata(&self) -> Result<SheetMetadata> {
        let path = format!("/spreadsheets/{}", self.spreadsheet_id);
        self.request(reqwest::Method::GET, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use base64::{Engine as _, engine::general_purpose};

    /// Build a structurally valid token whose `exp` claim is `secs_from_now`
    /// in the future.
    fn test_token(secs_from_now: i64) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let exp = Utc::now().timestamp() + secs_from_now;
        let payload =
            general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{}}}", exp).as_bytes());
        format!("{}.{}.sig", header, payload)
    }

    fn test_settings(base_url: &str) -> BackendSettings {
        BackendSettings {
            base_url: base_url.to_string(),
            api_key: Some("test-key".to_string()),
            spreadsheet_id: Some("sheet-1".to_string()),
            attachments_folder_id: Some("folder-1".to_string()),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_client_requires_spreadsheet_id() {
        let settings = BackendSettings {
            spreadsheet_id: None,
            ..test_settings("http://localhost")
        };
        assert!(HttpSheetsBackend::new(&settings).is_err());
    }

    #[test]
    fn test_base64_decode_url_roundtrip() {
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(b"{\"exp\":1}");
        assert_eq!(base64_decode_url(&encoded).unwrap(), b"{\"exp\":1}");
        assert!(base64_decode_url("!!!!!").is_err());
    }

    #[tokio::test]
    async fn test_token_expiry_check() {
        let backend = HttpSheetsBackend::new(&test_settings("http://localhost")).unwrap();

        // No token yet
        assert!(backend.is_token_expired().await);

        // Expiring within the refresh margin counts as expired
        backend
            .set_token(SessionToken {
                token: "t".to_string(),
                expires_at: Utc::now() + chrono::Duration::minutes(2),
            })
            .await;
        assert!(backend.is_token_expired().await);

        backend
            .set_token(SessionToken {
                token: "t".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .await;
        assert!(!backend.is_token_expired().await);
    }

    #[tokio::test]
    async fn test_auth_exchange_then_fetch_reuses_token() {
        let mut server = mockito::Server::new_async().await;

        let auth = server
            .mock("GET", "/auth/token")
            .match_header("X-ApiKey", "test-key")
            .with_body(format!("{{\"token\":\"{}\"}}", test_token(3600)))
            .expect(1)
            .create_async()
            .await;

        let rows = server
            .mock("GET", "/spreadsheets/sheet-1/tabs/Inventory/rows")
            .with_body(
                r#"{"rows":[{"Name":"Wedding Cake","Type":"hybrid","Tag":"buds","Price":2000,"Stock":3}]}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let backend = HttpSheetsBackend::new(&test_settings(&server.url())).unwrap();

        let first = backend.fetch_inventory_rows().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name.as_deref(), Some("Wedding Cake"));

        // Second fetch must not re-authenticate
        let second = backend.fetch_inventory_rows().await.unwrap();
        assert_eq!(second.len(), 1);

        auth.assert_async().await;
        rows.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_api_key_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/auth/token")
            .with_status(401)
            .create_async()
            .await;

        let backend = HttpSheetsBackend::new(&test_settings(&server.url())).unwrap();
        let result = backend.fetch_inventory_rows().await;

        assert!(matches!(
            result,
            Err(Error::Api(ApiError::Unauthorized))
        ));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/auth/token")
            .with_body(format!("{{\"token\":\"{}\"}}", test_token(3600)))
            .create_async()
            .await;

        server
            .mock("GET", "/spreadsheets/sheet-1/tabs/Orders/rows")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        server
            .mock("GET", "/spreadsheets/sheet-1")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        server
            .mock("GET", "/spreadsheets/sheet-1/tabs/Inventory/rows")
            .with_status(404)
            .with_body("no such tab")
            .create_async()
            .await;

        let backend = HttpSheetsBackend::new(&test_settings(&server.url())).unwrap();

        match backend.fetch_order_rows().await {
            Err(Error::Api(ApiError::RateLimit(after))) => {
                assert_eq!(after, std::time::Duration::from_secs(30));
            }
            other => panic!("expected RateLimit, got {:?}", other.map(|_| ())),
        }

        assert!(matches!(
            backend.sheet_metadata().await,
            Err(Error::Api(ApiError::ServerError(_)))
        ));

        assert!(matches!(
            backend.fetch_inventory_rows().await,
            Err(Error::Api(ApiError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_append_posts_values() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/auth/token")
            .with_body(format!("{{\"token\":\"{}\"}}", test_token(3600)))
            .create_async()
            .await;

        let append = server
            .mock("POST", "/spreadsheets/sheet-1/tabs/Orders/rows:append")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"values":["OID-1","12345"]}"#.to_string(),
            ))
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let backend = HttpSheetsBackend::new(&test_settings(&server.url())).unwrap();
        backend
            .append_order_row(&["OID-1".to_string(), "12345".to_string()])
            .await
            .unwrap();

        append.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_returns_web_link() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/auth/token")
            .with_body(format!("{{\"token\":\"{}\"}}", test_token(3600)))
            .create_async()
            .await;

        server
            .mock("POST", "/files")
            .with_body(r#"{"id":"f-1","webViewLink":"https://files.example/f-1"}"#)
            .create_async()
            .await;

        let backend = HttpSheetsBackend::new(&test_settings(&server.url())).unwrap();
        let link = backend
            .upload_attachment(vec![0xFF, 0xD8, 0xFF], "payment.jpg")
            .await
            .unwrap();

        assert_eq!(link, "https://files.example/f-1");
    }
}
