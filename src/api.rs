use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Config;
use crate::error::ApiError;
use crate::models::{BallotPayload, TokenGrant, TokenPair, Uid};

/// Thin HTTP layer. Requests are described by [`AdminRequest`] values so the
/// session layer can replay one after a token refresh; bodies are rebuilt
/// from their description on every send.
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    /// `base` must already include the `/api/v1` prefix.
    pub fn new(base: impl Into<String>) -> Self {
        ApiClient {
            http: Client::new(),
            base: base.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(ApiClient {
            http,
            base: config.api_base(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Sends one request exactly as described and reports the raw outcome.
    /// Status handling is left to the caller: the session layer needs to see
    /// a 401 before deciding whether to refresh and retry.
    pub async fn execute(
        &self,
        request: &AdminRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Multipart(spec) => builder.multipart(spec.to_form()?),
        };
        debug!(method = %request.method, path = %request.path, "sending request");
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ApiResponse { status, body })
    }

    /// Exchanges credentials for a token pair. The backend must return both
    /// tokens; a partial grant is treated as a malformed response.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let request = AdminRequest::post(
            "/admin/login",
            json!({ "username": username, "password": password }),
        );
        let response = self.execute(&request, None).await?.into_result()?;
        let grant: TokenGrant = response.json()?;
        match (grant.access_token, grant.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Ok(TokenPair {
                    access_token: access,
                    refresh_token: refresh,
                })
            }
            _ => Err(ApiError::Decode(
                "login response did not include both tokens".into(),
            )),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        let request = AdminRequest::post(
            "/admin/token/refresh",
            json!({ "refresh_token": refresh_token }),
        );
        let response = self.execute(&request, None).await?.into_result()?;
        response.json()
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let request =
            AdminRequest::post("/admin/logout", json!({ "refresh_token": refresh_token }));
        self.execute(&request, None).await?.into_result()?;
        Ok(())
    }

    /// Fetches the ballot a voting token gives access to.
    pub async fn fetch_ballot(
        &self,
        election: &Uid,
        token: &str,
    ) -> Result<BallotPayload, ApiError> {
        let request = AdminRequest::get(format!(
            "/elections/{}/vote/{}",
            election,
            encode_segment(token)
        ));
        let response = self.execute(&request, None).await?.into_result()?;
        response.json()
    }

    /// Casts the ballot. The server owns the single-use and voting-window
    /// rules; the client only reports the verdict.
    pub async fn cast_vote(
        &self,
        election: &Uid,
        token: &str,
        candidate: &Uid,
    ) -> Result<(), ApiError> {
        let request = AdminRequest::post(
            format!("/elections/{}/vote/{}", election, encode_segment(token)),
            json!({ "candidate_id": candidate }),
        );
        self.execute(&request, None).await?.into_result()?;
        Ok(())
    }
}

/// Rebuildable request description. Multipart forms cannot be reused once
/// built, so parts are kept as plain data and turned into a fresh form for
/// every attempt.
#[derive(Debug, Clone)]
pub struct AdminRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl AdminRequest {
    pub fn get(path: impl Into<String>) -> Self {
        AdminRequest {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: impl Into<String>, payload: Value) -> Self {
        AdminRequest {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Json(payload),
        }
    }

    pub fn post_empty(path: impl Into<String>) -> Self {
        AdminRequest {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn patch(path: impl Into<String>, payload: Value) -> Self {
        AdminRequest {
            method: Method::PATCH,
            path: path.into(),
            body: RequestBody::Json(payload),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        AdminRequest {
            method: Method::DELETE,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn multipart(path: impl Into<String>, form: MultipartSpec) -> Self {
        AdminRequest {
            method: Method::POST,
            path: path.into(),
            body: RequestBody::Multipart(form),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(MultipartSpec),
}

#[derive(Debug, Clone, Default)]
pub struct MultipartSpec {
    texts: Vec<(String, String)>,
    files: Vec<FilePart>,
}

#[derive(Debug, Clone)]
struct FilePart {
    field: String,
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl MultipartSpec {
    pub fn new() -> Self {
        MultipartSpec::default()
    }

    pub fn text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.texts.push((field.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        });
        self
    }

    fn to_form(&self) -> Result<reqwest::multipart::Form, ApiError> {
        let mut form = reqwest::multipart::Form::new();
        for (field, value) in &self.texts {
            form = form.text(field.clone(), value.clone());
        }
        for part in &self.files {
            let piece = reqwest::multipart::Part::bytes(part.bytes.clone())
                .file_name(part.file_name.clone())
                .mime_str(&part.mime)?;
            form = form.part(part.field.clone(), piece);
        }
        Ok(form)
    }
}

#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    /// Converts non-2xx statuses into [`ApiError::Rejected`].
    pub fn into_result(self) -> Result<ApiResponse, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::rejected(self.status.as_u16(), &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Percent-encodes one path segment, the same set of characters the admin UI
/// escaped when it embedded e-mail addresses in roster URLs.
pub fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_segment_escapes_reserved_characters() {
        assert_eq!(encode_segment("jane.doe@example.com"), "jane.doe%40example.com");
        assert_eq!(encode_segment("a+b c/d"), "a%2Bb%20c%2Fd");
        assert_eq!(encode_segment("plain-safe_1.2~3"), "plain-safe_1.2~3");
    }

    #[test]
    fn request_constructors_pick_the_right_method() {
        assert_eq!(AdminRequest::get("/x").method, Method::GET);
        assert_eq!(AdminRequest::post("/x", json!({})).method, Method::POST);
        assert_eq!(AdminRequest::post_empty("/x").method, Method::POST);
        assert_eq!(AdminRequest::patch("/x", json!({})).method, Method::PATCH);
        assert_eq!(AdminRequest::delete("/x").method, Method::DELETE);
    }

    #[test]
    fn multipart_spec_rebuilds_forms() {
        let spec = MultipartSpec::new()
            .text("name", "Doe")
            .file("photo", "doe.png", "image/png", vec![1, 2, 3]);
        // Two independent forms from the same description.
        assert!(spec.to_form().is_ok());
        assert!(spec.to_form().is_ok());
    }
}
