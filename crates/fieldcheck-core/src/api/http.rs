//! reqwest client for the checklist backend.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{ChecklistApi, DraftUpload};
use crate::models::{ScopeKey, ScopeSnapshot};
use crate::util::{compact_text, normalize_base_url};
use crate::{Error, Result};

#[derive(Clone)]
pub struct HttpChecklistApi {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpChecklistApi {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpChecklistApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpChecklistApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url).map_err(Error::Config)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn scope_url(&self, scope_key: &ScopeKey) -> String {
        format!(
            "{}/v1/scopes/{}",
            self.base_url,
            urlencoding::encode(scope_key.as_str())
        )
    }

    fn drafts_url(&self) -> String {
        format!("{}/v1/drafts", self.base_url)
    }
}

impl ChecklistApi for HttpChecklistApi {
    async fn fetch_scope(&self, token: &str, scope_key: &ScopeKey) -> Result<ScopeSnapshot> {
        let response = self
            .client
            .get(self.scope_url(scope_key))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(response.json::<ScopeSnapshot>().await?)
    }

    async fn upsert_draft(&self, token: &str, upload: DraftUpload) -> Result<String> {
        let mut form = Form::new();
        for (name, value) in upload.fields.into_parts() {
            form = form.text(name, value);
        }
        for file in upload.files {
            let part = Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.mime_type)?;
            form = form.part(file.part_name, part);
        }

        let response = self
            .client
            .post(self.drafts_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let payload = response.json::<UpsertResponse>().await?;
        payload
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Api {
                status: 200,
                message: "response did not include a draft id".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|payload| payload.message.or(payload.error))
        .map_or_else(|| compact_text(body), |message| compact_text(&message));

    Error::Api {
        status: status.as_u16(),
        message: if message.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            message
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> HttpChecklistApi {
        HttpChecklistApi::new("https://checklists.example.com/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        assert!(HttpChecklistApi::new("", Duration::from_secs(1)).is_err());
        assert!(HttpChecklistApi::new("checklists.example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn scope_url_escapes_key() {
        let scope = ScopeKey::new("site 4/unit 2").unwrap();
        assert_eq!(
            api().scope_url(&scope),
            "https://checklists.example.com/v1/scopes/site%204%2Funit%202"
        );
        assert_eq!(api().drafts_url(), "https://checklists.example.com/v1/drafts");
    }

    #[test]
    fn api_error_prefers_json_message() {
        let error = api_error(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":" bad answers "}"#);
        assert!(matches!(
            error,
            Error::Api { status: 422, ref message } if message == "bad answers"
        ));
    }

    #[test]
    fn api_error_falls_back_to_status_for_empty_body() {
        let error = api_error(StatusCode::BAD_GATEWAY, "   ");
        assert!(matches!(
            error,
            Error::Api { status: 502, ref message } if message == "HTTP 502"
        ));
    }
}
