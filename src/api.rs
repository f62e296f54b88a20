//! HTTP wrappers around the clearance backend.
//!
//! Each backend concern sits behind a small trait so the reconciliation and
//! bulk helpers can run against an in-memory fake in tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ApiConfig;
use crate::error::{backend_message, ApiError};
use crate::models::{
    NewStudentRequirement, Permit, Requirement, RequirementStatus, SmsMessage, StudentRequirement,
};

#[async_trait]
pub trait RequirementStore: Send + Sync {
    async fn list_student_requirements(&self) -> Result<Vec<StudentRequirement>, ApiError>;

    async fn create_student_requirement(
        &self,
        new: &NewStudentRequirement,
    ) -> Result<StudentRequirement, ApiError>;

    async fn update_status(
        &self,
        id: &str,
        status: RequirementStatus,
    ) -> Result<StudentRequirement, ApiError>;
}

#[async_trait]
pub trait PermitService: Send + Sync {
    async fn generate_permit(
        &self,
        student_id: &str,
        exam_period: Option<&str>,
    ) -> Result<Permit, ApiError>;

    async fn lookup_permit(&self, qr_code: &str) -> Result<Permit, ApiError>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), ApiError>;
}

/// The backend answers list endpoints either with a bare array or wrapped in
/// `{"data": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) => items,
            Listing::Wrapped { data } => data,
        }
    }
}

/// Single-record responses may also come back wrapped.
#[derive(Deserialize)]
#[serde(untagged)]
enum Single<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Single<T> {
    fn into_inner(self) -> T {
        match self {
            Single::Wrapped { data } => data,
            Single::Bare(item) => item,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate {
    status: RequirementStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PermitRequest<'a> {
    student_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exam_period: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Rejected(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: config.base_url.clone(),
                source,
            })?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `path` followed by `segment` as a single percent-encoded path segment,
    /// so ids and QR payloads containing `/`, `?` or `#` stay intact.
    fn segment_url(&self, path: &str, segment: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| ApiError::Rejected(format!("invalid backend url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Rejected("backend url cannot take a path".to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    pub async fn list_requirements(&self) -> Result<Vec<Requirement>, ApiError> {
        let endpoint = "/req/all";
        let listing: Listing<Requirement> = self
            .send_json(self.client.get(self.url(endpoint)), endpoint)
            .await?;
        Ok(listing.into_vec())
    }

    #[instrument(name = "api_send", skip(self, request))]
    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: backend_message(&body),
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        let body = self.send(request, endpoint).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl RequirementStore for ApiClient {
    async fn list_student_requirements(&self) -> Result<Vec<StudentRequirement>, ApiError> {
        let endpoint = "/institutionalReq/all";
        let listing: Listing<StudentRequirement> = self
            .send_json(self.client.get(self.url(endpoint)), endpoint)
            .await?;
        Ok(listing.into_vec())
    }

    async fn create_student_requirement(
        &self,
        new: &NewStudentRequirement,
    ) -> Result<StudentRequirement, ApiError> {
        let endpoint = "/institutionalReq/create";
        let created: Single<StudentRequirement> = self
            .send_json(self.client.post(self.url(endpoint)).json(new), endpoint)
            .await?;
        Ok(created.into_inner())
    }

    async fn update_status(
        &self,
        id: &str,
        status: RequirementStatus,
    ) -> Result<StudentRequirement, ApiError> {
        let endpoint = "/institutionalReq/update";
        let url = self.segment_url(endpoint, id)?;
        let updated: Single<StudentRequirement> = self
            .send_json(
                self.client.put(url).json(&StatusUpdate { status }),
                endpoint,
            )
            .await?;
        Ok(updated.into_inner())
    }
}

#[async_trait]
impl PermitService for ApiClient {
    async fn generate_permit(
        &self,
        student_id: &str,
        exam_period: Option<&str>,
    ) -> Result<Permit, ApiError> {
        let endpoint = "/qr-code/generate";
        let body = PermitRequest {
            student_id,
            exam_period,
        };
        let permit: Single<Permit> = self
            .send_json(self.client.post(self.url(endpoint)).json(&body), endpoint)
            .await?;
        Ok(permit.into_inner())
    }

    async fn lookup_permit(&self, qr_code: &str) -> Result<Permit, ApiError> {
        let endpoint = "/qr-code/scan";
        let url = self.segment_url(endpoint, qr_code)?;
        let permit: Single<Permit> = self
            .send_json(self.client.get(url), endpoint)
            .await?;
        Ok(permit.into_inner())
    }
}

#[async_trait]
impl SmsGateway for ApiClient {
    async fn send_sms(&self, message: &SmsMessage) -> Result<(), ApiError> {
        let endpoint = "/sms/send-sms";
        self.send(self.client.post(self.url(endpoint)).json(message), endpoint)
            .await?;
        Ok(())
    }
}
