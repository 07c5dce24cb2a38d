//! A [`Catalog`] that talks to a running `annotator-server` over HTTP.
//!
//! This lets a client drive a local [`crate::session::Session`] (navigation, drafts, bulk saves)
//! against the server's catalog, with the same error kinds the server reports.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::api::{
    BatchesResponse, FilesResponse, LoginRequest, LoginResponse, SaveRequest, SaveResponse,
};
use crate::catalog::{BatchId, Catalog, FileId, SegmentRecord};
use crate::segments::Segment;
use crate::user::UserSummary;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Catalog access through the server's JSON API, authenticated with a bearer token.
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpCatalog {
    /// Log in and return a catalog bound to the issued token.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<(Self, UserSummary)> {
        let client = Client::new();
        let base_url = base_url.trim_end_matches('/').to_owned();

        let resp = client
            .post(format!("{base_url}/api/auth/login"))
            .json(&LoginRequest {
                email: email.to_owned(),
                password: password.to_owned(),
            })
            .send()
            .await
            .map_err(transport_error)?;
        let login: LoginResponse = decode(resp).await?;

        Ok((
            Self {
                client,
                base_url,
                token: login.token,
            },
            login.user,
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::upstream(format!("request failed: {err}"))
}

/// Decode a success body, or map the server's error status back onto an [`Error`] kind.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|err| Error::upstream(format!("malformed response: {err}")));
    }

    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(match status {
        StatusCode::BAD_REQUEST => Error::Validation(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Upstream(message),
    })
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn max_batch(&self) -> Result<BatchId> {
        let body: BatchesResponse = self.get_json("/api/batches").await?;
        Ok(body.max_batch)
    }

    async fn list_files(&self, batch: BatchId) -> Result<Vec<FileId>> {
        let body: FilesResponse = self.get_json(&format!("/api/batch/{batch}/files")).await?;
        Ok(body.files)
    }

    async fn load_segments(&self, batch: BatchId, file: FileId) -> Result<Vec<SegmentRecord>> {
        let segments: Vec<Segment> = self
            .get_json(&format!("/api/batch/{batch}/file/{file}"))
            .await?;
        Ok(segments.iter().map(Segment::to_record).collect())
    }

    async fn save_markup(&self, segment_id: &str, markup: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/api/save", self.base_url))
            .bearer_auth(&self.token)
            .json(&SaveRequest {
                id: segment_id.to_owned(),
                markup: markup.to_owned(),
            })
            .send()
            .await
            .map_err(transport_error)?;
        let _: SaveResponse = decode(resp).await?;
        Ok(())
    }
}
