use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use super::{Access, Caller, Catalog, ChangeSignal, Operation};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::upstream::UpstreamClient;

/// Catalog API client
pub struct HttpCatalog {
    upstream: UpstreamClient,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeDateResponse {
    change_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    allowed: bool,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::new(config)?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        authorization: Option<&str>,
        not_found: impl FnOnce() -> Error,
    ) -> Result<T> {
        let url = self.upstream.url(path);
        let response = self
            .upstream
            .send(|client| client.get(&url).query(query), authorization)
            .await?;

        UpstreamClient::json(reject_not_found(response, not_found)?).await
    }
}

fn reject_not_found(response: Response, not_found: impl FnOnce() -> Error) -> Result<Response> {
    if response.status() == StatusCode::NOT_FOUND {
        Err(not_found())
    } else {
        Ok(response)
    }
}

fn parse_change_date(raw: Option<&str>) -> Result<ChangeSignal> {
    raw.map_or(Ok(ChangeSignal::Unknown), |value| {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| ChangeSignal::Changed(dt.with_timezone(&Utc)))
            .map_err(|e| Error::UpstreamInvalidResponse(format!("bad change date '{value}': {e}")))
    })
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn resolve_uuid(&self, uuid: &str) -> Result<u64> {
        let path = format!("records/{}/id", urlencoding::encode(uuid));
        let response: IdResponse = self
            .get_json(&path, &[], None, || {
                Error::RecordNotFound(format!("uuid={uuid}"))
            })
            .await?;
        Ok(response.id)
    }

    async fn change_signal(&self, record_id: u64) -> Result<ChangeSignal> {
        let path = format!("records/{record_id}/change-date");
        let response: ChangeDateResponse = self
            .get_json(&path, &[], None, || {
                Error::RecordNotFound(format!("id = {record_id}"))
            })
            .await?;
        parse_change_date(response.change_date.as_deref())
    }

    async fn check_access(
        &self,
        record_id: u64,
        operation: Operation,
        caller: &Caller,
    ) -> Result<Access> {
        let path = format!("records/{record_id}/access");
        let response: AccessResponse = self
            .get_json(
                &path,
                &[("operation", operation.as_str())],
                caller.authorization.as_deref(),
                || Error::RecordNotFound(format!("id = {record_id}")),
            )
            .await?;
        Ok(response.allowed.into())
    }

    async fn increase_popularity(&self, record_id: u64) -> Result<()> {
        let url = self.upstream.url(&format!("records/{record_id}/popularity"));
        let response = self.upstream.send(|client| client.post(&url), None).await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::UpstreamRequest(format!(
                "popularity update for {record_id} returned HTTP {status}"
            )))
        }
    }
}
