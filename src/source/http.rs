//! Sensor API data source.
//!
//! Talks to a JSON sensor API with cursor pagination: every list endpoint
//! answers `{ "results": [...], "next_cursor": "..." }` and the last page
//! omits `next_cursor`. Items that fail to parse are skipped and logged;
//! a page without `results` is a malformed payload.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::{newest_ascending, DataSource};
use crate::error::FetchError;
use crate::models::{RawThresholds, Reading, Sensor};

// ---

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: Url,
    max_pages: u32,
}

impl HttpSource {
    // ---
    pub fn new(base_url: impl AsRef<str>, max_pages: u32) -> Result<Self, FetchError> {
        // ---
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw)
            .map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(format!("{raw}: not a base url")));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            max_pages,
        })
    }

    /// Endpoint under the base url. Each segment is percent-encoded, so a
    /// sensor id containing `/`, `?` or `#` stays one path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        // ---
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Walk every page of a list endpoint, up to `max_pages`.
    async fn fetch_pages<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FetchError> {
        // ---
        let url = self.endpoint(segments);
        let path = url.path().to_string();
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_count = 0;

        loop {
            if page_count >= self.max_pages {
                debug!(
                    max_pages = self.max_pages,
                    fetched = items.len(),
                    "hit page limit, stopping pagination"
                );
                break;
            }
            page_count += 1;

            let mut request = self.client.get(url.clone()).query(query);
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor)]);
            }

            let response: JsonValue = request.send().await?.error_for_status()?.json().await?;

            let Some(results) = response.get("results").and_then(|r| r.as_array()) else {
                return Err(FetchError::Payload(format!(
                    "{path} page {page_count}: missing 'results' array"
                )));
            };

            for (i, item) in results.iter().enumerate() {
                match serde_json::from_value::<T>(item.clone()) {
                    Ok(parsed) => items.push(parsed),
                    Err(e) => {
                        debug!(
                            page = page_count,
                            item = i,
                            error = %e,
                            raw = %item,
                            "skipping unparseable item"
                        );
                    }
                }
            }

            cursor = response
                .get("next_cursor")
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(String::from);

            if cursor.is_none() {
                break;
            }
        }

        debug!(%path, pages = page_count, items = items.len(), "finished paginated fetch");
        Ok(items)
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl DataSource for HttpSource {
    // ---
    async fn fetch_sensors(&self, farm_id: Option<&str>) -> Result<Vec<Sensor>, FetchError> {
        // ---
        let query: Vec<(&str, String)> = farm_id
            .map(|id| vec![("farm_id", id.to_string())])
            .unwrap_or_default();

        let sensors: Vec<Sensor> = self.fetch_pages(&["sensors"], &query).await?;
        info!(count = sensors.len(), "fetched sensors from api");
        Ok(sensors)
    }

    async fn fetch_thresholds(&self, sensor_id: &str) -> Result<RawThresholds, FetchError> {
        // ---
        let url = self.endpoint(&["sensors", sensor_id, "thresholds"]);
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RawThresholds::default());
        }

        let body: JsonValue = response.error_for_status()?.json().await?;
        Ok(RawThresholds::from_json(&body))
    }

    async fn fetch_readings(
        &self,
        sensor_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Reading>, FetchError> {
        // ---
        let mut query = vec![
            ("sensor_ids", sensor_ids.join(",")),
            ("since", rfc3339(since)),
            ("limit", limit.to_string()),
        ];
        if let Some(until) = until {
            query.push(("until", rfc3339(until)));
        }

        let readings: Vec<Reading> = self.fetch_pages(&["readings"], &query).await?;

        // The api is not trusted to honour the bounds.
        let in_range = readings
            .into_iter()
            .filter(|r| r.timestamp >= since && until.map_or(true, |u| r.timestamp <= u))
            .collect();
        Ok(newest_ascending(in_range, limit))
    }

    fn source_name(&self) -> &str {
        "sensor-api"
    }
}
