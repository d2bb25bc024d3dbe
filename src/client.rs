// 🌐 API client
// Blocking HTTP client the dashboard uses for the bulk fact fetch and for
// per-code description lookups.

use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::hierarchy::{DescriptionLookup, Level};
use crate::snapshot::{FactSource, RawCollection};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal shape of a dimension row, as returned by `/{endpoint}/?codigo=X`.
#[derive(Debug, Deserialize)]
struct DimensionRow {
    #[serde(default)]
    descricao: Option<String>,
}

/// Talks to the CNAE/ICMS REST API.
///
/// ```ignore
/// let client = ApiClient::new("http://127.0.0.1:8000/api/v1")?;
/// let snapshot = load_snapshot(&client)?;
/// let lookup = CachedLookup::new(client);
/// ```
pub struct ApiClient {
    base_url: String,
    http: HttpClient,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, LoadError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, LoadError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Transport {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/", self.base_url, endpoint)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LoadError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .map_err(|e| LoadError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().map_err(|e| LoadError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

impl FactSource for ApiClient {
    fn fetch_collections(&self) -> Result<Vec<RawCollection>, LoadError> {
        let url = self.endpoint_url("arrecadacao");
        debug!(%url, "fetching collection records");
        self.get_json(&url, &[])
    }
}

impl DescriptionLookup for ApiClient {
    fn describe(&self, level: Level, code: &str) -> Option<String> {
        let url = self.endpoint_url(level.endpoint());
        match self.get_json::<Vec<DimensionRow>>(&url, &[("codigo", code)]) {
            Ok(rows) => {
                let found = rows.into_iter().next().and_then(|row| row.descricao);
                if found.is_none() {
                    debug!(level = level.name(), code, "no description found");
                }
                found
            }
            Err(e) => {
                warn!(level = level.name(), code, error = %e, "description lookup failed");
                None
            }
        }
    }
}
