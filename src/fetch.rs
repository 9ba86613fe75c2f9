//! Upstream CGM fetch client.
//!
//! Every roster account exposes a Nightscout-style REST endpoint. One poll
//! issues `GET {base}/api/v1/entries/sgv.json` with a date-floor filter and
//! decodes the JSON array body. Decoding is tolerant per element: a record
//! failing sgv or field coercion is dropped and counted, never failing the
//! whole batch. Account-level failures (connect, status, timeout, an
//! unparseable body) are returned as errors so the scheduler can skip just
//! that account.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Most entries one fetch may return (the upstream `count` cap).
pub const FETCH_COUNT: u32 = 300;

/// One element of the `sgv.json` response. Upstream sends many more fields
/// (`_id`, `device`, `direction`, `rssi`, ...); only the two the pipeline
/// consumes are kept, the rest are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SgvEntry {
    #[serde(rename = "dateString")]
    pub date_string: String,
    #[serde(deserialize_with = "deserialize_sgv")]
    pub sgv: i32,
}

/// Accept integer, float, or numeric-string forms of `sgv`. Uploaders are
/// not consistent about the JSON type; fractional values truncate toward
/// zero like the stored integer semantics.
fn deserialize_sgv<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    struct SgvVisitor;

    impl Visitor<'_> for SgvVisitor {
        type Value = i32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "an integer, float, or numeric string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<i32, E> {
            i32::try_from(v).map_err(|_| E::custom("sgv out of range"))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<i32, E> {
            i32::try_from(v).map_err(|_| E::custom("sgv out of range"))
        }

        #[allow(clippy::cast_possible_truncation)]
        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<i32, E> {
            if v.is_finite() && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&v) {
                Ok(v as i32)
            } else {
                Err(E::custom("sgv out of range"))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<i32, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom("non-numeric sgv string"))
        }
    }

    deserializer.deserialize_any(SgvVisitor)
}

/// Decoded result of one account fetch.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub entries: Vec<SgvEntry>,
    /// Array elements dropped by per-record decode failures.
    pub dropped: u64,
}

/// Decode a response body. The array itself failing to parse is a batch
/// error; individual bad elements are dropped and counted.
pub fn decode_entries(account: &str, body: &str) -> Result<Batch> {
    let values: Vec<Value> = serde_json::from_str(body)?;

    let mut batch = Batch {
        entries: Vec::with_capacity(values.len()),
        dropped: 0,
    };
    for value in values {
        match serde_json::from_value::<SgvEntry>(value) {
            Ok(entry) => batch.entries.push(entry),
            Err(e) => {
                batch.dropped += 1;
                warn!(account, error = %e, "dropping malformed entry");
            }
        }
    }
    Ok(batch)
}

/// Source of per-account reading batches. The scheduler polls through this
/// seam so tests can substitute canned sources for the HTTP client.
pub trait ReadingSource: Send + Sync + 'static {
    /// Fetch entries for one account with event dates on or after `since`.
    fn fetch(
        &self,
        account: &str,
        since: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Batch>> + Send;
}

/// HTTP client over the per-account upstream endpoints.
pub struct ReadingsClient {
    http: reqwest::Client,
    /// Base URL template with an `{account}` placeholder.
    base_template: String,
}

impl ReadingsClient {
    pub fn new(base_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_template: base_template.into(),
        })
    }

    /// Entries URL for one account, query string excluded.
    fn entries_url(&self, account: &str) -> String {
        let base = self.base_template.replace("{account}", account);
        format!("{base}/api/v1/entries/sgv.json")
    }
}

impl ReadingSource for ReadingsClient {
    async fn fetch(&self, account: &str, since: NaiveDate) -> Result<Batch> {
        let since = since.format("%Y-%m-%d").to_string();
        let count = FETCH_COUNT.to_string();

        let response = self
            .http
            .get(self.entries_url(account))
            .query(&[
                ("find[dateString][$gte]", since.as_str()),
                ("count", count.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status));
        }

        let body = response.text().await?;
        decode_entries(account, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SGV_JSON_3E;

    #[test]
    fn decodes_production_body() {
        let batch = decode_entries("alice", SGV_JSON_3E).unwrap();
        assert_eq!(batch.dropped, 0);
        assert_eq!(batch.entries.len(), 3);
        assert_eq!(batch.entries[0].sgv, 145);
        assert_eq!(batch.entries[0].date_string, "2023-08-25T08:53:00.000Z");
    }

    #[test]
    fn ignores_unknown_fields() {
        let body = r#"[{"dateString":"2023-08-25T08:53:00.000Z","sgv":110,"someFutureField":{"nested":true}}]"#;
        let batch = decode_entries("alice", body).unwrap();
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].sgv, 110);
    }

    #[test]
    fn coerces_string_and_float_sgv() {
        let body = r#"[
            {"dateString":"2023-08-25T08:00:00Z","sgv":"152"},
            {"dateString":"2023-08-25T08:05:00Z","sgv":88.7},
            {"dateString":"2023-08-25T08:10:00Z","sgv":101}
        ]"#;
        let batch = decode_entries("alice", body).unwrap();
        assert_eq!(batch.dropped, 0);
        let sgvs: Vec<i32> = batch.entries.iter().map(|e| e.sgv).collect();
        assert_eq!(sgvs, vec![152, 88, 101]);
    }

    #[test]
    fn drops_bad_records_keeps_good() {
        let body = r#"[
            {"dateString":"2023-08-25T08:00:00Z","sgv":"not a number"},
            {"dateString":"2023-08-25T08:05:00Z","sgv":120},
            {"dateString":"2023-08-25T08:10:00Z"},
            42
        ]"#;
        let batch = decode_entries("alice", body).unwrap();
        assert_eq!(batch.dropped, 3);
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].sgv, 120);
    }

    #[test]
    fn empty_array_is_not_an_error() {
        let batch = decode_entries("alice", "[]").unwrap();
        assert!(batch.entries.is_empty());
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn non_array_body_is_a_batch_error() {
        let err = decode_entries("alice", r#"{"status":"maintenance"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedBody(_)));
    }

    #[test]
    fn url_substitutes_account() {
        let client =
            ReadingsClient::new("https://{account}.herokuapp.com", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.entries_url("alice"),
            "https://alice.herokuapp.com/api/v1/entries/sgv.json"
        );

        let loopback =
            ReadingsClient::new("http://127.0.0.1:9/ns/{account}", Duration::from_secs(1)).unwrap();
        assert_eq!(
            loopback.entries_url("bob"),
            "http://127.0.0.1:9/ns/bob/api/v1/entries/sgv.json"
        );
    }
}
