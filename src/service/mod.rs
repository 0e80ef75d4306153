//! The four dataset read operations and their cache-aside flow.
//!
//! Every operation follows the same template: derive the cache key, check the
//! store, and on a miss fetch the page, parse its bordered table, post-filter
//! if the endpoint calls for it, write the result back with the endpoint's
//! TTL, and return it. Cache faults are logged and absorbed — a broken store
//! downgrades the service to fetch-every-time, it never fails a request.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::DseUrls;
use crate::error::DseError;
use crate::fetch;
use crate::parse::{self, Dataset, BORDERED_BODY_ROWS, BORDERED_ROWS};

const LATEST_KEY: &str = "latest_stock_data";
const TOP30_KEY: &str = "top30_stock_data";

const LATEST_TTL: Duration = Duration::from_secs(300);
const DSEX_TTL: Duration = Duration::from_secs(600);
const TOP30_TTL: Duration = Duration::from_secs(600);
const HISTORICAL_TTL: Duration = Duration::from_secs(3600);

/// Instrument code sent upstream when the caller does not name one.
pub const DEFAULT_INSTRUMENT: &str = "All Instrument";

/// Scraping client for the exchange's public pages.
///
/// Holds the shared upstream HTTP client, the injected cache store and the
/// per-endpoint URLs. One instance serves all requests; operations share no
/// mutable state, so concurrent calls only contend on the wire.
pub struct DseClient {
    http: Client,
    cache: Arc<dyn CacheStore>,
    urls: DseUrls,
}

impl DseClient {
    pub fn new(urls: DseUrls, cache: Arc<dyn CacheStore>) -> Result<Self, DseError> {
        Ok(Self {
            http: fetch::build_client()?,
            cache,
            urls,
        })
    }

    /// Latest share-price snapshot. Cached for five minutes.
    pub async fn latest(&self) -> Result<Dataset, DseError> {
        if let Some(hit) = self.cached(LATEST_KEY).await {
            return Ok(hit);
        }
        debug!("fetching fresh latest share prices");
        let data = self
            .scrape(&self.urls.latest, &[], BORDERED_ROWS, true)
            .await?;
        self.store(LATEST_KEY, &data, LATEST_TTL).await;
        Ok(data)
    }

    /// DSEX index data, optionally narrowed to one trading symbol by
    /// case-insensitive exact match on the `Symbol` column. An upstream
    /// failure degrades to an empty dataset instead of an error. Cached for
    /// ten minutes per symbol.
    pub async fn dsex(&self, symbol: Option<&str>) -> Result<Dataset, DseError> {
        let symbol = symbol.filter(|s| !s.is_empty());
        let key = format!("dsex_data_{}", symbol.unwrap_or("all"));
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        debug!("fetching fresh DSEX data");
        let mut data = match self.scrape(&self.urls.dsex, &[], BORDERED_ROWS, true).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "DSEX fetch failed; serving empty dataset");
                return Ok(Vec::new());
            }
        };
        if let Some(symbol) = symbol {
            data.retain(|record| {
                record
                    .get("Symbol")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
            });
        }
        self.store(&key, &data, DSEX_TTL).await;
        Ok(data)
    }

    /// The DS30 blue-chip snapshot. An upstream failure degrades to an empty
    /// dataset instead of an error. Cached for ten minutes.
    pub async fn top30(&self) -> Result<Dataset, DseError> {
        if let Some(hit) = self.cached(TOP30_KEY).await {
            return Ok(hit);
        }
        debug!("fetching fresh top 30 data");
        let data = match self.scrape(&self.urls.top30, &[], BORDERED_ROWS, true).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "top 30 fetch failed; serving empty dataset");
                return Ok(Vec::new());
            }
        };
        self.store(TOP30_KEY, &data, TOP30_TTL).await;
        Ok(data)
    }

    /// Day-end archive rows for an inclusive date range, optionally narrowed
    /// to one instrument code. Both dates must be `YYYY-MM-DD` with
    /// `start <= end`; validation runs before any network traffic. Cached
    /// for an hour per distinct query.
    pub async fn historical(
        &self,
        start: &str,
        end: &str,
        inst: Option<&str>,
    ) -> Result<Dataset, DseError> {
        validate_range(start, end)?;
        let inst = inst.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_INSTRUMENT);
        let key = format!("hist_{start}_{end}_{inst}");
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        debug!(start = %start, end = %end, inst = %inst, "fetching fresh historical data");
        let params = [
            ("startDate", start),
            ("endDate", end),
            ("inst", inst),
            ("archive", "data"),
        ];
        let data = self
            .scrape(&self.urls.historical, &params, BORDERED_BODY_ROWS, false)
            .await?;
        self.store(&key, &data, HISTORICAL_TTL).await;
        Ok(data)
    }

    async fn scrape(
        &self,
        url: &str,
        params: &[(&str, &str)],
        row_selector: &str,
        skip_first: bool,
    ) -> Result<Dataset, DseError> {
        let body = fetch::fetch_page(&self.http, url, params).await?;
        Ok(parse::parse_table(&body, row_selector, skip_first))
    }

    /// Cache lookup. Store faults and undecodable entries count as a miss.
    async fn cached(&self, key: &str) -> Option<Dataset> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(data) => {
                    debug!(key = %key, "cache hit");
                    Some(data)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "malformed cache entry; refetching");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed; continuing without cache");
                None
            }
        }
    }

    /// Best-effort cache write; a failure is logged and the response still
    /// goes out uncached.
    async fn store(&self, key: &str, data: &Dataset, ttl: Duration) {
        let raw = match serde_json::to_string(data) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize dataset for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &raw, ttl).await {
            warn!(key = %key, error = %e, "cache write failed; serving uncached");
        }
    }
}

fn valid_day(s: &str) -> Result<NaiveDate, DseError> {
    // The archive endpoint wants zero-padded dates, so the shape check is
    // stricter than what chrono alone would accept.
    let shape = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date shape regex should be valid");
    if !shape.is_match(s) {
        return Err(DseError::Date(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| DseError::Date(s.to_string()))
}

fn validate_range(start: &str, end: &str) -> Result<(), DseError> {
    let from = valid_day(start)?;
    let to = valid_day(end)?;
    if from > to {
        return Err(DseError::DateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use warp::Filter;

    const MARKET_PAGE: &str = r#"<html><body>
        <table class="table table-bordered">
            <tr><th>Symbol</th><th>LTP</th><th>Change</th><th>Volume</th></tr>
            <tr><td>ACI</td><td>310.5</td><td>+2.1</td><td>1,234,567</td></tr>
            <tr><td>aci</td><td>12</td><td>-0.4</td><td>9,000</td></tr>
            <tr><td>BATBC</td><td>450</td><td>-1</td><td>52,100</td></tr>
        </table>
    </body></html>"#;

    const ARCHIVE_PAGE: &str = r#"<html><body>
        <table class="table table-bordered">
            <thead><tr><th>DATE</th><th>TRADING CODE</th><th>CLOSEP*</th><th>VOLUME</th></tr></thead>
            <tbody>
                <tr><td>2024-01-02</td><td>ACI</td><td>305.4</td><td>1,050,000</td></tr>
                <tr><td>2024-01-03</td><td>ACI</td><td>310.5</td><td>980,250</td></tr>
            </tbody>
        </table>
    </body></html>"#;

    /// Ephemeral upstream serving `page` on every path, counting hits.
    fn upstream(page: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        serve_with_status(page, StatusCode::OK)
    }

    fn serve_with_status(
        page: &'static str,
        status: StatusCode,
    ) -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let route = warp::any().map(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            warp::reply::with_status(warp::reply::html(page), status)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, hits)
    }

    fn urls_for(addr: SocketAddr) -> DseUrls {
        let base = format!("http://{addr}");
        DseUrls {
            latest: format!("{base}/latest"),
            dsex: format!("{base}/dsex"),
            top30: format!("{base}/top30"),
            historical: format!("{base}/historical"),
        }
    }

    fn client_with(addr: SocketAddr, cache: Arc<dyn CacheStore>) -> DseClient {
        DseClient::new(urls_for(addr), cache).unwrap()
    }

    /// Store double that records every write's key and TTL.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: Mutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl CacheStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), ttl.as_secs()));
            self.inner.set(key, value, ttl).await
        }
    }

    /// Store double whose every operation fails.
    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("cache offline"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(anyhow::anyhow!("cache offline"))
        }
    }

    #[tokio::test]
    async fn latest_parses_and_serves_the_second_call_from_cache() {
        let (addr, hits) = upstream(MARKET_PAGE);
        let client = client_with(addr, Arc::new(MemoryStore::new()));

        let first = client.latest().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0]["Symbol"], "ACI");
        assert_eq!(first[0]["Volume"], "1234567");

        let second = client.latest().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "cache hit must skip upstream");
    }

    #[tokio::test]
    async fn malformed_cache_entry_counts_as_a_miss() {
        let (addr, hits) = upstream(MARKET_PAGE);
        let store = Arc::new(MemoryStore::new());
        store
            .set("latest_stock_data", "{definitely not json", Duration::from_secs(300))
            .await
            .unwrap();

        let client = client_with(addr, store);
        let data = client.latest().await.unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_cache_store_never_fails_a_read() {
        let (addr, hits) = upstream(MARKET_PAGE);
        let client = client_with(addr, Arc::new(FailingStore));

        assert_eq!(client.latest().await.unwrap().len(), 3);
        assert_eq!(client.latest().await.unwrap().len(), 3);
        // Nothing could be cached, so both calls went upstream.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dsex_filters_symbols_case_insensitively() {
        let (addr, _) = upstream(MARKET_PAGE);
        let client = client_with(addr, Arc::new(MemoryStore::new()));

        let filtered = client.dsex(Some("aci")).await.unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .iter()
            .all(|r| r["Symbol"].as_str().unwrap().eq_ignore_ascii_case("ACI")));

        let all = client.dsex(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn dsex_caches_the_filtered_dataset_under_the_symbol_key() {
        let (addr, _) = upstream(MARKET_PAGE);
        let store = Arc::new(RecordingStore::default());
        let client = client_with(addr, store.clone());

        client.dsex(Some("BATBC")).await.unwrap();

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "dsex_data_BATBC");
        drop(writes);

        let cached = store.inner.get("dsex_data_BATBC").await.unwrap().unwrap();
        let parsed: Dataset = serde_json::from_str(&cached).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["Symbol"], "BATBC");
    }

    #[tokio::test]
    async fn empty_symbol_means_no_filter() {
        let (addr, _) = upstream(MARKET_PAGE);
        let store = Arc::new(RecordingStore::default());
        let client = client_with(addr, store.clone());

        let data = client.dsex(Some("")).await.unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(store.writes.lock().unwrap()[0].0, "dsex_data_all");
    }

    #[tokio::test]
    async fn dsex_and_top30_degrade_to_empty_on_upstream_failure() {
        let (addr, _) = serve_with_status("boom", StatusCode::INTERNAL_SERVER_ERROR);
        let store = Arc::new(RecordingStore::default());
        let client = client_with(addr, store.clone());

        assert!(client.dsex(None).await.unwrap().is_empty());
        assert!(client.top30().await.unwrap().is_empty());
        // Failures are served, not cached.
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_and_historical_propagate_upstream_failure() {
        let (addr, _) = serve_with_status("boom", StatusCode::INTERNAL_SERVER_ERROR);
        let client = client_with(addr, Arc::new(MemoryStore::new()));

        match client.latest().await.unwrap_err() {
            DseError::Status { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("expected status error, got {other}"),
        }
        assert!(matches!(
            client.historical("2024-01-01", "2024-01-31", None).await,
            Err(DseError::Status { .. })
        ));
    }

    #[tokio::test]
    async fn historical_rejects_bad_dates_before_any_fetch() {
        let (addr, hits) = upstream(ARCHIVE_PAGE);
        let client = client_with(addr, Arc::new(MemoryStore::new()));

        assert!(matches!(
            client.historical("2024-02-02", "2024-01-01", None).await,
            Err(DseError::DateRange { .. })
        ));
        for bad in ["01-01-2024", "2024-1-2", "2024-02-31", "yesterday"] {
            assert!(matches!(
                client.historical(bad, "2024-03-01", None).await,
                Err(DseError::Date(_))
            ));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0, "validation must precede fetch");
    }

    #[tokio::test]
    async fn historical_sends_the_archive_query_parameters() {
        let captured: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let seen = captured.clone();
        let route = warp::query::raw().map(move |q: String| {
            *seen.lock().unwrap() = q;
            warp::reply::html(ARCHIVE_PAGE)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let client = client_with(addr, Arc::new(MemoryStore::new()));
        let data = client
            .historical("2024-01-01", "2024-03-31", None)
            .await
            .unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["DATE"], "2024-01-02");
        assert_eq!(data[0]["VOLUME"], "1050000");

        let query = captured.lock().unwrap().clone();
        for expected in [
            "startDate=2024-01-01",
            "endDate=2024-03-31",
            "inst=All+Instrument",
            "archive=data",
        ] {
            assert!(query.contains(expected), "missing {expected} in {query}");
        }
    }

    #[tokio::test]
    async fn each_operation_writes_with_its_own_ttl() {
        let (addr, _) = upstream(MARKET_PAGE);
        let store = Arc::new(RecordingStore::default());
        let client = client_with(addr, store.clone());

        client.latest().await.unwrap();
        client.dsex(None).await.unwrap();
        client.top30().await.unwrap();
        client
            .historical("2024-01-01", "2024-03-31", Some("ACI"))
            .await
            .unwrap();

        let writes = store.writes.lock().unwrap();
        let recorded: Vec<(&str, u64)> = writes.iter().map(|(k, t)| (k.as_str(), *t)).collect();
        assert_eq!(
            recorded,
            vec![
                ("latest_stock_data", 300),
                ("dsex_data_all", 600),
                ("top30_stock_data", 600),
                ("hist_2024-01-01_2024-03-31_ACI", 3600),
            ]
        );
    }
}
