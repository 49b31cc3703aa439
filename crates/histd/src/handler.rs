//! Request logic, independent of the HTTP layer

use chrono::{DateTime, Utc};
use histstore::{Cell, GridSpec, ScanOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::session::{Session, SessionRegistry};

/// Query string of `/hist`
#[derive(Debug, Default, Deserialize)]
pub struct HistQuery {
    pub token: Option<String>,
    pub ieta: Option<String>,
    pub iphi: Option<String>,
}

/// Query string carrying only a token
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistInfo {
    pub entries: i64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistPayload {
    pub found: bool,
    pub ieta: i32,
    pub iphi: i32,
    pub key: String,
    pub title: String,
    pub counts: Vec<f64>,
    pub edges: Vec<f64>,
    pub underflow: f64,
    pub overflow: f64,
    pub info: HistInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingCell {
    pub found: bool,
    pub ieta: i32,
    pub iphi: i32,
}

/// Body of a `/hist` answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistResponse {
    Found(Box<HistPayload>),
    Missing(MissingCell),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub ieta: i32,
    pub iphi: i32,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheView {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub evictions: u64,
    pub decoded_bins: u64,
    pub hit_ratio: f64,
}

/// Everything the grid page and `/session` show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSummary {
    pub token: String,
    pub file: String,
    pub upload_name: String,
    pub n_ieta: u32,
    pub n_iphi: u32,
    pub ieta_min: i32,
    pub iphi_min: i32,
    pub order: String,
    pub histograms: usize,
    pub matched: usize,
    pub strategy: String,
    pub created_at: DateTime<Utc>,
    pub cache: CacheView,
}

fn int_field<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, String> {
    match fields.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| format!("{} must be an integer, got '{}'", name, value)),
    }
}

/// Build the grid for an upload; blank fields take the server defaults
pub fn parse_grid(
    fields: &HashMap<String, String>,
    defaults: &GridSpec,
) -> Result<GridSpec, String> {
    let n_ieta = int_field(fields, "n_ieta", defaults.n_ieta)?;
    let n_iphi = int_field(fields, "n_iphi", defaults.n_iphi)?;
    let ieta_min = int_field(fields, "ieta_min", defaults.ieta_min)?;
    let iphi_min = int_field(fields, "iphi_min", defaults.iphi_min)?;
    let order = match fields.get("order").map(|v| v.trim()) {
        None | Some("") => defaults.order,
        Some(value) => value.parse::<ScanOrder>().map_err(|e| e.to_string())?,
    };

    GridSpec::new(n_ieta, n_iphi, ieta_min, iphi_min, order).map_err(|e| e.to_string())
}

/// Open, index and register an uploaded container
pub fn open_session(
    registry: &SessionRegistry,
    token: String,
    path: &Path,
    upload_name: String,
    grid: GridSpec,
    cache_capacity: usize,
) -> histstore::Result<Arc<Session>> {
    let session = registry.insert(Session::open(
        token,
        path,
        upload_name,
        grid,
        cache_capacity,
    )?);

    info!(
        token = %session.token,
        upload = %session.upload_name,
        histograms = session.cache.file().histogram_keys().len(),
        strategy = %session.index.strategy(),
        matched = session.index.len(),
        sessions = registry.len(),
        "Indexed upload"
    );

    Ok(session)
}

pub fn session_or_404(
    registry: &SessionRegistry,
    token: Option<&str>,
) -> Result<Arc<Session>, ApiError> {
    token
        .and_then(|token| registry.get(token))
        .ok_or_else(ApiError::unknown_session)
}

fn parse_coord(value: Option<&str>) -> Result<i32, ApiError> {
    value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .ok_or_else(|| ApiError::bad_request("ieta and iphi must be ints"))
}

/// Resolve a cell to its histogram. Blocks on a cache miss.
pub fn lookup_hist(
    registry: &SessionRegistry,
    query: &HistQuery,
) -> Result<HistResponse, ApiError> {
    let session = session_or_404(registry, query.token.as_deref())?;
    let ieta = parse_coord(query.ieta.as_deref())?;
    let iphi = parse_coord(query.iphi.as_deref())?;

    let Some(key) = session.index.get(Cell::new(ieta, iphi)) else {
        debug!(token = %session.token, ieta, iphi, "Cell not mapped");
        return Ok(HistResponse::Missing(MissingCell {
            found: false,
            ieta,
            iphi,
        }));
    };

    let entry = session
        .cache
        .get(key)
        .map_err(|e| ApiError::internal(format!("Failed to read histogram: {}", e)))?;

    Ok(HistResponse::Found(Box::new(HistPayload {
        found: true,
        ieta,
        iphi,
        key: entry.key.clone(),
        title: entry.histogram.title.clone(),
        counts: entry.histogram.counts.clone(),
        edges: entry.histogram.edges.clone(),
        underflow: entry.histogram.underflow,
        overflow: entry.histogram.overflow,
        info: HistInfo {
            entries: entry.stats.entries,
            mean: entry.stats.mean,
            std: entry.stats.std,
        },
    })))
}

/// All mapped cells of a session
pub fn list_cells(session: &Session) -> Vec<CellView> {
    session
        .index
        .iter()
        .map(|(cell, key)| CellView {
            ieta: cell.ieta,
            iphi: cell.iphi,
            key: key.to_string(),
        })
        .collect()
}

pub fn summarize(session: &Session) -> GridSummary {
    let stats = session.cache.stats().snapshot();
    GridSummary {
        token: session.token.clone(),
        file: session.stored_name(),
        upload_name: session.upload_name.clone(),
        n_ieta: session.grid.n_ieta,
        n_iphi: session.grid.n_iphi,
        ieta_min: session.grid.ieta_min,
        iphi_min: session.grid.iphi_min,
        order: session.grid.order.to_string(),
        histograms: session.cache.file().histogram_keys().len(),
        matched: session.index.len(),
        strategy: session.index.strategy().to_string(),
        created_at: session.created_at,
        cache: CacheView {
            len: session.cache.cache_len(),
            capacity: session.cache.capacity(),
            hits: stats.hits,
            misses: stats.misses,
            failures: stats.failures,
            evictions: stats.evictions,
            decoded_bins: stats.decoded_bins,
            hit_ratio: stats.hit_ratio,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use histstore::{ContainerWriter, Histogram};
    use tempfile::TempDir;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn query(token: &str, ieta: &str, iphi: &str) -> HistQuery {
        HistQuery {
            token: Some(token.to_string()),
            ieta: Some(ieta.to_string()),
            iphi: Some(iphi.to_string()),
        }
    }

    fn named_session(dir: &TempDir, registry: &SessionRegistry) -> String {
        let path = dir.path().join("named.hgrid");
        let mut writer = ContainerWriter::new();
        writer
            .add_histogram(
                "hcal/h_ieta-3_iphi7",
                &Histogram::uniform("energy", 0.0, 3.0, vec![1.0, 2.0, 1.0]).unwrap(),
            )
            .unwrap();
        writer.add_object("hcal/meta", b"run 42").unwrap();
        writer.finish(&path).unwrap();

        let token = SessionRegistry::new_token();
        open_session(
            registry,
            token.clone(),
            &path,
            "named.hgrid".to_string(),
            GridSpec::default(),
            4,
        )
        .unwrap();
        token
    }

    #[test]
    fn test_parse_grid_defaults() {
        let grid = parse_grid(&fields(&[("n_ieta", ""), ("order", "")]), &GridSpec::default())
            .unwrap();
        assert_eq!(grid, GridSpec::default());
    }

    #[test]
    fn test_parse_grid_values() {
        let grid = parse_grid(
            &fields(&[
                ("n_ieta", "4"),
                ("n_iphi", " 8 "),
                ("ieta_min", "-2"),
                ("iphi_min", "1"),
                ("order", "iphi-major"),
            ]),
            &GridSpec::default(),
        )
        .unwrap();

        assert_eq!(grid.n_ieta, 4);
        assert_eq!(grid.n_iphi, 8);
        assert_eq!(grid.ieta_min, -2);
        assert_eq!(grid.iphi_min, 1);
        assert_eq!(grid.order, ScanOrder::IphiMajor);
    }

    #[test]
    fn test_parse_grid_errors() {
        let defaults = GridSpec::default();

        let err = parse_grid(&fields(&[("n_ieta", "abc")]), &defaults).unwrap_err();
        assert!(err.contains("n_ieta must be an integer"));

        assert!(parse_grid(&fields(&[("n_iphi", "-4")]), &defaults).is_err());
        assert!(parse_grid(&fields(&[("n_iphi", "0")]), &defaults).is_err());
        assert!(parse_grid(&fields(&[("order", "spiral")]), &defaults).is_err());
    }

    #[test]
    fn test_lookup_found() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let token = named_session(&dir, &registry);

        let response = lookup_hist(&registry, &query(&token, "-3", "7")).unwrap();
        let HistResponse::Found(payload) = response else {
            panic!("expected a histogram");
        };
        assert_eq!(payload.key, "hcal/h_ieta-3_iphi7;1");
        assert_eq!(payload.counts, vec![1.0, 2.0, 1.0]);
        assert_eq!(payload.edges.len(), 4);
        assert_eq!(payload.info.entries, 4);
        assert_eq!(payload.info.mean, Some(1.5));
    }

    #[test]
    fn test_lookup_uses_cache() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let token = named_session(&dir, &registry);

        lookup_hist(&registry, &query(&token, "-3", "7")).unwrap();
        lookup_hist(&registry, &query(&token, "-3", "7")).unwrap();

        let session = registry.get(&token).unwrap();
        assert_eq!(session.cache.stats().misses(), 1);
        assert_eq!(session.cache.stats().hits(), 1);
    }

    #[test]
    fn test_lookup_missing_cell() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let token = named_session(&dir, &registry);

        let response = lookup_hist(&registry, &query(&token, "0", "0")).unwrap();
        assert_eq!(
            response,
            HistResponse::Missing(MissingCell {
                found: false,
                ieta: 0,
                iphi: 0
            })
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"found": false, "ieta": 0, "iphi": 0}));
    }

    #[test]
    fn test_lookup_errors() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let token = named_session(&dir, &registry);

        let err = lookup_hist(&registry, &query("nope", "1", "1")).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = lookup_hist(&registry, &HistQuery::default()).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = lookup_hist(&registry, &query(&token, "x", "1")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "ieta and iphi must be ints");

        let mut missing_iphi = query(&token, "1", "1");
        missing_iphi.iphi = None;
        let err = lookup_hist(&registry, &missing_iphi).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_found_json_shape() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new();
        let token = named_session(&dir, &registry);

        let response = lookup_hist(&registry, &query(&token, "-3", "7")).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["found"], true);
        assert_eq!(json["ieta"], -3);
        assert_eq!(json["info"]["entries"], 4);
        assert!(json["counts"].is_array());
    }

    #[test]
    fn test_empty_histogram_has_null_stats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.hgrid");
        let mut writer = ContainerWriter::new();
        writer
            .add_histogram(
                "ieta0_iphi0",
                &Histogram::uniform("e", 0.0, 2.0, vec![0.0, 0.0]).unwrap(),
            )
            .unwrap();
        writer.finish(&path).unwrap();

        let registry = SessionRegistry::new();
        let token = SessionRegistry::new_token();
        open_session(&registry, token.clone(), &path, "e".to_string(), GridSpec::default(), 4)
            .unwrap();

        let json = serde_json::to_value(lookup_hist(&registry, &query(&token, "0", "0")).unwrap())
            .unwrap();
        assert_eq!(json["info"]["entries"], 0);
        assert!(json["info"]["mean"].is_null());
        assert!(json["info"]["std"].is_null());
    }

    #[test]
    fn test_positional_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.hgrid");
        let hist = Histogram::uniform("h", 0.0, 1.0, vec![1.0]).unwrap();
        let mut writer = ContainerWriter::new();
        for i in 0..5 {
            writer.add_histogram(&format!("channel{}", i), &hist).unwrap();
        }
        writer.finish(&path).unwrap();

        let registry = SessionRegistry::new();
        let token = SessionRegistry::new_token();
        let grid = GridSpec::new(2, 2, 10, 1, ScanOrder::IphiMajor).unwrap();
        let session =
            open_session(&registry, token.clone(), &path, "plain".to_string(), grid, 4).unwrap();

        let cells = list_cells(&session);
        assert_eq!(cells.len(), 4);
        assert_eq!(session.index.get(Cell::new(11, 1)), Some("channel1;1"));

        let summary = summarize(&session);
        assert_eq!(summary.strategy, "by-position");
        assert_eq!(summary.histograms, 5);
        assert_eq!(summary.matched, 4);
        assert_eq!(summary.order, "iphi-major");
        assert_eq!(summary.file, "plain.hgrid");
    }
}
