//! Raster sources and the in-memory raster store.
//!
//! Loading is the only I/O step before the solver run, so it is the only
//! async part of assembly besides the run itself.

use super::{GeoTransform, Raster};
use crate::errors::RasterLoadError;
use async_trait::async_trait;
use ndarray::Array2;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Loads rasters by path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Loads the raster stored at `path`.
    async fn load(&self, path: &str) -> Result<Raster, RasterLoadError>;
}

/// Loads a raster, failing with [`RasterLoadError::Timeout`] past the deadline.
///
/// # Errors
///
/// Returns the source's error, or a timeout.
pub async fn load_with_timeout(
    source: &dyn RasterSource,
    path: &str,
    timeout: Option<Duration>,
) -> Result<Raster, RasterLoadError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, source.load(path))
            .await
            .map_err(|_| RasterLoadError::Timeout {
                path: path.to_string(),
                timeout_ms: limit.as_millis(),
            })?,
        None => source.load(path).await,
    }
}

/// A source backed by rasters registered in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRasterSource {
    rasters: HashMap<String, Raster>,
}

impl InMemoryRasterSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raster under a path.
    #[must_use]
    pub fn with_raster(mut self, path: impl Into<String>, raster: Raster) -> Self {
        self.rasters.insert(path.into(), raster);
        self
    }
}

#[async_trait]
impl RasterSource for InMemoryRasterSource {
    async fn load(&self, path: &str) -> Result<Raster, RasterLoadError> {
        self.rasters
            .get(path)
            .cloned()
            .ok_or_else(|| RasterLoadError::NotFound { path: path.to_string() })
    }
}

/// Reads ESRI ASCII grids (`.asc`) from disk.
#[derive(Debug, Default, Clone)]
pub struct AsciiGridSource {
    root: Option<PathBuf>,
}

impl AsciiGridSource {
    /// Creates a source resolving paths as given.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

#[async_trait]
impl RasterSource for AsciiGridSource {
    async fn load(&self, path: &str) -> Result<Raster, RasterLoadError> {
        let full = self.resolve(path);
        let text = tokio::fs::read_to_string(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RasterLoadError::NotFound { path: path.to_string() }
            } else {
                RasterLoadError::Io {
                    path: path.to_string(),
                    source: e,
                }
            }
        })?;
        parse_ascii_grid(&text, path)
    }
}

/// Parses an ESRI ASCII grid.
///
/// Recognized headers: `ncols`, `nrows`, `xllcorner`/`xllcenter`,
/// `yllcorner`/`yllcenter`, `cellsize`, `nodata_value` (case-insensitive).
/// Data rows are listed from the top.
///
/// # Errors
///
/// Returns [`RasterLoadError::Malformed`] for missing headers or a value
/// count that does not match the declared shape.
pub fn parse_ascii_grid(text: &str, path: &str) -> Result<Raster, RasterLoadError> {
    let malformed = |message: String| RasterLoadError::Malformed {
        path: path.to_string(),
        message,
    };

    let mut headers: HashMap<String, f64> = HashMap::new();
    let mut tokens = text.split_whitespace().peekable();
    while let Some(token) = tokens.peek() {
        if token.parse::<f64>().is_ok() {
            break;
        }
        let key = token.to_ascii_lowercase();
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| malformed(format!("header '{key}' has no value")))?
            .parse::<f64>()
            .map_err(|e| malformed(format!("header '{key}': {e}")))?;
        headers.insert(key, value);
    }

    let header = |key: &str| {
        headers
            .get(key)
            .copied()
            .ok_or_else(|| malformed(format!("missing header '{key}'")))
    };
    let dimension = |key: &str| -> Result<usize, RasterLoadError> {
        let value = header(key)?;
        if !(value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX)) {
            return Err(malformed(format!("header '{key}' must be a positive whole number, got {value}")));
        }
        Ok(value as usize)
    };
    let ncols = dimension("ncols")?;
    let nrows = dimension("nrows")?;
    let expected = nrows
        .checked_mul(ncols)
        .ok_or_else(|| malformed(format!("grid of {nrows}x{ncols} cells is too large")))?;
    let cellsize = header("cellsize")?;

    let x_min = match (headers.get("xllcorner"), headers.get("xllcenter")) {
        (Some(x), _) => *x,
        (None, Some(x)) => x - cellsize / 2.0,
        (None, None) => return Err(malformed("missing header 'xllcorner'".to_string())),
    };
    let y_min = match (headers.get("yllcorner"), headers.get("yllcenter")) {
        (Some(y), _) => *y,
        (None, Some(y)) => y - cellsize / 2.0,
        (None, None) => return Err(malformed("missing header 'yllcorner'".to_string())),
    };

    let values = tokens
        .map(|t| t.parse::<f64>().map_err(|e| malformed(format!("bad value '{t}': {e}"))))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != expected {
        return Err(malformed(format!(
            "expected {expected} values for {nrows}x{ncols}, found {}",
            values.len()
        )));
    }

    let array = Array2::from_shape_vec((nrows, ncols), values).map_err(|e| malformed(e.to_string()))?;
    let transform = GeoTransform::north_up(x_min, y_min + nrows as f64 * cellsize, cellsize, cellsize);
    let mut raster = Raster::new(array, transform).map_err(|e| malformed(e.message))?;
    if let Some(nodata) = headers.get("nodata_value") {
        raster = raster.with_nodata(*nodata);
    }
    Ok(raster)
}

/// Rasters loaded into a model, keyed by the path stages refer to.
///
/// Each raster is digested on insert so that cached packages built from
/// different raster contents never collide.
#[derive(Debug, Default, Clone)]
pub struct RasterStore {
    rasters: HashMap<String, Arc<Raster>>,
    digests: BTreeMap<String, String>,
}

impl RasterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a raster.
    pub fn insert(&mut self, path: impl Into<String>, raster: Raster) {
        let path = path.into();
        self.digests.insert(path.clone(), digest_raster(&raster));
        self.rasters.insert(path, Arc::new(raster));
    }

    /// Looks up a raster.
    ///
    /// # Errors
    ///
    /// Returns [`RasterLoadError::NotLoaded`] if the path was never loaded.
    pub fn get(&self, path: &str) -> Result<Arc<Raster>, RasterLoadError> {
        self.rasters
            .get(path)
            .cloned()
            .ok_or_else(|| RasterLoadError::NotLoaded { path: path.to_string() })
    }

    /// Returns true if the path is loaded.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.rasters.contains_key(path)
    }

    /// Number of loaded rasters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rasters.len()
    }

    /// Returns true if nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }

    /// A digest over every loaded path and its raster contents.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, digest) in &self.digests {
            hasher.update(path.as_bytes());
            hasher.update([0]);
            hasher.update(digest.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn digest_raster(raster: &Raster) -> String {
    let mut hasher = Sha256::new();
    hasher.update((raster.nrows() as u64).to_le_bytes());
    hasher.update((raster.ncols() as u64).to_le_bytes());
    for c in raster.transform().coefficients() {
        hasher.update(c.to_le_bytes());
    }
    hasher.update(raster.nodata().unwrap_or(f64::NAN).to_le_bytes());
    hasher.update(raster.crs().map_or(0, |c| c.epsg()).to_le_bytes());
    for v in raster.values() {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ncols 3\nnrows 2\nxllcorner 100\nyllcorner 200\ncellsize 10\nNODATA_value -9999\n1 2 3\n4 -9999 6\n";

    #[test]
    fn test_parse_ascii_grid() {
        let raster = parse_ascii_grid(SAMPLE, "dem.asc").unwrap();
        assert_eq!((raster.nrows(), raster.ncols()), (2, 3));
        assert_eq!(raster.bounds(), (100.0, 200.0, 130.0, 220.0));
        assert_eq!(raster.value_at(0, 2), Some(3.0));
        assert_eq!(raster.value_at(1, 1), None);
    }

    #[test]
    fn test_parse_ascii_grid_center_registration() {
        let text = "ncols 1\nnrows 1\nxllcenter 5\nyllcenter 5\ncellsize 10\n7\n";
        let raster = parse_ascii_grid(text, "c.asc").unwrap();
        assert_eq!(raster.bounds(), (0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_parse_ascii_grid_wrong_count() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        let err = parse_ascii_grid(text, "bad.asc").unwrap_err();
        assert!(matches!(err, RasterLoadError::Malformed { .. }));
    }

    #[test]
    fn test_parse_ascii_grid_rejects_bad_dimensions() {
        for (ncols, nrows) in [("1e300", "2"), ("4294967295", "4294967295"), ("-3", "2"), ("2.5", "2"), ("0", "1")] {
            let text = format!("ncols {ncols}\nnrows {nrows}\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n");
            let err = parse_ascii_grid(&text, "huge.asc").unwrap_err();
            assert!(matches!(err, RasterLoadError::Malformed { .. }), "{ncols}x{nrows}: {err}");
        }
    }

    #[tokio::test]
    async fn test_ascii_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("dem.asc"), SAMPLE).await.unwrap();

        let source = AsciiGridSource::with_root(dir.path());
        let raster = source.load("dem.asc").await.unwrap();
        assert_eq!(raster.nodata(), Some(-9999.0));

        let missing = source.load("nope.asc").await.unwrap_err();
        assert!(matches!(missing, RasterLoadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let raster = Raster::uniform(1, 1, GeoTransform::north_up(0.0, 1.0, 1.0, 1.0), 3.0).unwrap();
        let source = InMemoryRasterSource::new().with_raster("top", raster.clone());
        assert_eq!(source.load("top").await.unwrap(), raster);
        assert!(source.load("other").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_with_timeout() {
        struct Slow;

        #[async_trait]
        impl RasterSource for Slow {
            async fn load(&self, _path: &str) -> Result<Raster, RasterLoadError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(RasterLoadError::NotFound { path: String::new() })
            }
        }

        let err = load_with_timeout(&Slow, "dem.asc", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, RasterLoadError::Timeout { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn test_mock_source_is_called_once_per_path() {
        let mut source = MockRasterSource::new();
        source
            .expect_load()
            .withf(|path| path == "dem.asc")
            .times(1)
            .returning(|_| Raster::uniform(1, 1, GeoTransform::north_up(0.0, 1.0, 1.0, 1.0), 1.0).map_err(|e| {
                RasterLoadError::Malformed { path: "dem.asc".to_string(), message: e.message }
            }));

        let raster = load_with_timeout(&source, "dem.asc", None).await.unwrap();
        assert_eq!(raster.value_at(0, 0), Some(1.0));
    }

    #[test]
    fn test_store_not_loaded() {
        let store = RasterStore::new();
        assert!(matches!(store.get("dem.asc"), Err(RasterLoadError::NotLoaded { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_contents() {
        let transform = GeoTransform::north_up(0.0, 10.0, 1.0, 1.0);
        let mut a = RasterStore::new();
        let mut b = RasterStore::new();
        assert_eq!(a.fingerprint(), b.fingerprint());

        a.insert("dem.asc", Raster::uniform(10, 10, transform, 1.0).unwrap());
        b.insert("dem.asc", Raster::uniform(10, 10, transform, 1.0).unwrap());
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.insert("dem.asc", Raster::uniform(10, 10, transform, 2.0).unwrap());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
