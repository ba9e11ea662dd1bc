//! Read-only resources shared by all workers: geometry tables and the run
//! registry.

use crate::error::{Error, Result};
use g4post_algorithms::{GeometryTable, Polycone, Run, RunRegistry, RunTable, Usability, Volume};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Boundary surface used when a module does not name one.
pub const DEFAULT_SURFACE: &str = "dl";

// Geometry file schema: { "<id>": { name, center, surface_mesh: { "<surface>": { r, z } } } }
#[derive(Deserialize)]
struct JsonVolume {
    #[serde(default)]
    name: Option<String>,
    center: [f64; 3],
    surface_mesh: HashMap<String, JsonSurface>,
}

#[derive(Deserialize)]
struct JsonSurface {
    r: Vec<f64>,
    z: Vec<f64>,
}

/// Loads a geometry table, using the named surface of every volume as its boundary.
///
/// # Errors
/// Returns [`Error::Resource`] when the file cannot be read or a volume is malformed.
pub fn load_geometry(path: &Path, surface: &str) -> Result<GeometryTable> {
    let file = File::open(path).map_err(|e| Error::resource(path, e.to_string()))?;
    let volumes: HashMap<String, JsonVolume> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::resource(path, e.to_string()))?;
    geometry_from_volumes(path, volumes, surface)
}

/// Parses a geometry table from a JSON string.
///
/// # Errors
/// Returns [`Error::Resource`] when the document is malformed.
pub fn geometry_from_json(json: &str, surface: &str) -> Result<GeometryTable> {
    let volumes: HashMap<String, JsonVolume> =
        serde_json::from_str(json).map_err(|e| Error::resource("<inline>", e.to_string()))?;
    geometry_from_volumes(Path::new("<inline>"), volumes, surface)
}

fn geometry_from_volumes(
    path: &Path,
    volumes: HashMap<String, JsonVolume>,
    surface: &str,
) -> Result<GeometryTable> {
    let mut table = GeometryTable::new();
    for (key, mut volume) in volumes {
        let id: i64 = key
            .trim()
            .parse()
            .map_err(|_| Error::resource(path, format!("volume key `{key}` is not an integer id")))?;
        let mesh = volume.surface_mesh.remove(surface).ok_or_else(|| {
            Error::resource(path, format!("volume {id} has no surface `{surface}`"))
        })?;
        if mesh.r.len() != mesh.z.len() {
            return Err(Error::resource(
                path,
                format!(
                    "volume {id}: surface `{surface}` has {} r and {} z values",
                    mesh.r.len(),
                    mesh.z.len()
                ),
            ));
        }
        if mesh.r.len() < 3 {
            return Err(Error::resource(
                path,
                format!("volume {id}: surface `{surface}` needs at least three points"),
            ));
        }
        table.insert(
            id,
            Volume {
                name: volume.name,
                center: volume.center,
                boundary: Polycone::new(mesh.r, mesh.z),
            },
        );
    }
    Ok(table)
}

// Run registry schema.
#[derive(Deserialize)]
struct JsonRegistry {
    detectors: Vec<JsonDetector>,
    runs: Vec<JsonRun>,
}

#[derive(Deserialize)]
struct JsonDetector {
    name: String,
    string: i64,
    position: i64,
}

#[derive(Deserialize)]
struct JsonRun {
    period: String,
    run: String,
    livetime_in_s: f64,
    #[serde(default)]
    usability: HashMap<String, String>,
}

/// Loads the detector map and run list used by `detector_active_time`.
///
/// # Errors
/// Returns [`Error::Resource`] when the file cannot be read, lists no runs,
/// has no positive livetime, or uses an unknown usability value.
pub fn load_run_registry(path: &Path) -> Result<RunTable> {
    let file = File::open(path).map_err(|e| Error::resource(path, e.to_string()))?;
    let registry: JsonRegistry = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::resource(path, e.to_string()))?;
    registry_from_json(path, registry)
}

/// Parses a run registry from a JSON string.
///
/// # Errors
/// See [`load_run_registry`].
pub fn run_registry_from_json(json: &str) -> Result<RunTable> {
    let registry: JsonRegistry =
        serde_json::from_str(json).map_err(|e| Error::resource("<inline>", e.to_string()))?;
    registry_from_json(Path::new("<inline>"), registry)
}

fn registry_from_json(path: &Path, registry: JsonRegistry) -> Result<RunTable> {
    if registry.runs.is_empty() {
        return Err(Error::resource(path, "run registry lists no runs"));
    }
    let total: f64 = registry.runs.iter().map(|run| run.livetime_in_s).sum();
    if total <= 0.0 || registry.runs.iter().any(|run| run.livetime_in_s < 0.0) {
        return Err(Error::resource(path, "run livetimes must be non-negative with a positive total"));
    }

    let mut runs = Vec::with_capacity(registry.runs.len());
    for run in registry.runs {
        let mut usability = HashMap::with_capacity(run.usability.len());
        for (channel, status) in run.usability {
            let status = Usability::from_name(&status).ok_or_else(|| {
                Error::resource(
                    path,
                    format!("run {}/{}: unknown usability `{status}` for {channel}", run.period, run.run),
                )
            })?;
            usability.insert(channel, status);
        }
        runs.push(Run {
            period: run.period,
            run: run.run,
            livetime_in_s: run.livetime_in_s,
            usability,
        });
    }

    let detectors = registry
        .detectors
        .into_iter()
        .map(|d| (d.name, d.string, d.position));
    Ok(RunTable::new(detectors, runs))
}

/// Shared, read-only resources handed to every pipeline run.
///
/// Geometry tables are loaded on first use and cached by path and surface
/// for the lifetime of the value.
#[derive(Default)]
pub struct Resources {
    geometry: Mutex<HashMap<(PathBuf, String), Arc<GeometryTable>>>,
    registry: Option<Arc<dyn RunRegistry>>,
}

impl Resources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the run registry used by `detector_active_time`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RunRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn registry(&self) -> Option<&dyn RunRegistry> {
        self.registry.as_deref()
    }

    /// Geometry table for `path`, loading it on first request.
    ///
    /// # Errors
    /// Returns [`Error::Resource`] when the table cannot be loaded.
    pub fn geometry(&self, path: &Path, surface: &str) -> Result<Arc<GeometryTable>> {
        let key = (path.to_path_buf(), surface.to_string());
        let mut cache = self.geometry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = cache.get(&key) {
            return Ok(Arc::clone(table));
        }
        log::debug!("loading geometry {} (surface {surface})", path.display());
        let table = Arc::new(load_geometry(path, surface)?);
        cache.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Places an already built table in the cache.
    pub fn insert_geometry(&self, path: impl Into<PathBuf>, surface: &str, table: GeometryTable) {
        self.geometry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((path.into(), surface.to_string()), Arc::new(table));
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.geometry.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("Resources")
            .field("cached_geometries", &cached)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GEOMETRY: &str = r#"{
        "1": {
            "name": "tmp1",
            "center": [0, 0, 0],
            "surface_mesh": {
                "orig": {"r": [0, 1, 1, 0], "z": [-1, -1, 1, 1]},
                "dl": {"r": [0, 0.9, 0.9, 0], "z": [-0.9, -0.9, 0.9, 0.9]}
            }
        },
        "2": {
            "name": "tmp2",
            "center": [10, 10, 10],
            "surface_mesh": {
                "orig": {"r": [0, 1, 1, 0], "z": [-1, -1, 1, 1]},
                "dl": {"r": [0, 0.9, 0.9, 0], "z": [-0.9, -0.9, 0.9, 0.9]}
            }
        }
    }"#;

    #[test]
    fn test_geometry_surfaces() {
        let dl = geometry_from_json(GEOMETRY, "dl").unwrap();
        assert_eq!(dl.len(), 2);
        assert!(dl.contains(1, 0.5, 0.5, 0.5));
        assert!(!dl.contains(2, 0.5, 0.5, 0.5));
        assert!(!dl.contains(1, 0.0, 0.0, 0.95));

        let orig = geometry_from_json(GEOMETRY, "orig").unwrap();
        assert!(orig.contains(1, 0.0, 0.0, 0.95));
        assert!(geometry_from_json(GEOMETRY, "outer").is_err());
    }

    #[test]
    fn test_geometry_rejects_bad_keys() {
        let json = r#"{"det": {"center": [0, 0, 0], "surface_mesh": {}}}"#;
        assert!(matches!(
            geometry_from_json(json, "dl"),
            Err(Error::Resource { .. })
        ));
    }

    #[test]
    fn test_geometry_cache() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GEOMETRY.as_bytes()).unwrap();

        let resources = Resources::new();
        let first = resources.geometry(file.path(), "dl").unwrap();
        let second = resources.geometry(file.path(), "dl").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(resources.geometry(Path::new("/nonexistent/geometry.json"), "dl").is_err());
    }

    #[test]
    fn test_run_registry() {
        let json = r#"{
            "detectors": [{"name": "V01", "string": 1, "position": 1}],
            "runs": [
                {"period": "p03", "run": "r000", "livetime_in_s": 1.0, "usability": {"V01": "on"}},
                {"period": "p03", "run": "r001", "livetime_in_s": 3.0, "usability": {"V01": "off"}}
            ]
        }"#;
        let table = run_registry_from_json(json).unwrap();
        assert_eq!(table.channel_name(1_010_101), Some("V01"));
        assert_eq!(table.usability(0.1, "V01"), Some(Usability::On));
        assert_eq!(table.usability(0.5, "V01"), Some(Usability::Off));

        let bad = json.replace("\"off\"", "\"broken\"");
        assert!(run_registry_from_json(&bad).is_err());
        assert!(run_registry_from_json(r#"{"detectors": [], "runs": []}"#).is_err());
    }
}
