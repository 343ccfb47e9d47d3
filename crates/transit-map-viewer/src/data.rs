//! Static dataset files
//!
//! The data directory holds one folder per system plus a `config` folder. Every
//! file is optional: a missing file only leaves its system (or its labels)
//! empty. Traditional route geometry is not read up front; [`FsGeometrySource`]
//! reads a route's folder when the route is first shown.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use transit_map_lib::traditional::{assemble, line_candidates, stop_candidates};
use transit_map_lib::{
    GeometrySource, MapError, Result, SystemInputs, TraditionalDefinition, TraditionalGeometry,
};

/// Folder of per-route traditional geometry, relative to the data directory
const TRADITIONAL_DIR: &str = "transporte";

/// Layout of the data directory
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Geometry source over the traditional route folders
    pub fn geometry_source(&self) -> FsGeometrySource {
        FsGeometrySource::new(self.root.join(TRADITIONAL_DIR))
    }

    /// Read every dataset concurrently
    ///
    /// Fails only when the directory itself cannot be read.
    pub async fn read_inputs(&self) -> Result<SystemInputs> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(MapError::MissingData(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let path = |rel: &str| self.root.join(rel);
        let (
            trunk,
            trunk_macros,
            feeders,
            corridors,
            metro,
            route_map,
            catalog,
            metadata_csv,
            extremes,
            corridor_types,
        ) = futures::join!(
            read_optional(path("metropolitano/metropolitano.json")),
            read_optional(path("metropolitano/macros.json")),
            read_optional(path("metropolitano/alimentadores.geojson")),
            read_optional(path("corredores/corredores.geojson")),
            read_optional(path("metro/metro.json")),
            read_optional(path("transporte/routes.json")),
            read_optional(path("config/catalog.json")),
            read_optional(path("config/lista_rutas.csv")),
            read_optional(path("config/wr_extremes.json")),
            read_optional(path("config/lista_corredores.json")),
        );

        let inputs = SystemInputs {
            trunk,
            trunk_macros,
            feeders,
            corridors,
            metro,
            route_map,
            catalog,
            metadata_csv,
            extremes,
            corridor_types,
        };
        tracing::info!("Read datasets from {}", self.root.display());
        Ok(inputs)
    }
}

/// File contents, or `None` when missing or unreadable
async fn read_optional(path: PathBuf) -> Option<String> {
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Dataset {} not found", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

/// First file of `names` present in `folder`
async fn read_first(folder: &Path, names: &[String]) -> Result<Option<String>> {
    for name in names {
        match tokio::fs::read_to_string(folder.join(name)).await {
            Ok(text) => return Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Reads traditional route geometry from `<root>/<folder>/`
#[derive(Debug, Clone)]
pub struct FsGeometrySource {
    root: PathBuf,
}

impl FsGeometrySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GeometrySource for FsGeometrySource {
    fn fetch(&self, definition: &TraditionalDefinition) -> BoxFuture<'static, Result<TraditionalGeometry>> {
        let folder = self.root.join(&definition.folder);
        let id = definition.id.clone();
        let trip = definition.trip;
        async move {
            let line = read_first(&folder, &line_candidates(trip)).await?;
            let stops = read_first(&folder, &stop_candidates(trip)).await?;
            tracing::debug!(
                "Read geometry of {} (line: {}, stops: {})",
                id,
                line.is_some(),
                stops.is_some()
            );
            assemble(&id, line.as_deref(), stops.as_deref(), trip)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_map_lib::Trip;

    /// Fresh scratch directory under the system temp dir
    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("transit-map-viewer-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn definition(folder: &str, trip: Option<Trip>) -> TraditionalDefinition {
        TraditionalDefinition {
            id: "1244-IDA".to_string(),
            folder: folder.to_string(),
            name: String::new(),
            color: None,
            trip,
        }
    }

    #[tokio::test]
    async fn test_read_inputs_skips_missing_files() {
        let root = scratch("inputs");
        write(&root, "metro/metro.json", r#"{"lines": []}"#);
        write(&root, "config/lista_rutas.csv", "codigo_nuevo\n1244\n");

        let inputs = DataDir::new(&root).read_inputs().await.unwrap();
        assert_eq!(inputs.metro.as_deref(), Some(r#"{"lines": []}"#));
        assert!(inputs.metadata_csv.is_some());
        assert!(inputs.trunk.is_none());
        assert!(inputs.route_map.is_none());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let root = std::env::temp_dir().join("transit-map-viewer-does-not-exist");
        assert!(DataDir::new(root).read_inputs().await.is_err());
    }

    #[tokio::test]
    async fn test_geometry_prefers_trip_file() {
        let root = scratch("geometry");
        let track = |lon: f64| {
            format!(
                r#"{{"type": "FeatureCollection", "features": [{{"type": "Feature", "properties": {{}},
                   "geometry": {{"type": "LineString", "coordinates": [[{lon}, -12.0], [{lon}, -12.1]]}}}}]}}"#
            )
        };
        write(&root, "1244/route_track.geojson", &track(-77.0));
        write(&root, "1244/route_track_trip1.geojson", &track(-77.5));

        let source = FsGeometrySource::new(&root);
        let geometry = source.fetch(&definition("1244", Some(Trip::Outbound))).await.unwrap();
        assert_eq!(geometry.lines.len(), 1);
        assert_eq!(geometry.lines[0].0[0].x, -77.5);
        assert!(geometry.stops.is_empty());

        let generic = source.fetch(&definition("1244", None)).await.unwrap();
        assert_eq!(generic.lines[0].0[0].x, -77.0);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_empty_folder_fails_build() {
        let root = scratch("empty");
        std::fs::create_dir_all(root.join("ET01")).unwrap();
        let source = DataDir::new(&root).geometry_source();
        let err = source.fetch(&definition("ET01", None)).await.unwrap_err();
        assert!(matches!(err, MapError::MissingData(_)));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
