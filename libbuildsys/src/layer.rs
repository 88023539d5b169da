//! Managed layer directories and the rebuild-versus-reuse decision.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Layer availability flags, as persisted in the layer content metadata file.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct LayerTypes {
    /// Whether the layer is intended for launch.
    #[serde(default)]
    pub launch: bool,

    /// Whether the layer is intended for build.
    #[serde(default)]
    pub build: bool,

    /// Whether the layer is cached across builds.
    #[serde(default)]
    pub cache: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LayerContentMetadata {
    #[serde(default)]
    types: LayerTypes,

    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<toml::Table>,
}

/// A managed, persistent directory plus the metadata that was restored for it.
///
/// `metadata` is `None` for a layer that was never contributed (or whose
/// restored metadata file was empty or unreadable).
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub layers_dir: PathBuf,
    pub types: LayerTypes,
    pub metadata: Option<toml::Table>,
}

impl Layer {
    /// The directory this layer owns on disk.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.layers_dir.join(&self.name)
    }

    fn content_metadata_path(&self) -> PathBuf {
        self.layers_dir.join(format!("{}.toml", self.name))
    }
}

/// The root directory holding all layers contributed by this buildpack.
#[derive(Debug, Clone)]
pub struct Layers {
    pub path: PathBuf,
}

impl Layers {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Hands out the named layer, creating its directory and reading any
    /// previously restored content metadata.
    ///
    /// A missing, empty or malformed metadata file yields a layer with no
    /// metadata, so the next contribution rebuilds it and re-persists a clean
    /// file instead of aborting on stale cache state.
    pub fn layer(&self, name: &str) -> Result<Layer, LayerError> {
        let layer_dir = self.path.join(name);
        fs::create_dir_all(layer_dir)?;

        let content_metadata_path = self.path.join(format!("{name}.toml"));
        let content_metadata = if content_metadata_path.is_file() {
            let contents = fs::read_to_string(&content_metadata_path)?;
            toml::from_str::<LayerContentMetadata>(&contents).unwrap_or_default()
        } else {
            LayerContentMetadata::default()
        };

        Ok(Layer {
            name: String::from(name),
            layers_dir: self.path.clone(),
            types: content_metadata.types,
            metadata: content_metadata.metadata,
        })
    }
}

/// Decides whether a previously persisted layer can be reused verbatim or must
/// be rebuilt.
///
/// The content identity of a layer is its expected metadata table: everything
/// that would change the build output must be part of it. Identical metadata
/// across builds never re-triggers a rebuild.
#[derive(Debug, Clone)]
pub struct LayerContributor {
    pub expected_metadata: toml::Table,
    pub expected_types: LayerTypes,
}

impl LayerContributor {
    #[must_use]
    pub fn new(expected_metadata: toml::Table, expected_types: LayerTypes) -> Self {
        Self {
            expected_metadata,
            expected_types,
        }
    }

    /// Returns the layer untouched if its persisted identity equals the
    /// expected one, otherwise invokes `build` and persists the new identity
    /// alongside the returned layer's types.
    ///
    /// On reuse, the expected types are written back to disk regardless: the
    /// lifecycle strips the cache flag from restored layers, so it has to be
    /// re-asserted on every build.
    ///
    /// Nothing is persisted when `build` fails, leaving the prior identity (or
    /// its absence) in place so the next contribution rebuilds again.
    pub fn contribute<E, F>(&self, layer: Layer, build: F) -> Result<Layer, E>
    where
        F: FnOnce(Layer) -> Result<Layer, E>,
        E: From<LayerError>,
    {
        if layer.metadata.as_ref() == Some(&self.expected_metadata) {
            let layer = Layer {
                types: self.expected_types,
                ..layer
            };
            persist(&layer)?;
            return Ok(layer);
        }

        let layer = build(layer)?;
        let layer = Layer {
            metadata: Some(self.expected_metadata.clone()),
            ..layer
        };
        persist(&layer)?;
        Ok(layer)
    }
}

fn persist(layer: &Layer) -> Result<(), LayerError> {
    let content_metadata = LayerContentMetadata {
        types: layer.types,
        metadata: layer.metadata.clone(),
    };

    let toml_string = toml::to_string(&content_metadata).map_err(LayerError::Serialize)?;
    fs::write(layer.content_metadata_path(), toml_string)?;

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("Couldn't serialize layer content metadata: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Unexpected I/O error while handling layer: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn command_metadata(command: &str) -> toml::Table {
        let mut metadata = toml::Table::new();
        metadata.insert(
            String::from("command"),
            toml::Value::String(String::from(command)),
        );
        metadata
    }

    #[test]
    fn fresh_layer_has_no_metadata() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());

        let layer = layers.layer("build").unwrap();

        assert!(layer.path().is_dir());
        assert_eq!(layer.metadata, None);
        assert_eq!(layer.types, LayerTypes::default());
    }

    #[test]
    fn restored_metadata_round_trips() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());

        let contributor = LayerContributor::new(
            command_metadata("gradle"),
            LayerTypes {
                cache: true,
                ..LayerTypes::default()
            },
        );

        let layer = layers.layer("build").unwrap();
        let layer = contributor
            .contribute::<LayerError, _>(layer, Ok)
            .unwrap();
        assert_eq!(layer.metadata, Some(command_metadata("gradle")));

        let restored = layers.layer("build").unwrap();
        assert_eq!(restored.metadata, Some(command_metadata("gradle")));
        assert!(restored.types.cache);
    }

    #[test]
    fn equal_identity_skips_rebuild() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());
        let types = LayerTypes {
            cache: true,
            ..LayerTypes::default()
        };
        let contributor = LayerContributor::new(command_metadata("gradle"), types);

        let layer = layers.layer("build").unwrap();
        let mut build_count = 0;
        let layer = contributor
            .contribute::<LayerError, _>(layer, |layer| {
                build_count += 1;
                Ok(layer)
            })
            .unwrap();
        assert_eq!(build_count, 1);

        let layer = layers.layer(&layer.name).unwrap();
        let layer = contributor
            .contribute::<LayerError, _>(layer, |layer| {
                build_count += 1;
                Ok(layer)
            })
            .unwrap();

        assert_eq!(build_count, 1);
        assert!(layer.types.cache);
        assert_eq!(layer.metadata, Some(command_metadata("gradle")));
    }

    #[test]
    fn changed_identity_rebuilds() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());
        let types = LayerTypes::default();

        let layer = layers.layer("build").unwrap();
        LayerContributor::new(command_metadata("gradle"), types)
            .contribute::<LayerError, _>(layer, Ok)
            .unwrap();

        let layer = layers.layer("build").unwrap();
        let mut rebuilt = false;
        LayerContributor::new(command_metadata("maven"), types)
            .contribute::<LayerError, _>(layer, |layer| {
                rebuilt = true;
                Ok(layer)
            })
            .unwrap();

        assert!(rebuilt);
    }

    #[test]
    fn build_failure_persists_nothing() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());
        let contributor =
            LayerContributor::new(command_metadata("gradle"), LayerTypes::default());

        let layer = layers.layer("build").unwrap();
        let result = contributor.contribute(layer, |_| {
            Err(LayerError::Io(std::io::Error::other("build exploded")))
        });
        assert!(result.is_err());

        let restored = layers.layer("build").unwrap();
        assert_eq!(restored.metadata, None);
        assert!(!restored.types.cache);
    }

    #[test]
    fn malformed_metadata_forces_rebuild() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());

        fs::create_dir_all(temp_dir.path().join("build")).unwrap();
        fs::write(temp_dir.path().join("build.toml"), "[types\ncache = true").unwrap();

        let layer = layers.layer("build").unwrap();
        assert_eq!(layer.metadata, None);

        let mut rebuilt = false;
        LayerContributor::new(command_metadata("gradle"), LayerTypes::default())
            .contribute::<LayerError, _>(layer, |layer| {
                rebuilt = true;
                Ok(layer)
            })
            .unwrap();
        assert!(rebuilt);
    }

    #[test]
    fn empty_metadata_file_is_never_contributed() {
        let temp_dir = tempdir().unwrap();
        let layers = Layers::new(temp_dir.path());

        fs::create_dir_all(temp_dir.path().join("build")).unwrap();
        fs::write(temp_dir.path().join("build.toml"), "").unwrap();

        let layer = layers.layer("build").unwrap();
        assert_eq!(layer.metadata, None);
    }
}
