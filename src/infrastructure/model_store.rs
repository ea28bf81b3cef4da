use crate::application::features::outlier_normalizer::ClipBounds;
use crate::application::ml::classifier::TrainedClassifier;
use crate::application::ml::inference::ModelBundle;
use crate::application::ml::scaler::StandardScaler;
use crate::application::ml::training::TrainedModel;
use crate::domain::errors::ModelLoadError;
use crate::domain::ml::feature_registry::{FEATURE_COUNT, resolve_columns};
use crate::domain::ports::FeatureScaler;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const CLIP_BOUNDS_FILE: &str = "clip_bounds.json";

/// Model bundle persisted as JSON files in one directory.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads every artifact. Any missing or unreadable required file fails
    /// the whole load; the clip bounds file is optional.
    pub fn load(&self) -> Result<ModelBundle, ModelLoadError> {
        let classifier: TrainedClassifier = self.read_json(MODEL_FILE)?;
        let scaler: StandardScaler = self.read_json(SCALER_FILE)?;
        let names: Vec<String> = self.read_json(FEATURE_COLUMNS_FILE)?;

        let feature_columns =
            resolve_columns(&names).map_err(|name| ModelLoadError::UnknownFeatureColumn { name })?;
        if scaler.n_features() != feature_columns.len() {
            return Err(ModelLoadError::ShapeMismatch {
                scaler: scaler.n_features(),
                columns: feature_columns.len(),
            });
        }

        let clip_bounds = if self.dir.join(CLIP_BOUNDS_FILE).exists() {
            let bounds: ClipBounds = self.read_json(CLIP_BOUNDS_FILE)?;
            // A short vector would leave the trailing columns unclipped.
            if !bounds.is_complete() {
                return Err(ModelLoadError::CorruptArtifact {
                    path: self.dir.join(CLIP_BOUNDS_FILE),
                    reason: format!(
                        "clip bounds cover {} of {} feature columns",
                        bounds.column_count(),
                        FEATURE_COUNT
                    ),
                });
            }
            Some(bounds)
        } else {
            None
        };

        info!(
            "Loaded model bundle from {:?} ({} features, clip bounds: {})",
            self.dir,
            feature_columns.len(),
            if clip_bounds.is_some() { "frozen" } else { "none" }
        );
        Ok(ModelBundle {
            scaler: Box::new(scaler),
            classifier: Box::new(classifier),
            feature_columns,
            clip_bounds,
        })
    }

    pub fn save(&self, model: &TrainedModel) -> Result<(), ModelLoadError> {
        fs::create_dir_all(&self.dir).map_err(|e| ModelLoadError::WriteFailed {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;

        let names: Vec<&str> = model.feature_columns.iter().map(|f| f.name()).collect();
        self.write_json(MODEL_FILE, &model.classifier)?;
        self.write_json(SCALER_FILE, &model.scaler)?;
        self.write_json(FEATURE_COLUMNS_FILE, &names)?;
        match &model.clip_bounds {
            Some(bounds) => self.write_json(CLIP_BOUNDS_FILE, bounds)?,
            None => {
                // A stale file from an earlier run would otherwise be picked up.
                let stale = self.dir.join(CLIP_BOUNDS_FILE);
                if stale.exists() {
                    fs::remove_file(&stale).map_err(|e| ModelLoadError::WriteFailed {
                        path: stale,
                        reason: e.to_string(),
                    })?;
                }
            }
        }

        info!("Saved model bundle to {:?}", self.dir);
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T, ModelLoadError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Err(ModelLoadError::MissingArtifact { path });
        }
        let content = fs::read_to_string(&path).map_err(|e| ModelLoadError::CorruptArtifact {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ModelLoadError::CorruptArtifact {
            path,
            reason: e.to_string(),
        })
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), ModelLoadError> {
        let path = self.dir.join(file);
        let failed = |reason: String| ModelLoadError::WriteFailed {
            path: path.clone(),
            reason,
        };
        let content = serde_json::to_string(value).map_err(|e| failed(e.to_string()))?;

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(|e| failed(e.to_string()))?;
        fs::rename(&temp_path, &path).map_err(|e| failed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::classifier::SgdLogistic;
    use crate::domain::ml::feature_registry::Feature;
    use tempfile::tempdir;

    fn trained(columns: Vec<Feature>) -> TrainedModel {
        let width = columns.len();
        TrainedModel {
            scaler: StandardScaler {
                mean: vec![0.0; width],
                scale: vec![1.0; width],
            },
            classifier: TrainedClassifier::SgdLogistic(SgdLogistic::new(width)),
            feature_columns: columns,
            clip_bounds: None,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&trained(vec![Feature::Rsi, Feature::Macd])).unwrap();

        let bundle = store.load().unwrap();
        assert_eq!(bundle.feature_columns, vec![Feature::Rsi, Feature::Macd]);
        assert!(bundle.clip_bounds.is_none());
        // Untrained logistic model sits exactly on the decision boundary.
        assert_eq!(bundle.classifier.predict_proba(&[0.3, -0.2]).unwrap(), 0.5);
    }

    #[test]
    fn test_missing_artifact_is_reported() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&trained(vec![Feature::Rsi])).unwrap();
        fs::remove_file(dir.path().join(SCALER_FILE)).unwrap();

        match store.load() {
            Err(ModelLoadError::MissingArtifact { path }) => assert!(path.ends_with(SCALER_FILE)),
            other => panic!("expected missing artifact, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_column_and_shape_mismatch() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&trained(vec![Feature::Rsi])).unwrap();

        fs::write(dir.path().join(FEATURE_COLUMNS_FILE), r#"["rsi","macd"]"#).unwrap();
        assert!(matches!(
            store.load(),
            Err(ModelLoadError::ShapeMismatch { scaler: 1, columns: 2 })
        ));

        fs::write(dir.path().join(FEATURE_COLUMNS_FILE), r#"["sentiment"]"#).unwrap();
        assert!(matches!(
            store.load(),
            Err(ModelLoadError::UnknownFeatureColumn { .. })
        ));
    }

    #[test]
    fn test_short_clip_bounds_are_rejected() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&trained(vec![Feature::Rsi])).unwrap();
        fs::write(dir.path().join(CLIP_BOUNDS_FILE), r#"{"bounds":[[0.0,1.0]]}"#).unwrap();

        match store.load() {
            Err(ModelLoadError::CorruptArtifact { path, reason }) => {
                assert!(path.ends_with(CLIP_BOUNDS_FILE));
                assert!(reason.contains("1 of 27"));
            }
            other => panic!("expected corrupt clip bounds, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_corrupt_model_file() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&trained(vec![Feature::Rsi])).unwrap();
        fs::write(dir.path().join(MODEL_FILE), "{not json").unwrap();
        assert!(matches!(store.load(), Err(ModelLoadError::CorruptArtifact { .. })));
    }
}
