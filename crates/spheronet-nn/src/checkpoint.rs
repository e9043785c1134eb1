//! Checkpoint files: `model.ckpt-<step>.safetensors` in a checkpoint directory.
use crate::config::{CubedSphereConfig, CONFIG_FILE};
use crate::error::{ModelError, Result};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PREFIX: &str = "model.ckpt-";
const SUFFIX: &str = ".safetensors";

/// What to do when the requested checkpoint does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strictness {
    /// Fail with [`ModelError::CheckpointNotFound`].
    Strict,
    /// Warn and keep the freshly initialised weights.
    #[default]
    Lenient,
}

/// Which checkpoint to restore: `None` or `-1` mean the latest one.
pub fn requested_step(step: Option<i64>) -> Option<u64> {
    match step {
        Some(s) if s >= 0 => Some(s as u64),
        _ => None,
    }
}

pub fn checkpoint_path(dir: &Path, step: u64) -> PathBuf {
    dir.join(format!("{PREFIX}{step}{SUFFIX}"))
}

fn parse_step(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)?
        .parse()
        .ok()
}

/// All checkpoints in `dir`, ordered by step. A missing directory has none.
pub fn list_checkpoints(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(step) = parse_step(&path) {
            found.push((step, path));
        }
    }
    found.sort();
    Ok(found)
}

/// The checkpoint for `step`, or the latest one when `step` is `None`.
pub fn locate(dir: &Path, step: Option<u64>) -> Result<Option<(u64, PathBuf)>> {
    let mut found = list_checkpoints(dir)?;
    Ok(match step {
        Some(step) => found.into_iter().find(|(s, _)| *s == step),
        None => found.pop(),
    })
}

/// Write the parameters as `model.ckpt-<step>.safetensors` plus `config.json`.
pub fn save(varmap: &VarMap, config: &CubedSphereConfig, dir: &Path, step: u64) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = checkpoint_path(dir, step);
    varmap.save(&path)?;
    config.to_json(&dir.join(CONFIG_FILE))?;
    tracing::info!("saved checkpoint {}", path.display());
    Ok(path)
}

/// Load the requested checkpoint into `varmap`.
///
/// Returns the restored step, or `None` if no checkpoint was found and
/// `strictness` is lenient.
pub fn restore(
    varmap: &mut VarMap,
    dir: &Path,
    step: Option<u64>,
    strictness: Strictness,
) -> Result<Option<u64>> {
    match locate(dir, step)? {
        Some((found, path)) => {
            tracing::info!("restoring from {}", path.display());
            varmap.load(&path)?;
            Ok(Some(found))
        }
        None => match strictness {
            Strictness::Strict => Err(ModelError::CheckpointNotFound {
                dir: dir.to_path_buf(),
                step,
            }),
            Strictness::Lenient => {
                tracing::warn!(
                    "no checkpoint found in {}; continuing with randomly initialised weights",
                    dir.display()
                );
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CubedSphereModel;
    use candle_core::Device;
    use tempfile::TempDir;

    #[test]
    fn test_requested_step() {
        assert_eq!(requested_step(None), None);
        assert_eq!(requested_step(Some(-1)), None);
        assert_eq!(requested_step(Some(0)), Some(0));
        assert_eq!(requested_step(Some(500)), Some(500));
    }

    #[test]
    fn test_locate_latest() -> Result<()> {
        let dir = TempDir::new()?;
        for step in [10, 200, 30] {
            std::fs::write(checkpoint_path(dir.path(), step), b"")?;
        }
        std::fs::write(dir.path().join("model.ckpt-x.safetensors"), b"")?;
        std::fs::write(dir.path().join("notes.txt"), b"")?;

        let steps: Vec<u64> = list_checkpoints(dir.path())?.into_iter().map(|(s, _)| s).collect();
        assert_eq!(steps, [10, 30, 200]);
        assert_eq!(locate(dir.path(), None)?.map(|(s, _)| s), Some(200));
        assert_eq!(locate(dir.path(), Some(30))?.map(|(s, _)| s), Some(30));
        assert!(locate(dir.path(), Some(31))?.is_none());
        assert!(locate(&dir.path().join("missing"), None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_and_restore() -> Result<()> {
        let dir = TempDir::new()?;
        let config = CubedSphereConfig::tiny();
        let (saved, _) = CubedSphereModel::init(&config, &Device::Cpu, 1)?;
        save(&saved, &config, dir.path(), 7)?;
        assert!(dir.path().join(CONFIG_FILE).is_file());

        let (mut fresh, _) = CubedSphereModel::init(&config, &Device::Cpu, 2)?;
        let restored = restore(&mut fresh, dir.path(), None, Strictness::Strict)?;
        assert_eq!(restored, Some(7));

        let a = saved.data().lock().unwrap();
        let b = fresh.data().lock().unwrap();
        let lhs = a["fc1.weights"].as_tensor().flatten_all()?.to_vec1::<f32>()?;
        let rhs = b["fc1.weights"].as_tensor().flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(lhs, rhs);
        Ok(())
    }

    #[test]
    fn test_missing_checkpoint() -> Result<()> {
        let dir = TempDir::new()?;
        let (mut varmap, _) = CubedSphereModel::init(&CubedSphereConfig::tiny(), &Device::Cpu, 1)?;
        assert_eq!(
            restore(&mut varmap, dir.path(), None, Strictness::Lenient)?,
            None
        );
        assert!(matches!(
            restore(&mut varmap, dir.path(), Some(5), Strictness::Strict),
            Err(ModelError::CheckpointNotFound { step: Some(5), .. })
        ));
        Ok(())
    }
}
