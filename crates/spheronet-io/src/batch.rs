//! Mini-batches of residue grids and labels, drawn protein by protein.
use crate::error::{IoError, Result};
use crate::features::{discover, FeaturePair, FeatureStore, ProteinFeatures};
use candle_core::Tensor;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

/// Name of the grid sub-dataset.
pub const DATA: &str = "data";
/// Name of the label sub-dataset.
pub const MODEL_OUTPUT: &str = "model_output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        };
        f.write_str(name)
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "validation" | "val" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            other => Err(format!(
                "unknown split `{other}` (expected train, validation or test)"
            )),
        }
    }
}

/// Contiguous train / validation / test ranges over a sorted list of structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl Partition {
    pub fn range(&self, split: Split) -> Range<usize> {
        match split {
            Split::Train => self.train.clone(),
            Split::Validation => self.validation.clone(),
            Split::Test => self.test.clone(),
        }
    }
}

/// Split `len` items into `[0, train_end)`, `[train_end, validation_end)` and
/// `[validation_end, len)`.
///
/// `validation_end = floor(len * (1 - test_fraction))` and
/// `train_end = validation_end - validation_size`, clamped at zero.
pub fn partition(len: usize, test_fraction: f64, validation_size: usize) -> Result<Partition> {
    if !(0.0..=1.0).contains(&test_fraction) {
        return Err(IoError::InvalidFraction(test_fraction));
    }
    let validation_end = ((len as f64) * (1.0 - test_fraction)).floor() as usize;
    let validation_end = validation_end.min(len);
    let train_end = validation_end.saturating_sub(validation_size);
    Ok(Partition {
        train: 0..train_end,
        validation: train_end..validation_end,
        test: validation_end..len,
    })
}

/// One mini-batch: `data` is `(n, 6, R, X, Y, C)`, `model_output` is `(n, 21)`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub data: Tensor,
    pub model_output: Tensor,
}

impl Batch {
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        match name {
            DATA => Ok(&self.data),
            MODEL_OUTPUT => Ok(&self.model_output),
            other => Err(IoError::UnknownDataset(other.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.data.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Streams residues from a list of structures, one structure in memory at a time.
///
/// Structures are visited in list order, or in a seeded per-epoch shuffle. When
/// the last residue of the last structure is consumed a new epoch starts and the
/// batch continues from the first structure.
#[derive(Debug)]
pub struct BatchFactory {
    pairs: Vec<FeaturePair>,
    sizes: Vec<usize>,
    grid_shape: Option<Vec<usize>>,
    shuffle_seed: Option<u64>,
    order: Vec<usize>,
    epoch: usize,
    cursor: usize,
    offset: usize,
    cached: Option<(usize, FeatureStore)>,
}

impl BatchFactory {
    /// `grid_shape` is the per-residue `(6, R, X, Y, C)` shape every file must have.
    pub fn new(pairs: Vec<FeaturePair>, grid_shape: Option<&[usize]>) -> Result<Self> {
        let sizes = pairs
            .iter()
            .map(|pair| ProteinFeatures::read(&pair.protein).map(|p| p.len()))
            .collect::<Result<Vec<_>>>()?;
        if sizes.iter().sum::<usize>() == 0 {
            return Err(IoError::EmptyDataset);
        }
        let order = (0..pairs.len()).collect();
        Ok(Self {
            pairs,
            sizes,
            grid_shape: grid_shape.map(<[usize]>::to_vec),
            shuffle_seed: None,
            order,
            epoch: 0,
            cursor: 0,
            offset: 0,
            cached: None,
        })
    }

    /// Every structure in `dir`.
    pub fn from_dir(dir: &Path, grid_shape: Option<&[usize]>) -> Result<Self> {
        Self::new(discover(dir)?, grid_shape)
    }

    /// The structures of one split of `dir`, see [`partition`].
    pub fn from_split(
        dir: &Path,
        grid_shape: Option<&[usize]>,
        test_fraction: f64,
        validation_size: usize,
        split: Split,
    ) -> Result<Self> {
        let pairs = discover(dir)?;
        let range = partition(pairs.len(), test_fraction, validation_size)?.range(split);
        tracing::info!(
            "{split} split: structures {}..{} of {}",
            range.start,
            range.end,
            pairs.len()
        );
        Self::new(pairs[range].to_vec(), grid_shape)
    }

    /// Shuffle the structure order at the start of every epoch.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self.order = self.epoch_order(self.epoch);
        self
    }

    pub fn pairs(&self) -> &[FeaturePair] {
        &self.pairs
    }

    /// Total number of residues.
    pub fn data_size(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Number of completed passes over the data.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.pairs.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    fn store(&mut self, index: usize) -> Result<&FeatureStore> {
        let hit = matches!(&self.cached, Some((cached, _)) if *cached == index);
        if !hit {
            let pair = &self.pairs[index];
            tracing::trace!("loading features of {}", pair.id);
            let store = FeatureStore::load(pair, self.grid_shape.as_deref())?;
            self.cached = Some((index, store));
        }
        match &self.cached {
            Some((_, store)) => Ok(store),
            None => Err(IoError::EmptyDataset),
        }
    }

    fn advance(&mut self) {
        self.offset = 0;
        self.cursor += 1;
        if self.cursor == self.order.len() {
            self.cursor = 0;
            self.epoch += 1;
            self.order = self.epoch_order(self.epoch);
            tracing::debug!("starting epoch {}", self.epoch);
        }
    }

    /// The next `size` residues (at least one), wrapping into the next epoch if needed.
    pub fn next_batch(&mut self, size: usize) -> Result<Batch> {
        let mut remaining = size.max(1);
        let mut data = Vec::new();
        let mut labels = Vec::new();
        while remaining > 0 {
            let index = self.order[self.cursor];
            let offset = self.offset;
            let available = self.sizes[index].saturating_sub(offset);
            let take = available.min(remaining);
            if take > 0 {
                let store = self.store(index)?;
                data.push(store.grids.rows(offset, take)?);
                labels.push(store.protein.labels().narrow(0, offset, take)?);
            }
            remaining -= take;
            self.offset += take;
            if self.offset >= self.sizes[index] {
                self.advance();
            }
        }
        Ok(Batch {
            data: Tensor::cat(&data, 0)?,
            model_output: Tensor::cat(&labels, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spheronet_core::{AminoAcid, NUM_CLASSES};
    use spheronet_test_data::{FeatureDir, SMALL_GRID};

    #[test]
    fn test_partition_bounds() -> Result<()> {
        let p = partition(100, 0.25, 10)?;
        assert_eq!(p.train, 0..65);
        assert_eq!(p.validation, 65..75);
        assert_eq!(p.test, 75..100);

        let p = partition(5, 0.5, 10)?;
        assert_eq!(p.train, 0..0);
        assert_eq!(p.validation, 0..2);
        assert_eq!(p.test, 2..5);

        let p = partition(0, 0.25, 10)?;
        assert!(p.train.is_empty() && p.validation.is_empty() && p.test.is_empty());
        Ok(())
    }

    #[test]
    fn test_partition_exhaustive_and_pure() -> Result<()> {
        for len in 0..40 {
            for fraction in [0.0, 0.1, 0.25, 0.5, 0.9, 1.0] {
                for validation in [0, 1, 3, 50] {
                    let p = partition(len, fraction, validation)?;
                    assert_eq!(p.train.start, 0);
                    assert_eq!(p.train.end, p.validation.start);
                    assert_eq!(p.validation.end, p.test.start);
                    assert_eq!(p.test.end, len);
                    assert_eq!(p, partition(len, fraction, validation)?);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_partition_rejects_fraction() {
        assert!(matches!(
            partition(10, 1.5, 0),
            Err(IoError::InvalidFraction(_))
        ));
        assert!(partition(10, -0.1, 0).is_err());
        assert!(partition(10, f64::NAN, 0).is_err());
    }

    #[test]
    fn test_split_parse() {
        assert_eq!("test".parse::<Split>(), Ok(Split::Test));
        assert_eq!("Validation".parse::<Split>(), Ok(Split::Validation));
        assert!("holdout".parse::<Split>().is_err());
        assert_eq!(Split::Train.to_string(), "train");
    }

    #[test]
    fn test_scalar_batch_is_empty() -> Result<()> {
        let scalar = Tensor::new(0f32, &candle_core::Device::Cpu)?;
        let batch = Batch {
            data: scalar.clone(),
            model_output: scalar,
        };
        assert_eq!(batch.len(), 0);
        assert!(batch.is_empty());
        Ok(())
    }

    #[test]
    fn test_batches_wrap_around() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .protein("1abc", "ACD")
            .protein("2xyz", "EF")
            .create_temp()?;
        let mut factory = BatchFactory::from_dir(&dir, Some(&SMALL_GRID[..]))?;
        assert_eq!(factory.data_size(), 5);

        let first = factory.next_batch(4)?;
        assert_eq!(first.len(), 4);
        assert_eq!(first.get(DATA)?.dims(), &[4, 6, 4, 3, 3, 2]);
        assert_eq!(first.get(MODEL_OUTPUT)?.dims(), &[4, NUM_CLASSES]);
        assert!(first.get("labels").is_err());

        let second = factory.next_batch(3)?;
        assert_eq!(factory.epoch(), 1);
        let residues: Vec<AminoAcid> = second
            .model_output
            .to_vec2::<f32>()?
            .iter()
            .map(|row| AminoAcid::from_one_hot(row))
            .collect();
        assert_eq!(
            residues,
            [AminoAcid::PHE, AminoAcid::ALA, AminoAcid::CYS]
        );
        Ok(())
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .protein("1aaa", "A")
            .protein("1ccc", "C")
            .protein("1ddd", "D")
            .protein("1eee", "E")
            .protein("1fff", "F")
            .create_temp()?;
        let draw = |seed: u64| -> Result<Vec<f32>> {
            let mut factory = BatchFactory::from_dir(&dir, None)?.with_shuffle(seed);
            let batch = factory.next_batch(10)?;
            Ok(batch.model_output.argmax(1)?.to_dtype(candle_core::DType::F32)?.to_vec1()?)
        };
        assert_eq!(draw(7)?, draw(7)?);
        Ok(())
    }

    #[test]
    fn test_from_split() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .protein("1aaa", "AA")
            .protein("1bbb", "CC")
            .protein("1ccc", "DD")
            .protein("1ddd", "EE")
            .create_temp()?;
        let test = BatchFactory::from_split(&dir, None, 0.25, 1, Split::Test)?;
        let ids: Vec<_> = test.pairs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["1ddd"]);
        let train = BatchFactory::from_split(&dir, None, 0.25, 1, Split::Train)?;
        assert_eq!(train.pairs().len(), 2);
        Ok(())
    }
}
