//! Typed view of the precomputed feature files.
//!
//! Every structure `<id>` has two `.npz` archives:
//!
//! | file | array | shape | dtype |
//! |---|---|---|---|
//! | `<id>_protein_features.npz` | `aa_one_hot` | `(n, 21)` | float |
//! | | `residue_numbers` (optional) | `(n)` | integer |
//! | | `chain_ids` (optional) | `(n)` | ASCII bytes |
//! | | `insertion_codes` (optional) | `(n)` | ASCII bytes, space = none |
//! | `<id>_residue_features.npz` | `atom_density` | `(n, 6, R, X, Y, C)` | float |
use crate::error::{IoError, Result};
use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use spheronet_core::{AminoAcid, NUM_CLASSES, NUM_SIDES};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const PROTEIN_SUFFIX: &str = "_protein_features.npz";
pub const RESIDUE_SUFFIX: &str = "_residue_features.npz";

/// Chain, residue number and insertion code of one residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResidueKey {
    pub chain: char,
    pub number: i64,
    pub icode: Option<char>,
}

impl ResidueKey {
    pub fn new(chain: char, number: i64, icode: Option<char>) -> Self {
        Self {
            chain,
            number,
            icode,
        }
    }
}

impl fmt::Display for ResidueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.number)?;
        if let Some(icode) = self.icode {
            write!(f, "{icode}")?;
        }
        Ok(())
    }
}

fn read_arrays(path: &Path) -> Result<HashMap<String, Tensor>> {
    Ok(Tensor::read_npz(path)?.into_iter().collect())
}

fn ascii_column(tensor: &Tensor) -> Result<Vec<u8>> {
    Ok(tensor.flatten_all()?.to_dtype(DType::U8)?.to_vec1::<u8>()?)
}

fn icode_from_byte(byte: u8) -> Option<char> {
    match byte {
        0 | b' ' => None,
        b => Some(b as char),
    }
}

/// Labels and residue identities of one structure.
#[derive(Debug, Clone)]
pub struct ProteinFeatures {
    aa_one_hot: Tensor,
    residues: Vec<AminoAcid>,
    keys: Vec<ResidueKey>,
}

impl ProteinFeatures {
    pub fn read(path: &Path) -> Result<Self> {
        let mut arrays = read_arrays(path)?;
        let aa_one_hot = arrays
            .remove("aa_one_hot")
            .ok_or_else(|| IoError::MissingArray {
                path: path.to_path_buf(),
                key: "aa_one_hot",
            })?
            .to_dtype(DType::F32)?;
        let n = match aa_one_hot.dims() {
            &[n, NUM_CLASSES] => n,
            dims => {
                return Err(IoError::ArrayShape {
                    path: path.to_path_buf(),
                    key: "aa_one_hot",
                    expected: format!("(n, {NUM_CLASSES})"),
                    found: dims.to_vec(),
                })
            }
        };
        let column = |arrays: &mut HashMap<String, Tensor>, key: &'static str| {
            match arrays.remove(key) {
                Some(t) if t.elem_count() != n => Err(IoError::ArrayShape {
                    path: path.to_path_buf(),
                    key,
                    expected: format!("({n})"),
                    found: t.dims().to_vec(),
                }),
                other => Ok(other),
            }
        };

        let numbers: Vec<i64> = match column(&mut arrays, "residue_numbers")? {
            Some(t) => t.flatten_all()?.to_dtype(DType::I64)?.to_vec1::<i64>()?,
            None => (1..=n as i64).collect(),
        };
        let chains: Vec<char> = match column(&mut arrays, "chain_ids")? {
            Some(t) => ascii_column(&t)?.into_iter().map(char::from).collect(),
            None => vec!['A'; n],
        };
        let icodes: Vec<Option<char>> = match column(&mut arrays, "insertion_codes")? {
            Some(t) => ascii_column(&t)?.into_iter().map(icode_from_byte).collect(),
            None => vec![None; n],
        };
        let keys = (0..n)
            .map(|i| ResidueKey::new(chains[i], numbers[i], icodes[i]))
            .collect();
        let residues = aa_one_hot
            .to_vec2::<f32>()?
            .iter()
            .map(|row| AminoAcid::from_one_hot(row))
            .collect();

        Ok(Self {
            aa_one_hot,
            residues,
            keys,
        })
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// `(n, 21)` one-hot labels.
    pub fn labels(&self) -> &Tensor {
        &self.aa_one_hot
    }

    pub fn residues(&self) -> &[AminoAcid] {
        &self.residues
    }

    pub fn keys(&self) -> &[ResidueKey] {
        &self.keys
    }

    pub fn find(&self, key: &ResidueKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }
}

/// The `atom_density` grids of one structure, one per residue.
#[derive(Debug, Clone)]
pub struct ResidueGrids {
    atom_density: Tensor,
}

impl ResidueGrids {
    /// Read and validate the grids. `expected` is the per-residue shape `(6, R, X, Y, C)`.
    pub fn read(path: &Path, expected: Option<&[usize]>) -> Result<Self> {
        let atom_density = read_arrays(path)?
            .remove("atom_density")
            .ok_or_else(|| IoError::MissingArray {
                path: path.to_path_buf(),
                key: "atom_density",
            })?
            .to_dtype(DType::F32)?;
        let dims = atom_density.dims();
        if dims.len() != 6 {
            return Err(IoError::ArrayShape {
                path: path.to_path_buf(),
                key: "atom_density",
                expected: "(n, 6, R, X, Y, C)".to_string(),
                found: dims.to_vec(),
            });
        }
        let grid = &dims[1..];
        let compatible = match expected {
            Some(expected) => grid == expected,
            None => grid[0] == NUM_SIDES,
        };
        if !compatible {
            return Err(IoError::IncompatibleGridShape {
                path: path.to_path_buf(),
                expected: expected.map_or_else(|| vec![NUM_SIDES], <[usize]>::to_vec),
                found: grid.to_vec(),
            });
        }
        Ok(Self { atom_density })
    }

    pub fn len(&self) -> usize {
        self.atom_density.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-residue grid shape `(6, R, X, Y, C)`.
    pub fn grid_shape(&self) -> &[usize] {
        &self.atom_density.dims()[1..]
    }

    /// Grids of residues `start..start + len`, shape `(len, 6, R, X, Y, C)`.
    pub fn rows(&self, start: usize, len: usize) -> Result<Tensor> {
        Ok(self.atom_density.narrow(0, start, len)?)
    }

    /// Grid of a single residue as a batch of one.
    pub fn grid(&self, index: usize) -> Result<Tensor> {
        self.rows(index, 1)
    }
}

/// Paths of the two archives describing one structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePair {
    pub id: String,
    pub protein: PathBuf,
    pub residue: PathBuf,
}

impl FeaturePair {
    pub fn in_dir(dir: &Path, id: &str) -> Self {
        Self {
            id: id.to_string(),
            protein: dir.join(format!("{id}{PROTEIN_SUFFIX}")),
            residue: dir.join(format!("{id}{RESIDUE_SUFFIX}")),
        }
    }

    pub fn exists(&self) -> bool {
        self.protein.is_file() && self.residue.is_file()
    }
}

/// All feature pairs in `dir`, sorted by id.
///
/// Every protein file needs a residue file with the same id and vice versa.
pub fn discover(dir: &Path) -> Result<Vec<FeaturePair>> {
    let mut proteins = Vec::new();
    let mut residues = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(id) = name.strip_suffix(PROTEIN_SUFFIX) {
            proteins.push(id.to_string());
        } else if let Some(id) = name.strip_suffix(RESIDUE_SUFFIX) {
            residues.push(id.to_string());
        }
    }
    proteins.sort();
    residues.sort();

    if let Some(id) = proteins.iter().find(|id| residues.binary_search(id).is_err()) {
        return Err(IoError::UnpairedFeatureFile(
            dir.join(format!("{id}{PROTEIN_SUFFIX}")),
        ));
    }
    if let Some(id) = residues.iter().find(|id| proteins.binary_search(id).is_err()) {
        return Err(IoError::UnpairedFeatureFile(
            dir.join(format!("{id}{RESIDUE_SUFFIX}")),
        ));
    }
    if proteins.is_empty() {
        return Err(IoError::NoFeatures(dir.to_path_buf()));
    }
    tracing::debug!("found {} feature pairs in {}", proteins.len(), dir.display());
    Ok(proteins
        .iter()
        .map(|id| FeaturePair::in_dir(dir, id))
        .collect())
}

/// Both archives of one structure, loaded and cross-checked.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    pub id: String,
    pub protein: ProteinFeatures,
    pub grids: ResidueGrids,
}

impl FeatureStore {
    pub fn load(pair: &FeaturePair, expected: Option<&[usize]>) -> Result<Self> {
        let protein = ProteinFeatures::read(&pair.protein)?;
        let grids = ResidueGrids::read(&pair.residue, expected)?;
        if protein.len() != grids.len() {
            return Err(IoError::ResidueCount {
                id: pair.id.clone(),
                protein: protein.len(),
                residue: grids.len(),
            });
        }
        Ok(Self {
            id: pair.id.clone(),
            protein,
            grids,
        })
    }

    /// Load `<id>` from `dir`, or `None` when its files are absent.
    pub fn open(dir: &Path, id: &str, expected: Option<&[usize]>) -> Result<Option<Self>> {
        let pair = FeaturePair::in_dir(dir, id);
        if !pair.exists() {
            return Ok(None);
        }
        Self::load(&pair, expected).map(Some)
    }

    /// Residue index, identity and grid for `key`.
    pub fn residue(&self, key: &ResidueKey) -> Result<Option<(AminoAcid, Tensor)>> {
        match self.protein.find(key) {
            Some(index) => Ok(Some((self.protein.residues()[index], self.grids.grid(index)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spheronet_test_data::{FeatureDir, ProteinFixture, SMALL_GRID};

    #[test]
    fn test_discover_pairs_sorted() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .protein("2xyz", "GG")
            .protein("1abc", "MKV")
            .create_temp()?;
        let pairs = discover(&dir)?;
        let ids: Vec<_> = pairs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["1abc", "2xyz"]);
        assert!(pairs.iter().all(FeaturePair::exists));
        Ok(())
    }

    #[test]
    fn test_discover_rejects_orphans() -> Result<()> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MKV").create_temp()?;
        std::fs::remove_file(dir.join("1abc_residue_features.npz"))?;
        assert!(matches!(
            discover(&dir),
            Err(IoError::UnpairedFeatureFile(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_store() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .protein_on_chain("1abc", "MKVL", 'B', 10)
            .create_temp()?;
        let store = FeatureStore::open(&dir, "1abc", Some(&SMALL_GRID[..]))?.expect("store");
        assert_eq!(store.protein.len(), 4);
        assert_eq!(store.grids.grid_shape(), &SMALL_GRID);
        let key = ResidueKey::new('B', 12, None);
        let (aa, grid) = store.residue(&key)?.expect("residue");
        assert_eq!(aa, AminoAcid::VAL);
        assert_eq!(grid.dims(), &[1, 6, 4, 3, 3, 2]);
        assert!(store.residue(&ResidueKey::new('A', 12, None))?.is_none());
        assert!(FeatureStore::open(&dir, "9zzz", None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_default_metadata() -> Result<()> {
        let (dir, _handle) = FeatureDir::small()
            .with(ProteinFixture {
                id: "1abc".into(),
                sequence: "MKV".into(),
                chain: 'Z',
                first_number: 50,
                insertion_codes: Some(b" A ".to_vec()),
                metadata: false,
                signal: 0.0,
            })
            .create_temp()?;
        let protein = ProteinFeatures::read(&dir.join("1abc_protein_features.npz"))?;
        assert_eq!(
            protein.keys(),
            &[
                ResidueKey::new('A', 1, None),
                ResidueKey::new('A', 2, Some('A')),
                ResidueKey::new('A', 3, None),
            ]
        );
        assert_eq!(protein.labels().dims(), &[3, NUM_CLASSES]);
        Ok(())
    }

    #[test]
    fn test_incompatible_grid() -> Result<()> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MK").create_temp()?;
        let result = FeatureStore::open(&dir, "1abc", Some(&[6, 24, 38, 38, 2][..]));
        assert!(matches!(
            result,
            Err(IoError::IncompatibleGridShape { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_residue_key_display() {
        assert_eq!(ResidueKey::new('A', 42, None).to_string(), "A:42");
        assert_eq!(ResidueKey::new('H', 100, Some('B')).to_string(), "H:100B");
    }
}
