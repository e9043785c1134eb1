//! spheronet-test-data
//!
//! Synthetic inputs for tests. Feature files are generated on the fly rather
//! than embedded, so every test can pick a small grid:
//!
//! - [`FeatureDir`] writes `<id>_protein_features.npz` / `<id>_residue_features.npz`
//!   pairs for a list of proteins into a temporary directory.
//! - [`DdgTable`] writes a ddG CSV table.
//!
//! Both return the path together with the handle that keeps it alive.
//!
//! ```ignore
//! use spheronet_test_data::FeatureDir;
//! let (dir, _handle) = FeatureDir::small().protein("1abc", "MKLV").create_temp()?;
//! ```
use candle_core::{DType, Device, Result, Tensor};
use spheronet_core::{AminoAcid, NUM_CLASSES};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Grid shape `(6, R, X, Y, C)` used by most unit tests.
pub const SMALL_GRID: [usize; 5] = [6, 4, 3, 3, 2];

#[derive(Debug, Clone)]
pub struct ProteinFixture {
    pub id: String,
    pub sequence: String,
    pub chain: char,
    pub first_number: i64,
    /// One byte per residue; `b' '` means no insertion code.
    pub insertion_codes: Option<Vec<u8>>,
    /// Write `residue_numbers` and `chain_ids`. Without them readers fall back
    /// to 1-based numbering on chain `A`.
    pub metadata: bool,
    /// Phase of the synthetic grid pattern, to tell apart stores with equal sequences.
    pub signal: f32,
}

#[derive(Debug, Clone)]
pub struct FeatureDir {
    grid: [usize; 5],
    proteins: Vec<ProteinFixture>,
}

impl FeatureDir {
    pub fn new(grid: [usize; 5]) -> Self {
        Self {
            grid,
            proteins: Vec::new(),
        }
    }

    pub fn small() -> Self {
        Self::new(SMALL_GRID)
    }

    pub fn grid(&self) -> [usize; 5] {
        self.grid
    }

    /// Chain `A`, numbered from 1.
    pub fn protein(self, id: &str, sequence: &str) -> Self {
        self.protein_on_chain(id, sequence, 'A', 1)
    }

    pub fn protein_on_chain(self, id: &str, sequence: &str, chain: char, first_number: i64) -> Self {
        self.with(ProteinFixture {
            id: id.to_string(),
            sequence: sequence.to_string(),
            chain,
            first_number,
            insertion_codes: None,
            metadata: true,
            signal: 0.0,
        })
    }

    pub fn with(mut self, protein: ProteinFixture) -> Self {
        self.proteins.push(protein);
        self
    }

    pub fn proteins(&self) -> &[ProteinFixture] {
        &self.proteins
    }

    /// Returns (directory, handle). Drop the handle to delete the files.
    pub fn create_temp(&self) -> Result<(PathBuf, TempDir)> {
        let handle = TempDir::new()?;
        let path = handle.path().to_path_buf();
        self.write_to(&path)?;
        Ok((path, handle))
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for protein in &self.proteins {
            write_protein(dir, protein, self.grid)?;
        }
        Ok(())
    }
}

fn write_protein(dir: &Path, protein: &ProteinFixture, grid: [usize; 5]) -> Result<()> {
    let device = Device::Cpu;
    let n = protein.sequence.chars().count();

    let mut one_hot = vec![0f32; n * NUM_CLASSES];
    for (i, code) in protein.sequence.chars().enumerate() {
        let aa = AminoAcid::from_code1(code).unwrap_or(AminoAcid::UNK);
        one_hot[i * NUM_CLASSES + aa.index()] = 1.0;
    }
    let mut arrays = vec![(
        "aa_one_hot".to_string(),
        Tensor::from_vec(one_hot, (n, NUM_CLASSES), &device)?,
    )];
    if protein.metadata {
        let numbers: Vec<i64> = (0..n as i64).map(|i| protein.first_number + i).collect();
        arrays.push((
            "residue_numbers".to_string(),
            Tensor::from_vec(numbers, n, &device)?,
        ));
        arrays.push((
            "chain_ids".to_string(),
            Tensor::from_vec(vec![protein.chain as u8; n], n, &device)?,
        ));
    }
    if let Some(codes) = &protein.insertion_codes {
        arrays.push((
            "insertion_codes".to_string(),
            Tensor::from_vec(codes.clone(), codes.len(), &device)?,
        ));
    }
    Tensor::write_npz(
        &arrays,
        dir.join(format!("{}_protein_features.npz", protein.id)),
    )?;

    let [sides, radial, xi, eta, channels] = grid;
    let count = n * sides * radial * xi * eta * channels;
    let density = Tensor::arange(0u32, count as u32, &device)?
        .to_dtype(DType::F32)?
        .affine(0.37, protein.signal as f64)?
        .sin()?
        .reshape(vec![n, sides, radial, xi, eta, channels])?;
    Tensor::write_npz(
        &[("atom_density", &density)],
        dir.join(format!("{}_residue_features.npz", protein.id)),
    )?;
    Ok(())
}

/// A ddG table written as CSV.
#[derive(Debug, Clone, Default)]
pub struct DdgTable {
    rows: Vec<(String, String, f64)>,
    comments: Vec<String>,
}

impl DdgTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, pdb_id: &str, mutations: &str, ddg: f64) -> Self {
        self.rows.push((pdb_id.to_string(), mutations.to_string(), ddg));
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comments.push(text.to_string());
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for comment in &self.comments {
            out.push_str(&format!("# {comment}\n"));
        }
        out.push_str("pdb_id,mutations,ddg\n");
        for (pdb_id, mutations, ddg) in &self.rows {
            out.push_str(&format!("{pdb_id},{mutations},{ddg}\n"));
        }
        out
    }

    /// Returns (csv file, handle).
    pub fn create_temp(&self) -> Result<(PathBuf, TempDir)> {
        let handle = TempDir::new()?;
        let path = handle.path().join("ddgs.csv");
        fs::write(&path, self.render())?;
        Ok((path, handle))
    }
}
