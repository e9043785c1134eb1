//! Experimental ddG tables.
//!
//! ```text
//! # comment lines start with '#'
//! pdb_id,mutations,ddg
//! 1ey0,A:L25A,2.1
//! 1ey0,L25A;B:V66G,3.4
//! ```
//!
//! Mutation tokens are `[<chain>:]<wt><position>[<icode>]<mutant>`, separated by
//! `;` or whitespace. The chain defaults to `A`.
use crate::error::{IoError, Result};
use crate::features::ResidueKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use spheronet_core::AminoAcid;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CHAIN: char = 'A';

/// A single substitution `wild_type -> mutant` at one residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointMutation {
    pub chain: char,
    pub wild_type: AminoAcid,
    pub position: i64,
    pub icode: Option<char>,
    pub mutant: AminoAcid,
}

impl PointMutation {
    pub fn residue_key(&self) -> ResidueKey {
        ResidueKey::new(self.chain, self.position, self.icode)
    }

    /// `<wt><position><icode><mutant>`, e.g. `L25A`.
    pub fn code(&self) -> String {
        let icode = self.icode.map(String::from).unwrap_or_default();
        format!(
            "{}{}{}{}",
            self.wild_type.code1(),
            self.position,
            icode,
            self.mutant.code1()
        )
    }

    /// Feature store id holding the modelled mutant environment:
    /// `<pdb_id>_<chain>_<wt><position><icode><mutant>`.
    pub fn mutant_store_id(&self, pdb_id: &str) -> String {
        format!("{pdb_id}_{}_{}", self.chain, self.code())
    }
}

impl fmt::Display for PointMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.code())
    }
}

impl FromStr for PointMutation {
    type Err = IoError;

    fn from_str(token: &str) -> Result<Self> {
        let invalid = |reason: &str| IoError::InvalidMutation {
            token: token.to_string(),
            reason: reason.to_string(),
        };
        let token = token.trim();
        let (chain, body) = match token.split_once(':') {
            Some((chain, body)) => {
                let mut chars = chain.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => (c, body),
                    _ => return Err(invalid("chain must be a single character")),
                }
            }
            None => (DEFAULT_CHAIN, token),
        };

        let chars: Vec<char> = body.chars().collect();
        if chars.len() < 3 {
            return Err(invalid("expected <wt><position>[<icode>]<mutant>"));
        }
        let wild_type = AminoAcid::from_code1(chars[0])
            .ok_or_else(|| invalid("unknown wild-type residue"))?;
        let mutant = AminoAcid::from_code1(chars[chars.len() - 1])
            .ok_or_else(|| invalid("unknown mutant residue"))?;

        let middle = &chars[1..chars.len() - 1];
        let (digits, icode) = match middle.split_last() {
            Some((last, rest)) if last.is_ascii_alphabetic() => (rest, Some(*last)),
            _ => (middle, None),
        };
        let digits: String = digits.iter().collect();
        let position = digits
            .parse::<i64>()
            .map_err(|_| invalid("residue position is not an integer"))?;

        Ok(Self {
            chain,
            wild_type,
            position,
            icode,
            mutant,
        })
    }
}

/// Parse a `;` / whitespace separated list of mutation tokens.
pub fn parse_mutations(field: &str) -> Result<Vec<PointMutation>> {
    field
        .split(|c: char| c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::parse)
        .collect()
}

/// One row of a ddG table: one or more simultaneous mutations and the measured ddG.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub pdb_id: String,
    pub mutations: Vec<PointMutation>,
    pub ddg: f64,
}

impl MutationRecord {
    /// Canonical `;`-separated mutation list, e.g. `A:L25A;B:V66G`.
    pub fn mutation_list(&self) -> String {
        self.mutations.iter().join(";")
    }
}

impl fmt::Display for MutationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pdb_id, self.mutation_list())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DdgRow {
    pdb_id: String,
    mutations: String,
    ddg: f64,
}

/// Read every record of a ddG table.
pub fn read_ddg_csv(path: &Path) -> Result<Vec<MutationRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for row in reader.deserialize::<DdgRow>() {
        let row = row?;
        let mutations = parse_mutations(&row.mutations).map_err(|e| IoError::InvalidRecord {
            path: path.to_path_buf(),
            record: records.len() + 1,
            reason: e.to_string(),
        })?;
        if mutations.is_empty() {
            return Err(IoError::InvalidRecord {
                path: path.to_path_buf(),
                record: records.len() + 1,
                reason: format!("no mutations for {}", row.pdb_id),
            });
        }
        records.push(MutationRecord {
            pdb_id: row.pdb_id,
            mutations,
            ddg: row.ddg,
        });
    }
    tracing::info!("read {} ddG records from {}", records.len(), path.display());
    Ok(records)
}
