//! Amino-acid classes predicted by the network.
//!
//! The class order is the alphabetical one-letter order `ACDEFGHIKLMNPQRSTVWY`
//! followed by `X` for anything unknown or non-standard. Label vectors in the
//! feature files and the network output both use this order.
use strum::{Display, EnumIter, IntoEnumIterator};

/// Number of output classes: 20 amino acids plus unknown.
pub const NUM_CLASSES: usize = 21;

macro_rules! define_amino_acids {
    ($($name:ident: $code3:literal, $code1:literal, $idx:literal, $freq:literal),* $(,)?) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
        pub enum AminoAcid {
            $($name),*
        }

        impl AminoAcid {
            pub const fn code3(&self) -> &'static str {
                match self {
                    $(Self::$name => $code3),*
                }
            }
            pub const fn code1(&self) -> char {
                match self {
                    $(Self::$name => $code1),*
                }
            }
            /// Position of this class in the label / probability vectors.
            pub const fn index(&self) -> usize {
                match self {
                    $(Self::$name => $idx),*
                }
            }
            /// Background frequency of the residue in UniProtKB/Swiss-Prot.
            ///
            /// Used to normalise predicted probabilities into log-odds. `UNK`
            /// has no background frequency and reports 0.
            pub const fn background_frequency(&self) -> f64 {
                match self {
                    $(Self::$name => $freq),*
                }
            }
            pub fn from_index(value: usize) -> Self {
                match value {
                    $($idx => Self::$name,)*
                    _ => Self::UNK
                }
            }
        }
    }
}

define_amino_acids! {
    ALA: "ALA", 'A', 0,  0.0825,
    CYS: "CYS", 'C', 1,  0.0137,
    ASP: "ASP", 'D', 2,  0.0545,
    GLU: "GLU", 'E', 3,  0.0675,
    PHE: "PHE", 'F', 4,  0.0386,
    GLY: "GLY", 'G', 5,  0.0707,
    HIS: "HIS", 'H', 6,  0.0227,
    ILE: "ILE", 'I', 7,  0.0596,
    LYS: "LYS", 'K', 8,  0.0584,
    LEU: "LEU", 'L', 9,  0.0966,
    MET: "MET", 'M', 10, 0.0242,
    ASN: "ASN", 'N', 11, 0.0406,
    PRO: "PRO", 'P', 12, 0.0470,
    GLN: "GLN", 'Q', 13, 0.0393,
    ARG: "ARG", 'R', 14, 0.0553,
    SER: "SER", 'S', 15, 0.0656,
    THR: "THR", 'T', 16, 0.0534,
    VAL: "VAL", 'V', 17, 0.0687,
    TRP: "TRP", 'W', 18, 0.0108,
    TYR: "TYR", 'Y', 19, 0.0292,
    UNK: "UNK", 'X', 20, 0.0,
}

impl AminoAcid {
    /// Parse a one-letter code. Lower case is accepted; unknown letters give `None`.
    pub fn from_code1(code: char) -> Option<Self> {
        let code = code.to_ascii_uppercase();
        Self::iter().find(|aa| aa.code1() == code)
    }

    /// Parse a three-letter residue name such as `LEU`.
    pub fn from_code3(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        Self::iter().find(|aa| aa.code3() == code)
    }

    /// Class of a one-hot (or soft) label: the arg-max entry.
    pub fn from_one_hot(label: &[f32]) -> Self {
        let best = label
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, &value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((idx, value)),
            });
        best.map(|(idx, _)| Self::from_index(idx))
            .unwrap_or(Self::UNK)
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::UNK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_order() {
        let letters: String = AminoAcid::iter().map(|aa| aa.code1()).collect();
        assert_eq!(letters, "ACDEFGHIKLMNPQRSTVWYX");
        assert_eq!(AminoAcid::iter().count(), NUM_CLASSES);
        for (idx, aa) in AminoAcid::iter().enumerate() {
            assert_eq!(aa.index(), idx);
            assert_eq!(AminoAcid::from_index(idx), aa);
        }
    }

    #[test]
    fn test_residue_codes() {
        let leu = AminoAcid::LEU;
        assert_eq!(leu.code3(), "LEU");
        assert_eq!(leu.code1(), 'L');
        assert_eq!(AminoAcid::from_code1('l'), Some(AminoAcid::LEU));
        assert_eq!(AminoAcid::from_code3("trp"), Some(AminoAcid::TRP));
        assert_eq!(AminoAcid::from_code1('B'), None);
        assert_eq!(AminoAcid::from_index(999), AminoAcid::UNK);
    }

    #[test]
    fn test_from_one_hot() {
        let mut label = vec![0.0f32; NUM_CLASSES];
        label[AminoAcid::GLY.index()] = 1.0;
        assert_eq!(AminoAcid::from_one_hot(&label), AminoAcid::GLY);
        assert_eq!(AminoAcid::from_one_hot(&[]), AminoAcid::UNK);
    }

    #[test]
    fn test_background_frequencies() {
        let total: f64 = AminoAcid::iter().map(|aa| aa.background_frequency()).sum();
        assert!((total - 1.0).abs() < 0.01, "total = {total}");
        assert!(AminoAcid::iter()
            .filter(|aa| aa.is_standard())
            .all(|aa| aa.background_frequency() > 0.0));
        assert_eq!(AminoAcid::UNK.background_frequency(), 0.0);
    }
}
