//! Log-odds ddG of a substitution from predicted class probabilities.
//!
//! For one site,
//!
//! ```text
//! ddG = [ln P_mut(mutant) - ln f(mutant)] - [ln P_wt(wild type) - ln f(wild type)]
//! ```
//!
//! with `P_wt` / `P_mut` the probabilities predicted in the wild-type / mutant
//! environment and `f` the background frequency of each amino acid. Multi-point
//! mutations add up their site terms.
use spheronet_core::AminoAcid;
use spheronet_io::{PredictionRecord, ResultBundle, SitePrediction};

/// `ln x`, or 0 when `x` is zero, negative or not finite.
pub fn log_or_zero(x: f64) -> f64 {
    if x > 0.0 && x.is_finite() {
        x.ln()
    } else {
        0.0
    }
}

fn probability(probs: &[f32], aa: AminoAcid) -> f64 {
    probs.get(aa.index()).map_or(0.0, |&p| p as f64)
}

/// Frequency-normalised log-probability of `aa`.
pub fn log_odds(probs: &[f32], aa: AminoAcid) -> f64 {
    log_or_zero(probability(probs, aa)) - log_or_zero(aa.background_frequency())
}

pub fn site_ddg(
    wild_type_probs: &[f32],
    wild_type: AminoAcid,
    mutant_probs: &[f32],
    mutant: AminoAcid,
) -> f64 {
    log_odds(mutant_probs, mutant) - log_odds(wild_type_probs, wild_type)
}

/// Recompute a stored site from its probability vectors.
pub fn rescore_site(site: &SitePrediction) -> f64 {
    let wild_type = AminoAcid::from_code1(site.wild_type).unwrap_or(AminoAcid::UNK);
    let mutant = AminoAcid::from_code1(site.mutant).unwrap_or(AminoAcid::UNK);
    site_ddg(
        &site.wild_type_probabilities,
        wild_type,
        &site.mutant_probabilities,
        mutant,
    )
}

/// Recompute every site and total of a stored record.
pub fn rescore_record(record: &PredictionRecord) -> PredictionRecord {
    let sites: Vec<SitePrediction> = record
        .sites
        .iter()
        .map(|site| SitePrediction {
            ddg: rescore_site(site),
            ..site.clone()
        })
        .collect();
    PredictionRecord {
        predicted_ddg: sites.iter().map(|s| s.ddg).sum(),
        sites,
        ..record.clone()
    }
}

pub fn rescore_bundle(bundle: &ResultBundle) -> ResultBundle {
    ResultBundle {
        records: bundle.records.iter().map(rescore_record).collect(),
        skipped: bundle.skipped.clone(),
    }
}
