use candle_core::Device;
use spheronet_ddg::{pearson, rescore_bundle, DdgPipeline};
use spheronet_io::{read_ddg_csv, ResultBundle};
use spheronet_nn::{CubedSphereConfig, InferenceContext, Strictness};
use spheronet_test_data::{DdgTable, FeatureDir};
use tempfile::TempDir;

#[test]
fn test_table_to_bundle_and_back() -> Result<(), Box<dyn std::error::Error>> {
    let (features, _features) = FeatureDir::small()
        .protein("1abc", "MKVLGE")
        .protein("2xyz", "AWYF")
        .create_temp()?;
    let (csv, _csv) = DdgTable::new()
        .comment("toy table")
        .row("1abc", "K2A", 1.2)
        .row("1abc", "V3G", 0.4)
        .row("1abc", "L4A;G5W", 2.5)
        .row("2xyz", "W2F", -0.3)
        .row("2xyz", "Y3A", 0.9)
        .row("3nop", "A1G", 0.1)
        .create_temp()?;
    let checkpoints = TempDir::new()?;

    let context = InferenceContext::new(
        &CubedSphereConfig::tiny(),
        checkpoints.path(),
        None,
        Strictness::Lenient,
        &Device::Cpu,
    )?;
    let records = read_ddg_csv(&csv)?;
    assert_eq!(records.len(), 6);

    let mut pipeline = DdgPipeline::new(&context, &features);
    let report = pipeline.run(&records)?;
    assert_eq!(report.scored(), 5);
    assert_eq!(report.bundle.skipped.len(), 1);
    assert_eq!(report.bundle.skipped[0].pdb_id, "3nop");
    assert_eq!(pipeline.wild_type_evaluations(), 6);

    let out = checkpoints.path().join("results.json");
    report.bundle.write(&out)?;
    let reloaded = ResultBundle::read(&out)?;
    assert_eq!(reloaded.records.len(), 5);

    let rescored = rescore_bundle(&reloaded);
    for (a, b) in rescored.records.iter().zip(&report.bundle.records) {
        assert!((a.predicted_ddg - b.predicted_ddg).abs() < 1e-6);
    }
    let (predicted, observed) = rescored.pairs();
    let correlation = pearson(&predicted, &observed)?;
    assert_eq!(correlation.n, 5);
    assert!((-1.0..=1.0).contains(&correlation.r));
    Ok(())
}
