//! Integration tests on a real DEM (Copernicus 30m, Andes, Chile).
//!
//! Tests marked `#[ignore]` require the fixture file
//! `tests/fixtures/andes_chile_30m.tif` at the workspace root, which is not
//! checked in. Run them with `cargo test -- --ignored` after placing it.

use drainhand_algorithms::hydrology::{condition_dem, flow_accumulation, flow_direction, ConditionParams};
use drainhand_algorithms::pipeline::{compute_hand, encode_products, HandConfig};
use drainhand_core::io::{read_geotiff, write_geotiff};
use drainhand_core::raster::Raster;
use std::path::Path;

/// Path to the DEM fixture relative to workspace root.
const DEM_FILENAME: &str = "tests/fixtures/andes_chile_30m.tif";

fn dem_path() -> std::path::PathBuf {
    // The fixture lives at the workspace root, two levels above the crate
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest.parent().unwrap().parent().unwrap();
    workspace_root.join(DEM_FILENAME)
}

fn load_dem() -> Raster<f64> {
    let path = dem_path();
    assert!(path.exists(), "DEM fixture not found at {}", path.display());
    read_geotiff::<f64, _>(&path).expect("failed to read DEM fixture")
}

#[test]
#[ignore]
fn io_roundtrip() {
    let dem = load_dem();
    let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
    write_geotiff(&dem, tmp.path(), None).expect("write failed");

    let reloaded: Raster<f64> = read_geotiff(tmp.path()).expect("re-read failed");
    assert_eq!(reloaded.shape(), dem.shape());
    assert_eq!(reloaded.transform(), dem.transform());

    let (rows, cols) = dem.shape();
    for r in [0, rows / 3, rows / 2, rows - 1] {
        for c in [0, cols / 3, cols / 2, cols - 1] {
            let orig = dem.get(r, c).unwrap();
            let copy = reloaded.get(r, c).unwrap();
            if orig.is_nan() {
                assert!(copy.is_nan(), "pixel ({r},{c}): expected NaN");
            } else {
                assert!((orig - copy).abs() < 0.01, "pixel ({r},{c}): orig={orig}, copy={copy}");
            }
        }
    }
}

#[test]
#[ignore]
fn accumulation_covers_every_valid_cell() {
    let dem = load_dem();
    let cond = condition_dem(&dem, &ConditionParams::default()).expect("conditioning failed");
    let fdir = flow_direction(&cond.dem, Some(&cond.gradient)).expect("flow direction failed");
    let acc = flow_accumulation(&fdir).expect("accumulation failed");

    let valid = dem.valid_count();
    let max = acc.statistics().max.unwrap() as usize;
    assert!(max > 1000, "mountain DEM should have large catchments, max={max}");
    assert!(max <= valid);
}

#[test]
#[ignore]
fn hand_is_defined_and_plausible() {
    let dem = load_dem();
    let config = HandConfig::default();
    let products = compute_hand(&dem, None, &config).expect("HAND failed");

    let mut defined = 0usize;
    for (&h, &z) in products.hand.data().iter().zip(dem.data().iter()) {
        if dem.is_nodata(z) {
            continue;
        }
        assert!(!h.is_nan(), "valid elevation left without HAND");
        assert!(h >= 0.0);
        defined += 1;
    }
    assert!(defined > 0);

    // Relief is about 3000 m, so HAND stays well under it
    let stats = products.hand.statistics();
    assert!(stats.max.unwrap() < 3500.0);

    let encoded = encode_products(&products, None, &config).unwrap();
    assert_eq!(encoded.hand.shape(), dem.shape());
}
