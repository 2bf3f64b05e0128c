//! Property checks of the full pipeline on synthetic terrain, plus a
//! GeoJSON-to-GeoTIFF batch run through the file system.

use drainhand_algorithms::basin::{rasterize_basin_mask, OUTSIDE};
use drainhand_algorithms::hydrology::{
    condition_dem, drainage_mask, flow_accumulation, flow_direction, hand, ConditionParams,
    DrainageThreshold,
};
use drainhand_algorithms::interpolation::{fill_hand, GapFillParams};
use drainhand_algorithms::pipeline::{
    compute_hand, encode_products, run_batch, BatchOptions, FailurePolicy, HandConfig,
    TileOutcome,
};
use drainhand_core::io::{parse_basins, read_geotiff, DirectorySink, GeoTiffOptions, DEFAULT_ID_PROPERTY};
use drainhand_core::raster::d8;
use drainhand_core::{Basin, GeoTransform, Raster, CRS};
use geo::{polygon, MultiPolygon};

const SIZE: usize = 40;

/// Tilted valley draining to row 0, roughened so that it has pits and
/// closed depressions
fn rough_valley() -> Raster<f64> {
    let mut dem = Raster::new(SIZE, SIZE);
    dem.set_transform(GeoTransform::new(500_000.0, 4_000_000.0, 30.0, -30.0));
    dem.set_crs(Some(CRS::from_epsg(32633)));
    for row in 0..SIZE {
        for col in 0..SIZE {
            let noise = ((row * 7919 + col * 104_729) % 1000) as f64 / 1000.0;
            let z = 0.5 * row as f64 + 0.2 * (col as f64 - 20.0).abs() + 3.0 * noise;
            dem.set(row, col, z).unwrap();
        }
    }
    dem
}

fn is_border(row: usize, col: usize) -> bool {
    row == 0 || col == 0 || row == SIZE - 1 || col == SIZE - 1
}

#[test]
fn conditioned_dem_has_no_interior_minimum() {
    let cond = condition_dem(&rough_valley(), &ConditionParams::default()).unwrap();
    for row in 1..SIZE - 1 {
        for col in 1..SIZE - 1 {
            let z = cond.dem.get(row, col).unwrap();
            let g = cond.gradient.get(row, col).unwrap();
            let drains = (0..8).any(|k| {
                let (nr, nc) = d8::neighbor(row, col, k, SIZE, SIZE).unwrap();
                let nz = cond.dem.get(nr, nc).unwrap();
                nz < z || (nz == z && cond.gradient.get(nr, nc).unwrap() < g)
            });
            assert!(drains, "cell ({row}, {col}) is a local minimum");
        }
    }
}

#[test]
fn every_valid_cell_reaches_an_outlet() {
    let cond = condition_dem(&rough_valley(), &ConditionParams::default()).unwrap();
    let fdir = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
    let acc = flow_accumulation(&fdir).unwrap();

    let mut outlet_total = 0u64;
    for row in 0..SIZE {
        for col in 0..SIZE {
            let code = fdir.get(row, col).unwrap();
            if !is_border(row, col) {
                assert_ne!(code, d8::NO_FLOW, "interior cell ({row}, {col}) has no direction");
            }
            let a = acc.get(row, col).unwrap();
            assert!(a >= 1);
            match d8::downstream(row, col, code, SIZE, SIZE) {
                Some((nr, nc)) => assert!(acc.get(nr, nc).unwrap() > a),
                None => outlet_total += u64::from(a),
            }
        }
    }
    // Each cell is counted at exactly one outlet
    assert_eq!(outlet_total, (SIZE * SIZE) as u64);
}

#[test]
fn flow_direction_is_pure() {
    let cond = condition_dem(&rough_valley(), &ConditionParams::default()).unwrap();
    let a = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
    let b = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
    assert_eq!(a.data(), b.data());
}

#[test]
fn hand_is_zero_on_drainage_and_non_negative() {
    let cond = condition_dem(&rough_valley(), &ConditionParams::default()).unwrap();
    let fdir = flow_direction(&cond.dem, Some(&cond.gradient)).unwrap();
    let acc = flow_accumulation(&fdir).unwrap();
    let drainage = drainage_mask(&acc, DrainageThreshold::Fixed(50)).unwrap();
    let result = hand(&cond.dem, &fdir, &drainage.mask).unwrap();

    for (h, &d) in result.data().iter().zip(drainage.mask.data().iter()) {
        if d == 1 {
            assert_eq!(*h, 0.0);
        }
        assert!(h.is_nan() || *h >= 0.0);
    }

    let before = result.data().iter().filter(|h| h.is_nan()).count();
    let filled = fill_hand(&result, &rough_valley(), &GapFillParams::default()).unwrap();
    let after = filled.data().iter().filter(|h| h.is_nan()).count();
    assert!(after <= before);
    for (h, f) in result.data().iter().zip(filled.data().iter()) {
        if !h.is_nan() {
            assert_eq!(h.to_bits(), f.to_bits());
        }
    }
}

#[test]
fn masked_cells_are_nodata_in_both_outputs() {
    let dem = rough_valley();
    // Diamond in the middle of the grid, in map coordinates
    let (cx, cy) = dem.pixel_to_geo(20, 20);
    let poly = polygon![
        (x: cx - 300.0, y: cy),
        (x: cx, y: cy - 300.0),
        (x: cx + 300.0, y: cy),
        (x: cx, y: cy + 300.0),
    ];
    let mask = rasterize_basin_mask(&MultiPolygon::new(vec![poly]), &dem).unwrap();
    let config = HandConfig {
        threshold: DrainageThreshold::Fixed(50),
        ..Default::default()
    };

    let products = compute_hand(&dem, Some(&mask), &config).unwrap();
    let encoded = encode_products(&products, Some(&mask), &config).unwrap();

    let mut outside = 0;
    for ((&m, &h), &a) in mask
        .data()
        .iter()
        .zip(encoded.hand.data().iter())
        .zip(encoded.accumulation.data().iter())
    {
        if m == OUTSIDE {
            outside += 1;
            assert_eq!(h, config.nodata);
            assert_eq!(a, config.nodata);
        } else {
            assert_ne!(h, config.nodata, "in-basin HAND left undefined");
        }
    }
    assert!(outside > 0 && outside < SIZE * SIZE);
}

#[test]
fn batch_writes_geotiffs_for_geojson_basins() {
    let dem = rough_valley();
    let (x0, y0) = dem.pixel_to_geo(5, 5);
    let (x1, y1) = dem.pixel_to_geo(30, 30);
    let geojson = format!(
        r#"{{
            "type": "FeatureCollection",
            "features": [
                {{
                    "type": "Feature",
                    "properties": {{ "HYBAS_ID": 6050000740 }},
                    "geometry": {{
                        "type": "Polygon",
                        "coordinates": [[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]
                    }}
                }},
                {{
                    "type": "Feature",
                    "properties": {{ "HYBAS_ID": 1 }},
                    "geometry": {{
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 0.0]]]
                    }}
                }}
            ]
        }}"#
    );
    let basins: Vec<Basin> = parse_basins(&geojson, DEFAULT_ID_PROPERTY).unwrap();
    assert_eq!(basins.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path().join("out"), GeoTiffOptions::default()).unwrap();
    let options = BatchOptions {
        policy: FailurePolicy::Skip,
        error_log: Some(dir.path().join("error_ids.txt")),
    };
    let config = HandConfig::default();

    let reports = run_batch(&dem, &basins, &config, &sink, &options).unwrap();
    assert!(reports[0].is_written());
    assert!(matches!(reports[1].outcome, TileOutcome::Failed { .. }));

    let hand_path = sink.path_for("hand_100_basin_6050000740.tif");
    let acc_path = sink.path_for("flow_acc_basin_6050000740.tif");
    let hand_out: Raster<u16> = read_geotiff(&hand_path).unwrap();
    let acc_out: Raster<u16> = read_geotiff(&acc_path).unwrap();
    assert_eq!(hand_out.shape(), acc_out.shape());
    assert_eq!(hand_out.nodata(), Some(65535));
    assert_eq!(hand_out.crs().and_then(|c| c.epsg()), Some(32633));
    // Window is the 26x26 basin box plus one padding cell each side
    assert_eq!(hand_out.shape(), (28, 28));

    let errors = std::fs::read_to_string(dir.path().join("error_ids.txt")).unwrap();
    assert!(errors.starts_with("1\t"));
}
