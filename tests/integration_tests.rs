//! Integration tests for the evaluation pipeline.
//!
//! These tests run complete evaluations over small synthetic datasets whose
//! numbers are worked out by hand.

use approx::assert_relative_eq;

use mots_eval_rs::{
    evaluate, group_and_sort, Category, Config, Error, EvalOptions, EvalResult, Frame, ImageSize,
    Label, Mask, Poly2d, RleLabel, Video,
};

const H: u32 = 10;
const W: u32 = 10;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// RLE of the rectangle covering columns `x0..x1` and rows `y0..y1`.
fn rect(x0: usize, y0: usize, x1: usize, y1: usize) -> RleLabel {
    let mut data = vec![0u8; (H * W) as usize];
    for x in x0..x1 {
        for y in y0..y1 {
            data[y + H as usize * x] = 1;
        }
    }
    let mask = Mask::from_binary(&data, H, W).expect("valid canvas");
    RleLabel {
        counts: mask.to_compressed(),
        size: [H, W],
    }
}

fn label(id: &str, category: &str, rle: RleLabel) -> Label {
    Label::with_rle(id, category, rle)
}

fn frame(video: &str, index: u32, labels: Vec<Label>) -> Frame {
    Frame {
        name: format!("{}-{:04}.jpg", video, index),
        video_name: Some(video.to_string()),
        frame_index: Some(index),
        labels: Some(labels),
    }
}

fn config() -> Config {
    Config {
        image_size: Some(ImageSize { width: W, height: H }),
        categories: vec![
            Category::parent("human", vec![Category::leaf("pedestrian"), Category::leaf("rider")]),
            Category::parent("vehicle", vec![Category::leaf("car")]),
        ],
    }
}

fn options(num_workers: usize) -> EvalOptions {
    EvalOptions {
        num_workers,
        ..EvalOptions::default()
    }
}

fn pedestrian_gt() -> RleLabel {
    rect(0, 0, 5, 10)
}

fn pedestrian_pred() -> RleLabel {
    // IoU 0.8 with the ground truth
    rect(0, 0, 4, 10)
}

fn car() -> RleLabel {
    rect(6, 0, 10, 10)
}

/// Two videos.
///
/// Video `a`: the pedestrian is tracked in all three frames but the predicted
/// identity changes in the last one; the car is missed in the middle frame.
/// Video `b`: the pedestrian is never predicted and a car is predicted where
/// there is none.
fn dataset() -> (Vec<Video>, Vec<Video>) {
    let gt_a = |index| {
        let labels = vec![label("p1", "pedestrian", pedestrian_gt()), label("c1", "car", car())];
        frame("a", index, labels)
    };
    let gts = vec![
        vec![gt_a(0), gt_a(1), gt_a(2)],
        vec![
            frame("b", 0, vec![label("p1", "pedestrian", pedestrian_gt())]),
            frame("b", 1, vec![label("p1", "pedestrian", pedestrian_gt())]),
        ],
    ];
    let preds = vec![
        vec![
            frame(
                "a",
                0,
                vec![label("x", "pedestrian", pedestrian_pred()), label("z", "car", car())],
            ),
            frame("a", 1, vec![label("x", "pedestrian", pedestrian_pred())]),
            frame(
                "a",
                2,
                vec![label("y", "pedestrian", pedestrian_pred()), label("z", "car", car())],
            ),
        ],
        vec![frame("b", 0, vec![]), frame("b", 1, vec![label("q", "car", car())])],
    ];
    (gts, preds)
}

fn value(result: &EvalResult, row: &str, column: &str) -> f64 {
    result
        .row(row)
        .and_then(|r| r.get(column))
        .unwrap_or_else(|| panic!("missing {} / {}", row, column))
}

// =============================================================================
// Test 1: Complete evaluation
// =============================================================================

#[test]
fn test_integration_class_rows() {
    init_logger();
    let (gts, preds) = dataset();
    let result = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    // pedestrian: 5 gt, 2 FN, 1 IDSw, 3 matches at distance 0.2, IDTP 2 of 5 + 3
    assert_relative_eq!(value(&result, "pedestrian", "MOTA"), 40.0, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "pedestrian", "MOTP"), 80.0, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "pedestrian", "IDF1"), 50.0, epsilon = 1e-9);
    assert_eq!(value(&result, "pedestrian", "FN"), 2.0);
    assert_eq!(value(&result, "pedestrian", "FP"), 0.0);
    assert_eq!(value(&result, "pedestrian", "IDSw"), 1.0);
    assert_eq!(value(&result, "pedestrian", "MT"), 1.0);
    assert_eq!(value(&result, "pedestrian", "ML"), 1.0);
    assert_eq!(value(&result, "pedestrian", "FM"), 0.0);

    // car: 3 gt, 1 FN, 1 FP, 2 exact matches, IDTP 2 of 3 + 3
    assert_relative_eq!(value(&result, "car", "MOTA"), 100.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "car", "MOTP"), 100.0, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "car", "IDF1"), 400.0 / 6.0, epsilon = 1e-9);
    assert_eq!(value(&result, "car", "PT"), 1.0);
    assert_eq!(value(&result, "car", "FM"), 1.0);

    // rider never appears
    assert_eq!(value(&result, "rider", "MOTA"), -1.0);
    assert_eq!(value(&result, "rider", "MOTP"), -1.0);
    assert_eq!(value(&result, "rider", "IDF1"), -1.0);
    assert_eq!(value(&result, "rider", "FP"), 0.0);
}

#[test]
fn test_integration_aggregate_rows() {
    let (gts, preds) = dataset();
    let result = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    let names: Vec<String> = result.rows().into_iter().map(|r| r.name).collect();
    assert_eq!(
        names,
        vec!["pedestrian", "rider", "car", "human", "vehicle", "AVERAGE", "OVERALL"]
    );

    // Super-classes pool their leaves
    let values = |name: &str| result.row(name).map(|r| r.values);
    assert_eq!(values("human"), values("pedestrian"));
    assert_eq!(values("vehicle"), values("car"));

    // AVERAGE skips the undefined rider row and sums counts
    let mota = (40.0 + 100.0 / 3.0) / 2.0;
    assert_relative_eq!(value(&result, "AVERAGE", "MOTA"), mota, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "AVERAGE", "MOTP"), 90.0, epsilon = 1e-9);
    let idf1 = (50.0 + 400.0 / 6.0) / 2.0;
    assert_relative_eq!(value(&result, "AVERAGE", "IDF1"), idf1, epsilon = 1e-9);
    assert_eq!(value(&result, "AVERAGE", "FN"), 3.0);
    assert_eq!(value(&result, "AVERAGE", "FP"), 1.0);

    // OVERALL: 8 gt, 3 FN, 1 FP, 1 IDSw, 5 matches summing 0.6, IDTP 4 of 8 + 6
    assert_relative_eq!(value(&result, "OVERALL", "MOTA"), 37.5, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "OVERALL", "MOTP"), 88.0, epsilon = 1e-9);
    assert_relative_eq!(value(&result, "OVERALL", "IDF1"), 800.0 / 14.0, epsilon = 1e-9);
    assert_eq!(value(&result, "OVERALL", "IDSw"), 1.0);
    assert_eq!(value(&result, "OVERALL", "MT"), 1.0);
    assert_eq!(value(&result, "OVERALL", "PT"), 1.0);
    assert_eq!(value(&result, "OVERALL", "ML"), 1.0);
}

#[test]
fn test_integration_summary() {
    let (gts, preds) = dataset();
    let result = evaluate(&gts, &preds, &config(), &options(2)).unwrap();
    let summary = result.summary();

    let mut keys: Vec<&str> = summary.keys().map(String::as_str).collect();
    keys.sort_unstable();
    let mut expected = vec![
        "IDF1", "MOTA", "MOTP", "FP", "FN", "IDSw", "MT", "PT", "ML", "FM", "mIDF1", "mMOTA",
        "mMOTP",
    ];
    expected.sort_unstable();
    assert_eq!(keys, expected);

    assert_relative_eq!(summary["MOTA"], 37.5, epsilon = 1e-9);
    assert_relative_eq!(summary["mMOTP"], 90.0, epsilon = 1e-9);
    assert_eq!(summary["FN"], 3.0);
}

// =============================================================================
// Test 2: Determinism and neutral inputs
// =============================================================================

#[test]
fn test_integration_deterministic_across_pool_sizes() {
    let (gts, preds) = dataset();
    let single = evaluate(&gts, &preds, &config(), &options(1)).unwrap();
    let many = evaluate(&gts, &preds, &config(), &options(4)).unwrap();
    let again = evaluate(&gts, &preds, &config(), &options(4)).unwrap();

    assert_eq!(single, many);
    assert_eq!(many, again);
}

#[test]
fn test_integration_empty_frames_change_nothing() {
    let (gts, preds) = dataset();
    let base = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    let (mut padded_gts, mut padded_preds) = dataset();
    padded_gts[0].push(frame("a", 7, vec![]));
    padded_preds[0].push(frame("a", 7, vec![]));
    padded_gts.push(vec![frame("c", 0, vec![])]);
    padded_preds.push(vec![frame("c", 0, vec![])]);
    let padded = evaluate(&padded_gts, &padded_preds, &config(), &options(2)).unwrap();

    assert_eq!(base.rows(), padded.rows());
}

#[test]
fn test_integration_frame_order_does_not_matter() {
    let (gts, preds) = dataset();
    let base = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    let (mut shuffled_gts, mut shuffled_preds) = dataset();
    shuffled_gts[0].reverse();
    shuffled_preds[0].swap(0, 2);
    let shuffled = evaluate(&shuffled_gts, &shuffled_preds, &config(), &options(2)).unwrap();

    assert_eq!(base.rows(), shuffled.rows());
}

#[test]
fn test_integration_perfect_predictions() {
    let (gts, _) = dataset();
    let result = evaluate(&gts, &gts, &config(), &options(2)).unwrap();

    for row in ["pedestrian", "car", "AVERAGE", "OVERALL"] {
        assert_relative_eq!(value(&result, row, "MOTA"), 100.0, epsilon = 1e-9);
        assert_relative_eq!(value(&result, row, "MOTP"), 100.0, epsilon = 1e-9);
        assert_relative_eq!(value(&result, row, "IDF1"), 100.0, epsilon = 1e-9);
    }
    assert_eq!(value(&result, "OVERALL", "MT"), 3.0);
}

// =============================================================================
// Test 3: Ignore regions
// =============================================================================

#[test]
fn test_integration_crowd_swallows_false_positive() {
    let gts = vec![vec![frame(
        "v",
        0,
        vec![
            label("p1", "pedestrian", rect(0, 0, 2, 2)),
            label("crowd", "car", rect(1, 5, 10, 10)).with_flag("crowd", true),
        ],
    )]];
    // 45 of the 50 predicted pixels lie in the crowd region: IoF 0.9
    let preds = vec![vec![frame(
        "v",
        0,
        vec![
            label("x", "pedestrian", rect(0, 0, 2, 2)),
            label("y", "pedestrian", rect(0, 5, 10, 10)),
        ],
    )]];

    let result = evaluate(&gts, &preds, &config(), &options(1)).unwrap();
    assert_eq!(value(&result, "pedestrian", "FP"), 0.0);
    assert_relative_eq!(value(&result, "pedestrian", "MOTA"), 100.0, epsilon = 1e-9);
    // The crowd label itself is no ground truth
    assert_eq!(value(&result, "car", "MOTA"), -1.0);

    let strict = EvalOptions {
        ignore_iof_threshold: 0.95,
        ..options(1)
    };
    let result = evaluate(&gts, &preds, &config(), &strict).unwrap();
    assert_eq!(value(&result, "pedestrian", "FP"), 1.0);
}

// =============================================================================
// Test 4: Input forms
// =============================================================================

#[test]
fn test_integration_polygon_labels() {
    let square = |x0: f64, x1: f64| Poly2d {
        vertices: vec![[x0, 0.0], [x1, 0.0], [x1, 10.0], [x0, 10.0]],
        types: "LLLL".to_string(),
        closed: true,
    };
    let gt = Label::with_polygons("p1", "pedestrian", vec![square(0.0, 5.0)]);
    let pred = Label::with_polygons("x", "pedestrian", vec![square(0.0, 4.0)]);
    let gts = vec![vec![frame("v", 0, vec![gt])]];
    let preds = vec![vec![frame("v", 0, vec![pred])]];

    let result = evaluate(&gts, &preds, &config(), &options(1)).unwrap();
    assert_relative_eq!(value(&result, "pedestrian", "MOTP"), 80.0, epsilon = 1e-9);

    let no_canvas = Config {
        image_size: None,
        ..config()
    };
    assert!(matches!(
        evaluate(&gts, &preds, &no_canvas, &options(1)),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_integration_json_round_trip() {
    let (gts, preds) = dataset();
    let base = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    // Flatten, decode from JSON and regroup the way label files are loaded
    let flat_gts: Vec<Frame> = gts.into_iter().flatten().collect();
    let flat_preds: Vec<Frame> = preds.into_iter().rev().flatten().collect();
    let gt_json = serde_json::to_string(&flat_gts).unwrap();
    let pred_json = serde_json::to_string(&flat_preds).unwrap();
    let config_json = serde_json::to_string(&config()).unwrap();

    let gts = group_and_sort(serde_json::from_str(&gt_json).unwrap());
    let preds = group_and_sort(serde_json::from_str(&pred_json).unwrap());
    let config: Config = serde_json::from_str(&config_json).unwrap();
    let decoded = evaluate(&gts, &preds, &config, &options(2)).unwrap();

    assert_eq!(base.rows(), decoded.rows());
}

#[test]
fn test_integration_export() {
    let (gts, preds) = dataset();
    let result = evaluate(&gts, &preds, &config(), &options(2)).unwrap();

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["overall"]["name"], "OVERALL");
    assert_eq!(json["classes"][1]["scores"]["MOTA"], -1.0);
    assert_eq!(json["overall"]["tally"]["num_objects"], 8);

    let table = result.to_string();
    assert_eq!(table.lines().count(), 8);
    assert!(table.lines().next().unwrap_or_default().contains("IDF1"));
    assert!(table.contains("AVERAGE"));
    assert!(table.contains("OVERALL"));
}

// =============================================================================
// Test 5: Errors
// =============================================================================

#[test]
fn test_integration_video_count_mismatch() {
    let (gts, mut preds) = dataset();
    preds.pop();
    assert!(matches!(
        evaluate(&gts, &preds, &config(), &options(1)),
        Err(Error::ShapeMismatch(_))
    ));
}

#[test]
fn test_integration_frame_index_mismatch() {
    let (gts, mut preds) = dataset();
    preds[1][1].frame_index = Some(5);
    assert!(matches!(
        evaluate(&gts, &preds, &config(), &options(1)),
        Err(Error::ShapeMismatch(_))
    ));
}

#[test]
fn test_integration_unknown_category() {
    let (mut gts, preds) = dataset();
    gts[1][0]
        .labels
        .get_or_insert_with(Vec::new)
        .push(label("t1", "train", car()));

    let err = evaluate(&gts, &preds, &config(), &options(2)).unwrap_err();
    assert!(matches!(err, Error::UnknownCategory(ref c) if c == "train"));

    let lenient = EvalOptions {
        ignore_unknown_categories: true,
        ..options(2)
    };
    let result = evaluate(&gts, &preds, &config(), &lenient).unwrap();
    let (gts, preds) = dataset();
    let base = evaluate(&gts, &preds, &config(), &options(2)).unwrap();
    assert_eq!(result.rows(), base.rows());
}

#[test]
fn test_integration_invalid_options() {
    let (gts, preds) = dataset();
    let bad = EvalOptions {
        iou_threshold: -0.5,
        ..options(1)
    };
    assert!(matches!(
        evaluate(&gts, &preds, &config(), &bad),
        Err(Error::Config(_))
    ));
}
