use polars::prelude::*;
use rstest::rstest;

use super::*;
use crate::error::{
    CrosstalkError,
    ErrorKind,
};

fn canonical_df() -> DataFrame {
    df![
        "A" => [100.0, 200.0],
        "C" => [80.0, 180.0],
        "G" => [90.0, 190.0],
        "T" => [70.0, 170.0]
    ]
    .unwrap()
}

#[test]
fn frame_from_canonical_df() {
    let frame = IntensityFrame::try_from_df(&canonical_df()).unwrap();
    assert_eq!(frame.len(), 2);
    assert_eq!(frame.row(0), Some([100.0, 80.0, 90.0, 70.0]));
    assert_eq!(frame.row(2), None);
    assert_eq!(frame.channel(Channel::G).to_vec(), vec![90.0, 190.0]);
}

#[test]
fn columns_are_reordered_canonically() {
    let df = df![
        "a" => [1.0],
        "G" => [3.0],
        "c" => [2.0],
        "T" => [4.0]
    ]
    .unwrap();
    let frame = IntensityFrame::try_from_df(&df).unwrap();
    assert_eq!(frame.row(0), Some([1.0, 2.0, 3.0, 4.0]));

    // Writing back keeps the caller's labels and order.
    let layout = ChannelLayout::try_from_df(&df).unwrap();
    assert_eq!(layout.channels(), &[Channel::A, Channel::G, Channel::C, Channel::T]);
    assert_eq!(layout.names()[2].as_str(), "c");
    let out = layout.to_df(&frame).unwrap();
    assert_eq!(out.get_column_names(), df.get_column_names());
    assert!(out.equals(&df));
}

#[test]
fn integer_columns_are_accepted() {
    let df = df![
        "A" => [1i32, 2],
        "C" => [3i64, 4],
        "G" => [5u16, 6],
        "T" => [7.5f32, 8.0]
    ]
    .unwrap();
    let frame = IntensityFrame::try_from_df(&df).unwrap();
    assert_eq!(frame.row(1), Some([2.0, 4.0, 6.0, 8.0]));
}

#[rstest]
#[case::missing_t(df!["A" => [1.0], "C" => [1.0], "G" => [1.0]].unwrap())]
#[case::extra_column(
    df!["A" => [1.0], "C" => [1.0], "G" => [1.0], "T" => [1.0], "N" => [1.0]].unwrap()
)]
#[case::ambiguous(df!["A" => [1.0], "a" => [1.0], "G" => [1.0], "T" => [1.0]].unwrap())]
#[case::unknown_label(df!["A" => [1.0], "X" => [1.0], "G" => [1.0], "T" => [1.0]].unwrap())]
fn schema_errors(#[case] df: DataFrame) {
    let err = IntensityFrame::try_from_df(&df).unwrap_err();
    assert!(matches!(err, CrosstalkError::Schema(_)), "{}", err);
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[rstest]
#[case::negative(df!["A" => [1.0], "C" => [-1.0], "G" => [1.0], "T" => [1.0]].unwrap())]
#[case::nan(df!["A" => [1.0], "C" => [1.0], "G" => [f64::NAN], "T" => [1.0]].unwrap())]
#[case::infinite(df!["A" => [f64::INFINITY], "C" => [1.0], "G" => [1.0], "T" => [1.0]].unwrap())]
#[case::null(df!["A" => [1.0], "C" => [1.0], "G" => [1.0], "T" => [None::<f64>]].unwrap())]
#[case::text(df!["A" => [1.0], "C" => ["high"], "G" => [1.0], "T" => [1.0]].unwrap())]
fn data_integrity_errors(#[case] df: DataFrame) {
    let err = IntensityFrame::try_from_df(&df).unwrap_err();
    assert!(matches!(err, CrosstalkError::DataIntegrity(_)), "{}", err);
}

#[test]
fn negative_values_are_never_coerced() {
    let err = IntensityFrame::try_from_rows(&[[1.0, -0.5, 1.0, 1.0]]).unwrap_err();
    assert!(err.to_string().contains("channel C"));
}

#[test]
fn mismatched_columns_are_rejected() {
    let err = IntensityFrame::try_from_columns(
        vec![1.0, 2.0],
        vec![1.0],
        vec![1.0, 2.0],
        vec![1.0, 2.0],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn empty_frame_round_trips() {
    let frame = IntensityFrame::empty();
    let df = frame.to_df().unwrap();
    assert_eq!(df.height(), 0);
    for (name, dtype) in Channel::schema().iter() {
        assert_eq!(df.column(name.as_str()).unwrap().dtype(), dtype);
    }
    assert_eq!(IntensityFrame::try_from_df(&df).unwrap(), frame);
}

#[rstest]
#[case("AGCT", [Channel::A, Channel::G, Channel::C, Channel::T])]
#[case("tgca", [Channel::T, Channel::G, Channel::C, Channel::A])]
fn channel_orders_parse(
    #[case] order: &str,
    #[case] expected: [Channel; 4],
) {
    assert_eq!(Channel::parse_order(order).unwrap(), expected);
}

#[rstest]
#[case::repeated("AACT")]
#[case::short("ACG")]
#[case::unknown("ACGU")]
fn bad_channel_orders(#[case] order: &str) {
    assert!(Channel::parse_order(order).is_err());
}

#[test]
fn model_serializes_as_calibration_record() {
    let model = CrosstalkModel::try_from_rows([
        [1.0, 0.2, 0.0, 0.0],
        [0.1, 1.0, 0.3, 0.0],
        [0.0, 0.1, 1.0, 0.2],
        [0.0, 0.0, 0.1, 1.0],
    ])
    .unwrap();

    let json = serde_json::to_value(&model).unwrap();
    assert_eq!(json["channels"], serde_json::json!(["A", "C", "G", "T"]));
    let restored: CrosstalkModel = serde_json::from_value(json).unwrap();
    assert_eq!(restored, model);
}

#[test]
fn calibration_in_instrument_order_is_reordered() {
    // Leakage of A into G stored with G listed second.
    let json = r#"{
        "channels": ["A", "G", "C", "T"],
        "mixing": [
            [1.0, 0.0, 0.0, 0.0],
            [0.4, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0]
        ]
    }"#;
    let model: CrosstalkModel = serde_json::from_str(json).unwrap();
    assert_eq!(model.leakage(Channel::A, Channel::G), 0.4);
    assert_eq!(model.leakage(Channel::A, Channel::C), 0.0);
}

#[rstest]
#[case::singular(r#"{"channels": ["A","C","G","T"], "mixing": [[1,1,0,0],[1,1,0,0],[0,0,1,0],[0,0,0,1]]}"#)]
#[case::repeated_channel(r#"{"channels": ["A","A","G","T"], "mixing": [[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]}"#)]
fn bad_calibrations_fail_to_load(#[case] json: &str) {
    assert!(serde_json::from_str::<CrosstalkModel>(json).is_err());
}

#[test]
fn model_inverse_and_normalization() {
    let model = CrosstalkModel::try_from_rows([
        [2.0, 0.5, 0.0, 0.0],
        [0.0, 1.5, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
    .unwrap();

    let product = model.mixing() * model.unmixing();
    assert!((product - nalgebra::Matrix4::identity()).abs().max() < 1e-12);

    let normalized = model.column_normalized().unwrap();
    for column in normalized.mixing().column_iter() {
        assert!((column.sum() - 1.0).abs() < 1e-12);
    }
    assert_eq!(model.difference(&model), 0.0);
    assert_eq!(CrosstalkModel::default(), CrosstalkModel::identity());
}
