use assert_approx_eq::assert_approx_eq;
use polars::prelude::*;
use rstest::{
    fixture,
    rstest,
};
use xtalk::prelude::*;

#[fixture]
fn reference_model() -> CrosstalkModel {
    CrosstalkModel::try_from_rows([
        [1.0, 0.12, 0.03, 0.0],
        [0.09, 1.0, 0.10, 0.02],
        [0.02, 0.08, 1.0, 0.09],
        [0.0, 0.03, 0.12, 1.0],
    ])
    .unwrap()
}

#[rstest]
fn dataframe_correction_keeps_layout(reference_model: CrosstalkModel) {
    let df = df![
        "a" => [120.0, 15.0, 40.0],
        "g" => [10.0, 200.0, 30.0],
        "c" => [25.0, 30.0, 300.0],
        "t" => [5.0, 20.0, 35.0]
    ]
    .unwrap();

    let corrector = CrosstalkCorrector::new(reference_model.clone());
    let out = corrector.correct_df(&df).unwrap();

    assert_eq!(out.get_column_names(), df.get_column_names());
    assert_eq!(out.height(), df.height());

    let frame = IntensityFrame::try_from_df(&df).unwrap();
    let expected = corrector.correct(&frame).unwrap();
    let c = out.column("c").unwrap().f64().unwrap();
    for (i, value) in c.into_no_null_iter().enumerate() {
        assert_approx_eq!(value, expected.row(i).unwrap()[Channel::C.index()]);
    }
}

#[rstest]
fn estimated_model_matches_the_simulation(reference_model: CrosstalkModel) {
    let sample = SyntheticTrace::default()
        .with_n(300)
        .with_noise_level(0.002)
        .with_model(Some(reference_model))
        .with_seed(Some(2024))
        .generate()
        .unwrap();

    let estimation = CrosstalkEstimator::default()
        .with_quantile_low(0.95)
        .estimate(&sample.frame)
        .unwrap();
    let truth = sample.model.column_normalized().unwrap();

    let diff = estimation.model.difference(&truth);
    assert!(diff < 0.02, "mean matrix difference {}", diff);
}

#[rstest]
fn batch_reports_reference_differences(reference_model: CrosstalkModel) {
    let sequences = (0..4)
        .map(|seed| {
            let sample = SyntheticTrace::default()
                .with_n(200)
                .with_model(Some(reference_model.clone()))
                .with_seed(Some(seed))
                .generate()
                .unwrap();
            Sequence::new(format!("seq{}", seed), sample.frame)
                .with_reference(Some(reference_model.clone()))
        })
        .chain(std::iter::once(Sequence::new("blank", IntensityFrame::empty())))
        .collect::<Vec<_>>();

    let processor = BatchProcessor::new(CrosstalkCorrector::new(reference_model))
        .with_observer(std::sync::Arc::new(NoopObserver));
    let reports = processor.process(&sequences);
    let summary = BatchSummary::from_reports(&reports);

    assert_eq!(summary.corrected, 4);
    assert_eq!(summary.empty, 1);
    assert_eq!(summary.to_string(), "0 of 5 sequences failed, 1 empty");

    for report in reports.iter().take(4) {
        match &report.outcome {
            SequenceOutcome::Corrected {
                frame,
                matrix_difference,
                ..
            } => {
                assert_eq!(*matrix_difference, Some(0.0));
                assert!(frame.data().iter().all(|v| *v >= 0.0));
            },
            other => panic!("{} was not corrected: {:?}", report.name, other),
        }
    }
}

#[test]
fn missing_channel_fails_before_any_work() {
    let df = df![
        "A" => [1.0, 2.0],
        "C" => [1.0, 2.0],
        "G" => [1.0, 2.0]
    ]
    .unwrap();

    let err = CrosstalkCorrector::default().correct_df(&df).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(Sequence::try_from_df("partial", &df).is_err());
}
