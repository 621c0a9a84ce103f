//! Full detect + stitch pipeline runs over synthetic pressure grids.

mod common;

use common::{moving_low_run, pressure_grid, spec_2deg, PERIOD_HOURS};
use stormtrack::detect::params::DetectParams;
use stormtrack::grid::FieldGrid;
use stormtrack::pipeline::{run_track_types, CancelToken, Pipeline};
use stormtrack::policy::TrackTypePolicy;
use stormtrack::stitch::gap_fill::fill_gaps;
use stormtrack::stitch::params::StitchParams;
use stormtrack::stormtrack_errors::StormTrackError;

fn tc_policy(max_gap_steps: u32, min_duration_steps: u32) -> TrackTypePolicy {
    TrackTypePolicy::new(
        "tc",
        DetectParams::builder("psl")
            .search_radius_deg(6.0)
            .contour(200.0, 10.0)
            .build()
            .unwrap(),
        StitchParams::builder()
            .max_displacement_deg(8.0)
            .max_gap_steps(max_gap_steps)
            .min_duration_steps(min_duration_steps)
            .build()
            .unwrap(),
    )
}

#[test]
fn full_pipeline_tracks_a_moving_low() {
    let spec = spec_2deg();
    let grids = moving_low_run(&spec, 12, 40, 52, 1); // lat 15, one cell east per step
    let pipeline = Pipeline::new(tc_policy(0, 3), PERIOD_HOURS).unwrap();
    let report = pipeline.run(&grids, &CancelToken::new()).unwrap();

    assert!(!report.cancelled);
    assert!(report.failures.is_empty());
    assert_eq!(report.trajectories.len(), 1);

    let track = &report.trajectories[0];
    assert_eq!(track.points.len(), 12);
    assert_eq!(track.duration_steps(), 12);
    let cols: Vec<usize> = track.points.iter().map(|p| p.i).collect();
    assert_eq!(cols, (40..52).collect::<Vec<_>>());
}

#[test]
fn parallel_run_matches_sequential_run() {
    let spec = spec_2deg();
    // two independent storms, one per hemisphere
    let grids: Vec<_> = (0..10usize)
        .map(|k| {
            pressure_grid(
                &spec,
                k as u32 + 1,
                &[(120 + k, 30, 600.0), (40 + k, 52, 600.0)],
            )
        })
        .collect();

    let pipeline = Pipeline::new(tc_policy(0, 3), PERIOD_HOURS).unwrap();
    let sequential = pipeline.run(&grids, &CancelToken::new()).unwrap();
    let parallel = pipeline.run_parallel(&grids, 4, &CancelToken::new()).unwrap();

    assert_eq!(sequential.trajectories, parallel.trajectories);
    assert_eq!(sequential.failures.len(), parallel.failures.len());
    assert_eq!(sequential.trajectories.len(), 2);
}

#[test]
fn rerun_is_idempotent() {
    let spec = spec_2deg();
    let grids = moving_low_run(&spec, 8, 40, 52, 1);
    let pipeline = Pipeline::new(tc_policy(0, 3), PERIOD_HOURS).unwrap();

    let first = pipeline.run(&grids, &CancelToken::new()).unwrap();
    let second = pipeline.run(&grids, &CancelToken::new()).unwrap();
    assert_eq!(first.trajectories, second.trajectories);
}

#[test]
fn failed_step_is_reported_and_stitched_as_gap() {
    let spec = spec_2deg();
    let mut grids = moving_low_run(&spec, 10, 40, 52, 1);
    // step 6 has no pressure field at all
    let time = grids[5].time();
    grids[5] = FieldGrid::new(spec.clone(), time);

    let pipeline = Pipeline::new(tc_policy(1, 3), PERIOD_HOURS).unwrap();
    let report = pipeline.run(&grids, &CancelToken::new()).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, 6);
    assert!(matches!(
        report.failures[0].error,
        StormTrackError::MissingVariable { .. }
    ));

    // the storm bridges the failed step: 9 observed points spanning 10 steps
    assert_eq!(report.trajectories.len(), 1);
    let track = &report.trajectories[0];
    assert_eq!(track.duration_steps(), 9);
    assert_eq!(track.span_steps(), 10);

    // gap interpolation restores one point per step
    let filled = fill_gaps(track, &spec, PERIOD_HOURS);
    assert_eq!(filled.points.len(), 10);
    assert_eq!(filled.duration_steps(), 9);
}

#[test]
fn cancellation_before_start_yields_cancelled_report() {
    let spec = spec_2deg();
    let grids = moving_low_run(&spec, 6, 40, 52, 1);
    let pipeline = Pipeline::new(tc_policy(0, 3), PERIOD_HOURS).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let report = pipeline.run(&grids, &token).unwrap();
    assert!(report.cancelled);
    assert!(report.trajectories.is_empty());
}

#[test]
fn out_of_order_grids_are_rejected() {
    let spec = spec_2deg();
    let mut grids = moving_low_run(&spec, 4, 40, 52, 1);
    grids.reverse();

    let pipeline = Pipeline::new(tc_policy(0, 1), PERIOD_HOURS).unwrap();
    let err = pipeline.run(&grids, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, StormTrackError::OutOfOrderTimeStep { .. }));
}

#[test]
fn track_types_run_independently() {
    let spec = spec_2deg();
    let grids = moving_low_run(&spec, 8, 40, 52, 1);

    let policies = vec![tc_policy(0, 3), {
        let mut relaxed = tc_policy(1, 1);
        relaxed.name = "etc".into();
        relaxed
    }];
    let reports = run_track_types(&policies, &grids, PERIOD_HOURS, &CancelToken::new());

    assert_eq!(reports.len(), 2);
    let tc = reports[0].as_ref().unwrap();
    let etc = reports[1].as_ref().unwrap();
    assert_eq!(tc.track_type, "tc");
    assert_eq!(etc.track_type, "etc");
    assert_eq!(tc.trajectories.len(), 1);
    assert_eq!(etc.trajectories.len(), 1);
}

#[test]
fn malformed_policy_is_fatal_before_the_run() {
    let mut policy = tc_policy(0, 3);
    policy.stitch.max_displacement_deg = f64::NAN;
    assert!(matches!(
        Pipeline::new(policy, PERIOD_HOURS),
        Err(StormTrackError::InvalidStitchParameter(_))
    ));
}
