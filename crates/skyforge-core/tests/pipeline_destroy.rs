//! Integration tests for best-effort destroy.

mod support;

use skyforge_core::error::DeployError;
use skyforge_core::pipeline::{DestroyOptions, run_destroy};

use support::{Failure, ScriptedStage, entries, journal, local_config};

#[test]
fn stages_are_destroyed_in_reverse_inside_their_deploy_context() {
    let log = journal();
    let stages = vec![
        ScriptedStage::new("01-state", &log).exposing("cloud").boxed(),
        ScriptedStage::new("02-infrastructure", &log)
            .exposing("kubernetes")
            .boxed(),
        ScriptedStage::new("03-services", &log).boxed(),
    ];

    let report = run_destroy(&stages, &local_config(), &DestroyOptions::default()).unwrap();

    assert!(report.succeeded());
    assert_eq!(
        entries(&log),
        vec![
            "refresh:01-state[]",
            "refresh:02-infrastructure[cloud]",
            "refresh:03-services[cloud,kubernetes]",
            "destroy:03-services[cloud,kubernetes]",
            "destroy:02-infrastructure[cloud]",
            "destroy:01-state[]",
        ]
    );
    assert!(report.outputs.contains_stage("02-infrastructure"));
}

#[test]
fn failing_stage_is_recorded_and_the_rest_still_run() {
    let log = journal();
    let stages = vec![
        ScriptedStage::new("01-state", &log).boxed(),
        ScriptedStage::new("02-infrastructure", &log)
            .failing_destroy(Failure::Tool)
            .boxed(),
        ScriptedStage::new("03-services", &log).boxed(),
    ];

    let report = run_destroy(&stages, &local_config(), &DestroyOptions::default()).unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.failed_stages(), vec!["02-infrastructure"]);
    assert_eq!(report.status.get("01-state"), Some(&true));
    assert_eq!(report.status.get("03-services"), Some(&true));
    assert!(report.errors["02-infrastructure"].contains("terraform apply failed"));
    assert!(entries(&log).contains(&"destroy:01-state[]".to_string()));
}

#[test]
fn refresh_failure_does_not_block_teardown() {
    let log = journal();
    let stages = vec![
        ScriptedStage::new("01-state", &log)
            .failing_refresh(Failure::Tool)
            .boxed(),
        ScriptedStage::new("02-infrastructure", &log).boxed(),
    ];

    let report = run_destroy(&stages, &local_config(), &DestroyOptions::default()).unwrap();

    assert!(report.succeeded());
    assert!(!report.outputs.contains_stage("01-state"));
    assert_eq!(report.status.len(), 2);
}

#[test]
fn without_ignore_errors_the_first_failure_propagates() {
    let log = journal();
    let stages = vec![
        ScriptedStage::new("01-state", &log).boxed(),
        ScriptedStage::new("02-infrastructure", &log)
            .failing_destroy(Failure::Tool)
            .boxed(),
    ];
    let options = DestroyOptions {
        ignore_errors: false,
        ..Default::default()
    };

    let err = run_destroy(&stages, &local_config(), &options).unwrap_err();

    assert!(matches!(err, DeployError::Tool { .. }));
    assert!(!entries(&log).contains(&"destroy:01-state[]".to_string()));
}

#[test]
fn invariant_violation_aborts_even_when_ignoring_errors() {
    let log = journal();
    let stages = vec![
        ScriptedStage::new("01-state", &log).boxed(),
        ScriptedStage::new("02-infrastructure", &log)
            .failing_destroy(Failure::Invariant)
            .boxed(),
    ];

    let err = run_destroy(&stages, &local_config(), &DestroyOptions::default()).unwrap_err();

    assert!(matches!(err, DeployError::Invariant(_)));
    assert!(!entries(&log).contains(&"destroy:01-state[]".to_string()));
}
