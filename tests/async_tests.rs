//! Async integration tests for the scheduler.
//!
//! These tests are only compiled when the `async` feature is enabled.

#![cfg(feature = "async")]

use std::time::Duration;

use calibrate::model::RandomSearch;
use calibrate::{Candidate, EvalContext, Scheduler, SearchSpace, StopReason};

fn space() -> SearchSpace {
    SearchSpace::builder()
        .param("car_sigma", 0.0, 1.0)
        .param("car_tau", 0.1, 2.0)
        .build()
        .unwrap()
}

fn divergence(c: &Candidate, _: &EvalContext) -> Result<Vec<f64>, String> {
    let sigma = c.get("car_sigma").ok_or_else(|| "missing car_sigma".to_owned())?;
    let tau = c.get("car_tau").ok_or_else(|| "missing car_tau".to_owned())?;
    Ok(vec![(sigma - 0.5).abs(), (tau - 1.0).abs()])
}

#[tokio::test]
async fn test_run_async_basic() {
    let report = Scheduler::builder(divergence)
        .model(RandomSearch::with_seed(space(), 42))
        .workers(3)
        .budget(15)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
        .run_async()
        .await
        .expect("async run should succeed");

    assert_eq!(report.issued, 15);
    assert_eq!(report.observations.len(), 15);
    assert_eq!(report.stop_reason, StopReason::BudgetExhausted);
    let best = report.best().expect("should have a best observation");
    assert!(best.fitness <= 0.0);
}

#[tokio::test]
async fn test_run_async_all_failures() {
    let report = Scheduler::builder(|_: &Candidate, _: &EvalContext| {
        Err::<f64, _>("simulator not found".to_owned())
    })
    .model(RandomSearch::with_seed(space(), 1))
    .workers(2)
    .budget(8)
    .poll_interval(Duration::from_millis(10))
    .build()
    .unwrap()
    .run_async()
    .await
    .unwrap();

    assert_eq!(report.issued, 8);
    assert_eq!(report.failed, 8);
    assert!(report.observations.is_empty());
    assert!(report.best().is_none());
}

#[tokio::test]
async fn test_cancel_while_awaiting() {
    let scheduler = Scheduler::builder(|c: &Candidate, ctx: &EvalContext| {
        std::thread::sleep(Duration::from_millis(10));
        divergence(c, ctx)
    })
    .model(RandomSearch::with_seed(space(), 2))
    .workers(2)
    .budget(10_000)
    .poll_interval(Duration::from_millis(10))
    .build()
    .unwrap();

    let handle = scheduler.handle();
    let run = tokio::spawn(scheduler.run_async());

    while handle.issued() < 4 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.cancel());
    assert!(handle.is_shut_down());

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(handle.stop_reason(), Some(StopReason::Cancelled));
    assert!(report.issued < 10_000);
}

#[tokio::test]
async fn test_run_until_ctrl_c_finishes_without_interrupt() {
    let report = Scheduler::builder(divergence)
        .model(RandomSearch::with_seed(space(), 3))
        .workers(2)
        .budget(6)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
        .run_until_ctrl_c()
        .await
        .unwrap();

    assert_eq!(report.issued, 6);
    assert_eq!(report.stop_reason, StopReason::BudgetExhausted);
}
