use std::collections::VecDeque;
use std::time::Duration;

use dataport::error::DataportError;
use dataport::job::{await_completion, CancelToken, JobKind, JobState, JobStatus, PollOptions};

fn scripted(statuses: &[JobStatus]) -> VecDeque<JobStatus> {
    statuses.iter().copied().collect()
}

#[test]
fn paused_is_not_terminal_and_finish_returns_payload() {
    let mut script = scripted(&[
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Finished,
    ]);
    let mut polls = 0;

    let payload = await_completion(
        JobKind::Etl,
        "etl-1",
        |id| {
            polls += 1;
            assert_eq!(id, "etl-1");
            let status = script.pop_front().expect("polled past the script");
            Ok(JobState::with_payload(status, format!("dest-{polls}")))
        },
        &PollOptions::new(Duration::ZERO),
    )
    .expect("finished");

    assert_eq!(polls, 4);
    assert_eq!(payload.as_deref(), Some("dest-4"));
}

#[test]
fn many_pauses_keep_polling() {
    let mut script = scripted(&[JobStatus::Paused; 10]);
    script.push_back(JobStatus::Finished);

    let result = await_completion::<(), _>(
        JobKind::Release,
        "v1",
        |_| Ok(JobState::new(script.pop_front().expect("script"))),
        &PollOptions::new(Duration::ZERO),
    );
    assert!(result.is_ok());
    assert!(script.is_empty());
}

#[test]
fn failed_and_interrupted_carry_their_status() {
    for terminal in [JobStatus::Failed, JobStatus::Interrupted] {
        let mut script = scripted(&[JobStatus::Pending, JobStatus::Running, terminal]);

        let err = await_completion::<(), _>(
            JobKind::Import,
            "import-7",
            |_| Ok(JobState::new(script.pop_front().expect("script"))),
            &PollOptions::new(Duration::ZERO),
        )
        .expect_err("terminal failure");

        match err {
            DataportError::JobFailed {
                kind,
                job_id,
                status,
            } => {
                assert_eq!(kind, JobKind::Import);
                assert_eq!(job_id, "import-7");
                assert_eq!(status, terminal);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn timeout_surfaces_last_status() {
    let options =
        PollOptions::new(Duration::from_millis(5)).with_timeout(Duration::from_millis(40));

    let err = await_completion::<(), _>(
        JobKind::Export,
        "job-9",
        |_| Ok(JobState::new(JobStatus::Running)),
        &options,
    )
    .expect_err("should time out");

    match err {
        DataportError::JobTimedOut {
            status,
            elapsed_secs,
            ..
        } => {
            assert_eq!(status, JobStatus::Running);
            assert!(elapsed_secs >= 0.04);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn cancelled_token_stops_before_first_poll() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut polls = 0;

    let err = await_completion::<(), _>(
        JobKind::Evaluation,
        "eval-1",
        |_| {
            polls += 1;
            Ok(JobState::new(JobStatus::Running))
        },
        &PollOptions::new(Duration::ZERO).with_cancel(cancel),
    )
    .expect_err("cancelled");

    assert_eq!(polls, 0);
    assert!(matches!(err, DataportError::Cancelled { kind: JobKind::Evaluation, .. }));
}

#[test]
fn cancellation_is_observed_between_polls() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut polls = 0;

    let err = await_completion::<(), _>(
        JobKind::Export,
        "job-3",
        |_| {
            polls += 1;
            if polls == 2 {
                trigger.cancel();
            }
            Ok(JobState::new(JobStatus::Pending))
        },
        &PollOptions::new(Duration::ZERO).with_cancel(cancel),
    )
    .expect_err("cancelled");

    assert_eq!(polls, 2);
    assert!(matches!(err, DataportError::Cancelled { .. }));
}
