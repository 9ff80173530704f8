mod common;

use archive_relay::config::SubmitFailurePolicy;
use archive_relay::gateways::PollOutcome;
use archive_relay::models::StepChange;
use archive_relay::orchestration::RunOutcome;
use archive_relay::state_machine::Step;
use common::*;

#[tokio::test]
async fn test_ingest_without_result_check_completes_in_one_run() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let mut record = harness.create(harness.ingest_request(false)).await;
    assert_eq!(record.step(), Step::Startup);
    let accepted_notice = harness.store.accepted_notice_path(&record);
    let result_artifact = harness.store.result_artifact_path(&record);

    let outcome = harness.orchestrator.start(&mut record).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(harness.stored_ids().await.is_empty());

    let pushes = harness.transfer.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].local_path, accepted_notice);
    assert_eq!(pushes[0].file_info, "X1 ACCEPTED");
    assert!(pushes[0].existed);
    assert!(pushes.iter().all(|push| push.local_path != result_artifact));
    assert_eq!(harness.remote.poll_calls(), 0);
}

#[tokio::test]
async fn test_run_on_startup_is_noop() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let mut record = harness.create(harness.ingest_request(true)).await;
    let outcome = harness.orchestrator.run(&mut record).await;

    assert_eq!(outcome, RunOutcome::NotStarted);
    assert_eq!(harness.remote.submit_calls(), 0);
    assert_eq!(harness.reload(&record).await.step(), Step::Startup);
}

#[tokio::test]
async fn test_poll_not_ready_three_times_then_forward() {
    let harness = Harness::with_config(
        ScriptedRemote::accepting("X1").with_polls(vec![PollOutcome::NotReady; 3]),
        RecordingTransfer::refusing(),
        |config| config.remote.poll_retry_attempts = 1,
    )
    .await;

    let mut record = harness
        .create_at(
            harness.ingest_request(true),
            &[Step::SubmitRetry, Step::AcceptedIdRetry, Step::PollRetry],
        )
        .await;

    for _ in 0..3 {
        let outcome = harness.orchestrator.run(&mut record).await;
        assert_eq!(outcome, RunOutcome::Pending { step: Step::PollRetry });
        assert_eq!(record.step(), Step::PollRetry);
    }

    harness.orchestrator.run(&mut record).await;

    assert_eq!(record.step(), Step::ForwardRetry);
    assert_eq!(harness.remote.poll_calls(), 4);
    assert_eq!(harness.remote.download_calls(), 1);
    assert_eq!(harness.reload(&record).await.step(), Step::ForwardRetry);

    let result = harness.store.result_artifact_path(&record);
    assert_eq!(std::fs::read(&result).unwrap(), harness.remote.result_bytes());
}

#[tokio::test]
async fn test_forward_retry_never_downloads_again() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness
        .create_at(
            harness.ingest_request(true),
            &[Step::SubmitRetry, Step::AcceptedIdRetry, Step::PollRetry],
        )
        .await;

    harness.orchestrator.run(&mut record).await;
    harness.orchestrator.run(&mut record).await;
    assert_eq!(record.step(), Step::ForwardRetry);
    assert_eq!(harness.remote.download_calls(), 1);

    harness.transfer.set_acknowledge(true);
    let outcome = harness.orchestrator.run(&mut record).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(harness.remote.download_calls(), 1);
    assert!(harness.work_files().is_empty());
}

#[tokio::test]
async fn test_dip_lifecycle_forwards_result() {
    let harness = Harness::new(
        ScriptedRemote::accepting("D1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let mut record = harness.create(harness.dip_request()).await;
    let result_artifact = harness.store.result_artifact_path(&record);

    let outcome = harness.orchestrator.start(&mut record).await;

    assert_eq!(outcome, RunOutcome::Completed);
    let pushes = harness.transfer.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].local_path, result_artifact);
    assert_eq!(pushes[0].file_info, "D1 DIP");
    assert_eq!(pushes[0].partner, "partner-b");
    assert!(pushes[0].existed);
    assert!(!result_artifact.exists());
    assert!(harness.stored_ids().await.is_empty());
}

#[tokio::test]
async fn test_rejected_job_produces_exactly_one_error_artifact() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1").with_submit_default(SubmitStep::rejected(412)),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness
        .create_at(harness.ingest_request(true), &[Step::SubmitRetry])
        .await;
    let error_artifact = harness.store.error_artifact_path(&record);

    for _ in 0..4 {
        let outcome = harness.orchestrator.run(&mut record).await;
        assert_eq!(outcome, RunOutcome::Pending { step: Step::Error });
    }

    assert_eq!(record.status(), 412);
    assert_eq!(harness.remote.submit_calls(), 1);
    assert_eq!(harness.work_files(), vec![error_artifact.clone()]);

    let pushes = harness.transfer.pushes();
    assert_eq!(pushes.len(), 4);
    assert!(pushes.iter().all(|push| push.local_path == error_artifact));
    assert!(pushes.iter().all(|push| push.file_info.ends_with("ATR_FAILED")));

    harness.transfer.set_acknowledge(true);
    assert_eq!(
        harness.orchestrator.run(&mut record).await,
        RunOutcome::Completed
    );
    assert!(harness.work_files().is_empty());
    assert!(harness.stored_ids().await.is_empty());
}

#[tokio::test]
async fn test_submit_transport_error_follows_policy() {
    let retrying = Harness::new(
        ScriptedRemote::accepting("X1").with_submit_default(SubmitStep::TransportError),
        RecordingTransfer::refusing(),
    )
    .await;
    let mut record = retrying
        .create_at(retrying.ingest_request(true), &[Step::SubmitRetry])
        .await;
    retrying.orchestrator.run(&mut record).await;
    assert_eq!(record.step(), Step::SubmitRetry);

    let failing = Harness::with_config(
        ScriptedRemote::accepting("X1").with_submit_default(SubmitStep::TransportError),
        RecordingTransfer::refusing(),
        |config| config.remote.submit_failure_policy = SubmitFailurePolicy::Fail,
    )
    .await;
    let mut record = failing
        .create_at(failing.ingest_request(true), &[Step::SubmitRetry])
        .await;
    failing.orchestrator.run(&mut record).await;
    assert_eq!(record.step(), Step::Error);
    assert_eq!(record.status(), 500);
}

#[tokio::test]
async fn test_poll_failure_moves_to_error() {
    let harness = Harness::new(
        ScriptedRemote::accepting("D9").with_poll_default(PollOutcome::Failed { code: 404 }),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness.create(harness.dip_request()).await;
    harness.orchestrator.start(&mut record).await;

    assert_eq!(record.step(), Step::Error);
    assert_eq!(record.status(), 404);
    let pushes = harness.transfer.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].file_info, "D9 DIP_FAILED");
}

#[tokio::test]
async fn test_reload_sees_last_durable_step_only() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness
        .create_at(harness.ingest_request(true), &[Step::SubmitRetry])
        .await;

    // Decided in memory, crashed before the write
    record.try_transition(Step::AcceptedIdRetry, 0).unwrap();
    drop(record);

    let listed = harness.store.list_pending().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].step(), Step::SubmitRetry);
    assert_eq!(listed[0].status(), -2);
}

#[tokio::test]
async fn test_forced_transition_is_tolerated() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness.create(harness.ingest_request(true)).await;
    assert!(record.try_transition(Step::ForwardRetry, 0).is_err());

    let change = record.apply_step(Step::ForwardRetry, 0);
    assert_eq!(change, StepChange::Forced);
    assert_eq!(record.step(), Step::ForwardRetry);
    assert_eq!(record.status(), -5);

    harness.store.update(&record).await.unwrap();
    let reloaded = harness.reload(&record).await;
    assert_eq!(reloaded.step(), Step::ForwardRetry);
    assert_eq!(reloaded.status(), -5);
}

#[tokio::test]
async fn test_forward_without_artifact_fails_to_error() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing(),
    )
    .await;

    let mut record = harness.create(harness.ingest_request(true)).await;
    record.force_step(Step::ForwardRetry, 0);
    harness.store.update(&record).await.unwrap();

    harness.orchestrator.run(&mut record).await;

    assert_eq!(record.step(), Step::Error);
    assert_eq!(record.status(), 500);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let new_request = harness.ingest_request(true);
    let source = new_request.source_path.clone();
    let record = harness.create(new_request).await;
    std::fs::write(harness.store.result_artifact_path(&record), b"atr").unwrap();

    assert!(harness.orchestrator.cleanup(&record).await);
    assert!(harness.orchestrator.cleanup(&record).await);

    assert!(!source.exists());
    assert!(harness.work_files().is_empty());
    assert!(harness.stored_ids().await.is_empty());
}

#[tokio::test]
async fn test_concurrently_removed_record_is_gone() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let mut record = harness
        .create_at(harness.ingest_request(true), &[Step::SubmitRetry])
        .await;
    let stale = record.clone();
    assert!(harness.store.remove(&stale).await);

    let outcome = harness.orchestrator.run(&mut record).await;
    assert_eq!(outcome, RunOutcome::Gone);
}

#[tokio::test]
async fn test_dip_query_file_survives_completion() {
    let harness = Harness::new(
        ScriptedRemote::accepting("D1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let new_request = harness.dip_request();
    std::fs::write(&new_request.source_path, br#"{"$query": []}"#).unwrap();
    let query_file = new_request.source_path.clone();
    let mut record = harness.create(new_request).await;

    let outcome = harness.orchestrator.start(&mut record).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(harness.stored_ids().await.is_empty());
    assert!(query_file.exists());
}

#[tokio::test]
async fn test_transfer_id_persisted_when_not_acknowledged() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing().with_transfer_id(77),
    )
    .await;

    let mut record = harness
        .create_at(
            harness.ingest_request(true),
            &[Step::SubmitRetry, Step::AcceptedIdRetry],
        )
        .await;

    let outcome = harness.orchestrator.run(&mut record).await;

    assert_eq!(
        outcome,
        RunOutcome::Pending {
            step: Step::AcceptedIdRetry
        }
    );
    let reloaded = harness.reload(&record).await;
    assert_eq!(reloaded.transfer_id, Some(77));
    assert_eq!(reloaded.step(), Step::AcceptedIdRetry);
}

#[tokio::test]
async fn test_run_latest_skips_record_removed_since_listing() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::acknowledging(),
    )
    .await;

    let record = harness
        .create_at(harness.ingest_request(true), &[Step::SubmitRetry])
        .await;
    let listed = harness.store.list_pending().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(harness.orchestrator.cleanup(&record).await);

    let outcome = harness
        .orchestrator
        .run_latest(listed[0].kind, listed[0].id)
        .await;

    assert_eq!(outcome, RunOutcome::Gone);
    assert_eq!(harness.remote.submit_calls(), 0);
    assert!(harness.transfer.pushes().is_empty());
    assert!(harness.work_files().is_empty());
}

#[tokio::test]
async fn test_run_latest_uses_stored_step() {
    let harness = Harness::new(
        ScriptedRemote::accepting("X1"),
        RecordingTransfer::refusing(),
    )
    .await;

    let record = harness
        .create_at(harness.ingest_request(true), &[Step::SubmitRetry])
        .await;
    let mut stale = record.clone();
    stale.force_step(Step::Error, 500);

    let outcome = harness.orchestrator.run_latest(stale.kind, stale.id).await;

    assert_eq!(
        outcome,
        RunOutcome::Pending {
            step: Step::AcceptedIdRetry
        }
    );
    assert_eq!(harness.remote.submit_calls(), 1);
}
