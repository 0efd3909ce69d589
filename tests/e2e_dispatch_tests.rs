//! End-to-end tests for routing, per-site queues and shutdown

mod common;

use autofanfic::fanfic::{DispatchError, OutcomeStatus, SubmitOutcome, FFNET_SITE};
use autofanfic::notifications::NotificationKind;
use common::{Pipeline, ScriptedDownloader, HOUR, MINUTE};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_disabled_ffnet_is_not_downloaded() {
    let pipeline = Pipeline::builder(ScriptedDownloader::new(OutcomeStatus::Success))
        .disable_site(FFNET_SITE)
        .build();

    let outcome = pipeline
        .submit("https://m.fanfiction.net/s/12345/3/Some-Story")
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::SiteDisabled {
            site_key: "ffnet".to_string(),
            url: "www.fanfiction.net/s/12345/".to_string(),
        }
    );
    let events = pipeline.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, NotificationKind::SiteDisabled);
    assert_eq!(events[0].url, "www.fanfiction.net/s/12345/");

    tokio::time::sleep(HOUR).await;
    assert!(pipeline.downloader.calls().is_empty());
    assert!(pipeline.dispatcher.active_sites().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_other_sites_unaffected_by_disabled_ffnet() {
    let pipeline = Pipeline::builder(ScriptedDownloader::new(OutcomeStatus::Success))
        .disable_site(FFNET_SITE)
        .build();

    let outcome = pipeline.submit("https://www.royalroad.com/fiction/555/title").await;
    pipeline.wait_for_notifications(1).await;

    assert!(matches!(outcome, SubmitOutcome::Enqueued { ref site_key, .. } if site_key == "royalroad"));
    assert_eq!(pipeline.notifier.kinds(), [NotificationKind::TerminalSuccess]);
}

#[tokio::test(start_paused = true)]
async fn test_sites_run_concurrently() {
    let downloader =
        ScriptedDownloader::new(OutcomeStatus::Success).with_latency(MINUTE * 10);
    let pipeline = Pipeline::builder(downloader).build();
    let start = Instant::now();

    pipeline.submit("https://archiveofourown.org/works/1").await;
    pipeline.submit("https://www.royalroad.com/fiction/2").await;
    pipeline.wait_for_notifications(2).await;

    let calls = pipeline.downloader.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.started == start));

    let mut sites = pipeline.dispatcher.active_sites().await;
    sites.sort();
    assert_eq!(sites, ["ao3", "royalroad"]);
}

#[tokio::test(start_paused = true)]
async fn test_same_site_runs_in_submission_order() {
    let downloader =
        ScriptedDownloader::new(OutcomeStatus::Success).with_latency(MINUTE * 10);
    let pipeline = Pipeline::builder(downloader).build();

    for id in 1..=3 {
        pipeline
            .submit(&format!("https://archiveofourown.org/works/{}", id))
            .await;
    }
    pipeline.wait_for_notifications(3).await;

    let calls = pipeline.downloader.calls();
    let urls: Vec<_> = calls.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        [
            "archiveofourown.org/works/1",
            "archiveofourown.org/works/2",
            "archiveofourown.org/works/3",
        ]
    );
    for pair in calls.windows(2) {
        assert!(pair[1].started >= pair[0].finished);
    }
}

#[tokio::test(start_paused = true)]
async fn test_waiting_retry_does_not_block_site() {
    let downloader = ScriptedDownloader::new(OutcomeStatus::Success)
        .with_script("archiveofourown.org/works/1", vec![OutcomeStatus::Failure]);
    let pipeline = Pipeline::builder(downloader).build();
    let start = Instant::now();

    pipeline.submit("https://archiveofourown.org/works/1").await;
    pipeline.submit("https://archiveofourown.org/works/2").await;
    pipeline.wait_for_notifications(2).await;

    let first = pipeline.downloader.calls_for("archiveofourown.org/works/1");
    let second = pipeline.downloader.calls_for("archiveofourown.org/works/2");
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].started, start);
    assert_eq!(first[1].started - start, MINUTE);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_submissions_are_independent_jobs() {
    let pipeline = Pipeline::always(OutcomeStatus::Success);

    let a = pipeline.submit("https://archiveofourown.org/works/7").await;
    let b = pipeline.submit("https://archiveofourown.org/works/7").await;
    pipeline.wait_for_notifications(2).await;

    match (a, b) {
        (
            SubmitOutcome::Enqueued { job_id: first, .. },
            SubmitOutcome::Enqueued { job_id: second, .. },
        ) => assert_ne!(first, second),
        other => panic!("unexpected outcomes: {:?}", other),
    }
    assert_eq!(pipeline.downloader.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_pending_retries() {
    let pipeline = Pipeline::always(OutcomeStatus::Failure);

    pipeline.submit("https://archiveofourown.org/works/1").await;
    pipeline.wait_for_calls(1).await;
    pipeline.dispatcher.shutdown().await;

    tokio::time::sleep(HOUR * 13).await;
    assert_eq!(pipeline.downloader.calls().len(), 1);
    assert!(pipeline.shutdown.is_cancelled());
    assert!(!pipeline.dispatcher.is_accepting());
    assert_eq!(
        pipeline
            .dispatcher
            .submit("https://archiveofourown.org/works/2", false)
            .await,
        Err(DispatchError::ShuttingDown)
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_attempt() {
    let downloader = ScriptedDownloader::new(OutcomeStatus::Success)
        .with_latency(Duration::from_secs(20));
    let pipeline = Pipeline::builder(downloader).build();

    pipeline.submit("https://archiveofourown.org/works/1").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    pipeline.dispatcher.shutdown().await;

    assert_eq!(pipeline.downloader.calls().len(), 1);
    assert_eq!(pipeline.notifier.kinds(), [NotificationKind::TerminalSuccess]);
}
