use super::*;
use crate::config::DegradationConfig;
use std::collections::VecDeque;
use tokio::time::Instant;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        linear_delay: Duration::from_secs(2),
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        session_wait_ceiling: Duration::from_secs(1800),
    }
}

fn fetcher_with(policy: RetryPolicy, degradation: DegradationConfig) -> ResilientFetcher {
    let agents = (0..5).map(|i| format!("agent-{i}")).collect();
    ResilientFetcher::new(
        policy,
        Arc::new(FailureClassifier::default()),
        Arc::new(IdentityPool::with_offset(agents, 0).unwrap()),
        Arc::new(SessionTelemetry::in_memory()),
        Arc::new(DegradationTracker::new(degradation)),
    )
}

fn fetcher(max_attempts: u32) -> ResilientFetcher {
    fetcher_with(policy(max_attempts), DegradationConfig::default())
}

fn ctx(key: &str) -> FetchContext {
    FetchContext::new(format!("https://news.example.com/{key}"), key)
}

/// Run `fetcher.execute` over a fixed script of outcomes, recording the
/// identity handed to each attempt.
async fn run_script(
    fetcher: &ResilientFetcher,
    key: &str,
    cancel: &CancelToken,
    script: Vec<AttemptOutcome<&'static str>>,
) -> (Result<&'static str, TerminalFailure>, Vec<String>) {
    let mut script: VecDeque<_> = script.into();
    let mut seen = Vec::new();
    let result = fetcher
        .execute(&ctx(key), cancel, |identity| {
            seen.push(identity);
            let next = script
                .pop_front()
                .unwrap_or_else(|| AttemptOutcome::http_status(503, None));
            std::future::ready(next)
        })
        .await;
    (result, seen)
}

#[tokio::test(start_paused = true)]
async fn rate_limited_four_times_then_success() {
    let f = fetcher(5);
    let mut script: Vec<_> = (0..4).map(|_| AttemptOutcome::http_status(429, None)).collect();
    script.push(AttemptOutcome::success("page", Some("<rss>fine</rss>")).with_status(200));

    let start = Instant::now();
    let (result, seen) = run_script(&f, "a", &CancelToken::new(), script).await;
    assert_eq!(result.unwrap(), "page");
    assert!(start.elapsed() >= Duration::from_secs(15));

    let events = f.telemetry().events();
    assert_eq!(events.len(), 5);
    let outcomes: Vec<_> = events.iter().map(|e| e.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            EventOutcome::RetryScheduled,
            EventOutcome::RetryScheduled,
            EventOutcome::RetryScheduled,
            EventOutcome::RetryScheduled,
            EventOutcome::Success
        ]
    );
    let waits: Vec<f64> = events[..4].iter().map(|e| e.wait_duration_seconds).collect();
    assert_eq!(waits, vec![1.0, 2.0, 4.0, 8.0]);
    assert_eq!(events[3].cumulative_wait_seconds, 15.0);
    assert_eq!(events[4].cumulative_wait_seconds, 15.0);
    assert_eq!(events[4].status_code, Some(200));
    assert!(events[..4].iter().all(|e| e.identity_rotated && e.block_kind == BlockKind::RateLimited));
    assert_eq!(f.total_wait(), Duration::from_secs(15));

    // Each 429 rotated the identity before the next attempt.
    assert_eq!(seen, vec!["agent-0", "agent-1", "agent-2", "agent-3", "agent-4"]);
    assert_eq!(events[4].identity.as_deref(), Some("agent-4"));

    // Every attempt was observed: 4 failures, 1 success.
    let status = f.tracker().status();
    assert_eq!(status.total_attempts, 5);
    assert_eq!(status.total_successes, 1);
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn captcha_fails_immediately_without_waiting() {
    let f = fetcher(5);
    let body = r#"<div class="g-recaptcha" data-sitekey="x"></div>"#;
    let start = Instant::now();
    let (result, seen) = run_script(&f, "kw", &CancelToken::new(), vec![AttemptOutcome::success("page", Some(body))]).await;

    assert_eq!(
        result.unwrap_err(),
        TerminalFailure::NonRetryable {
            kind: BlockKind::CaptchaChallenge,
            attempts_made: 1
        }
    );
    assert_eq!(seen.len(), 1);
    assert!(start.elapsed() < Duration::from_millis(1));
    assert_eq!(f.total_wait(), Duration::ZERO);

    let events = f.telemetry().events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, EventOutcome::PermanentFailure);
    assert_eq!(events[0].failure_reason, Some(FailureReason::CaptchaRequired));
    assert_eq!(events[0].wait_duration_seconds, 0.0);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_permanent() {
    let f = fetcher(5);
    let (result, _) = run_script(&f, "gone", &CancelToken::new(), vec![AttemptOutcome::http_status(404, None)]).await;
    let err = result.unwrap_err();
    assert_eq!(err.block_kind(), Some(BlockKind::PermanentNotFound));
    assert_eq!(err.attempts_made(), 1);
    assert_eq!(f.telemetry().events()[0].failure_reason, Some(FailureReason::Permanent));
}

#[tokio::test(start_paused = true)]
async fn exhausted_operations_degrade_the_session() {
    let f = fetcher_with(policy(1), DegradationConfig::default());
    for key in ["one", "two", "three"] {
        let (result, _) = run_script(&f, key, &CancelToken::new(), vec![]).await;
        assert!(matches!(
            result.unwrap_err(),
            TerminalFailure::Exhausted {
                kind: BlockKind::ServerError,
                attempts_made: 1,
                cause: Exhaustion::Attempts
            }
        ));
        // The success-rate check applies from the first attempt.
        assert!(f.tracker().is_degraded(), "after operation {key}");
    }
    let status = f.tracker().status();
    assert_eq!(status.warnings.len(), 2);
    assert!(status.warnings[1].contains("consecutive"));
    let info = f.telemetry().degradation_info();
    assert!(info.is_degraded);
    assert!(info.degradation_reason.unwrap().contains("success rate"));
    assert_eq!(f.telemetry().summarize().failure_count, 3);
}

#[tokio::test(start_paused = true)]
async fn larger_sample_size_defers_success_rate_check() {
    let degradation = DegradationConfig {
        min_success_threshold: 0.6,
        max_consecutive_failures: 3,
        min_sample_size: 5,
    };
    let f = fetcher_with(policy(1), degradation);
    for (i, key) in ["one", "two", "three"].into_iter().enumerate() {
        let _ = run_script(&f, key, &CancelToken::new(), vec![]).await;
        assert_eq!(f.tracker().is_degraded(), i == 2, "after operation {key}");
    }
    let info = f.telemetry().degradation_info();
    assert!(info.degradation_reason.unwrap().contains("consecutive"));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_with_retries_counts_every_attempt() {
    let f = fetcher(3);
    let (result, seen) = run_script(&f, "x", &CancelToken::new(), vec![]).await;
    assert_eq!(result.unwrap_err().reason(), "exhausted");
    assert_eq!(seen.len(), 3);
    let events = f.telemetry().events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].outcome, EventOutcome::PermanentFailure);
    assert_eq!(events[2].failure_reason, Some(FailureReason::Exhausted));
    assert_eq!(events[2].cumulative_wait_seconds, 3.0);
    assert_eq!(f.tracker().status().total_failures, 3);
    // Server errors do not rotate.
    assert!(seen.iter().all(|s| s == "agent-0"));
}

#[tokio::test(start_paused = true)]
async fn forbidden_rotates_identity_timeout_does_not() {
    let f = fetcher(5);
    let (result, seen) = run_script(
        &f,
        "f",
        &CancelToken::new(),
        vec![
            AttemptOutcome::failed(crate::retry::AttemptError::Timeout),
            AttemptOutcome::http_status(403, Some("Access denied")),
            AttemptOutcome::success("ok", None),
        ],
    )
    .await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(seen, vec!["agent-0", "agent-0", "agent-1"]);
    let events = f.telemetry().events();
    assert!(!events[0].identity_rotated);
    assert_eq!(events[0].wait_duration_seconds, 2.0);
    assert!(events[1].identity_rotated);
    assert_eq!(f.identities().current(), "agent-1");
}

#[tokio::test(start_paused = true)]
async fn malformed_response_is_retried() {
    let f = fetcher(5);
    let (result, _) = run_script(
        &f,
        "m",
        &CancelToken::new(),
        vec![AttemptOutcome::malformed(Some("")), AttemptOutcome::success("ok", None)],
    )
    .await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(f.telemetry().events()[0].block_kind, BlockKind::MalformedResponse);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_returns_promptly() {
    let mut p = policy(5);
    p.initial_delay = Duration::from_secs(30);
    let f = fetcher_with(p, DegradationConfig::default());
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let (result, seen) = run_script(&f, "c", &token, vec![]).await;
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(
        result.unwrap_err(),
        TerminalFailure::Cancelled {
            last_kind: Some(BlockKind::ServerError),
            attempts_made: 1
        }
    );
    assert_eq!(seen.len(), 1);
    let events = f.telemetry().events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].failure_reason, Some(FailureReason::Cancelled));
    // Cancellation is not a health observation.
    assert_eq!(f.tracker().status().total_attempts, 1);
}

#[tokio::test]
async fn cancelled_before_first_attempt_records_nothing() {
    let f = fetcher(5);
    let token = CancelToken::new();
    token.cancel();
    let (result, seen) = run_script(&f, "c", &token, vec![AttemptOutcome::success("ok", None)]).await;
    assert_eq!(
        result.unwrap_err(),
        TerminalFailure::Cancelled {
            last_kind: None,
            attempts_made: 0
        }
    );
    assert!(seen.is_empty());
    assert!(f.telemetry().events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_a_hung_attempt() {
    let f = fetcher(5);
    let token = CancelToken::new().with_timeout(Duration::from_secs(5));
    let result = f
        .execute(&ctx("hang"), &token, |_identity| {
            std::future::pending::<AttemptOutcome<()>>()
        })
        .await;
    assert!(result.unwrap_err().is_cancelled());
    assert!(f.telemetry().events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_wait_ceiling_spans_operations() {
    let mut p = policy(10);
    p.session_wait_ceiling = Duration::from_secs(5);
    let f = fetcher_with(p, DegradationConfig::default());

    // Waits 1s + 2s = 3s; the next 4s would exceed 5s.
    let (result, _) = run_script(&f, "first", &CancelToken::new(), vec![]).await;
    assert_eq!(
        result.unwrap_err(),
        TerminalFailure::Exhausted {
            kind: BlockKind::ServerError,
            attempts_made: 3,
            cause: Exhaustion::WaitCeiling
        }
    );
    assert_eq!(f.total_wait(), Duration::from_secs(3));

    // 3s + 1s fits, 4s + 2s does not.
    let (result, _) = run_script(&f, "second", &CancelToken::new(), vec![]).await;
    assert_eq!(result.unwrap_err().attempts_made(), 2);
    assert_eq!(f.total_wait(), Duration::from_secs(4));
    // Per-operation cumulative wait restarts for each logical key.
    let last_second = f
        .telemetry()
        .events()
        .into_iter()
        .filter(|e| e.context.logical_key == "second")
        .last()
        .unwrap();
    assert_eq!(last_second.cumulative_wait_seconds, 1.0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_operations_share_ceiling_and_rotation() {
    let mut p = policy(10);
    p.session_wait_ceiling = Duration::from_secs(5);
    let f = fetcher_with(p, DegradationConfig::default());
    let cancel = CancelToken::new();
    let limited = || (0..10).map(|_| AttemptOutcome::http_status(429, None)).collect::<Vec<_>>();

    let ((a, seen_a), (b, seen_b)) = tokio::join!(
        run_script(&f, "alpha", &cancel, limited()),
        run_script(&f, "beta", &cancel, limited()),
    );
    for result in [a, b] {
        assert!(matches!(
            result.unwrap_err(),
            TerminalFailure::Exhausted {
                kind: BlockKind::RateLimited,
                cause: Exhaustion::WaitCeiling,
                ..
            }
        ));
    }

    // Reserved waits never exceed the ceiling and match what was logged.
    assert!(f.total_wait() <= Duration::from_secs(5));
    let events = f.telemetry().events();
    let logged: f64 = events
        .iter()
        .filter(|e| e.outcome == EventOutcome::RetryScheduled)
        .map(|e| e.wait_duration_seconds)
        .sum();
    assert_eq!(Duration::from_secs_f64(logged), f.total_wait());

    // Each operation's events keep their own attempt order.
    for key in ["alpha", "beta"] {
        let attempts: Vec<u32> = events
            .iter()
            .filter(|e| e.context.logical_key == key)
            .map(|e| e.attempt_number)
            .collect();
        let expected: Vec<u32> = (1..=attempts.len() as u32).collect();
        assert!(!attempts.is_empty());
        assert_eq!(attempts, expected, "attempt order for {key}");
    }

    // Every rotation drew the next identity in round-robin order, with no
    // identity handed out twice.
    let rotations = events.iter().filter(|e| e.identity_rotated).count();
    let mut rotated: Vec<String> = seen_a[1..].iter().chain(&seen_b[1..]).cloned().collect();
    rotated.sort();
    let expected: Vec<String> = (1..=rotations).map(|i| format!("agent-{i}")).collect();
    assert_eq!(rotated, expected);
    assert_eq!(f.identities().current(), format!("agent-{rotations}"));
}
