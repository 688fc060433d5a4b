use resilience::monitor::AlwaysHealthy;
use resilience::{
    CircuitBreakerConfig, CircuitState, ConfigSource, DegradationMonitorConfig,
    FallbackDispatcher, PolicyTable, RecordingSink, ResilienceEngine, ResilienceError,
    ResilienceEvent, ResilienceOptions, YamlFileSource,
};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn engine_with_table(table: PolicyTable) -> (ResilienceEngine, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let engine = ResilienceEngine::new(
        table,
        FallbackDispatcher::builtin(),
        DegradationMonitorConfig {
            enabled: false,
            ..Default::default()
        },
        sink.clone(),
        Arc::new(AlwaysHealthy),
    );
    (engine, sink)
}

fn no_retry_options() -> ResilienceOptions {
    ResilienceOptions {
        timeout: Duration::from_millis(200),
        retries: 0,
        fallback_enabled: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_breaker_cycle_through_engine() {
    let mut table = PolicyTable::builtin();
    table.set_breaker_config(
        "video_transcode",
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout_secs: 1,
            half_open_max_calls: 1,
            ..Default::default()
        },
    );
    let (engine, sink) = engine_with_table(table);
    engine.initialize().unwrap();

    // Open the circuit with two failing calls
    for _ in 0..2 {
        let result: Result<Value, _> = engine
            .execute_with_resilience(
                "video_transcode",
                || async { Err::<Value, _>("encoder crashed".to_string()) },
                no_retry_options(),
            )
            .await;
        assert!(result.is_err());
    }
    assert_eq!(
        engine.get_stats().await["video_transcode"].state,
        CircuitState::Open
    );

    // Calls are gated while the recovery timeout runs
    let result: Result<Value, _> = engine
        .execute_with_resilience(
            "video_transcode",
            || async { Ok::<Value, String>(Value::Null) },
            no_retry_options(),
        )
        .await;
    assert!(matches!(
        result.unwrap_err(),
        ResilienceError::CircuitOpen { .. }
    ));

    // After the recovery timeout a probe is admitted and closes the circuit
    sleep(Duration::from_millis(1_200)).await;
    let result: Result<String, _> = engine
        .execute_with_resilience(
            "video_transcode",
            || async { Ok::<_, String>("transcoded".to_string()) },
            no_retry_options(),
        )
        .await;
    assert_eq!(result.unwrap(), "transcoded");
    assert_eq!(
        engine.get_stats().await["video_transcode"].state,
        CircuitState::Closed
    );

    let states: Vec<CircuitState> = sink
        .take()
        .into_iter()
        .filter_map(|event| match event {
            ResilienceEvent::CircuitBreakerStateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
    );
}

#[tokio::test]
async fn test_half_open_failure_reopens_through_engine() {
    let mut table = PolicyTable::builtin();
    table.set_breaker_config(
        "database_query",
        CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_secs: 1,
            ..Default::default()
        },
    );
    let (engine, _) = engine_with_table(table);
    engine.initialize().unwrap();

    let _: Result<Value, _> = engine
        .execute_with_resilience(
            "database_query",
            || async { Err::<Value, _>("connection refused".to_string()) },
            no_retry_options(),
        )
        .await;
    assert_eq!(
        engine.get_stats().await["database_query"].state,
        CircuitState::Open
    );

    sleep(Duration::from_millis(1_200)).await;

    // The admitted probe fails and the circuit reopens
    let _: Result<Value, _> = engine
        .execute_with_resilience(
            "database_query",
            || async { Err::<Value, _>("still refusing".to_string()) },
            no_retry_options(),
        )
        .await;
    assert_eq!(
        engine.get_stats().await["database_query"].state,
        CircuitState::Open
    );
}

#[tokio::test]
async fn test_yaml_overrides_change_engine_behavior() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
circuit_breakers:
  storage_upload:
    failure_threshold: 1
    recovery_timeout_secs: 60
"#
    )
    .unwrap();

    let mut table = PolicyTable::builtin();
    table.apply_overrides(YamlFileSource::new(file.path()).load().unwrap());
    let (engine, _) = engine_with_table(table);
    engine.initialize().unwrap();

    // One failure is now enough to open the storage_upload circuit
    let _: Result<Value, _> = engine
        .execute_with_resilience(
            "storage_upload",
            || async { Err::<Value, _>("bucket unavailable".to_string()) },
            no_retry_options(),
        )
        .await;
    assert_eq!(
        engine.get_stats().await["storage_upload"].state,
        CircuitState::Open
    );
}

#[tokio::test]
async fn test_fallback_is_deterministic_through_engine() {
    let (engine, _) = engine_with_table(PolicyTable::builtin());
    engine.initialize().unwrap();

    let degraded_options = ResilienceOptions {
        timeout: Duration::from_millis(200),
        retries: 1,
        circuit_breaker_enabled: false,
        fallback_enabled: true,
    };

    let first: Value = engine
        .execute_with_resilience(
            "job_analysis",
            || async { Err::<Value, _>("model offline".to_string()) },
            degraded_options.clone(),
        )
        .await
        .unwrap();
    let second: Value = engine
        .execute_with_resilience(
            "job_analysis",
            || async { Err::<Value, _>("different failure".to_string()) },
            degraded_options,
        )
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first["status"], "degraded");
}

#[tokio::test]
async fn test_monitor_reports_degradation_end_to_end() {
    let sink = Arc::new(RecordingSink::new());
    let mut table = PolicyTable::builtin();
    table.set_breaker_config(
        "job_analysis",
        CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_secs: 60,
            ..Default::default()
        },
    );
    let engine = ResilienceEngine::new(
        table,
        FallbackDispatcher::builtin(),
        DegradationMonitorConfig {
            enabled: true,
            interval_secs: 1,
            degraded_threshold: 0.5,
        },
        sink.clone(),
        Arc::new(AlwaysHealthy),
    );
    engine.initialize().unwrap();

    // The only breaker in the registry opens: fraction 1.0 > 0.5
    let _: Result<Value, _> = engine
        .execute_with_resilience(
            "job_analysis",
            || async { Err::<Value, _>("model offline".to_string()) },
            no_retry_options(),
        )
        .await;

    sleep(Duration::from_millis(1_300)).await;
    engine.shutdown();

    let degraded = sink.take().into_iter().any(|event| {
        matches!(
            event,
            ResilienceEvent::ResilienceDegraded {
                open_count: 1,
                total_count: 1,
            }
        )
    });
    assert!(degraded);
}

#[tokio::test]
async fn test_operations_fail_independently() {
    let (engine, _) = engine_with_table(PolicyTable::builtin());
    engine.initialize().unwrap();

    // Open job_analysis (threshold 3) while database_query stays healthy
    for _ in 0..3 {
        let _: Result<Value, _> = engine
            .execute_with_resilience(
                "job_analysis",
                || async { Err::<Value, _>("model offline".to_string()) },
                no_retry_options(),
            )
            .await;
    }
    let result: Result<String, _> = engine
        .execute_with_resilience(
            "database_query",
            || async { Ok::<_, String>("rows".to_string()) },
            no_retry_options(),
        )
        .await;
    assert_eq!(result.unwrap(), "rows");

    let stats = engine.get_stats().await;
    assert_eq!(stats["job_analysis"].state, CircuitState::Open);
    assert_eq!(stats["database_query"].state, CircuitState::Closed);
}
