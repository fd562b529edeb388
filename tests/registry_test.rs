//! Provider registry: ranking, health feed, sanitization and persistence.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chatrelay::config::{HealthMonitorConfig, ProviderConfigPatch};
use chatrelay::events::{CoreEvent, ProviderEvent};
use chatrelay::health::HealthMonitor;
use chatrelay::registry::SelectionRequirements;
use chatrelay::settings::{MemorySettingsStore, SettingsStore};
use chatrelay::types::{Capabilities, Capability};
use support::{ScriptedProvider, context_with};

fn vision() -> Capabilities {
    Capabilities::new().with_streaming().with_vision()
}

#[test]
fn equal_success_rate_prefers_lower_latency() {
    let fast = Arc::new(ScriptedProvider::new("fast").with_capabilities(vision()));
    let slow = Arc::new(ScriptedProvider::new("slow").with_capabilities(vision()));
    let ctx = context_with(&[fast, slow]);
    let registry = &ctx.registry;

    for (id, latency) in [("fast", 500), ("slow", 1200)] {
        for _ in 0..9 {
            registry.record_success(id, Duration::from_millis(latency));
        }
        registry.record_failure(id, &chatrelay::error::LlmError::api_error(500, "boom"));
        let m = registry.metrics(id).unwrap();
        assert!((m.success_rate() - 0.9).abs() < 1e-9);
    }

    let req = SelectionRequirements::new().with_capability(Capability::Vision);
    for _ in 0..10 {
        assert_eq!(registry.get_best_provider(&req).as_deref(), Some("fast"));
    }
}

#[test]
fn preferred_and_excluded_providers_narrow_the_candidates() {
    let a = Arc::new(ScriptedProvider::new("a"));
    let b = Arc::new(ScriptedProvider::new("b"));
    let ctx = context_with(&[a, b]);
    let registry = &ctx.registry;

    let req = SelectionRequirements::new().with_preferred("b");
    assert_eq!(registry.get_best_provider(&req).as_deref(), Some("b"));

    let req = SelectionRequirements::new()
        .with_excluded("a")
        .with_excluded("b");
    assert_eq!(registry.get_best_provider(&req), None);
}

#[tokio::test]
async fn three_failed_health_checks_mark_provider_unhealthy_and_excludable() {
    let flaky = Arc::new(ScriptedProvider::new("flaky"));
    let steady = Arc::new(ScriptedProvider::new("steady"));
    let ctx = context_with(&[flaky.clone(), steady.clone()]);
    let mut events = ctx.events.subscribe();
    let monitor = HealthMonitor::new(&ctx, HealthMonitorConfig::default());

    flaky.set_probe_error(Some("connection refused"));
    for _ in 0..3 {
        assert_eq!(monitor.tick().await, Some(2));
    }

    let health = ctx.registry.health("flaky").unwrap();
    assert_eq!(health.consecutive_failures, 3);
    assert!(!health.connected);
    assert!(health.last_error.unwrap().contains("connection refused"));
    assert!(ctx.registry.health("steady").unwrap().connected);

    let req = SelectionRequirements::new()
        .with_preferred("flaky")
        .excluding_unhealthy();
    assert_eq!(ctx.registry.get_best_provider(&req).as_deref(), Some("steady"));
    // Health biases ranking only when a request asks for it.
    let req = SelectionRequirements::new().with_preferred("flaky");
    assert_eq!(ctx.registry.get_best_provider(&req).as_deref(), Some("flaky"));

    let mut flips = 0;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Provider(ProviderEvent::StatusChanged { provider_id, connected, .. }) = event {
            assert_eq!(provider_id, "flaky");
            assert!(!connected);
            flips += 1;
        }
    }
    assert_eq!(flips, 1, "repeated failures are not status changes");

    flaky.set_probe_error(None);
    monitor.tick().await;
    let health = ctx.registry.health("flaky").unwrap();
    assert!(health.connected);
    assert_eq!(health.consecutive_failures, 0);
    let recovered = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, CoreEvent::Provider(ProviderEvent::StatusChanged { connected: true, .. })))
        .count();
    assert_eq!(recovered, 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_skipped() {
    let slow = Arc::new(ScriptedProvider::new("slow").with_delay(Duration::from_secs(5)));
    let ctx = context_with(&[slow.clone()]);
    let monitor = Arc::new(HealthMonitor::new(&ctx, HealthMonitorConfig::default()));

    let running = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.tick().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.tick().await, None);
    assert_eq!(running.await.unwrap(), Some(1));
    assert_eq!(slow.probes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn monitor_is_disabled_by_default_and_stops_on_shutdown() {
    let p = Arc::new(ScriptedProvider::new("p"));
    let ctx = context_with(&[p.clone()]);

    let disabled = Arc::new(HealthMonitor::new(&ctx, HealthMonitorConfig::default()));
    assert!(disabled.start().is_none());

    let config = HealthMonitorConfig {
        enabled: true,
        interval_secs: 60,
    };
    let handle = Arc::new(HealthMonitor::new(&ctx, config)).start().unwrap();
    tokio::time::sleep(Duration::from_secs(125)).await;
    handle.shutdown().await;
    let probes = p.probes.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(probes, 2);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(p.probes.load(std::sync::atomic::Ordering::SeqCst), probes);
}

#[tokio::test]
async fn credentials_never_leave_the_registry() {
    let secret = "sk-live-9f8e7d6c5b4a3210";
    let p = Arc::new(ScriptedProvider::new("p"));
    let ctx = context_with(&[p]);
    let registry = &ctx.registry;
    registry
        .configure("p", &ProviderConfigPatch::new().api_key(secret).default_model("m2"))
        .unwrap();
    registry.create_instance("p").unwrap();

    let mut outputs = vec![
        registry.sanitized_config("p").unwrap().to_string(),
        serde_json::to_string(&registry.status()).unwrap(),
        format!("{:?}", registry.config("p").unwrap()),
        format!("{:?}", registry.status()),
    ];
    let store = MemorySettingsStore::new();
    assert_eq!(registry.save_configs(&store).await.unwrap(), 1);
    outputs.push(serde_json::to_string(&store.snapshot()).unwrap());

    for output in &outputs {
        for window in secret.as_bytes().windows(8) {
            let needle = std::str::from_utf8(window).unwrap();
            assert!(!output.contains(needle), "leaked {needle:?} in {output}");
        }
    }
    assert!(outputs[0].contains("\"has_api_key\":true"));
}

#[tokio::test]
async fn stored_configs_round_trip_without_dropping_the_live_key() {
    let p = Arc::new(ScriptedProvider::new("p"));
    let ctx = context_with(&[p]);
    let registry = &ctx.registry;
    registry
        .configure(
            "p",
            &ProviderConfigPatch::new()
                .api_key("sk-keep-me-please")
                .default_model("m1")
                .timeout_ms(12_000),
        )
        .unwrap();

    let store = MemorySettingsStore::new();
    registry.save_configs(&store).await.unwrap();
    let mut stored = store.get("providers.p").await.unwrap().unwrap();
    stored["default_model"] = serde_json::json!("m2");
    store.set("providers.p", stored).await.unwrap();
    store
        .set("providers.unregistered", serde_json::json!({"default_model": "x"}))
        .await
        .unwrap();

    assert_eq!(registry.load_configs(&store).await.unwrap(), 1);
    let config = registry.config("p").unwrap();
    assert_eq!(config.default_model, "m2");
    assert_eq!(config.timeout_ms, 12_000);
    assert_eq!(config.api_key(), Some("sk-keep-me-please"));
}

#[test]
fn reregistering_keeps_the_live_instance_until_recreated() {
    let first = Arc::new(ScriptedProvider::new("p").with_reply("first"));
    let ctx = context_with(&[first]);
    let mut events = ctx.events.subscribe();

    let second = Arc::new(ScriptedProvider::new("p").with_reply("second"));
    ctx.registry.register(second.registration());
    assert!(ctx.registry.is_live("p"));
    match events.try_recv().unwrap() {
        CoreEvent::Provider(ProviderEvent::Registered { replaced, .. }) => assert!(replaced),
        other => panic!("unexpected {other:?}"),
    }

    let stats = ctx.registry.stats();
    assert_eq!(stats.registered, 1);
    assert_eq!(stats.live, 1);
    assert!(ctx.registry.unregister("p"));
    assert!(!ctx.registry.is_live("p"));
    assert!(ctx.registry.health("p").is_some());
}
