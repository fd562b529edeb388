//! Config to orchestrated reply over real HTTP clients and a mock upstream.
#![cfg(feature = "all-providers")]

use serde_json::json;
use wiremock::matchers::{any, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatrelay::prelude::*;

fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": d}}]})
        ));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":3,\"total_tokens\":13}}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

fn config_for(openai: &MockServer) -> CoreConfig {
    CoreConfig::from_json_str(
        &json!({
            "orchestrator": {"max_concurrent_requests": 2},
            "providers": {
                "openai": {"apiKey": "sk-e2e-0123456789", "baseUrl": format!("{}/v1", openai.uri())},
                "anthropic": {}
            },
            "default_provider": "openai"
        })
        .to_string(),
    )
    .unwrap()
}

#[tokio::test]
async fn streamed_reply_lands_in_history_with_cost() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-e2e-0123456789"))
        .and(body_partial_json(json!({"model": "gpt-4o", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse(&["Bon", "jour"]), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let ctx = CoreContext::from_config(&config).unwrap();
    let mut events = ctx.events.subscribe();
    let orchestrator = RequestOrchestrator::new(ctx.clone(), config.orchestrator.clone()).unwrap();

    let handle = orchestrator
        .submit("chat-1", "Say hello", RequestOptions::new().streaming().with_model("openai:gpt-4o"))
        .unwrap();
    let (chunks, outcome) = handle.collect().await;
    let outcome = outcome.unwrap();

    assert_eq!(outcome.provider_id, "openai");
    assert_eq!(outcome.completion.text, "Bonjour");
    assert_eq!(outcome.completion.usage, Some(Usage::new(10, 3)));
    assert!(outcome.cost > 0.0);
    assert_eq!(chunks.iter().filter(|c| c.finished).count(), 1);
    assert_eq!(chunks.last().unwrap().full_text_so_far, "Bonjour");

    let history = orchestrator.history("chat-1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], ChatMessage::user("Say hello"));
    assert_eq!(history[1], ChatMessage::assistant("Bonjour"));

    let metrics = ctx.registry.metrics("openai").unwrap();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.success_count, 1);

    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Request(RequestEvent::Completed { .. }) = event {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn pinned_provider_without_key_fails_before_dispatch() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let ctx = CoreContext::from_config(&config).unwrap();
    assert!(ctx.registry.is_live("anthropic"));
    let orchestrator = RequestOrchestrator::new(ctx, config.orchestrator.clone()).unwrap();

    let err = orchestrator
        .submit("chat-2", "hi", RequestOptions::new().with_provider("anthropic"))
        .unwrap_err();
    assert!(matches!(err, LlmError::MissingCredential(ref p) if p == "anthropic"));
    assert_eq!(orchestrator.queue_depth(), 0);
    assert!(orchestrator.history("chat-2").is_empty());
}

#[tokio::test]
async fn upstream_rejection_reaches_the_caller_and_the_metrics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let ctx = CoreContext::from_config(&config).unwrap();
    let orchestrator = RequestOrchestrator::new(ctx.clone(), config.orchestrator.clone()).unwrap();

    let err = orchestrator
        .submit("chat-3", "hi", RequestOptions::new())
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::AuthenticationError(_)));
    assert_eq!(err.user_message(), "Invalid API key");

    let status = orchestrator.get_system_status();
    assert_eq!(status.failed, 1);
    assert_eq!(status.in_flight, 0);
    assert_eq!(ctx.registry.metrics("openai").unwrap().failure_count, 1);
    assert!(orchestrator.history("chat-3").is_empty());
}
