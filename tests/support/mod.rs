//! Shared test doubles: a scripted provider client with call counters.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatrelay::config::ProviderConfig;
use chatrelay::context::CoreContext;
use chatrelay::error::LlmError;
use chatrelay::registry::{BuildContext, ProviderRegistration, ProviderRegistry};
use chatrelay::traits::{ChunkStream, ProviderClient};
use chatrelay::types::{Capabilities, ChatMessage, Completion, CompletionOptions, StreamChunk, Usage};

/// Provider double whose behaviour is fixed at construction. Every call is
/// counted; `peak_active` records the highest number of overlapping calls.
pub struct ScriptedProvider {
    id: String,
    capabilities: Capabilities,
    configured: bool,
    delay: Duration,
    reply: String,
    deltas: Vec<String>,
    explicit_terminal: bool,
    failures: Mutex<VecDeque<LlmError>>,
    panic_next: AtomicBool,
    probe_error: Mutex<Option<String>>,
    pub calls: AtomicUsize,
    pub probes: AtomicUsize,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub seen_messages: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            capabilities: Capabilities::new().with_streaming(),
            configured: true,
            delay: Duration::ZERO,
            reply: format!("reply from {id}"),
            deltas: vec!["Hel".into(), "lo".into(), " world".into()],
            explicit_terminal: true,
            failures: Mutex::new(VecDeque::new()),
            panic_next: AtomicBool::new(false),
            probe_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            seen_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn with_deltas(mut self, deltas: &[&str]) -> Self {
        self.deltas = deltas.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Stream ends without a finished chunk.
    pub fn closing_bare(mut self) -> Self {
        self.explicit_terminal = false;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Errors returned, in order, by the next calls before succeeding.
    pub fn failing_with(self, errors: Vec<LlmError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    /// The next call panics instead of answering.
    pub fn panicking_once(self) -> Self {
        self.panic_next.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_probe_error(&self, error: Option<&str>) {
        *self.probe_error.lock().unwrap() = error.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    fn begin(&self, messages: &[ChatMessage]) -> Option<LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_messages.lock().unwrap().push(messages.to_vec());
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted provider crashed");
        }
        self.failures.lock().unwrap().pop_front()
    }

    async fn occupy(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Registration whose factory hands out this very instance.
    pub fn registration(self: &Arc<Self>) -> ProviderRegistration {
        let shared = self.clone();
        ProviderRegistration::new(
            self.id.clone(),
            move |_ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
                Ok(shared.clone())
            },
            ProviderConfig::new("http://scripted.invalid", "scripted-model"),
        )
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["scripted-model".to_string()]
    }

    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion, LlmError> {
        let failure = self.begin(messages);
        self.occupy().await;
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(Completion {
            text: self.reply.clone(),
            model: options.model.clone().or_else(|| Some("scripted-model".into())),
            usage: Some(Usage::new(3, 4)),
            finish_reason: Some("stop".into()),
        })
    }

    async fn complete_streaming(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<ChunkStream, LlmError> {
        let failure = self.begin(&messages);
        self.occupy().await;
        if let Some(e) = failure {
            return Err(e);
        }
        let deltas = self.deltas.clone();
        let explicit_terminal = self.explicit_terminal;
        Ok(Box::pin(async_stream::stream! {
            let mut full = String::new();
            for delta in deltas {
                full.push_str(&delta);
                yield Ok(StreamChunk {
                    delta_text: delta,
                    full_text_so_far: full.clone(),
                    ..Default::default()
                });
            }
            if explicit_terminal {
                yield Ok(StreamChunk {
                    full_text_so_far: full,
                    finished: true,
                    finish_reason: Some("stop".into()),
                    ..Default::default()
                });
            }
        }))
    }

    async fn test_connection(&self) -> Result<(), LlmError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.probe_error.lock().unwrap().clone() {
            Some(message) => Err(LlmError::ConnectionError(message)),
            None => Ok(()),
        }
    }
}

/// Context with each scripted provider registered and live.
pub fn context_with(providers: &[Arc<ScriptedProvider>]) -> CoreContext {
    let ctx = CoreContext::with_registry(Arc::new(ProviderRegistry::with_http_client(
        chatrelay::events::EventBus::new(),
        reqwest::Client::new(),
    )));
    for provider in providers {
        ctx.registry.register(provider.registration());
        ctx.registry
            .create_instance(provider.provider_id())
            .expect("scripted instance");
    }
    ctx
}
