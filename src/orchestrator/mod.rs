//! Request orchestrator
//!
//! Owns the inbound FIFO queue and the concurrency ceiling. Each admitted
//! request moves through `queued → selecting → executing → completed|failed`:
//! a provider is chosen through the registry, the client is invoked
//! (streaming or not), chunks are forwarded to the caller, and the user and
//! assistant turns are folded into the chat's history in submission order.
//!
//! A request pinned to a provider never runs anywhere else; when the pinned
//! provider is unavailable the request fails.

pub mod history;
pub mod request;

pub use history::ConversationHistory;
pub use request::{ModelSelection, Request, RequestHandle, RequestOptions, RequestOutcome, RequestState};

use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

use crate::config::OrchestratorConfig;
use crate::context::CoreContext;
use crate::error::LlmError;
use crate::events::RequestEvent;
use crate::registry::RegistryStats;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::traits::ProviderClient;
use crate::types::{ChatMessage, Completion, CompletionOptions, HealthStatus, StreamChunk};

/// Terminal request states kept for [`RequestOrchestrator::request_state`].
const RETAINED_TERMINAL_STATES: usize = 1024;

/// Read-only snapshot returned by [`RequestOrchestrator::get_system_status`].
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub registry: RegistryStats,
    pub queue_depth: usize,
    pub in_flight: usize,
    pub max_concurrent_requests: usize,
    pub peak_in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub chat_message_counts: BTreeMap<String, usize>,
    pub health: BTreeMap<String, HealthStatus>,
    pub selected_model: Option<ModelSelection>,
}

struct Job {
    request: Request,
    ticket: u64,
    chunk_tx: mpsc::Sender<StreamChunk>,
    result_tx: oneshot::Sender<Result<RequestOutcome, LlmError>>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Job>,
    in_flight: usize,
    peak_in_flight: usize,
    states: HashMap<String, RequestState>,
    finished: VecDeque<String>,
    completed: u64,
    failed: u64,
}

struct Shared {
    ctx: CoreContext,
    config: OrchestratorConfig,
    queue: Mutex<QueueState>,
    history: ConversationHistory,
    selected: Mutex<Option<ModelSelection>>,
}

/// A stream attempt that failed, and whether any chunk reached the caller.
struct StreamFailure {
    error: LlmError,
    forwarded: bool,
}

/// Concurrency slot held while a request executes.
struct Slot(Option<Arc<Shared>>);

impl Slot {
    fn release(&mut self) {
        if let Some(shared) = self.0.take() {
            shared.lock_queue().in_flight -= 1;
            Shared::drain(&shared);
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct RequestOrchestrator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = self.shared.lock_queue();
        f.debug_struct("RequestOrchestrator")
            .field("queue_depth", &q.queue.len())
            .field("in_flight", &q.in_flight)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl RequestOrchestrator {
    pub fn new(ctx: CoreContext, config: OrchestratorConfig) -> Result<Self, LlmError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                ctx,
                config,
                queue: Mutex::new(QueueState::default()),
                history: ConversationHistory::new(),
                selected: Mutex::new(None),
            }),
        })
    }

    /// Queue a message for `chat_id` and start draining.
    ///
    /// Routing is checked up front: configuration and routing errors are
    /// returned here and never occupy a queue slot. Must be called from
    /// within a Tokio runtime.
    pub fn submit(
        &self,
        chat_id: impl Into<String>,
        message: impl Into<String>,
        options: RequestOptions,
    ) -> Result<RequestHandle, LlmError> {
        tokio::runtime::Handle::try_current()
            .map_err(|_| LlmError::InternalError("submit requires a Tokio runtime".into()))?;

        let shared = &self.shared;
        let mut request = Request::new(chat_id, message, RequestOptions::default());
        let routed = shared
            .resolve_options(options)
            .and_then(|options| {
                shared.route(&options)?;
                Ok(options)
            });
        request.options = match routed {
            Ok(options) => options,
            Err(e) => {
                tracing::warn!(request_id = %request.id, chat_id = %request.chat_id, error = %e, "request rejected");
                shared.publish_failed(&request, None, &e);
                return Err(e);
            }
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(shared.config.stream_buffer);
        let (result_tx, result_rx) = oneshot::channel();
        let request_id = request.id.clone();
        let chat_id = request.chat_id.clone();
        let queue_depth = {
            let mut q = shared.lock_queue();
            // Ticket and queue position are taken together so per-chat
            // commit order always matches admission order.
            let ticket = shared.history.reserve(&chat_id);
            q.states.insert(request_id.clone(), RequestState::Queued);
            q.queue.push_back(Job {
                request,
                ticket,
                chunk_tx,
                result_tx,
            });
            q.queue.len()
        };
        tracing::info!(request_id = %request_id, chat_id = %chat_id, queue_depth, "request queued");
        shared.ctx.events.publish(RequestEvent::Queued {
            request_id: request_id.clone(),
            chat_id,
            queue_depth,
        });

        Shared::drain(shared);
        Ok(RequestHandle::new(request_id, chunk_rx, result_rx))
    }

    /// Accept a bare model id or `provider:model`. The selection applies to
    /// later submissions that name neither a model nor a provider.
    pub fn select_model(&self, model_ref: &str) -> Result<ModelSelection, LlmError> {
        let registry = &self.shared.ctx.registry;
        let selection = ModelSelection::parse(model_ref, |p| registry.is_registered(p))?;
        tracing::info!(provider = ?selection.provider_id, model = %selection.model, "model selected");
        *self
            .shared
            .selected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(selection.clone());
        Ok(selection)
    }

    pub fn selected_model(&self) -> Option<ModelSelection> {
        self.shared
            .selected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_state(&self, request_id: &str) -> Option<RequestState> {
        self.shared.lock_queue().states.get(request_id).cloned()
    }

    pub fn history(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.shared.history.messages(chat_id)
    }

    pub fn clear_history(&self, chat_id: &str) {
        self.shared.history.clear(chat_id);
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.lock_queue().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock_queue().in_flight
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let registry = &self.shared.ctx.registry;
        let (queue_depth, in_flight, peak_in_flight, completed, failed) = {
            let q = self.shared.lock_queue();
            (q.queue.len(), q.in_flight, q.peak_in_flight, q.completed, q.failed)
        };
        SystemStatus {
            registry: registry.stats(),
            queue_depth,
            in_flight,
            max_concurrent_requests: self.shared.config.max_concurrent_requests,
            peak_in_flight,
            completed,
            failed,
            chat_message_counts: self.shared.history.message_counts(),
            health: registry.health_map(),
            selected_model: self.selected_model(),
        }
    }
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expand a compound model reference and apply the current model
    /// selection when the request names neither model nor provider.
    fn resolve_options(&self, mut options: RequestOptions) -> Result<RequestOptions, LlmError> {
        if let Some(model_ref) = options.model.take() {
            let registry = &self.ctx.registry;
            let parsed = ModelSelection::parse(&model_ref, |p| registry.is_registered(p))?;
            if let Some(provider_id) = parsed.provider_id {
                if let Some(pinned) = &options.provider_id
                    && pinned != &provider_id
                {
                    return Err(LlmError::ConfigurationError(format!(
                        "model '{model_ref}' conflicts with provider '{pinned}'"
                    )));
                }
                options.provider_id = Some(provider_id);
            }
            options.model = Some(parsed.model);
        } else if options.provider_id.is_none()
            && let Some(selection) = self
                .selected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        {
            options.model = Some(selection.model);
            options.provider_id = selection.provider_id;
        }
        Ok(options)
    }

    /// Provider that should serve `options`, or a terminal routing error.
    fn route(&self, options: &RequestOptions) -> Result<String, LlmError> {
        let registry = &self.ctx.registry;
        if let Some(provider_id) = &options.provider_id {
            if !registry.is_registered(provider_id) {
                return Err(LlmError::UnknownProvider(provider_id.clone()));
            }
            let Some(client) = registry.client(provider_id) else {
                return Err(LlmError::NoRoute(format!(
                    "provider '{provider_id}' has no live instance"
                )));
            };
            if !client.is_configured() {
                return Err(LlmError::MissingCredential(provider_id.clone()));
            }
            if !client
                .capabilities()
                .supports_all(&options.required_capabilities)
            {
                return Err(LlmError::NoRoute(format!(
                    "provider '{provider_id}' lacks required capabilities {:?}",
                    options.required_capabilities
                )));
            }
            return Ok(provider_id.clone());
        }

        let mut requirements = options.requirements();
        for (id, client) in registry.live_clients() {
            if !client.is_configured() {
                requirements.exclude_providers.push(id);
            }
        }
        if requirements.preferred_providers.is_empty()
            && let Some(default) = registry.default_provider()
        {
            requirements.preferred_providers.push(default);
        }
        registry.get_best_provider(&requirements).ok_or_else(|| {
            LlmError::NoRoute(format!(
                "no live, configured provider matches capabilities {:?}",
                options.required_capabilities
            ))
        })
    }

    /// Admit queued jobs while slots are free. Never waits on a job.
    fn drain(self: &Arc<Self>) {
        let mut q = self.lock_queue();
        while q.in_flight < self.config.max_concurrent_requests {
            let Some(job) = q.queue.pop_front() else {
                break;
            };
            q.in_flight += 1;
            q.peak_in_flight = q.peak_in_flight.max(q.in_flight);
            q.states
                .insert(job.request.id.clone(), RequestState::Selecting);
            let slot = Slot(Some(self.clone()));
            let shared = self.clone();
            tokio::spawn(async move { shared.run(job, slot).await });
        }
    }

    async fn run(&self, job: Job, mut slot: Slot) {
        let Job {
            mut request,
            ticket,
            chunk_tx,
            result_tx,
        } = job;

        let result = match AssertUnwindSafe(self.execute(&mut request, &chunk_tx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(self.recover_from_panic(&request, panic_message(&*panic))),
        };
        drop(chunk_tx);
        slot.release();

        match result {
            Ok((outcome, window)) => {
                let turns = [
                    ChatMessage::user(request.message.clone()),
                    ChatMessage::assistant(outcome.completion.text.clone()),
                ];
                self.history
                    .commit(&request.chat_id, ticket, Some(turns), window)
                    .await;
                self.finish(
                    &request.id,
                    RequestState::Completed {
                        provider_id: outcome.provider_id.clone(),
                    },
                );
                tracing::info!(
                    request_id = %request.id,
                    chat_id = %request.chat_id,
                    provider = %outcome.provider_id,
                    model = ?outcome.completion.model,
                    elapsed_ms = outcome.elapsed_ms,
                    attempts = request.attempts,
                    "request completed"
                );
                self.ctx.events.publish(RequestEvent::Completed {
                    request_id: request.id.clone(),
                    chat_id: request.chat_id.clone(),
                    provider_id: outcome.provider_id.clone(),
                    model: outcome.completion.model.clone(),
                    elapsed_ms: outcome.elapsed_ms,
                    usage: outcome.completion.usage,
                    cost: outcome.cost,
                });
                let _ = result_tx.send(Ok(outcome));
            }
            Err((error, provider_id)) => {
                self.history.commit(&request.chat_id, ticket, None, 0).await;
                self.finish(
                    &request.id,
                    RequestState::Failed {
                        kind: error.kind().to_string(),
                    },
                );
                tracing::warn!(
                    request_id = %request.id,
                    chat_id = %request.chat_id,
                    provider = ?provider_id,
                    attempts = request.attempts,
                    error = %error,
                    "request failed"
                );
                self.publish_failed(&request, provider_id, &error);
                let _ = result_tx.send(Err(error));
            }
        }
    }

    /// A provider call panicked. The request fails like any other so its
    /// history ticket is still committed.
    fn recover_from_panic(&self, request: &Request, message: &str) -> (LlmError, Option<String>) {
        let provider_id = match self.lock_queue().states.get(&request.id) {
            Some(RequestState::Executing { provider_id }) => Some(provider_id.clone()),
            _ => None,
        };
        tracing::error!(
            request_id = %request.id,
            provider = ?provider_id,
            panic = message,
            "provider call panicked"
        );
        let error = LlmError::InternalError(format!("provider call panicked: {message}"));
        if let Some(id) = &provider_id {
            self.ctx.registry.record_failure(id, &error);
        }
        (error, provider_id)
    }

    /// Select, dispatch and account for one request. Returns the outcome and
    /// the history window of the provider that served it.
    async fn execute(
        &self,
        request: &mut Request,
        chunk_tx: &mpsc::Sender<StreamChunk>,
    ) -> Result<(RequestOutcome, usize), (LlmError, Option<String>)> {
        let registry = &self.ctx.registry;
        let provider_id = self.route(&request.options).map_err(|e| (e, None))?;
        let Some(client) = registry.client(&provider_id) else {
            let e = LlmError::NoRoute(format!("provider '{provider_id}' was removed"));
            return Err((e, Some(provider_id)));
        };
        self.set_state(
            &request.id,
            RequestState::Executing {
                provider_id: provider_id.clone(),
            },
        );

        let window = client
            .history_window()
            .unwrap_or(self.config.default_history_window);
        let mut messages = self.history.context(&request.chat_id, window);
        messages.push(ChatMessage::user(request.message.clone()));
        let options = request.options.completion_options();
        let provider_config = registry.config(&provider_id);
        let policy = match &self.config.retry {
            Some(policy) => policy.capped(provider_config.as_ref().map_or(0, |c| c.retry_attempts)),
            None => RetryPolicy::new().with_max_retries(0),
        };

        tracing::debug!(
            request_id = %request.id,
            provider = %provider_id,
            streaming = request.options.streaming,
            history = messages.len() - 1,
            "dispatching request"
        );
        let started = Instant::now();
        let mut retries = 0;
        let result = if request.options.streaming {
            self.stream_with_retry(&client, request, &messages, &options, &policy, chunk_tx, &mut retries)
                .await
        } else {
            self.complete_with_retry(&client, request, &messages, &options, &policy, chunk_tx, &mut retries)
                .await
        };
        request.attempts = retries + 1;
        let elapsed = started.elapsed();

        match result {
            Ok(mut completion) => {
                registry.record_success(&provider_id, elapsed);
                if completion.model.is_none() {
                    completion.model = options
                        .model
                        .clone()
                        .or_else(|| provider_config.map(|c| c.default_model));
                }
                let usage = *completion
                    .usage
                    .get_or_insert_with(|| client.estimate_usage(&messages, &completion.text));
                let cost = client.cost(completion.model.as_deref().unwrap_or_default(), &usage);
                Ok((
                    RequestOutcome {
                        request_id: request.id.clone(),
                        chat_id: request.chat_id.clone(),
                        provider_id,
                        completion,
                        elapsed_ms: elapsed.as_millis() as u64,
                        cost,
                    },
                    window,
                ))
            }
            Err(e) => {
                registry.record_failure(&provider_id, &e);
                Err((e, Some(provider_id)))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_with_retry(
        &self,
        client: &Arc<dyn ProviderClient>,
        request: &Request,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        policy: &RetryPolicy,
        chunk_tx: &mpsc::Sender<StreamChunk>,
        retries: &mut u32,
    ) -> Result<Completion, LlmError> {
        let registry = &self.ctx.registry;
        let provider_id = client.provider_id().to_string();
        let completion = RetryExecutor::new(policy.clone())
            .execute(
                || client.complete(messages, options),
                |error, retry| {
                    *retries = retry;
                    registry.record_failure(&provider_id, error);
                    tracing::warn!(request_id = %request.id, provider = %provider_id, retry, error = %error, "retrying request");
                },
            )
            .await?;

        let chunk = StreamChunk {
            delta_text: completion.text.clone(),
            full_text_so_far: completion.text.clone(),
            finished: true,
            usage: completion.usage,
            finish_reason: completion.finish_reason.clone(),
        };
        self.forward(request, chunk_tx, chunk).await;
        Ok(completion)
    }

    /// Streams are retried only while nothing has reached the caller.
    #[allow(clippy::too_many_arguments)]
    async fn stream_with_retry(
        &self,
        client: &Arc<dyn ProviderClient>,
        request: &Request,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        policy: &RetryPolicy,
        chunk_tx: &mpsc::Sender<StreamChunk>,
        retries: &mut u32,
    ) -> Result<Completion, LlmError> {
        loop {
            match self
                .stream_once(client, request, messages.to_vec(), options.clone(), chunk_tx)
                .await
            {
                Ok(completion) => return Ok(completion),
                Err(StreamFailure { error, forwarded }) => {
                    if forwarded || !policy.should_retry(&error, *retries) {
                        return Err(error);
                    }
                    self.ctx.registry.record_failure(client.provider_id(), &error);
                    let delay = policy.calculate_delay(*retries);
                    *retries += 1;
                    tracing::warn!(
                        request_id = %request.id,
                        provider = client.provider_id(),
                        retry = *retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying stream"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Forward one provider stream. The caller always sees exactly one
    /// finished chunk whose text is the concatenation of every delta, even
    /// if the client's stream closes without one.
    async fn stream_once(
        &self,
        client: &Arc<dyn ProviderClient>,
        request: &Request,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
        chunk_tx: &mpsc::Sender<StreamChunk>,
    ) -> Result<Completion, StreamFailure> {
        let mut stream = client
            .complete_streaming(messages, options)
            .await
            .map_err(|error| StreamFailure {
                error,
                forwarded: false,
            })?;

        let mut forwarded = false;
        let mut full_text = String::new();
        while let Some(item) = stream.next().await {
            let mut chunk = item.map_err(|error| StreamFailure { error, forwarded })?;
            full_text.push_str(&chunk.delta_text);
            chunk.full_text_so_far.clone_from(&full_text);
            forwarded = true;
            if chunk.finished {
                let completion = Completion {
                    text: full_text,
                    model: None,
                    usage: chunk.usage,
                    finish_reason: chunk.finish_reason.clone(),
                };
                self.forward(request, chunk_tx, chunk).await;
                return Ok(completion);
            }
            self.forward(request, chunk_tx, chunk).await;
        }

        tracing::debug!(request_id = %request.id, provider = client.provider_id(), "stream closed without a terminal chunk");
        let terminal = StreamChunk {
            full_text_so_far: full_text.clone(),
            finished: true,
            ..Default::default()
        };
        self.forward(request, chunk_tx, terminal).await;
        Ok(Completion {
            text: full_text,
            ..Default::default()
        })
    }

    /// Publish a chunk event and hand the chunk to the caller. A caller that
    /// dropped its handle no longer receives chunks; the request still runs
    /// to completion.
    async fn forward(&self, request: &Request, chunk_tx: &mpsc::Sender<StreamChunk>, chunk: StreamChunk) {
        self.ctx.events.publish(RequestEvent::StreamingChunk {
            request_id: request.id.clone(),
            chat_id: request.chat_id.clone(),
            chunk: chunk.clone(),
        });
        let _ = chunk_tx.send(chunk).await;
    }

    fn set_state(&self, request_id: &str, state: RequestState) {
        self.lock_queue()
            .states
            .insert(request_id.to_string(), state);
    }

    fn finish(&self, request_id: &str, state: RequestState) {
        let mut q = self.lock_queue();
        match state {
            RequestState::Completed { .. } => q.completed += 1,
            _ => q.failed += 1,
        }
        q.states.insert(request_id.to_string(), state);
        q.finished.push_back(request_id.to_string());
        while q.finished.len() > RETAINED_TERMINAL_STATES {
            if let Some(old) = q.finished.pop_front() {
                q.states.remove(&old);
            }
        }
    }

    fn publish_failed(&self, request: &Request, provider_id: Option<String>, error: &LlmError) {
        self.ctx.events.publish(RequestEvent::Failed {
            request_id: request.id.clone(),
            chat_id: request.chat_id.clone(),
            provider_id,
            kind: error.kind().to_string(),
            message: error.user_message(),
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
