//! Integration test for the credential-expiry recovery loop: a downstream
//! handler fails with an expired credential, the original message is parked
//! on the retry queue, and the orchestrator drains it once the credential is
//! refreshed.

use async_trait::async_trait;
use mailroute_core::constants::counters;
use mailroute_core::dispatch::DispatchFanout;
use mailroute_core::error::InvokeError;
use mailroute_core::events::{
    Action, ActionEvent, ActionSubscriber, EventPublisher, InboundEvent, SubscriberRegistry,
};
use mailroute_core::metrics::{
    IdempotentCounterPublisher, MemoryCounterEmitter, MemoryIdempotencyStore,
};
use mailroute_core::pipeline::InboundPipeline;
use mailroute_core::retry::{
    BackoffPolicy, MemoryRetryQueue, RecoveringSubscriber, ReplayInvoker, RetryEnvelope,
    RetryOrchestrator, RetryOrchestratorConfig, RetryQueue,
};
use mailroute_core::routing::{MemoryRouteStore, Resolver, RoutingRule};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delivery handler whose credential can be expired or refreshed.
#[derive(Default)]
struct DeliveryHandler {
    credential_valid: AtomicBool,
    delivered: Mutex<Vec<String>>,
}

impl DeliveryHandler {
    fn with_expired_credential() -> Arc<Self> {
        Arc::new(Self {
            credential_valid: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn refresh_credential(&self) {
        self.credential_valid.store(true, Ordering::SeqCst);
    }

    fn deliver(&self, event: &ActionEvent) -> Result<(), InvokeError> {
        if !self.credential_valid.load(Ordering::SeqCst) {
            return Err(InvokeError::CredentialExpired("access token expired".into()));
        }
        for decision in &event.decisions {
            self.delivered.lock().push(decision.recipient.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ActionSubscriber for DeliveryHandler {
    async fn handle_event(&self, event: &ActionEvent) -> Result<(), InvokeError> {
        self.deliver(event)
    }

    fn subscriber_name(&self) -> &str {
        "delivery-handler"
    }
}

/// Replays a parked action event against the same handler.
struct HandlerReplayInvoker {
    handler: Arc<DeliveryHandler>,
}

#[async_trait]
impl ReplayInvoker for HandlerReplayInvoker {
    async fn invoke(&self, message: &RetryEnvelope) -> Result<(), InvokeError> {
        let event: ActionEvent = serde_json::from_value(message.body.clone())
            .map_err(|e| InvokeError::Handler(format!("malformed parked event: {e}")))?;
        self.handler.deliver(&event)
    }
}

fn orchestrator_config() -> RetryOrchestratorConfig {
    RetryOrchestratorConfig {
        batch_size: 10,
        receive_wait_ms: 10,
        invoke_timeout_ms: 1_000,
        backoff: BackoffPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            multiplier: 2.0,
            jitter_enabled: false,
            jitter_max_percentage: 0.0,
        },
    }
}

#[tokio::test]
async fn expired_credential_parks_then_drains_after_refresh() -> anyhow::Result<()> {
    let store = MemoryRouteStore::new();
    store.put(RoutingRule::new("a@example.com", Action::Deliver, "inbox-1"));

    let retry_queue = MemoryRetryQueue::new(Duration::from_secs(60));
    let handler = DeliveryHandler::with_expired_credential();

    let registry = Arc::new(SubscriberRegistry::new(2));
    registry
        .register_subscriber(
            "delivery-handler",
            Action::Deliver,
            1,
            Arc::new(RecoveringSubscriber::new(
                "delivery-handler",
                handler.clone(),
                Arc::new(retry_queue.clone()),
            )),
        )
        .await;

    let emitter = MemoryCounterEmitter::new();
    let pipeline = InboundPipeline::new(
        Resolver::new(Arc::new(store)),
        IdempotentCounterPublisher::new(
            Arc::new(emitter.clone()),
            Arc::new(MemoryIdempotencyStore::default()),
            "MailRoute/test",
        ),
        DispatchFanout::new(EventPublisher::new(16), registry),
        Duration::from_secs(30),
    );

    // Inbound event dispatches to the handler; the expired credential parks
    // the message instead of failing the invocation.
    let event = InboundEvent::new("msg-park", "sender@other.test", vec!["a@example.com".into()]);
    pipeline.process_event("exec-park", &event).await?;

    assert!(handler.delivered.lock().is_empty());
    assert_eq!(retry_queue.len(), 1);

    // Credential refreshed; the on-demand drain replays the parked message.
    handler.refresh_credential();
    let orchestrator = RetryOrchestrator::new(
        Arc::new(retry_queue.clone()),
        Arc::new(HandlerReplayInvoker {
            handler: handler.clone(),
        }),
        Arc::new(emitter.clone()),
        "MailRoute/test",
        orchestrator_config(),
    );
    let report = orchestrator.run().await?;

    assert_eq!(report.received, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert!(retry_queue.is_empty());
    assert_eq!(*handler.delivered.lock(), vec!["a@example.com".to_string()]);
    assert_eq!(emitter.total_for(counters::RETRY_DRAIN_COMPLETED), 1.0);
    Ok(())
}

#[tokio::test]
async fn still_expired_credential_escalates_out_of_retry_queue() {
    let retry_queue = MemoryRetryQueue::new(Duration::from_secs(60));
    let handler = DeliveryHandler::with_expired_credential();

    // Park one message directly, then drain without refreshing.
    let parked = serde_json::json!({
        "source": "mailroute.router",
        "detail_type": "routing-decision",
        "action": "deliver",
        "count": 1,
        "decisions": [],
        "published_at": chrono::Utc::now(),
    });
    retry_queue.send(parked).await.unwrap();

    let emitter = MemoryCounterEmitter::new();
    let orchestrator = RetryOrchestrator::new(
        Arc::new(retry_queue.clone()),
        Arc::new(HandlerReplayInvoker {
            handler: handler.clone(),
        }),
        Arc::new(emitter.clone()),
        "MailRoute/test",
        orchestrator_config(),
    );

    let report = orchestrator.run().await.unwrap();

    // The credential-expired classification is not retried inline, and the
    // message leaves the retry queue for the source dead-letter path.
    assert_eq!(report.received, 1);
    assert_eq!(report.failed, 1);
    assert!(retry_queue.is_empty());
    assert_eq!(emitter.total_for(counters::RETRY_REPLAY_FAILURE), 1.0);
}
