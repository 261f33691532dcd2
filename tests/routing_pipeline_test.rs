//! Integration tests for the resolve -> count -> dispatch pipeline.

use mailroute_core::constants::counters;
use mailroute_core::dispatch::DispatchFanout;
use mailroute_core::events::{
    Action, EventPublisher, InboundEvent, MatchKind, SubscriberRegistry, VerdictStatus, Verdicts,
};
use mailroute_core::metrics::{
    IdempotentCounterPublisher, MemoryCounterEmitter, MemoryIdempotencyStore,
};
use mailroute_core::pipeline::InboundPipeline;
use mailroute_core::routing::{EmailAddress, MemoryRouteStore, Resolver, RoutingRule};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn build_pipeline(
    store: &MemoryRouteStore,
    emitter: &MemoryCounterEmitter,
) -> (InboundPipeline, EventPublisher) {
    let publisher = EventPublisher::new(64);
    let fanout = DispatchFanout::new(publisher.clone(), Arc::new(SubscriberRegistry::default()));
    let counter_publisher = IdempotentCounterPublisher::new(
        Arc::new(emitter.clone()),
        Arc::new(MemoryIdempotencyStore::default()),
        "MailRoute/test",
    );
    let pipeline = InboundPipeline::new(
        Resolver::new(Arc::new(store.clone())),
        counter_publisher,
        fanout,
        Duration::from_secs(30),
    );
    (pipeline, publisher)
}

#[tokio::test]
async fn fallback_chain_degrades_through_all_four_forms() {
    let store = MemoryRouteStore::new();
    store.put(RoutingRule::new("user+x@d.com", Action::Deliver, "t-exact"));
    store.put(RoutingRule::new("user@d.com", Action::Deliver, "t-normalized"));
    store.put(RoutingRule::new("*@d.com", Action::Deliver, "t-domain"));
    store.put(RoutingRule::new("*", Action::Deliver, "t-global"));

    let resolver = Resolver::new(Arc::new(store.clone()));
    let recipient = EmailAddress::new("user+x@d.com");

    let expectations = [
        (Some("user+x@d.com"), MatchKind::Exact, "t-exact"),
        (Some("user@d.com"), MatchKind::Normalized, "t-normalized"),
        (Some("*@d.com"), MatchKind::DomainWildcard, "t-domain"),
        (Some("*"), MatchKind::GlobalWildcard, "t-global"),
        (None, MatchKind::Default, ""),
    ];

    for (remove_next, expected_kind, expected_target) in expectations {
        let outcome = resolver.resolve_recipient(&recipient).await.unwrap();
        assert_eq!(outcome.matched_key, expected_kind);
        assert_eq!(outcome.target, expected_target);
        if let Some(pattern) = remove_next {
            store.remove(pattern);
        }
    }
}

#[tokio::test]
async fn normalized_rule_resolves_plus_tagged_recipient_end_to_end() {
    let store = MemoryRouteStore::new();
    store.put(RoutingRule::new("a@example.com", Action::Deliver, "inbox-1"));
    let emitter = MemoryCounterEmitter::new();
    let (pipeline, publisher) = build_pipeline(&store, &emitter);
    let mut bus = publisher.subscribe();

    let event = InboundEvent::new(
        "msg-e2e-1",
        "sender@other.test",
        vec!["a+promo@example.com".into()],
    );
    let decisions = pipeline.process_event("exec-e2e-1", &event).await.unwrap();

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].action, Action::Deliver);
    assert_eq!(decisions[0].target, "inbox-1");
    assert_eq!(decisions[0].matched_key, MatchKind::Normalized);

    // The decision also went out on the bus, tagged with its action.
    let published = bus.recv().await.unwrap();
    assert_eq!(published.action, Action::Deliver);
    assert_eq!(published.count, 1);
    assert_eq!(published.decisions[0].recipient, "a+promo@example.com");

    assert_eq!(emitter.total_for(counters::ROUTER_RESOLVE_SUCCESS), 1.0);
}

#[tokio::test]
async fn mixed_recipients_fan_out_one_event_per_action() {
    let store = MemoryRouteStore::new();
    store.put(RoutingRule::new("a@d.com", Action::Deliver, "inbox-a"));
    store.put(RoutingRule::new("b@d.com", Action::Deliver, "inbox-b"));
    store.put(RoutingRule::new("canary@d.com", Action::Monitor, "canary"));
    let emitter = MemoryCounterEmitter::new();
    let (pipeline, publisher) = build_pipeline(&store, &emitter);
    let mut bus = publisher.subscribe();

    let event = InboundEvent::new(
        "msg-e2e-2",
        "sender@other.test",
        vec![
            "a@d.com".into(),
            "b@d.com".into(),
            "canary@d.com".into(),
            "stranger@d.com".into(),
        ],
    );
    pipeline.process_event("exec-e2e-2", &event).await.unwrap();

    let first = bus.recv().await.unwrap();
    assert_eq!(first.action, Action::Deliver);
    assert_eq!(first.count, 2);

    let second = bus.recv().await.unwrap();
    assert_eq!(second.action, Action::Reject);
    assert_eq!(second.count, 1);
    assert_eq!(second.decisions[0].recipient, "stranger@d.com");

    let third = bus.recv().await.unwrap();
    assert_eq!(third.action, Action::Monitor);
    assert_eq!(third.count, 1);

    assert!(bus.try_recv().is_err());
}

#[tokio::test]
async fn spam_verdict_rejects_every_recipient_without_lookup() {
    let store = MemoryRouteStore::new();
    store.put(RoutingRule::new("a@d.com", Action::Deliver, "inbox-a"));
    let emitter = MemoryCounterEmitter::new();
    let (pipeline, _publisher) = build_pipeline(&store, &emitter);

    let event = InboundEvent::new(
        "msg-e2e-3",
        "spammer@evil.test",
        vec!["a@d.com".into(), "b@d.com".into()],
    )
    .with_verdicts(Verdicts::all_pass().with_check("spam", VerdictStatus::Fail));

    let decisions = pipeline.process_event("exec-e2e-3", &event).await.unwrap();
    assert!(decisions.iter().all(|d| d.action == Action::Reject));
    assert!(decisions.iter().all(|d| d.matched_key == MatchKind::Default));
}

proptest! {
    #[test]
    fn normalization_is_idempotent(
        local in "[a-z]{1,8}",
        tag in proptest::option::of("[a-z0-9]{1,8}"),
        domain in "[a-z]{1,8}\\.[a-z]{2,3}",
    ) {
        let raw = match &tag {
            Some(tag) => format!("{local}+{tag}@{domain}"),
            None => format!("{local}@{domain}"),
        };
        let address = EmailAddress::new(raw);
        let once = address.normalized();
        let twice = once.normalized();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.as_str(), format!("{local}@{domain}"));
    }

    #[test]
    fn lookup_keys_are_bounded_and_end_global(
        local in "[a-z+]{1,12}",
        domain in "[a-z]{1,8}\\.[a-z]{2,3}",
    ) {
        let address = EmailAddress::new(format!("{local}@{domain}"));
        let keys = address.lookup_keys();
        prop_assert!(keys.len() >= 3 && keys.len() <= 4);
        prop_assert_eq!(keys.last().unwrap().1.pattern(), "*");
    }
}
