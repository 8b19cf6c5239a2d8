//! End-to-end flow through the fabric: typed call, dispatch, event raise,
//! recipient resolution, and relay to connected clients.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use taskwire_contracts::{
    CorrelationContext, CorrelationId, Domain, DomainEventEnvelope, FailureKind, GatewayPattern,
    RpcCall, RpcOutcome, RpcPattern, SubCallPolicy, Task, TaskPriority, TaskStatus, TasksCreate,
    TasksCreatePayload, User, UsersFindByIds, UsersFindByIdsPayload,
};
use taskwire_fabric::{
    CallContext, ContractRegistry, EventPipeline, EventPublisher, FabricError, ForwardingState,
    GatewayRelay, HandlerError, LocalTransport, PipelineConfig, RetryPolicy, RpcClient, RpcDispatcher,
    StaticResolver,
};
use uuid::Uuid;

/// Correlation contexts seen by the identity service
type Seen = Arc<Mutex<Vec<CorrelationContext>>>;

fn identity_dispatcher(seen: Seen) -> RpcDispatcher {
    let registry = Arc::new(ContractRegistry::for_domain(Domain::Identity).unwrap());
    RpcDispatcher::builder(registry)
        .handle::<UsersFindByIds, _, _>(move |ctx: CallContext, payload: UsersFindByIdsPayload| {
            let seen = seen.clone();
            async move {
                seen.lock().push(ctx.correlation);
                Ok(payload
                    .ids
                    .into_iter()
                    .map(|id| User {
                        id,
                        username: format!("user-{id}"),
                        email: format!("{id}@example.com"),
                        created_at: Utc::now(),
                    })
                    .collect())
            }
        })
        .unwrap()
        .build()
}

/// Minimal tasks service: validates assignees with identity, commits, raises
fn tasks_dispatcher(
    identity: RpcClient,
    publisher: EventPublisher,
    store: Arc<Mutex<Vec<Task>>>,
) -> RpcDispatcher {
    let registry = Arc::new(ContractRegistry::for_domain(Domain::Tasks).unwrap());
    RpcDispatcher::builder(registry)
        .handle::<TasksCreate, _, _>(move |ctx: CallContext, payload: TasksCreatePayload| {
            let identity = identity.clone();
            let publisher = publisher.clone();
            let store = store.clone();
            async move {
                if !payload.assignee_ids.is_empty() {
                    let users = identity
                        .call::<UsersFindByIds>(
                            &ctx.correlation.for_sub_call(SubCallPolicy::Reuse),
                            &UsersFindByIdsPayload {
                                ids: payload.assignee_ids.clone(),
                            },
                        )
                        .await?;
                    if users.len() != payload.assignee_ids.len() {
                        return Err(HandlerError::rejected("unknown assignee"));
                    }
                }

                let now = Utc::now();
                let task = Task {
                    id: Uuid::now_v7(),
                    title: payload.title,
                    description: payload.description,
                    status: payload.status.unwrap_or(TaskStatus::Todo),
                    priority: payload.priority.unwrap_or(TaskPriority::Medium),
                    due_date: payload.due_date,
                    created_by: payload.actor_id,
                    assignee_ids: payload.assignee_ids,
                    created_at: now,
                    updated_at: now,
                };
                store.lock().push(task.clone());

                if let Err(e) = publisher.raise(DomainEventEnvelope::task_created(
                    task.clone(),
                    Some(payload.actor_id),
                    Some(ctx.correlation.forward()),
                )) {
                    return Err(HandlerError::from(e));
                }
                Ok(task)
            }
        })
        .unwrap()
        .build()
}

struct Harness {
    client: RpcClient,
    relay: Arc<GatewayRelay>,
    pipeline: taskwire_fabric::PipelineHandle,
    store: Arc<Mutex<Vec<Task>>>,
    seen_by_identity: Seen,
}

fn harness(resolver: StaticResolver) -> Harness {
    let relay = Arc::new(GatewayRelay::default());
    let pipeline = EventPipeline::builder(Arc::new(resolver), relay.clone())
        .config(PipelineConfig::default().with_resolver_timeout(Duration::from_secs(1)))
        .spawn();

    let seen_by_identity: Seen = Arc::default();
    let store: Arc<Mutex<Vec<Task>>> = Arc::default();

    let identity_only = Arc::new(LocalTransport::new().with_service(
        Domain::Identity,
        Arc::new(identity_dispatcher(seen_by_identity.clone())),
    ));
    let tasks = tasks_dispatcher(
        RpcClient::new(identity_only.clone()),
        pipeline.publisher(),
        store.clone(),
    );

    let transport = LocalTransport::new()
        .with_service(
            Domain::Identity,
            Arc::new(identity_dispatcher(seen_by_identity.clone())),
        )
        .with_service(Domain::Tasks, Arc::new(tasks));

    Harness {
        client: RpcClient::new(Arc::new(transport)),
        relay,
        pipeline,
        store,
        seen_by_identity,
    }
}

fn create_payload(assignees: Vec<Uuid>) -> TasksCreatePayload {
    TasksCreatePayload {
        title: "Ship release".into(),
        description: None,
        status: None,
        priority: Some(TaskPriority::High),
        due_date: None,
        assignee_ids: assignees,
        actor_id: Uuid::now_v7(),
    }
}

#[test_log::test(tokio::test)]
async fn test_create_forwards_to_resolved_recipients_with_same_correlation() {
    let u1 = Uuid::now_v7();
    let u2 = Uuid::now_v7();
    let h = harness(StaticResolver::new([u1, u2]));
    let mut outcomes = h.pipeline.subscribe();
    let mut sub1 = h.relay.connect(u1);
    let mut sub2 = h.relay.connect(u2);
    let mut bystander = h.relay.connect(Uuid::now_v7());

    let r1 = CorrelationContext::from_id(CorrelationId::parse("R1").unwrap());
    let task = h
        .client
        .call::<TasksCreate>(&r1, &create_payload(vec![u1, u2]))
        .await
        .unwrap();

    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(h.store.lock().len(), 1);

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.state(), ForwardingState::Forwarded);
    let event = outcome.forwarded().unwrap();
    assert_eq!(event.correlation_id().map(|id| id.as_str()), Some("R1"));
    assert_eq!(event.recipients.len(), 2);

    for sub in [&mut sub1, &mut sub2] {
        let message = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.event, GatewayPattern::TaskCreated);
        assert_eq!(message.correlation_id.unwrap().as_str(), "R1");
        assert_eq!(message.event_id, event.id);
    }
    assert!(bystander.try_recv().is_none());

    // The sub-call reused the triggering id
    let seen = h.seen_by_identity.lock().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_caused_by(&r1));
    assert_eq!(seen[0].id, r1.id);
}

#[test_log::test(tokio::test)]
async fn test_empty_audience_still_answers_caller() {
    let h = harness(StaticResolver::empty());
    let mut outcomes = h.pipeline.subscribe();
    let mut sub = h.relay.connect(Uuid::now_v7());

    let task = h
        .client
        .call::<TasksCreate>(&CorrelationContext::new(), &create_payload(vec![]))
        .await
        .unwrap();
    assert_eq!(task.title, "Ship release");

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.state(), ForwardingState::Dropped);
    assert!(outcome.error().is_none());
    assert!(sub.try_recv().is_none());
    assert_eq!(h.pipeline.stats().forwarded, 0);
}

#[test_log::test(tokio::test)]
async fn test_raise_on_closed_pipeline_reaches_harness_caller() {
    let h = harness(StaticResolver::new([Uuid::now_v7()]));
    h.pipeline.shutdown().await;

    let err = h
        .client
        .call::<TasksCreate>(&CorrelationContext::new(), &create_payload(vec![]))
        .await
        .unwrap_err();

    match err {
        FabricError::Remote { kind, message, .. } => {
            assert_eq!(kind, FailureKind::Internal);
            assert!(message.contains("closed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.pipeline.stats().raised, 0);
}

#[test_log::test(tokio::test)]
async fn test_malformed_wire_payload_is_rejected_before_commit() {
    let h = harness(StaticResolver::new([Uuid::now_v7()]));
    let transport = LocalTransport::new().with_service(
        Domain::Tasks,
        Arc::new(tasks_dispatcher(
            h.client.clone(),
            h.pipeline.publisher(),
            h.store.clone(),
        )),
    );

    let call = RpcCall::new(
        RpcPattern::TasksCreate,
        CorrelationContext::new(),
        json!({ "description": "no title, no actor" }),
    );
    let reply = taskwire_fabric::Transport::send(&transport, call).await.unwrap();

    match reply.outcome {
        RpcOutcome::Error { error } => assert_eq!(error.kind, FailureKind::ContractViolation),
        RpcOutcome::Ok { .. } => panic!("malformed payload was accepted"),
    }
    assert!(h.store.lock().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_forked_sub_call_links_to_parent() {
    let seen: Seen = Arc::default();
    let transport = LocalTransport::new().with_service(
        Domain::Identity,
        Arc::new(identity_dispatcher(seen.clone())),
    );
    let client = RpcClient::new(Arc::new(transport));

    let root = CorrelationContext::new();
    let child = root.for_sub_call(SubCallPolicy::Distinct);
    client
        .call::<UsersFindByIds>(&child, &UsersFindByIdsPayload { ids: vec![] })
        .await
        .unwrap();

    let seen = seen.lock().clone();
    assert_ne!(seen[0].id, root.id);
    assert_eq!(seen[0].parent_id.as_ref(), Some(&root.id));
    assert!(seen[0].is_caused_by(&root));
    assert_eq!(seen[0].lineage(&[root.clone()]), vec![&seen[0].id, &root.id]);
}

#[tokio::test(start_paused = true)]
async fn test_caller_timeout_does_not_cancel_commit() {
    let relay = Arc::new(GatewayRelay::default());
    let pipeline = EventPipeline::builder(Arc::new(StaticResolver::new([Uuid::now_v7()])), relay)
        .spawn();
    let mut outcomes = pipeline.subscribe();
    let store: Arc<Mutex<Vec<Task>>> = Arc::default();

    let registry = Arc::new(ContractRegistry::for_domain(Domain::Tasks).unwrap());
    let publisher = pipeline.publisher();
    let committed = store.clone();
    let slow = RpcDispatcher::builder(registry)
        .handle::<TasksCreate, _, _>(move |ctx: CallContext, payload: TasksCreatePayload| {
            let publisher = publisher.clone();
            let committed = committed.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let now = Utc::now();
                let task = Task {
                    id: Uuid::now_v7(),
                    title: payload.title,
                    description: None,
                    status: TaskStatus::Todo,
                    priority: TaskPriority::Low,
                    due_date: None,
                    created_by: payload.actor_id,
                    assignee_ids: vec![],
                    created_at: now,
                    updated_at: now,
                };
                committed.lock().push(task.clone());
                if let Err(e) = publisher.raise(DomainEventEnvelope::task_created(
                    task.clone(),
                    None,
                    Some(ctx.correlation),
                )) {
                    return Err(HandlerError::from(e));
                }
                Ok(task)
            }
        })
        .unwrap()
        .build();

    let client = RpcClient::new(Arc::new(
        LocalTransport::new().with_service(Domain::Tasks, Arc::new(slow)),
    ));

    let err = client
        .call_with_timeout::<TasksCreate>(
            &CorrelationContext::new(),
            &create_payload(vec![]),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, taskwire_fabric::FabricError::Timeout { .. }));

    // The callee finishes anyway and its event is still forwarded
    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.state(), ForwardingState::Forwarded);
    assert_eq!(store.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_policy_bounds_attempts() {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskwire_contracts::{ChangeSet, EntitySnapshot};
    use taskwire_fabric::{FabricError, RecipientResolver};

    struct Offline(AtomicU32);

    #[async_trait::async_trait]
    impl RecipientResolver for Offline {
        async fn resolve(
            &self,
            _entity: &EntitySnapshot,
            _changes: Option<&ChangeSet>,
        ) -> taskwire_fabric::Result<BTreeSet<Uuid>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(FabricError::resolver("offline"))
        }
    }

    let resolver = Arc::new(Offline(AtomicU32::new(0)));
    let pipeline = EventPipeline::builder(resolver.clone(), Arc::new(GatewayRelay::default()))
        .config(
            PipelineConfig::default()
                .with_resolver_retry(RetryPolicy::fixed(Duration::from_millis(50), 5)),
        )
        .spawn();
    let mut outcomes = pipeline.subscribe();

    let now = Utc::now();
    let task = Task {
        id: Uuid::now_v7(),
        title: "orphan".into(),
        description: None,
        status: TaskStatus::Done,
        priority: TaskPriority::Low,
        due_date: None,
        created_by: Uuid::now_v7(),
        assignee_ids: vec![],
        created_at: now,
        updated_at: now,
    };
    pipeline
        .publisher()
        .raise(DomainEventEnvelope::task_deleted(task, None, None))
        .unwrap();

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.state(), ForwardingState::Dropped);
    assert!(matches!(
        outcome.error(),
        Some(FabricError::ForwardingFailed { .. })
    ));
    assert_eq!(resolver.0.load(Ordering::SeqCst), 5);
}
