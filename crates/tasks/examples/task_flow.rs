// Task flow walkthrough
//
// Wires the tasks service, event pipeline and gateway relay in one process,
// then creates, updates and comments on a task while two users watch their
// realtime streams. Tune with TASKWIRE_* variables or a .env file.
//
// Run with: cargo run -p taskwire-tasks --example task_flow

use std::sync::Arc;
use std::time::Duration;

use taskwire_contracts::{
    CorrelationContext, Domain, TaskPatch, TaskPriority, TaskStatus, TasksCommentCreate,
    TasksCommentCreatePayload, TasksCreate, TasksCreatePayload, TasksFindAll,
    TasksFindAllPayload, TasksUpdate, TasksUpdatePayload,
};
use taskwire_fabric::{
    init_tracing, ClientSubscription, ContractRegistry, EventPipeline, FabricConfig, GatewayRelay,
    LocalTransport, RpcClient,
};
use taskwire_tasks::{InMemoryTaskStore, TaskAudienceResolver, TasksService};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("taskwire=info");

    let config = FabricConfig::from_env();
    info!(?config, "starting task flow");

    let store = InMemoryTaskStore::new();
    let relay = Arc::new(GatewayRelay::new(config.relay_dedup_capacity));
    let pipeline = EventPipeline::builder(
        Arc::new(TaskAudienceResolver::new(store.clone())),
        relay.clone(),
    )
    .config(config.pipeline_config())
    .spawn();

    let registry = Arc::new(ContractRegistry::for_domain(Domain::Tasks)?);
    let service = Arc::new(
        TasksService::new(store, pipeline.publisher())
            .with_default_page_size(config.default_page_size),
    );
    let dispatcher = service.into_dispatcher(registry)?;
    let transport = LocalTransport::new().with_service(Domain::Tasks, Arc::new(dispatcher));
    let client = RpcClient::new(Arc::new(transport)).with_timeout(config.rpc_timeout);

    let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
    let mut alice_stream = relay.connect(alice);
    let mut bob_stream = relay.connect(bob);

    let request = CorrelationContext::new();
    info!(correlation_id = %request.id, "creating task");
    let task = client
        .call::<TasksCreate>(
            &request,
            &TasksCreatePayload {
                title: "Ship the release".into(),
                description: Some("Tag, build and announce".into()),
                status: None,
                priority: Some(TaskPriority::High),
                due_date: None,
                assignee_ids: vec![bob],
                actor_id: alice,
            },
        )
        .await?;

    client
        .call::<TasksUpdate>(
            &CorrelationContext::new(),
            &TasksUpdatePayload {
                id: task.id,
                changes: TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
                actor_id: bob,
            },
        )
        .await?;

    client
        .call::<TasksCommentCreate>(
            &CorrelationContext::new(),
            &TasksCommentCreatePayload {
                task_id: task.id,
                author_id: bob,
                content: "Build is green".into(),
            },
        )
        .await?;

    let page = client
        .call::<TasksFindAll>(&CorrelationContext::new(), &TasksFindAllPayload::default())
        .await?;
    info!(total = page.total, pages = page.total_pages, "listed tasks");

    // Alice hears create, update and Bob's comment; Bob skips his own comment
    print_stream("alice", &mut alice_stream, 3).await?;
    print_stream("bob", &mut bob_stream, 2).await?;

    pipeline.shutdown().await;
    let stats = pipeline.stats();
    info!(
        raised = stats.raised,
        forwarded = stats.forwarded,
        dropped = stats.dropped,
        failed = stats.failed,
        "pipeline stopped"
    );
    Ok(())
}

async fn print_stream(
    who: &str,
    stream: &mut ClientSubscription,
    expected: usize,
) -> anyhow::Result<()> {
    for _ in 0..expected {
        let message = tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("{who}'s stream closed"))?;
        println!("{who} <- {}", serde_json::to_string(&message)?);
    }
    Ok(())
}
