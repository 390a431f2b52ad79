use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spchain_core::ids::next_batch_id;
use spchain_core::protocol::{ExecutionMode, Transport, TransportError, WireRequest, WireResponse};
use spchain_core::{
    ActionId, ActionKind, ActionRequest, Arg, ClientSvcOperation, PendingAction, Protocol, ReferenceResolver,
    RestOperation, Segment, ServiceContext,
};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

#[derive(Debug)]
struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, _request: WireRequest) -> Result<WireResponse, TransportError> {
        Ok(WireResponse::ok(""))
    }
}

fn context() -> Arc<ServiceContext> {
    Arc::new(ServiceContext::new("https://contoso.example/sites/bench", Arc::new(NullTransport)))
}

fn rest_actions(ctx: &Arc<ServiceContext>, size: u32) -> Vec<PendingAction> {
    let batch = next_batch_id();
    let lists = ctx.rest_root().path("web").path("lists");
    (0..size)
        .map(|i| {
            let target = lists
                .invoke("getByTitle", [format!("List {}", i)])
                .select(["Title", "Id"])
                .expect("valid select");
            let request = if i % 2 == 0 {
                ActionRequest::rest(ActionKind::Read, RestOperation::get())
            } else {
                ActionRequest::rest(ActionKind::Update, RestOperation::merge(json!({"Description": i})))
            };
            PendingAction::new(batch, ActionId::new(i), target, request).0
        })
        .collect()
}

fn client_svc_actions(ctx: &Arc<ServiceContext>, size: u32) -> Vec<PendingAction> {
    let batch = next_batch_id();
    let set = ctx
        .client_svc_root()
        .descend(Segment::StaticMethod {
            type_id: "{981cbc68-9edc-4f8d-872f-71146fcbb84f}".into(),
            name: "GetTaxonomySession".into(),
            args: vec![],
        })
        .invoke("GetDefaultSiteCollectionTermStore", Vec::<Arg>::new())
        .invoke("GetTermSetById", [Arg::Guid(uuid::Uuid::nil())]);
    (0..size)
        .map(|i| {
            let target = set.invoke("GetTerm", [Arg::Guid(uuid::Uuid::from_u128(i as u128))]);
            let request = ActionRequest::client_svc(
                ActionKind::Invoke,
                ClientSvcOperation::method("SetDescription", [Arg::from(format!("term {}", i)), Arg::from(1033)]),
            );
            PendingAction::new(batch, ActionId::new(i), target, request).0
        })
        .collect()
}

fn bench_serialize(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("batch_serialization");

    for size in [1u32, 10, 100] {
        let rest = rest_actions(&ctx, size);
        group.bench_with_input(BenchmarkId::new("rest_batch", size), &rest, |b, actions| {
            b.iter(|| {
                let resolved = ReferenceResolver::resolve(next_batch_id(), Protocol::Rest, actions).expect("resolvable");
                let encoded = Protocol::Rest
                    .adapter()
                    .serialize(ctx.base_url(), resolved, ExecutionMode::Deferred)
                    .expect("serializable");
                black_box(encoded)
            })
        });

        let csom = client_svc_actions(&ctx, size);
        group.bench_with_input(BenchmarkId::new("client_svc", size), &csom, |b, actions| {
            b.iter(|| {
                let resolved =
                    ReferenceResolver::resolve(next_batch_id(), Protocol::ClientSvc, actions).expect("resolvable");
                let encoded = Protocol::ClientSvc
                    .adapter()
                    .serialize(ctx.base_url(), resolved, ExecutionMode::Deferred)
                    .expect("serializable");
                black_box(encoded)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_serialize);
criterion_main!(benches);
