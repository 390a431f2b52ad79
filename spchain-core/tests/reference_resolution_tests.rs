// Reference resolution tests
// Actions that target objects created earlier in the same batch.

mod support;

use serde_json::json;
use spchain_core::protocol::WireResponse;
use spchain_core::{
    ActionId, ActionKind, ActionRequest, Arg, ClientSvcOperation, CompositionError, PathAnchor,
    ProducedRef, Protocol, ResourceNode, RestOperation, Segment, ServiceContext, SpError,
};
use std::sync::Arc;
use support::{context, ScriptedTransport};
use uuid::Uuid;

const SESSION_TYPE: &str = "{981cbc68-9edc-4f8d-872f-71146fcbb84f}";

fn term_store(ctx: &Arc<ServiceContext>) -> ResourceNode {
    ctx.client_svc_root()
        .descend(Segment::StaticMethod {
            type_id: SESSION_TYPE.to_string(),
            name: "GetTaxonomySession".to_string(),
            args: vec![],
        })
        .invoke("GetDefaultSiteCollectionTermStore", Vec::<Arg>::new())
}

fn create_term(store: &ResourceNode, term_id: Uuid) -> ActionRequest {
    let store = store.unbatched();
    ActionRequest::client_svc(ActionKind::Create, ClientSvcOperation::Create { properties: vec![] })
        .with_identity(move |_| Some(store.invoke("GetTerm", [Arg::Guid(term_id)])))
}

#[cfg(test)]
mod reference_resolution {
    use super::*;

    #[tokio::test]
    async fn test_create_then_describe_in_one_batch() {
        println!("🧪 Create a term and describe it before it exists");

        let transport = ScriptedTransport::new();
        // object paths: session 0, store 1, set 2, created term 3
        // actions: ObjectPath 4, Query 5, SetDescription 6 (void, no entry)
        transport.respond(WireResponse::ok(
            json!([
                {"SchemaVersion": "15.0.0.0", "LibraryVersion": "16.0.0.0", "ErrorInfo": null},
                4, {"IsNull": false},
                5, {"_ObjectType_": "SP.Taxonomy.Term", "Name": "Blue"}
            ])
            .to_string(),
        ));
        let ctx = context(&transport);
        let batch = ctx.batch(Protocol::ClientSvc);

        let set_id = Uuid::new_v4();
        let term_id = Uuid::new_v4();
        let store = term_store(&ctx).in_batch(&batch);
        let set = store.invoke("GetTermSetById", [Arg::Guid(set_id)]);

        let created = set
            .invoke("CreateTerm", [Arg::from("Blue"), Arg::from(1033), Arg::Guid(term_id)])
            .enqueue(create_term(&store, term_id))
            .unwrap();
        let term = created.produced().expect("create yields a produced node");
        let described = term
            .enqueue(ActionRequest::client_svc(
                ActionKind::Invoke,
                ClientSvcOperation::method("SetDescription", [Arg::from("A colour"), Arg::from(1033)]),
            ))
            .unwrap();

        batch.execute().await.unwrap();
        assert_eq!(created.await.unwrap()["Name"], "Blue");
        assert!(described.await.unwrap().is_null());

        let body = transport.requests()[0].body_text();
        assert!(body.contains("<Method Id=\"3\" ParentId=\"2\" Name=\"CreateTerm\">"));
        assert!(body.contains("<Method Name=\"SetDescription\" Id=\"6\" ObjectPathId=\"3\">"));
        println!("✅ Dependent action addressed the created term through its token");

        // identity written back: the same node now resolves to a stable path
        let chain = term.object_path().unwrap();
        assert_eq!(chain.anchor, PathAnchor::Root);
        assert_eq!(
            chain.steps.last(),
            Some(&Segment::method("GetTerm", [Arg::Guid(term_id)]))
        );
    }

    #[tokio::test]
    async fn test_produced_node_rejected_by_another_batch() {
        let transport = ScriptedTransport::new();
        let ctx = context(&transport);
        let first = ctx.batch(Protocol::ClientSvc);
        let second = ctx.batch(Protocol::ClientSvc);

        let store = term_store(&ctx).in_batch(&first);
        let created = store
            .invoke("GetTermSetById", [Arg::Guid(Uuid::nil())])
            .invoke("CreateTerm", [Arg::from("x"), Arg::from(1033), Arg::Guid(Uuid::nil())])
            .enqueue(create_term(&store, Uuid::nil()))
            .unwrap();

        let foreign = created.produced().unwrap().in_batch(&second);
        let err = foreign
            .enqueue(ActionRequest::client_svc(
                ActionKind::Delete,
                ClientSvcOperation::method("DeleteObject", Vec::<Arg>::new()),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            SpError::Composition(CompositionError::DependencyOrder { .. })
        ));
    }

    #[tokio::test]
    async fn test_reference_to_later_action_rejected() {
        let transport = ScriptedTransport::new();
        let ctx = context(&transport);
        let batch = ctx.batch(Protocol::ClientSvc);

        // forged handle on the object action 1 would create
        let later = ProducedRef::new(batch.id(), ActionId::new(1), Protocol::ClientSvc, Some(ctx.clone()));
        let err = ResourceNode::produced(later)
            .in_batch(&batch)
            .enqueue(ActionRequest::client_svc(ActionKind::Read, ClientSvcOperation::query()))
            .unwrap_err();
        match err {
            SpError::Composition(CompositionError::DependencyOrder { action, referenced, .. }) => {
                assert_eq!(action, ActionId::new(0));
                assert_eq!(referenced, ActionId::new(1));
            }
            other => panic!("expected dependency order error, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_rest_chain_below_unresolved_object() {
        let transport = ScriptedTransport::new();
        let ctx = context(&transport);
        let batch = ctx.batch(Protocol::Rest);

        let pending = ProducedRef::new(batch.id(), ActionId::new(0), Protocol::Rest, Some(ctx.clone()));
        let err = ResourceNode::produced(pending)
            .path("items")
            .in_batch(&batch)
            .enqueue(ActionRequest::rest(ActionKind::Read, RestOperation::get()))
            .unwrap_err();
        assert!(matches!(
            err,
            SpError::Composition(CompositionError::UnresolvedReference { .. })
        ));
    }

    #[tokio::test]
    async fn test_client_svc_path_without_entry_point_fails_batch() {
        let transport = ScriptedTransport::new();
        let ctx = context(&transport);
        let batch = ctx.batch(Protocol::ClientSvc);

        let handle = ctx
            .client_svc_root()
            .path("Web")
            .in_batch(&batch)
            .enqueue(ActionRequest::client_svc(ActionKind::Read, ClientSvcOperation::query()))
            .unwrap();

        assert!(matches!(batch.execute().await, Err(SpError::Configuration(_))));
        assert!(matches!(handle.await, Err(SpError::Configuration(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_prefix_interned_once() {
        let transport = ScriptedTransport::new();
        transport.respond(WireResponse::ok(
            json!([{"ErrorInfo": null}, 3, {"Name": "a"}, 4, {"Name": "b"}]).to_string(),
        ));
        let ctx = context(&transport);
        let batch = ctx.batch(Protocol::ClientSvc);
        let store = term_store(&ctx).in_batch(&batch);

        let query = || ActionRequest::client_svc(ActionKind::Read, ClientSvcOperation::query());
        let a = store.invoke("GetTermSetById", [Arg::Guid(Uuid::nil())]).enqueue(query()).unwrap();
        let b = store.invoke("GetTermSetById", [Arg::Guid(Uuid::nil())]).enqueue(query()).unwrap();

        batch.execute().await.unwrap();
        assert_eq!(a.await.unwrap()["Name"], "a");
        assert_eq!(b.await.unwrap()["Name"], "b");

        let body = transport.requests()[0].body_text();
        assert_eq!(body.matches("Name=\"GetTermSetById\"").count(), 1);
    }
}
