//! Full-stack tests: client → queue → in-process bridge → engine.

use serde_json::json;
use std::sync::Arc;
use tether_engine::EngineConfig;
use tether_rpc::{CallArg, InProcessBridge, QueueConfig, Remote, RemoteObject, RemoteScope, RpcClient};
use tether_types::{EqualityOperand, ObjectId};

/// Host environment: a Doc class, a free function, and a few globals.
const HOST_SCRIPT: &str = r#"
    Doc = { __name = "Doc" }
    Doc.__index = Doc

    open_docs = {}

    function Doc.new()
        local doc = setmetatable({ title = "untitled", open = true }, Doc)
        open_docs[#open_docs + 1] = doc
        return doc
    end

    function Doc:close()
        self.open = false
    end

    function Doc:rename(title)
        self.title = title
        return self.title
    end

    function active_doc()
        return open_docs[#open_docs]
    end

    function shout(word)
        return string.upper(word)
    end

    -- Indexable view over open_docs: readable element by element but
    -- opaque to introspection, like a host collection object.
    docs_view = setmetatable({}, {
        __name = "DocList",
        __index = function(_, i) return open_docs[i] end,
    })
"#;

fn client() -> RpcClient {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let bridge = InProcessBridge::spawn(EngineConfig::default(), |engine| {
        engine.lua().load(HOST_SCRIPT).exec()?;
        Ok(())
    })
    .expect("engine must come up");
    RpcClient::new(Arc::new(bridge), QueueConfig::default())
}

async fn new_doc(client: &RpcClient) -> RemoteObject {
    let value = client.new_instance("Doc").await.unwrap();
    let descriptor = value.as_wrapped().unwrap().clone();
    RemoteObject::new(client.clone(), descriptor)
}

#[tokio::test]
async fn construct_read_write_call_scenario() {
    let client = client();

    // new("Doc") → a wrapped instance with the first identifier.
    let doc = new_doc(&client).await;
    assert_eq!(doc.descriptor().instance_of(), "Doc");

    // get → scalar by value.
    let title = doc.get("title").await.unwrap();
    assert_eq!(title.as_scalar(), Some(&json!("untitled")));

    // set then get → the assignment landed on the live object.
    doc.set("title", json!("a")).await.unwrap();
    let title = doc.get("title").await.unwrap();
    assert_eq!(title.as_scalar(), Some(&json!("a")));

    // Bound call closes this instance and only this instance.
    let other = new_doc(&client).await;
    doc.call_method("close", vec![]).await.unwrap();

    assert_eq!(
        doc.get("open").await.unwrap().as_scalar(),
        Some(&json!(false))
    );
    assert_eq!(
        other.get("open").await.unwrap().as_scalar(),
        Some(&json!(true))
    );
}

#[tokio::test]
async fn method_arguments_and_results_round_trip() {
    let client = client();
    let doc = new_doc(&client).await;

    let renamed = doc
        .call_method("rename", vec![CallArg::from(json!("quarterly"))])
        .await
        .unwrap();
    assert_eq!(renamed.as_scalar(), Some(&json!("quarterly")));
}

#[tokio::test]
async fn results_feed_back_as_arguments_preserving_identity() {
    let client = client();
    let doc = new_doc(&client).await;

    // active_doc() returns the same concrete object `new` produced; the
    // descriptor that comes back must carry the same identifier.
    let scope = RemoteScope::fetch(&client).await.unwrap();
    let active = scope.get("active_doc").unwrap().as_object().unwrap();
    let current = active.invoke(vec![]).await.unwrap().into_object().unwrap();
    assert_eq!(current.id(), doc.id());

    // And the engine agrees they are the same value.
    assert!(doc.remote_eq(&current).await.unwrap());
}

#[tokio::test]
async fn unknown_reference_resolves_as_error_not_crash() {
    let client = client();

    let err = client.get(ObjectId(999), "x").await.unwrap_err();
    assert_eq!(err.remote_code(), Some("PROXY_UNKNOWN_REFERENCE"));

    // The failure is per-call: the next call proceeds normally.
    let doc = new_doc(&client).await;
    assert!(doc.get("title").await.is_ok());
}

#[tokio::test]
async fn unknown_member_fails_locally() {
    let client = client();
    let doc = new_doc(&client).await;

    let err = doc.get("nonexistent").await.unwrap_err();
    assert!(matches!(err, tether_rpc::RpcError::UnknownMember(_)));
}

#[tokio::test]
async fn scope_exposes_functions_classes_and_hidden_extras() {
    let client = client();
    let scope = RemoteScope::fetch(&client).await.unwrap();

    // Free function, described with its parameter list.
    let shout = scope.get("shout").unwrap().as_object().unwrap();
    assert_eq!(shout.descriptor().instance_of(), "Function");

    // The class table is addressable too.
    assert!(scope.get("Doc").is_some());

    // Host info is only reachable through the globals metatable; the
    // extras list still surfaces it.
    assert_eq!(
        scope.get("engine").unwrap().as_scalar(),
        Some(&json!("tether"))
    );
}

#[tokio::test]
async fn free_function_invocation() {
    let client = client();
    let scope = RemoteScope::fetch(&client).await.unwrap();

    let shout = scope.get("shout").unwrap().as_object().unwrap();
    let result = shout.invoke(vec![CallArg::from(json!("quiet"))]).await.unwrap();
    assert_eq!(result.as_scalar(), Some(&json!("QUIET")));
}

#[tokio::test]
async fn iteration_stops_at_index_out_of_range() {
    let client = client();
    for _ in 0..3 {
        new_doc(&client).await;
    }

    let scope = RemoteScope::fetch(&client).await.unwrap();
    let view = scope.get("docs_view").unwrap().as_object().unwrap();
    assert_eq!(view.descriptor().instance_of(), "DocList");

    let items = view.items().await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item.as_object().is_some()));
}

#[tokio::test]
async fn is_equal_mixes_wrapped_and_literal_operands() {
    let client = client();
    let doc = new_doc(&client).await;

    // Wrapped vs wrapped: same entry.
    assert!(doc.remote_eq(&doc.clone()).await.unwrap());

    // Wrapped vs literal: an object never equals a scalar.
    assert!(!doc.remote_eq_literal(json!("untitled")).await.unwrap());

    // Literal vs literal through the client directly.
    let equal = client
        .is_equal(
            EqualityOperand::literal(json!(7)),
            EqualityOperand::literal(json!(7)),
        )
        .await
        .unwrap();
    assert!(equal);
}

#[tokio::test]
async fn eval_passes_raw_commands_through() {
    let client = client();

    let result = client.eval("return 6 * 7").await.unwrap();
    assert_eq!(result, Some("42".to_string()));

    // A failed eval is a tagged error, and does not poison the session.
    let err = client.eval("this is not a command").await.unwrap_err();
    assert_eq!(err.remote_code(), Some("PROXY_EVALUATION_FAILED"));
    assert_eq!(client.eval("return 1").await.unwrap(), Some("1".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_are_serialized_not_failed() {
    let client = client();
    let doc = new_doc(&client).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let doc = doc.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                doc.get("title").await.map(|_| ())
            } else {
                doc.set("title", json!(format!("title-{i}"))).await
            }
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok(), "contention must queue, not fail");
    }
}

#[tokio::test]
async fn sequences_describe_element_wise_across_the_stack() {
    let client = client();
    new_doc(&client).await;
    new_doc(&client).await;

    let scope = RemoteScope::fetch(&client).await.unwrap();
    let active = scope.get("active_doc").unwrap().as_object().unwrap();

    // open_docs arrives as a per-element sequence when read as a value.
    let open_docs = scope.get("open_docs");
    match open_docs {
        Some(Remote::Sequence(items)) => assert_eq!(items.len(), 2),
        other => panic!("expected sequence, got {other:?}"),
    }

    // Elements keep their identity: the last one is the active doc.
    let last = match scope.get("open_docs") {
        Some(Remote::Sequence(items)) => items.last().unwrap().as_object().unwrap().clone(),
        _ => unreachable!(),
    };
    let current = active.invoke(vec![]).await.unwrap().into_object().unwrap();
    assert_eq!(last.id(), current.id());
}
