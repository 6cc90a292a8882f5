mod common;

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use amf_remoting::accel::MemberKind;
use amf_remoting::amf::fault::codes;
use amf_remoting::amf::packet::{AmfBody, VERSION_AMF0, VERSION_AMF3};
use amf_remoting::invocation::{
    BoxError, InvocationAttribute, InvocationCallback, InvocationResultHandler, MethodDescriptor,
};
use amf_remoting::remoting::{
    Destination, FactoryScope, LruResultCache, Principal, RemotingMessage, ServiceDefinition,
    ServiceFactory,
};
use amf_remoting::{
    AmfGateway, AmfPacket, CallOutcome, CodecContext, InvocationContext, Object, RemotingAdapter,
    RemotingConfig, Value,
};

/// Bank account service; every side effect is counted in `ledger`
struct Accounts {
    ledger: Arc<AtomicUsize>,
}

/// Appends its tag to the context stack
struct Trace(&'static str);

impl InvocationCallback for Trace {
    fn on_invoked(
        &self,
        ctx: &mut InvocationContext,
        _method: &MethodDescriptor,
        _target: &dyn Any,
        _args: &[Value],
        _result: &Value,
    ) -> Result<(), BoxError> {
        ctx.push(Value::from(self.0));
        Ok(())
    }
}

impl InvocationAttribute for Trace {
    fn as_callback(&self) -> Option<&dyn InvocationCallback> {
        Some(self)
    }
}

/// Wraps the result together with the traced tags
struct Envelope;

impl InvocationResultHandler for Envelope {
    fn handle_result(
        &self,
        ctx: &mut InvocationContext,
        _method: &MethodDescriptor,
        _target: &dyn Any,
        _args: &[Value],
        result: &Value,
    ) -> Result<(), BoxError> {
        let mut trace = Vec::new();
        while let Some(tag) = ctx.pop() {
            trace.insert(0, tag);
        }
        let envelope = Object::anonymous([
            ("result", result.clone()),
            ("trace", Value::from(trace)),
        ]);
        ctx.set_result(Value::from(envelope));
        Ok(())
    }
}

impl InvocationAttribute for Envelope {
    fn as_result_handler(&self) -> Option<&dyn InvocationResultHandler> {
        Some(self)
    }
}

fn accounts(ledger: Arc<AtomicUsize>) -> ServiceDefinition {
    ServiceDefinition::builder("Accounts", move || Accounts {
        ledger: ledger.clone(),
    })
    .method("balance")
    .param(MemberKind::String)
    .cacheable()
    .handler(|svc: &mut Accounts, args| {
        svc.ledger.fetch_add(1, Ordering::SeqCst);
        let owner = args[0].as_str().unwrap_or_default();
        Ok(Value::Double(owner.len() as f64 * 100.0))
    })
    .method("close")
    .param(MemberKind::String)
    .roles(&["manager", "auditor"])
    .handler(|svc: &mut Accounts, _args| {
        svc.ledger.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Boolean(true))
    })
    .method("audit")
    .hook(Envelope)
    .hook(Trace("first"))
    .hook(Trace("second"))
    .handler(|_svc: &mut Accounts, _args| Ok(Value::from("clean")))
    .build()
}

fn adapter(ledger: Arc<AtomicUsize>) -> RemotingAdapter {
    let factory = ServiceFactory::new().with_service(accounts(ledger), FactoryScope::Application);
    let cache = LruResultCache::new(NonZeroUsize::new(64).unwrap());
    RemotingAdapter::new(
        Destination::wildcard("amf"),
        Arc::new(factory),
        RemotingConfig::default(),
    )
    .with_cache(Arc::new(cache))
}

fn call(operation: &str, body: Vec<Value>) -> RemotingMessage {
    RemotingMessage::new(operation, body).with_source("Accounts")
}

#[test]
fn cacheable_call_hits_the_service_once() {
    common::init_tracing();
    let ledger = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(ledger.clone());
    let msg = call("balance", vec![Value::from("alice")]);

    let first = adapter.invoke(&msg, &Principal::anonymous());
    let second = adapter.invoke(&msg, &Principal::anonymous());
    assert_eq!(first, CallOutcome::Returned(Value::Double(500.0)));
    assert_eq!(first, second);
    assert_eq!(ledger.load(Ordering::SeqCst), 1);

    // Different arguments miss the cache
    adapter.invoke(&call("balance", vec![Value::from("bob")]), &Principal::anonymous());
    assert_eq!(ledger.load(Ordering::SeqCst), 2);
}

#[test]
fn authorization_precedes_side_effects() {
    common::init_tracing();
    let ledger = Arc::new(AtomicUsize::new(0));
    let adapter = adapter(ledger.clone());
    let msg = call("close", vec![Value::from("alice")]);

    let outcome = adapter.invoke(&msg, &Principal::new("eve", ["teller"]));
    assert_eq!(outcome.fault().unwrap().code.as_deref(), Some(codes::AUTHORIZATION));
    assert_eq!(ledger.load(Ordering::SeqCst), 0);

    let outcome = adapter.invoke(&msg, &Principal::new("dan", ["auditor"]));
    assert_eq!(outcome, CallOutcome::Returned(Value::Boolean(true)));
    assert_eq!(ledger.load(Ordering::SeqCst), 1);
}

#[test]
fn hooks_run_callbacks_then_result_handler() {
    common::init_tracing();
    let adapter = adapter(Arc::new(AtomicUsize::new(0)));
    let outcome = adapter.invoke(&call("audit", vec![]), &Principal::anonymous());

    let value = match outcome {
        CallOutcome::Returned(value) => value,
        CallOutcome::Faulted(fault) => panic!("expected a result, got {fault:?}"),
    };
    assert_eq!(value.get("result"), Some(&Value::from("clean")));
    assert_eq!(
        value.get("trace"),
        Some(&Value::from(vec![Value::from("first"), Value::from("second")]))
    );
}

#[test]
fn gateway_answers_encoded_packets() {
    common::init_tracing();
    let gateway = AmfGateway::new(Arc::new(adapter(Arc::new(AtomicUsize::new(0)))));
    let ctx = CodecContext::default();

    for version in [VERSION_AMF0, VERSION_AMF3] {
        let mut request = AmfPacket::new(version);
        request.bodies.push(AmfBody::new(
            "Accounts.balance",
            "/1",
            Value::from(vec![Value::from("carol")]),
        ));
        request.bodies.push(AmfBody::new(
            "Accounts.close",
            "/2",
            Value::from(vec![Value::from("carol")]),
        ));

        let bytes = gateway
            .handle(&request.encode(&ctx).unwrap(), &Principal::anonymous())
            .unwrap();
        let response = AmfPacket::decode(&bytes, &ctx).unwrap();
        assert_eq!(response.version, version);

        assert_eq!(response.bodies[0].target, "/1/onResult");
        assert_eq!(response.bodies[0].value, Value::Double(500.0));

        assert_eq!(response.bodies[1].target, "/2/onStatus");
        let fault = response.bodies[1].value.as_fault().unwrap();
        assert_eq!(fault.code.as_deref(), Some(codes::AUTHORIZATION));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_from_tasks() {
    common::init_tracing();
    let ledger = Arc::new(AtomicUsize::new(0));
    let adapter = Arc::new(adapter(ledger.clone()));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let adapter = adapter.clone();
            tokio::task::spawn_blocking(move || {
                let owner = "x".repeat(i % 4 + 1);
                let outcome = adapter.invoke(
                    &call("balance", vec![Value::from(owner.as_str())]),
                    &Principal::anonymous(),
                );
                (owner.len(), outcome)
            })
        })
        .collect();

    for task in tasks {
        let (len, outcome) = task.await.unwrap();
        assert_eq!(outcome, CallOutcome::Returned(Value::Double(len as f64 * 100.0)));
    }

    let stats = adapter.stats();
    assert_eq!(stats.calls, 32);
    assert_eq!(stats.faults, 0);
    assert_eq!(stats.cache_hits as usize + ledger.load(Ordering::SeqCst), 32);
}
