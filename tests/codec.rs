mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use amf_remoting::accel::{MemberKind, Origin};
use amf_remoting::amf::{amf0, amf3, Amf3Decoder, Amf3Encoder, AssocArray, Date};
use amf_remoting::{
    Accelerator, CodecConfig, CodecContext, CompilerStrategy, Object, TypeDescriptor,
    TypeRegistry, Value,
};

const STRATEGIES: [CompilerStrategy; 2] = [CompilerStrategy::Plan, CompilerStrategy::Emit];

fn context(strategy: CompilerStrategy) -> CodecContext {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        TypeDescriptor::new("Foo")
            .member("a", MemberKind::Integer)
            .member("b", MemberKind::String),
    );
    let accelerator = Arc::new(Accelerator::new(registry, strategy));
    CodecContext::new(CodecConfig::default().with_compiler(strategy)).with_accelerator(accelerator)
}

fn encode3(ctx: &CodecContext, value: &Value) -> bytes::Bytes {
    let mut encoder = Amf3Encoder::with_context(ctx.clone());
    encoder.encode(value).unwrap();
    encoder.finish()
}

fn decode3(ctx: &CodecContext, data: &bytes::Bytes) -> Value {
    let mut decoder = Amf3Decoder::with_context(ctx.clone());
    decoder.decode(&mut data.clone()).unwrap()
}

fn nested() -> Value {
    let mut map = AssocArray::new();
    map.insert("when", Date::from_millis(1_700_000_000_000.0));
    map.insert("tags", vec![Value::from("x"), Value::from("y")]);

    let inner = Object::anonymous([
        ("map", Value::from(map)),
        ("list", Value::from(vec![Value::Double(1.0), Value::Double(2.5), Value::Null])),
    ]);
    let middle = Object::anonymous([("inner", Value::from(inner)), ("flag", Value::Boolean(true))]);
    Value::from(vec![Value::from(middle), Value::from("tail")])
}

#[test]
fn foo_roundtrip_is_idempotent() {
    common::init_tracing();
    for strategy in STRATEGIES {
        let ctx = context(strategy);
        let foo = Value::from(Object::typed(
            "Foo",
            [("a", Value::Integer(1)), ("b", Value::from("x"))],
        ));

        let first = encode3(&ctx, &foo);
        let decoded = decode3(&ctx, &first);
        let obj = decoded.as_object().unwrap();
        assert_eq!(obj.type_name(), Some("Foo"));
        assert_eq!(obj.get("a"), Some(&Value::Integer(1)));
        assert_eq!(obj.get("b"), Some(&Value::from("x")));

        let second = encode3(&ctx, &decoded);
        assert_eq!(first, second, "{strategy:?}");
    }
}

#[test]
fn nested_values_roundtrip_in_both_formats() {
    common::init_tracing();
    let value = nested();

    let encoded = amf3::encode(&value).unwrap();
    assert_eq!(amf3::decode(&encoded).unwrap(), value);

    let encoded = amf0::encode(&value).unwrap();
    assert_eq!(amf0::decode(&encoded).unwrap(), value);
}

#[test]
fn unknown_type_decodes_to_dynamic_bag() {
    common::init_tracing();
    let ctx = context(CompilerStrategy::Emit);
    let value = Value::from(Object::typed(
        "com.example.Unregistered",
        [("id", Value::Integer(7)), ("name", Value::from("seven"))],
    ));

    let decoded = decode3(&ctx, &encode3(&ctx, &value));
    let obj = decoded.as_object().unwrap();
    assert_eq!(obj.type_name(), Some("com.example.Unregistered"));
    assert_eq!(obj.get("id"), Some(&Value::Integer(7)));
    assert_eq!(obj.get("name"), Some(&Value::from("seven")));
    assert_eq!(
        ctx.accelerator.compiled("com.example.Unregistered").origin(),
        Origin::DynamicBag
    );
}

#[test]
fn concurrent_first_decode_builds_once() {
    common::init_tracing();
    const THREADS: usize = 8;

    for strategy in STRATEGIES {
        let ctx = context(strategy);
        let payloads: Vec<_> = (0..THREADS)
            .map(|i| {
                let foo = Object::typed(
                    "Foo",
                    [("a", Value::Integer(i as i32)), ("b", Value::from(format!("n{i}")))],
                );
                // Encode without touching the shared cache
                amf3::encode(&Value::from(foo)).unwrap()
            })
            .collect();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = payloads
            .into_iter()
            .map(|payload| {
                let ctx = ctx.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    decode3(&ctx, &payload)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let decoded = handle.join().unwrap();
            assert_eq!(decoded.get("a"), Some(&Value::Integer(i as i32)));
            assert_eq!(decoded.get_str("b"), Some(format!("n{i}").as_str()));
        }
        assert_eq!(ctx.accelerator.stats().builds, 1);
    }
}

#[test]
fn plan_and_emit_agree_on_awkward_member_names() {
    common::init_tracing();
    let value = Value::from(Object::typed(
        "Sp",
        [
            ("first name", Value::from("ada")),
            ("line\nbreak", Value::Integer(3)),
        ],
    ));

    let mut outputs = Vec::new();
    for strategy in STRATEGIES {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(
            TypeDescriptor::new("Sp")
                .member("first name", MemberKind::String)
                .member("line\nbreak", MemberKind::Integer),
        );
        let accelerator = Arc::new(Accelerator::new(registry, strategy));
        assert_eq!(accelerator.compiled("Sp").origin(), Origin::Compiled(strategy));

        let ctx = CodecContext::new(CodecConfig::default().with_compiler(strategy))
            .with_accelerator(accelerator);
        let bytes = encode3(&ctx, &value);
        let decoded = decode3(&ctx, &bytes);
        assert_eq!(decoded.get("first name"), Some(&Value::from("ada")));
        assert_eq!(decoded.get("line\nbreak"), Some(&Value::Integer(3)));
        outputs.push((bytes, decoded));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn associative_arrays_keep_their_shape() {
    common::init_tracing();
    let mut dense = AssocArray::new();
    dense.dense.push(Value::from("a"));
    dense.dense.push(Value::Double(2.0));

    let mut numeric = AssocArray::new();
    numeric.insert("0", "x");
    numeric.insert("7", "y");

    let values = [
        Value::from(AssocArray::new()),
        Value::from(dense),
        Value::from(numeric),
    ];
    for value in &values {
        assert_eq!(&amf3::decode(&amf3::encode(value).unwrap()).unwrap(), value);
        assert_eq!(&amf0::decode(&amf0::encode(value).unwrap()).unwrap(), value);
    }
}
