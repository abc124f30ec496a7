//! Lambda evaluator tests: transports, negotiation, and transforms in plans

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blockflow_core::config::EngineConfig;
use blockflow_core::error::Error as CoreError;
use blockflow_core::schema::TypeTag;
use blockflow_core::types::Value;
use blockflow_exec::{Engine, ExecError};
use blockflow_lambda::{
    FailureKind, FunctionRegistry, LambdaClient, LambdaConfig, LambdaError, LambdaRequest,
    LambdaResponse, LambdaWorker, SharedBufferTransport, StreamTransport, Transport,
};
use blockflow_planner::Plan;

fn worker() -> Arc<LambdaWorker> {
    let reg = FunctionRegistry::new();
    reg.register("add", |args: &[Value]| match args {
        [Value::Integer(a), Value::Integer(b)] => Ok(Value::Integer(a + b)),
        other => Err(format!("add: bad args {:?}", other)),
    });
    reg.register("describe", |args: &[Value]| match args {
        [v] => Ok(Value::from(format!("<{}>", v))),
        _ => Err("describe takes one argument".into()),
    });
    reg.register("slow_double", |args: &[Value]| match args {
        [Value::Integer(i)] => {
            thread::sleep(Duration::from_millis(5));
            Ok(Value::Integer(i * 2))
        }
        _ => Err("slow_double: bad args".into()),
    });
    Arc::new(LambdaWorker::new(reg))
}

fn config() -> LambdaConfig {
    LambdaConfig {
        request_timeout: Duration::from_secs(10),
        fast_path: true,
    }
}

/// A stream transport over a socket pair, served by `worker` on its own thread.
#[cfg(unix)]
fn socket_transport(worker: Arc<LambdaWorker>) -> (StreamTransport, thread::JoinHandle<()>) {
    use std::os::unix::net::UnixStream;

    let (client, server) = UnixStream::pair().expect("socket pair");
    let handle = thread::spawn(move || {
        let reader = server.try_clone().expect("clone socket");
        worker
            .serve_stream(reader, server)
            .expect("serve stream");
    });
    let transport = StreamTransport::from_unix_stream(client).expect("transport");
    (transport, handle)
}

fn rows() -> Vec<Vec<Value>> {
    (0..20)
        .map(|i| vec![Value::Integer(i), Value::Integer(i * 10)])
        .collect()
}

#[cfg(unix)]
#[test]
fn test_transports_agree() {
    let w = worker();
    let (stream, server) = socket_transport(w.clone());
    let over_socket = LambdaClient::new(Arc::new(stream), &config());
    let shared = SharedBufferTransport::spawn(w).unwrap();
    let over_buffer = LambdaClient::new(Arc::new(shared), &config());

    let a = over_socket.eval_rows("add", rows(), false).unwrap();
    let b = over_buffer.eval_rows("add", rows(), false).unwrap();
    assert_eq!(a, b);
    assert_eq!(a[3], Value::Integer(33));

    let values = vec![Value::Integer(1), Value::from("x"), Value::Undefined];
    assert_eq!(
        over_socket.eval_values("describe", values.clone(), false).unwrap(),
        over_buffer.eval_values("describe", values, false).unwrap()
    );

    drop(over_socket);
    server.join().expect("server thread");
}

#[cfg(unix)]
#[test]
fn test_concurrent_requests_over_one_socket() {
    let (stream, server) = socket_transport(worker());
    let client = Arc::new(LambdaClient::new(Arc::new(stream), &config()));
    thread::scope(|s| {
        for t in 0..8i64 {
            let client = client.clone();
            s.spawn(move || {
                let input: Vec<Value> = (0..4).map(|i| Value::Integer(t * 100 + i)).collect();
                let out = client.eval_values("slow_double", input, false).unwrap();
                let expected: Vec<Value> =
                    (0..4).map(|i| Value::Integer((t * 100 + i) * 2)).collect();
                assert_eq!(out, expected);
            });
        }
    });
    drop(client);
    server.join().expect("server thread");
}

#[test]
fn test_unknown_function_fails() {
    let shared = SharedBufferTransport::spawn(worker()).unwrap();
    let client = LambdaClient::new(Arc::new(shared), &config());
    match client.eval_values("missing", vec![Value::Integer(1)], false) {
        Err(LambdaError::Failure(f)) => assert_eq!(f.kind, FailureKind::UnknownFunction),
        other => panic!("expected failure, got {:?}", other),
    }
    // The transport stays usable after a failed request.
    assert_eq!(
        client
            .eval_values("describe", vec![Value::Integer(2)], false)
            .unwrap(),
        vec![Value::from("<2>")]
    );
}

#[test]
fn test_skip_undefined_short_circuits() {
    let shared = SharedBufferTransport::spawn(worker()).unwrap();
    let client = LambdaClient::new(Arc::new(shared), &config());
    let out = client
        .eval_rows(
            "add",
            vec![
                vec![Value::Integer(1), Value::Undefined],
                vec![Value::Integer(1), Value::Integer(2)],
            ],
            true,
        )
        .unwrap();
    assert_eq!(out, vec![Value::Undefined, Value::Integer(3)]);
    assert!(client
        .eval_rows("add", vec![vec![Value::Integer(1), Value::Undefined]], false)
        .is_err());
}

struct Unreachable;

impl Transport for Unreachable {
    fn call(&self, _request: LambdaRequest, _timeout: Duration) -> blockflow_lambda::Result<LambdaResponse> {
        Err(LambdaError::Unavailable("no evaluator here".into()))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

#[test]
fn test_negotiate_falls_back() {
    let shared = SharedBufferTransport::spawn(worker()).unwrap();
    let client =
        LambdaClient::negotiate(Some(Arc::new(Unreachable)), Arc::new(shared), &config()).unwrap();
    assert_eq!(client.transport_name(), "shared-buffer");
    assert!(LambdaClient::negotiate(None, Arc::new(Unreachable), &config()).is_err());
}

#[test]
fn test_negotiate_prefers_fast_path() {
    let fast = SharedBufferTransport::spawn(worker()).unwrap();
    let client =
        LambdaClient::negotiate(Some(Arc::new(fast)), Arc::new(Unreachable), &config());
    // The fallback is only contacted when the fast path fails.
    assert_eq!(client.unwrap().transport_name(), "shared-buffer");

    let disabled = LambdaConfig {
        fast_path: false,
        ..config()
    };
    let fast = SharedBufferTransport::spawn(worker()).unwrap();
    assert!(LambdaClient::negotiate(Some(Arc::new(fast)), Arc::new(Unreachable), &disabled).is_err());
}

#[test]
fn test_transform_in_plan() {
    let shared = SharedBufferTransport::spawn(worker()).unwrap();
    let client = Arc::new(LambdaClient::new(Arc::new(shared), &config()));
    let pairs = Plan::range(0, 10)
        .unwrap()
        .union(&[Plan::range(100, 110).unwrap()])
        .unwrap();
    let plan = pairs
        .transform(client.clone(), "add", TypeTag::Integer, false)
        .unwrap();

    let engine = Engine::new(EngineConfig {
        block_size: 3,
        ..EngineConfig::default()
    })
    .unwrap();
    let out = engine.execute(plan.node()).unwrap();
    assert_eq!(out.types, vec![TypeTag::Integer]);
    let got: Vec<i64> = out
        .blocks
        .iter()
        .flat_map(|b| b.column(0).iter().filter_map(Value::as_int).collect::<Vec<_>>())
        .collect();
    assert_eq!(got, (0..10).map(|i| 100 + 2 * i).collect::<Vec<_>>());

    let bad = Plan::range(0, 2)
        .unwrap()
        .transform(client, "missing", TypeTag::Integer, false)
        .unwrap();
    let err = engine.execute(bad.node()).unwrap_err();
    assert!(matches!(err, ExecError::Core(CoreError::EvaluatorFailure(_))));
    assert_eq!(engine.pool().stats().outstanding, 0);
}
