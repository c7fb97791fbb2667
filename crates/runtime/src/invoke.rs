//! Invocation protocol: the only path from the runtime into developer code.
//!
//! An invocation signals Pending immediately, resolves the named function,
//! runs it to completion, and settles exactly once as Fulfilled or
//! Rejected. There are no retries and no timeout; a hung function keeps its
//! caller pending.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use toolspec::{Binding, CleanupHandle, FunctionTable, StreamFunction, StreamSink, ToolFunction};
use tracing::{debug, warn};

use crate::InvokeError;

/// Receives the three lifecycle signals of an invocation.
pub trait Lifecycle {
    fn pending(&mut self) {}
    fn fulfilled(&mut self, _value: &Value) {}
    fn rejected(&mut self, _error: &InvokeError) {}
}

impl Lifecycle for () {}

/// Closure-based [`Lifecycle`].
#[derive(Default)]
pub struct Callbacks<'a> {
    on_pending: Option<Box<dyn FnMut() + 'a>>,
    on_fulfilled: Option<Box<dyn FnMut(&Value) + 'a>>,
    on_rejected: Option<Box<dyn FnMut(&InvokeError) + 'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pending(mut self, f: impl FnMut() + 'a) -> Self {
        self.on_pending = Some(Box::new(f));
        self
    }

    pub fn on_fulfilled(mut self, f: impl FnMut(&Value) + 'a) -> Self {
        self.on_fulfilled = Some(Box::new(f));
        self
    }

    pub fn on_rejected(mut self, f: impl FnMut(&InvokeError) + 'a) -> Self {
        self.on_rejected = Some(Box::new(f));
        self
    }
}

impl Lifecycle for Callbacks<'_> {
    fn pending(&mut self) {
        if let Some(f) = self.on_pending.as_mut() {
            f();
        }
    }

    fn fulfilled(&mut self, value: &Value) {
        if let Some(f) = self.on_fulfilled.as_mut() {
            f(value);
        }
    }

    fn rejected(&mut self, error: &InvokeError) {
        if let Some(f) = self.on_rejected.as_mut() {
            f(error);
        }
    }
}

/// Invoke `name` from `functions` without lifecycle observers.
pub async fn invoke(
    functions: Option<&FunctionTable>,
    name: &str,
    params: Value,
) -> Result<Value, InvokeError> {
    invoke_with(functions, name, params, &mut ()).await
}

/// Invoke `name` from `functions`, reporting to `lifecycle`.
///
/// The developer function runs on its own task so a panic is reported as a
/// rejection instead of unwinding through the caller.
pub async fn invoke_with<L>(
    functions: Option<&FunctionTable>,
    name: &str,
    params: Value,
    lifecycle: &mut L,
) -> Result<Value, InvokeError>
where
    L: Lifecycle + ?Sized,
{
    lifecycle.pending();
    debug!(function = name, "invocation pending");

    let result = match resolve_call(functions, name) {
        Ok(function) => run(function, params).await,
        Err(err) => Err(err),
    };

    match &result {
        Ok(value) => {
            debug!(function = name, "invocation fulfilled");
            lifecycle.fulfilled(value);
        }
        Err(err) => {
            warn!(function = name, error = %err, "invocation rejected");
            lifecycle.rejected(err);
        }
    }
    result
}

async fn run(function: Arc<dyn ToolFunction>, params: Value) -> Result<Value, InvokeError> {
    let handle = tokio::spawn(async move { function.call(params).await });
    match handle.await {
        Ok(result) => result.map_err(InvokeError::from),
        Err(join_err) if join_err.is_panic() => Err(InvokeError::Panicked {
            message: panic_message(join_err.into_panic()),
        }),
        Err(_) => Err(InvokeError::Rejected {
            message: "invocation was cancelled".to_string(),
        }),
    }
}

/// Start the streaming function `name`, reporting through `sink`.
///
/// Panics during start are isolated the same way as in [`invoke`].
pub async fn start_stream(
    functions: Option<&FunctionTable>,
    name: &str,
    params: Value,
    sink: StreamSink,
) -> Result<CleanupHandle, InvokeError> {
    let stream = resolve_stream(functions, name)?;
    debug!(function = name, "starting stream");
    let handle = tokio::spawn(async move { stream.start(params, sink).await });
    match handle.await {
        Ok(result) => result.map_err(InvokeError::from),
        Err(join_err) if join_err.is_panic() => Err(InvokeError::Panicked {
            message: panic_message(join_err.into_panic()),
        }),
        Err(_) => Err(InvokeError::Rejected {
            message: "stream start was cancelled".to_string(),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolve a request/response function.
pub fn resolve_call(
    functions: Option<&FunctionTable>,
    name: &str,
) -> Result<Arc<dyn ToolFunction>, InvokeError> {
    match lookup(functions, name)? {
        Binding::Call(function) => Ok(function.clone()),
        Binding::Unbound => Err(InvokeError::NotCallable(name.to_string())),
        other => Err(InvokeError::WrongKind {
            name: name.to_string(),
            expected: "function",
            actual: other.kind(),
        }),
    }
}

/// Resolve a streaming function.
pub fn resolve_stream(
    functions: Option<&FunctionTable>,
    name: &str,
) -> Result<Arc<dyn StreamFunction>, InvokeError> {
    match lookup(functions, name)? {
        Binding::Stream(function) => Ok(function.clone()),
        Binding::Unbound => Err(InvokeError::NotCallable(name.to_string())),
        other => Err(InvokeError::WrongKind {
            name: name.to_string(),
            expected: "stream",
            actual: other.kind(),
        }),
    }
}

fn lookup<'a>(functions: Option<&'a FunctionTable>, name: &str) -> Result<&'a Binding, InvokeError> {
    let functions = functions.ok_or(InvokeError::MissingFunctionTable)?;
    functions
        .get(name)
        .ok_or_else(|| InvokeError::FunctionNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use toolspec::FunctionError;

    fn table() -> FunctionTable {
        let mut table = FunctionTable::new();
        table
            .register("echo", |params| async move { Ok(params) })
            .register("fail", |_| async {
                Err::<Value, _>(FunctionError::from("backend unavailable"))
            })
            .register("explode", |_| async {
                if true {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            })
            .register_stream("ticks", |_, _sink| async { Ok(CleanupHandle::noop()) })
            .declare("declared");
        table
    }

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Lifecycle for Recorder {
        fn pending(&mut self) {
            self.0.push("pending".into());
        }
        fn fulfilled(&mut self, value: &Value) {
            self.0.push(format!("fulfilled:{value}"));
        }
        fn rejected(&mut self, error: &InvokeError) {
            self.0.push(format!("rejected:{error}"));
        }
    }

    #[tokio::test]
    async fn fulfilled_invocation_signals_pending_then_value() {
        let table = table();
        let mut recorder = Recorder::default();
        let value = invoke_with(Some(&table), "echo", json!({"a": 1}), &mut recorder)
            .await
            .unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert_eq!(recorder.0, vec!["pending", "fulfilled:{\"a\":1}"]);
    }

    #[tokio::test]
    async fn rejection_carries_the_function_message() {
        let table = table();
        let mut recorder = Recorder::default();
        let err = invoke_with(Some(&table), "fail", Value::Null, &mut recorder)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InvokeError::Rejected {
                message: "backend unavailable".into()
            }
        );
        assert_eq!(recorder.0, vec!["pending", "rejected:backend unavailable"]);
    }

    #[tokio::test]
    async fn panics_are_normalized() {
        let table = table();
        let err = invoke(Some(&table), "explode", Value::Null).await.unwrap_err();
        assert_eq!(
            err,
            InvokeError::Panicked {
                message: "kaboom".into()
            }
        );
    }

    #[tokio::test]
    async fn configuration_errors_fail_fast() {
        let table = table();
        assert_eq!(
            invoke(None, "echo", Value::Null).await.unwrap_err(),
            InvokeError::MissingFunctionTable
        );
        assert_eq!(
            invoke(Some(&table), "missing", Value::Null).await.unwrap_err(),
            InvokeError::FunctionNotFound("missing".into())
        );
        assert_eq!(
            invoke(Some(&table), "declared", Value::Null).await.unwrap_err(),
            InvokeError::NotCallable("declared".into())
        );
        assert!(matches!(
            invoke(Some(&table), "ticks", Value::Null).await.unwrap_err(),
            InvokeError::WrongKind { expected: "function", actual: "stream", .. }
        ));
    }

    #[tokio::test]
    async fn configuration_errors_still_settle_once() {
        let mut recorder = Recorder::default();
        let _ = invoke_with(None, "echo", Value::Null, &mut recorder).await;
        assert_eq!(recorder.0.len(), 2);
        assert_eq!(recorder.0[0], "pending");
    }

    #[tokio::test]
    async fn closure_callbacks_observe_the_lifecycle() {
        let table = table();
        let log = RefCell::new(Vec::new());
        let mut callbacks = Callbacks::new()
            .on_pending(|| log.borrow_mut().push("pending".to_string()))
            .on_fulfilled(|v| log.borrow_mut().push(format!("ok {v}")));
        invoke_with(Some(&table), "echo", json!(7), &mut callbacks)
            .await
            .unwrap();
        drop(callbacks);
        assert_eq!(log.into_inner(), vec!["pending", "ok 7"]);
    }

    #[tokio::test]
    async fn start_stream_isolates_panics() {
        let mut table = table();
        table.register_stream("bad", |_, _sink| async {
            if true {
                panic!("no socket");
            }
            Ok(CleanupHandle::noop())
        });
        let (sink, _rx) = StreamSink::channel();
        let err = start_stream(Some(&table), "bad", Value::Null, sink)
            .await
            .err();
        assert_eq!(
            err,
            Some(InvokeError::Panicked {
                message: "no socket".into()
            })
        );

        let (sink, _rx) = StreamSink::channel();
        assert!(start_stream(Some(&table), "ticks", Value::Null, sink).await.is_ok());
    }

    #[test]
    fn resolve_stream_rejects_call_bindings() {
        let table = table();
        assert!(resolve_stream(Some(&table), "ticks").is_ok());
        assert!(matches!(
            resolve_stream(Some(&table), "echo"),
            Err(InvokeError::WrongKind { expected: "stream", .. })
        ));
    }
}
