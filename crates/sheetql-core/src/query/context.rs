//! Per-call execution scope for the shared SQL engine.
//!
//! The engine's hook tables are process-wide, so hooks cannot be handed the
//! provider they should run against. Instead every top-level query pushes a
//! frame onto a thread-local stack for the duration of the evaluation, and
//! hooks read the innermost frame. Frames nest: a hook that runs another
//! query gets a fresh child frame, and the parent is back on top afterwards.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use super::registration::Provider;
use crate::error::{Result, SheetqlError};
use crate::functions::FunctionRegistry;

struct Frame {
    id: Uuid,
    data: RefCell<HashMap<String, Value>>,
    provider: Arc<dyn Provider>,
    functions: Arc<FunctionRegistry>,
}

thread_local! {
    static STACK: RefCell<Vec<Rc<Frame>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame it was created for, also on unwind.
struct FrameGuard;

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let popped = STACK.with(|stack| stack.borrow_mut().pop());
        if let Some(frame) = popped {
            trace!(context = %frame.id, "leaving execution context");
        }
    }
}

/// Run `work` inside a fresh execution context bound to `provider`.
pub fn execute<R>(
    provider: Arc<dyn Provider>,
    functions: Arc<FunctionRegistry>,
    work: impl FnOnce() -> R,
) -> R {
    let frame = Rc::new(Frame {
        id: Uuid::new_v4(),
        data: RefCell::new(HashMap::new()),
        provider,
        functions,
    });
    trace!(
        context = %frame.id,
        provider = frame.provider.provider_type(),
        "entering execution context"
    );
    STACK.with(|stack| stack.borrow_mut().push(frame));
    let _guard = FrameGuard;
    work()
}

/// Handle on the innermost active context.
#[derive(Clone)]
pub struct ExecutionContext {
    frame: Rc<Frame>,
}

impl ExecutionContext {
    /// The innermost context, or `MissingExecutionContext` outside [`execute`].
    pub fn current() -> Result<Self> {
        STACK
            .with(|stack| stack.borrow().last().cloned())
            .map(|frame| ExecutionContext { frame })
            .ok_or(SheetqlError::MissingExecutionContext)
    }

    pub fn is_active() -> bool {
        Self::depth() > 0
    }

    /// Number of nested contexts on this thread.
    pub fn depth() -> usize {
        STACK.with(|stack| stack.borrow().len())
    }

    pub fn id(&self) -> Uuid {
        self.frame.id
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.frame.provider.clone()
    }

    pub fn functions(&self) -> Arc<FunctionRegistry> {
        self.frame.functions.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.frame.data.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.frame.data.borrow_mut().insert(key.into(), value);
    }

    /// Mutate the scratch map in place. `f` must not touch this context's data again.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> R {
        f(&mut self.frame.data.borrow_mut())
    }
}
