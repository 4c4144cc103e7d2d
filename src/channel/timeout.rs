use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{ExecutionError, FlowResult};

use super::DataflowVariable;

/// Returns a variable that a timer thread binds to `value` once `after` has
/// elapsed.
///
/// Adding it as one of a select's inputs turns a blocking select into one
/// with a deadline: if nothing else is ready in time, the timeout channel
/// wins.
///
/// # Errors
///
/// Returns `ExecutionError::Spawn` if the timer thread cannot be started.
pub fn timeout_channel<T>(after: Duration, value: T) -> FlowResult<Arc<DataflowVariable<T>>>
where
    T: Clone + Send + 'static,
{
    let var = Arc::new(DataflowVariable::new());
    let timer = Arc::clone(&var);
    thread::Builder::new()
        .name("flowselect-timeout".to_string())
        .spawn(move || {
            thread::sleep(after);
            // Someone else may have bound it first.
            let _ = timer.bind(value);
        })
        .map_err(|e| ExecutionError::Spawn {
            message: e.to_string(),
        })?;
    Ok(var)
}
