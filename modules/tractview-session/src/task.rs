use std::future::Future;

use tokio::task::JoinHandle;

/// Owned handle to a background task, aborted when dropped.
///
/// Every timer loop in this crate (status poll, push listener, playback
/// ticker) is held through one of these, so no exit path can leak a running
/// timer: replacing or dropping the owner kills the task.
#[derive(Debug)]
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
