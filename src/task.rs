//! Background work the caller can poll or await.
//!
//! Bulk operations and the startup migration run detached from the caller.
//! A `BackgroundTask<T>` keeps their result observable: poll it from an event
//! loop tick, await it, or drop it to let the work finish unobserved.
//!
//! ```ignore
//! let mut task = BackgroundTask::spawn(async move { migrator.migrate_if_needed().await });
//!
//! // In event loop tick
//! if task.poll() {
//!     // State changed, report the outcome
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use tokio::task::JoinHandle;

/// The state of a background task
#[derive(Debug, Clone)]
pub enum TaskState<T> {
  /// Still running
  Running,
  /// Completed with a result
  Finished(T),
  /// Panicked or was cancelled
  Failed(String),
}

impl<T> TaskState<T> {
  pub fn is_running(&self) -> bool {
    matches!(self, TaskState::Running)
  }

  pub fn output(&self) -> Option<&T> {
    match self {
      TaskState::Finished(output) => Some(output),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      TaskState::Failed(e) => Some(e),
      _ => None,
    }
  }
}

/// A spawned tokio task with an observable result.
pub struct BackgroundTask<T> {
  state: TaskState<T>,
  handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
  /// Spawn `future` on the current tokio runtime.
  pub fn spawn<F>(future: F) -> Self
  where
    F: Future<Output = T> + Send + 'static,
  {
    Self {
      state: TaskState::Running,
      handle: Some(tokio::spawn(future)),
    }
  }

  pub fn state(&self) -> &TaskState<T> {
    &self.state
  }

  pub fn is_running(&self) -> bool {
    self.state.is_running()
  }

  pub fn output(&self) -> Option<&T> {
    self.state.output()
  }

  /// Check for completion without blocking.
  ///
  /// Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(handle) = self.handle.as_mut() else {
      return false;
    };
    if !handle.is_finished() {
      return false;
    }

    match handle.now_or_never() {
      Some(result) => {
        self.handle = None;
        self.state = match result {
          Ok(output) => TaskState::Finished(output),
          Err(e) => TaskState::Failed(e.to_string()),
        };
        true
      }
      None => false,
    }
  }

  /// Wait for the task to complete.
  pub async fn wait(self) -> Result<T, String> {
    match self.state {
      TaskState::Finished(output) => Ok(output),
      TaskState::Failed(e) => Err(e),
      TaskState::Running => match self.handle {
        Some(handle) => handle.await.map_err(|e| e.to_string()),
        None => Err("task was never started".to_string()),
      },
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BackgroundTask<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BackgroundTask")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_wait_returns_output() {
    let task = BackgroundTask::spawn(async { 41 + 1 });
    assert_eq!(task.wait().await, Ok(42));
  }

  #[tokio::test]
  async fn test_poll_observes_completion() {
    let mut task = BackgroundTask::spawn(async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      "done"
    });
    assert!(task.is_running());
    assert!(!task.poll());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(task.poll());
    assert_eq!(task.output(), Some(&"done"));

    // Nothing left to observe
    assert!(!task.poll());
    assert_eq!(task.wait().await, Ok("done"));
  }

  #[tokio::test]
  async fn test_panic_surfaces_as_failure() {
    let mut task = BackgroundTask::spawn(async {
      if true {
        panic!("window exploded");
      }
      0u32
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(task.poll());
    assert!(task.state().error().is_some());
    assert!(task.wait().await.is_err());
  }
}
