//! Lifecycle of the daemon's long-running tasks.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

/// How long [`TaskManager::shutdown_all`] waits for tasks to notice
/// cancellation before aborting them.
const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// A task that has returned, failed or panicked.
#[derive(Debug)]
pub struct TaskExit {
    pub name: String,
    pub result: Result<()>,
}

/// Spawns named tasks under one cancellation root.
///
/// Every task receives a child token of the root; cancelling the root (or a
/// single task via [`cancel`](Self::cancel)) asks it to wind down. Tasks that
/// exit on their own are surfaced through [`next_exit`](Self::next_exit).
pub struct TaskManager {
    tasks: JoinSet<Result<()>>,
    names: HashMap<Id, String>,
    tokens: HashMap<String, CancellationToken>,
    root: CancellationToken,
    grace: Duration,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            tokens: HashMap::new(),
            root: CancellationToken::new(),
            grace,
        }
    }

    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let token = self.root.child_token();
        let task_token = token.clone();
        let task_name = name.clone();

        let handle = self.tasks.spawn(async move {
            let result = task(task_token).await;
            if let Err(e) = &result {
                error!("Task '{task_name}' failed: {e:#}");
            }
            result
        });

        info!("Task '{name}' spawned");
        self.names.insert(handle.id(), name.clone());
        self.tokens.insert(name, token);
    }

    /// Requests a single task to stop. Returns `false` for unknown names.
    pub fn cancel(&self, name: &str) -> bool {
        self.tokens.get(name).map(CancellationToken::cancel).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next task to finish. `None` once no task is left.
    pub async fn next_exit(&mut self) -> Option<TaskExit> {
        let (id, result) = match self.tasks.join_next_with_id().await? {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(anyhow!("task panicked: {e}"))),
        };
        let name = self
            .names
            .remove(&id)
            .unwrap_or_else(|| format!("task-{id}"));
        self.tokens.remove(&name);
        Some(TaskExit { name, result })
    }

    /// Cancels every task and waits for all of them.
    ///
    /// Tasks still running after the grace period are aborted. The first
    /// failure encountered is returned once every task is gone.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.root.cancel();

        let mut first_error = None;
        loop {
            match tokio::time::timeout(self.grace, self.next_exit()).await {
                Ok(None) => break,
                Ok(Some(TaskExit { result: Ok(()), .. })) => {}
                Ok(Some(TaskExit { name, result: Err(e) })) => {
                    warn!("Task '{name}' failed during shutdown: {e:#}");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    error!("{} tasks ignored cancellation, aborting", self.tasks.len());
                    self.tasks.abort_all();
                    while self.tasks.join_next().await.is_some() {}
                    self.names.clear();
                    self.tokens.clear();
                    first_error.get_or_insert(anyhow!("task shutdown timeout exceeded"));
                    break;
                }
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn until_cancelled(token: CancellationToken) -> Result<()> {
        token.cancelled().await;
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_cancels_every_task() {
        let mut tasks = TaskManager::new();
        tasks.spawn("a", until_cancelled);
        tasks.spawn("b", until_cancelled);
        assert_eq!(tasks.len(), 2);

        tasks.shutdown_all().await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn single_task_can_be_cancelled() {
        let mut tasks = TaskManager::new();
        tasks.spawn("loop", until_cancelled);
        tasks.spawn("other", until_cancelled);

        assert!(tasks.cancel("loop"));
        assert!(!tasks.cancel("missing"));

        let exit = tasks.next_exit().await.unwrap();
        assert_eq!(exit.name, "loop");
        assert!(exit.result.is_ok());
        assert_eq!(tasks.len(), 1);
        tasks.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn failed_task_is_reported_by_name() {
        let mut tasks = TaskManager::new();
        tasks.spawn("broken", |_| async { Err(anyhow!("no bus")) });

        let exit = tasks.next_exit().await.unwrap();
        assert_eq!(exit.name, "broken");
        assert!(exit.result.is_err());
        assert!(tasks.next_exit().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_surfaces_first_failure() {
        let mut tasks = TaskManager::new();
        tasks.spawn("ok", until_cancelled);
        tasks.spawn("bad", |token: CancellationToken| async move {
            token.cancelled().await;
            Err(anyhow!("cleanup failed"))
        });

        assert!(tasks.shutdown_all().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_tasks_are_aborted() {
        let mut tasks = TaskManager::with_grace(Duration::from_millis(50));
        tasks.spawn("stubborn", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let err = tasks.shutdown_all().await.unwrap_err();
        assert!(format!("{err:#}").contains("timeout"));
        assert!(tasks.is_empty());
    }
}
