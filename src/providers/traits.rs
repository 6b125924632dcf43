//! Provider traits shared by the daemon's services.

use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Creates a component asynchronously.
///
/// # Example
///
/// ```no_run
/// use rigd::providers::traits::AsyncProvider;
///
/// struct Greeting;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for Greeting {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("hello".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A service started through the [`TaskManager`].
///
/// Services start in descending priority order. A critical service that fails
/// to start aborts startup; any other failure is logged and skipped.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    fn priority(&self) -> i32 {
        0
    }

    fn is_critical(&self) -> bool {
        false
    }
}
