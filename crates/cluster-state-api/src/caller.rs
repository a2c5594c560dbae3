//! The seam between API clients and whatever carries their calls.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Delivers a facade call and returns its raw result.
///
/// Implementations may cross a network or dispatch in-process, as
/// [`crate::LocalCaller`] does.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    /// Call `method` on version `version` of `facade`.
    ///
    /// `id` selects an object within the facade, such as a watcher; it is
    /// empty for facades that act on the authenticated entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be delivered or the server
    /// rejects it.
    async fn call(
        &self,
        facade: &str,
        version: u32,
        id: &str,
        method: &str,
        args: Value,
    ) -> Result<Value>;
}

/// Call a facade with typed arguments and results.
pub(crate) async fn call_typed<C, A, R>(
    caller: &C,
    facade: &str,
    id: &str,
    method: &str,
    args: &A,
) -> Result<R>
where
    C: ApiCaller + ?Sized,
    A: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let args = serde_json::to_value(args)?;
    let value = caller.call(facade, crate::FACADE_VERSION, id, method, args).await?;
    Ok(serde_json::from_value(value)?)
}
