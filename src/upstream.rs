//! Time bounds for calls into the credential store and annotation catalog.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Run an upstream call, failing with [`Error::Upstream`] if it does not settle within `limit`.
///
/// The inner future's own error is passed through unchanged so a store's `NotFound` or
/// `Conflict` still reaches the caller as such.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(res) => res,
        Err(_) => {
            let timeout_ms = limit.as_millis() as u64;
            warn!(operation, timeout_ms, "upstream call timed out");
            Err(Error::upstream(format!(
                "{operation} timed out after {timeout_ms} ms"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn passes_through_inner_result() -> anyhow::Result<()> {
        let value = bounded(Duration::from_secs(1), "noop", async { Ok(7) }).await?;
        assert_eq!(value, 7);

        let err = bounded::<(), _>(Duration::from_secs(1), "noop", async {
            Err(Error::not_found("missing"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn slow_call_becomes_upstream_error() {
        let err = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.to_string().contains("slow timed out"));
    }
}
