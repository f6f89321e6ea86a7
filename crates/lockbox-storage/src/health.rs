//! Storage health check

use futures::StreamExt;
use lockbox_core::{AbsoluteLocation, LockboxResult};

use crate::backend::StorageBackend;

/// Verify the backend is reachable by listing `root` and pulling one entry
pub async fn check_health(backend: &dyn StorageBackend, root: &AbsoluteLocation) -> LockboxResult<()> {
    let mut entries = backend.list(root).await?;
    if let Some(first) = entries.next().await {
        first?;
    }
    Ok(())
}
