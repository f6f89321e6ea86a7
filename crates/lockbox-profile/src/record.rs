//! Small JSON records (profiles, keyrings) stored as whole backend objects

use bytes::Bytes;
use lockbox_core::{AbsoluteLocation, LockboxError, LockboxResult};
use lockbox_storage::StorageBackend;
use serde::{de::DeserializeOwned, Serialize};

/// Records larger than this are refused rather than buffered.
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Read and parse the record at `location`; `Ok(None)` if there is none.
pub async fn read_record<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    location: &AbsoluteLocation,
) -> LockboxResult<Option<T>> {
    let mut source = match backend.read(location).await {
        Ok(source) => source,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut buf = Vec::new();
    while let Some(chunk) = source.next_chunk().await? {
        if buf.len() + chunk.len() > MAX_RECORD_SIZE {
            return Err(LockboxError::integrity("record exceeds maximum size"));
        }
        buf.extend_from_slice(&chunk);
    }

    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| LockboxError::Serialization(format!("parsing record: {e}")))
}

/// Serialize `value` and replace the record at `location` with it.
pub async fn write_record<T: Serialize>(
    backend: &dyn StorageBackend,
    location: &AbsoluteLocation,
    value: &T,
) -> LockboxResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| LockboxError::Serialization(format!("serializing record: {e}")))?;

    let mut sink = backend.write(location).await?;
    if let Err(e) = sink.write(Bytes::from(json)).await {
        // Nothing was published; report the write failure, not the abort.
        let _ = sink.abort().await;
        return Err(e.into());
    }
    sink.commit().await?;
    Ok(())
}
