//! OpenDAL Operator factory for lockbox storage backends

use lockbox_core::config::{BackendKind, StorageConfig};
use lockbox_core::{LockboxError, LockboxResult};
use opendal::layers::LoggingLayer;
use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};

use crate::logging::RedactingInterceptor;

/// Staging directory used for fs writes when none is configured.
pub const DEFAULT_STAGING_DIR: &str = ".lockbox-staging";

/// S3 access credentials. Only needed for [`BackendKind::S3`].
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for the configured backend.
///
/// The fs service always gets an atomic write dir, so a write that never
/// commits leaves nothing at its target. Service logging goes through
/// [`RedactingInterceptor`], never the stock one. No retry layer is installed:
/// transient failures surface to the caller flagged as retryable.
pub fn build_operator(
    storage: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> LockboxResult<Operator> {
    let op = match storage.backend {
        BackendKind::Fs => {
            let staging = storage
                .atomic_write_dir
                .clone()
                .unwrap_or_else(|| storage.root.join(DEFAULT_STAGING_DIR));
            // opendal 0.55: builders use the consuming pattern
            let builder = opendal::services::Fs::default()
                .root(&storage.root.to_string_lossy())
                .atomic_write_dir(&staging.to_string_lossy());
            Operator::new(builder)
                .map_err(|e| LockboxError::Config(format!("creating fs operator: {e}")))?
                .layer(LoggingLayer::new(RedactingInterceptor))
                .finish()
        }
        BackendKind::Memory => Operator::new(opendal::services::Memory::default())
            .map_err(|e| LockboxError::Config(format!("creating memory operator: {e}")))?
            .layer(LoggingLayer::new(RedactingInterceptor))
            .finish(),
        BackendKind::S3 => {
            check_endpoint_tls(storage)?;
            let creds = credentials.ok_or_else(|| {
                LockboxError::Config(
                    "S3 backend selected but no credentials were provided".into(),
                )
            })?;
            // Path-style addressing is the default, as SeaweedFS and MinIO require.
            let builder = opendal::services::S3::default()
                .endpoint(&storage.endpoint)
                .region(&storage.region)
                .bucket(&storage.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(creds.secret_access_key.expose_secret());
            Operator::new(builder)
                .map_err(|e| LockboxError::Config(format!("creating S3 operator: {e}")))?
                .layer(LoggingLayer::new(RedactingInterceptor))
                .finish()
        }
    };
    Ok(op)
}

/// Reject plaintext HTTP when `enforce_tls` is set; warn about it otherwise.
fn check_endpoint_tls(storage: &StorageConfig) -> LockboxResult<()> {
    if !storage.endpoint.starts_with("http://") {
        return Ok(());
    }
    if storage.enforce_tls {
        return Err(LockboxError::Config(format!(
            "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
             Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
            storage.endpoint
        )));
    }
    tracing::warn!(
        endpoint = %storage.endpoint,
        "S3 endpoint uses plaintext HTTP; credentials and ciphertext travel unencrypted. \
         Set storage.enforce_tls = true and use HTTPS in production."
    );
    Ok(())
}
