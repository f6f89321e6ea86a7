//! OpenDAL logging routed through `tracing` with object paths redacted
//!
//! Profile locations embed an encoding of the user id, so the stock
//! interceptor (which prints raw paths and full error contexts) is never
//! installed. Errors are reported by kind only.

use lockbox_core::redact::secure_path;
use opendal::layers::LoggingInterceptor;
use opendal::raw::{AccessorInfo, Operation};
use opendal::{Error, ErrorKind};

/// Context keys whose values are object paths.
const PATH_KEYS: [&str; 3] = ["path", "from", "to"];

#[derive(Debug, Clone, Copy, Default)]
pub struct RedactingInterceptor;

impl LoggingInterceptor for RedactingInterceptor {
    fn log(
        &self,
        info: &AccessorInfo,
        operation: Operation,
        context: &[(&str, &str)],
        message: &str,
        err: Option<&Error>,
    ) {
        let service = info.scheme();
        let context = render_context(context);
        match err {
            None => tracing::debug!(service, op = %operation, %context, "{message}"),
            // Expected on every existence check.
            Some(err) if err.kind() == ErrorKind::NotFound => tracing::debug!(
                service,
                op = %operation,
                %context,
                kind = %err.kind(),
                "{message}"
            ),
            Some(err) if err.kind() == ErrorKind::Unexpected => tracing::error!(
                service,
                op = %operation,
                %context,
                kind = %err.kind(),
                temporary = err.is_temporary(),
                "{message}"
            ),
            Some(err) => tracing::warn!(
                service,
                op = %operation,
                %context,
                kind = %err.kind(),
                temporary = err.is_temporary(),
                "{message}"
            ),
        }
    }
}

fn render_context(context: &[(&str, &str)]) -> String {
    context
        .iter()
        .map(|(key, value)| {
            if PATH_KEYS.contains(key) {
                format!("{key}={}", secure_path(value))
            } else {
                format!("{key}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
