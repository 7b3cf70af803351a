use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};

pub const EXTRACT_BEFORE_QUERY: &str = "extract.before_query";
pub const LOAD_AFTER_STAGING: &str = "load.after_staging";
pub const LOAD_BEFORE_TRUNCATE: &str = "load.before_truncate";
pub const WATERMARK_BEFORE_COMMIT: &str = "watermark.before_commit";

/// Returns an error when the failpoint `name` is configured to `return`.
///
/// The optional parameter picks how the error is classified: `timed_retry` yields a transient
/// error that the retry policy retries, anything else a permanent one.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("timed_retry") => ErrorKind::WithTimedRetry,
            _ => ErrorKind::WithNoRetry,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
