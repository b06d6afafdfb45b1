use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, TableResult};

/// Fires after a copy invocation finished and before its progress is persisted.
pub const BACKUP_BEFORE_PROGRESS_PERSIST: &str = "backup.before_progress_persist";

pub fn table_fail_point(name: &str) -> TableResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("timeout") => ErrorKind::StoreTimeout,
            Some("request_failed") => ErrorKind::StoreRequestFailed,
            _ => ErrorKind::FailpointTriggered,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
