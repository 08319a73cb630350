use std::time::Duration;

use crate::Notice;

/// Quiet period applied to non-empty keyword edits before a fetch goes out.
pub const KEYWORD_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the list after `delay`. A newer `ScheduleFetch` replaces a pending one.
    ScheduleFetch { delay: Duration },
    /// Surface a notice to the user.
    Notify(Notice),
}
