//! Allocation stack traces for debug handles.
//!
//! When `stacktrace_depth_limit` is nonzero, every handle open captures a
//! truncated backtrace so an invalid-use diagnostic can name the
//! allocation site of the offending handle.

use std::backtrace::Backtrace;

/// A captured, depth-limited allocation backtrace.
pub(crate) struct AllocationTrace {
    rendered: String,
}

impl AllocationTrace {
    /// Capture the current call stack, keeping at most `depth_limit`
    /// frames. Returns `None` when capture is disabled.
    pub(crate) fn capture(depth_limit: usize) -> Option<AllocationTrace> {
        if depth_limit == 0 {
            return None;
        }
        let full = Backtrace::force_capture().to_string();
        Some(AllocationTrace {
            rendered: truncate_frames(&full, depth_limit),
        })
    }

    /// The rendered (already truncated) trace.
    pub(crate) fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl std::fmt::Display for AllocationTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Cut a rendered backtrace after `limit` frame headers.
///
/// Frame headers look like `  12: symbol`; the `at file:line` continuation
/// lines belong to the preceding frame and are kept with it.
fn truncate_frames(full: &str, limit: usize) -> String {
    let mut out = String::new();
    let mut frames = 0usize;
    for line in full.lines() {
        if is_frame_header(line) {
            frames += 1;
            if frames > limit {
                break;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_frame_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.split_once(':') {
        Some((index, _)) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
