//! Bounded rendering of request and reply payloads for `tracing`.

use std::borrow::Cow;

/// Keep the head and tail of `msg` when it exceeds `limit` bytes, noting how
/// many bytes were dropped in between.
pub fn truncate_for_log(msg: &str, limit: usize) -> Cow<'_, str> {
    if msg.len() <= limit {
        return Cow::Borrowed(msg);
    }
    let half = limit / 2;
    let head_end = floor_boundary(msg, half);
    let tail_start = ceil_boundary(msg, msg.len() - half);
    Cow::Owned(format!(
        "{} ... ({} bytes) ... {}",
        &msg[..head_end],
        msg.len() - limit,
        &msg[tail_start..]
    ))
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
