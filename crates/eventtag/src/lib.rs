//! Shared event tagging helpers used across crates.
//!
//! Every event we synthesize carries a process-unique marker value in the
//! `EventSourceUserData` field so the tap callback can let it through
//! untouched instead of feeding our own output back into the engine.

/// 'vnky' in ASCII bytes: 0x76 0x6e 0x6b 0x79 -> 1986947961
pub const VNKEY_TAG: i64 = 1_986_947_961;

/// CoreGraphics field index for `kCGEventSourceUserData`.
pub const FIELD_EVENT_SOURCE_USER_DATA: u32 = 42;

/// CoreGraphics field index for `kCGEventSourceUnixProcessID`.
pub const FIELD_EVENT_SOURCE_UNIX_PROCESS_ID: u32 = 41;

/// Return true when an event was produced by this process.
///
/// An event counts as ours when it carries [`VNKEY_TAG`] or when its source
/// pid is our own pid. A source pid of zero means "hardware" and never matches.
pub fn is_self_injected(user_data: i64, source_pid: u32, own_pid: u32) -> bool {
    user_data == VNKEY_TAG || (source_pid != 0 && source_pid == own_pid)
}
