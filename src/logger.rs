//! Thin structured-logging facade used by the bad-instance and
//! last-example policy handling throughout the decoders.
//!
//! This crate never installs a `log` backend itself; callers wire up
//! whichever sink they like (`env_logger`, `tracing-log`, a custom
//! `log::Log` impl). That mirrors the original library's pluggable
//! `Log_message_handler`: the facade is in scope, the sink is not.

/// Emit a structured warning for a bad instance, honoring
/// `warn_bad_instances`. Every "Warn" policy variant in the bad-example
/// and last-example tables routes through this single helper instead of
/// duplicating the `if warn { log::warn!(...) }` check at each call site.
pub fn warn_bad_instance(warn_bad_instances: bool, store: &str, index: usize, message: &str) {
    if warn_bad_instances {
        log::warn!("bad instance #{index} in '{store}': {message}");
    }
}

/// Emit a structured warning when a batch is short/padded/dropped.
pub fn warn_last_batch(batch_index: usize, message: &str) {
    log::warn!("last batch #{batch_index}: {message}");
}
