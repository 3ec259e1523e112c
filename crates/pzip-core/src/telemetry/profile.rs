use std::time::Instant;

#[cfg(feature = "profiling")]
use crate::telemetry::tags;
#[cfg(feature = "profiling")]
use std::collections::BTreeSet;
#[cfg(feature = "profiling")]
use std::sync::{OnceLock, RwLock};

/// Converts elapsed time since `started_at` to microseconds, clamped to `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    crate::types::duration_to_us(started_at.elapsed())
}

#[cfg(feature = "profiling")]
const PROFILE_TAGS_ENV: &str = "PZIP_PROFILE_TAGS";

/// Parses a comma separated tag list; `None` means every tag is enabled.
#[cfg(feature = "profiling")]
fn parse_tags<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Option<BTreeSet<String>> {
    let mut enabled = BTreeSet::new();
    for token in tokens.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
        let normalized = token.to_ascii_lowercase();
        if normalized == "*" || normalized == "all" {
            return None;
        }
        enabled.insert(normalized);
    }

    if enabled.is_empty() { None } else { Some(enabled) }
}

#[cfg(feature = "profiling")]
fn filter_state() -> &'static RwLock<Option<BTreeSet<String>>> {
    static STATE: OnceLock<RwLock<Option<BTreeSet<String>>>> = OnceLock::new();
    STATE.get_or_init(|| {
        let parsed = std::env::var(PROFILE_TAGS_ENV)
            .ok()
            .and_then(|raw| parse_tags(raw.split(',')));
        RwLock::new(parsed)
    })
}

#[cfg(feature = "profiling")]
fn set_filter(enabled: Option<BTreeSet<String>>) {
    let mut guard = match filter_state().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = enabled;
}

/// Enables all profiling tags.
pub fn enable_all_tags() {
    #[cfg(feature = "profiling")]
    set_filter(None);
}

/// Restricts profiling events to the given tags. An empty slice enables all.
pub fn set_enabled_tags(enabled: &[&str]) {
    #[cfg(feature = "profiling")]
    set_filter(parse_tags(enabled.iter().copied()));

    let _ = enabled;
}

/// Reloads enabled tags from `PZIP_PROFILE_TAGS`.
pub fn reload_enabled_tags_from_env() {
    #[cfg(feature = "profiling")]
    set_filter(
        std::env::var(PROFILE_TAGS_ENV)
            .ok()
            .and_then(|raw| parse_tags(raw.split(','))),
    );
}

/// Returns true when at least one tag in the stack is enabled.
pub fn is_tag_stack_enabled(tag_stack: &[&str]) -> bool {
    #[cfg(feature = "profiling")]
    {
        let guard = match filter_state().read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            None => true,
            Some(enabled) => tag_stack
                .iter()
                .any(|tag| enabled.contains(&tag.to_ascii_lowercase())),
        }
    }

    #[cfg(not(feature = "profiling"))]
    {
        let _ = tag_stack;
        false
    }
}

/// Emits one profiling event as a `tracing` debug record on the subsystem target.
#[cfg(feature = "profiling")]
#[inline]
pub fn event(
    target: &'static str,
    tag_stack: &[&str],
    op: &'static str,
    result: &'static str,
    elapsed_us: u64,
    message: &'static str,
) {
    if !is_tag_stack_enabled(tag_stack) {
        return;
    }

    // tracing needs a literal target, hence one arm per subsystem.
    match target {
        tags::PROFILE_SOURCE => {
            tracing::debug!(target: tags::PROFILE_SOURCE, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_SPLITTER => {
            tracing::debug!(target: tags::PROFILE_SPLITTER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_CODEC => {
            tracing::debug!(target: tags::PROFILE_CODEC, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_BUFFER => {
            tracing::debug!(target: tags::PROFILE_BUFFER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_WORKER => {
            tracing::debug!(target: tags::PROFILE_WORKER, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_ORDERING => {
            tracing::debug!(target: tags::PROFILE_ORDERING, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        tags::PROFILE_COLLECTOR => {
            tracing::debug!(target: tags::PROFILE_COLLECTOR, op, result, elapsed_us, tags = ?tag_stack, "{message}");
        }
        _ => {
            tracing::debug!(target: "pzip.profile", op, result, elapsed_us, original_target = target, tags = ?tag_stack, "{message}");
        }
    }
}

#[cfg(not(feature = "profiling"))]
#[inline]
pub fn event(
    _target: &'static str,
    _tag_stack: &[&str],
    _op: &'static str,
    _result: &'static str,
    _elapsed_us: u64,
    _message: &'static str,
) {
}
