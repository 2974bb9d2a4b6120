//! Cache key scheme: `{operation_kind}:{job_name}:{qualifiers}`.
//!
//! Keys always carry the trailing separator after the job segment so a
//! prefix built by [`job_key_prefix`] cannot match a job whose name merely
//! starts with the same text. Jenkins forbids `:` in job names.

/// Job segment for results that are not tied to a job.
pub const GLOBAL_SCOPE: &str = "_";

pub fn cache_key(kind: &str, job_name: &str, qualifiers: &[&str]) -> String {
    format!("{kind}:{job_name}:{}", qualifiers.join(":"))
}

pub fn job_key_prefix(kind: &str, job_name: &str) -> String {
    format!("{kind}:{job_name}:")
}

/// Job segment of a key built by [`cache_key`].
pub fn key_job_name(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, ':');
    parts.next()?;
    let job = parts.next()?;
    parts.next()?;
    Some(job)
}
