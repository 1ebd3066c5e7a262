//! OTLP `os` semantic conventions.
//!
//! <https://github.com/open-telemetry/semantic-conventions/blob/main/docs/resource/os.md>

use opentelemetry_semantic_conventions::resource::OS_TYPE;

use crate::tags::Tag;

/// Extracts the Datadog tag for a system attribute, if `key` is one.
pub(crate) fn system_tag(key: &str, value: &str) -> Option<Tag> {
    match key {
        OS_TYPE if !value.is_empty() => Some(Tag::from_key_value(OS_TYPE, value)),
        _ => None,
    }
}
