use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use otlp_attributes::{tags::Tag, value::string_value};

use crate::config::ScopeMetadataTags;

const UNKNOWN: &str = "n/a";

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN
    } else {
        value
    }
}

/// Returns the tags describing the instrumentation scope of a metric.
pub(crate) fn scope_metadata_tags(mode: ScopeMetadataTags, scope: Option<&InstrumentationScope>) -> Vec<Tag> {
    let (name, version) = scope.map_or(("", ""), |scope| (scope.name.as_str(), scope.version.as_str()));

    match mode {
        ScopeMetadataTags::None => Vec::new(),
        ScopeMetadataTags::InstrumentationLibrary => vec![
            Tag::from_key_value("instrumentation_library", or_unknown(name)),
            Tag::from_key_value("instrumentation_library_version", or_unknown(version)),
        ],
        ScopeMetadataTags::InstrumentationScope => {
            let mut tags = vec![
                Tag::from_key_value("instrumentation_scope", or_unknown(name)),
                Tag::from_key_value("instrumentation_scope_version", or_unknown(version)),
            ];

            // Only string attributes are carried over.
            if let Some(scope) = scope {
                tags.extend(
                    scope
                        .attributes
                        .iter()
                        .filter_map(|kv| string_value(kv).map(|value| Tag::from_key_value(&kv.key, value))),
                );
            }
            tags
        }
    }
}
