//! Telemetry source resolution.

use std::fmt;

use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_semantic_conventions::resource::{
    AWS_ECS_LAUNCHTYPE, AWS_ECS_TASK_ARN, CLOUD_PLATFORM, CLOUD_PROVIDER, HOST_NAME,
};

use crate::value::get_string_attribute;
use crate::GenericError;

/// Datadog-specific hostname attribute, checked before `host.name`.
const DATADOG_HOST_NAME: &str = "datadog.host.name";

/// The kind of source that produced telemetry data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    /// Hostname-based source.
    Hostname,

    /// AWS ECS Fargate task.
    AwsEcsFargate,
}

impl SourceKind {
    /// Returns the tag name used for this kind of source.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Hostname => "host",
            SourceKind::AwsEcsFargate => "task_arn",
        }
    }
}

/// The source of telemetry data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Source {
    /// The kind of source.
    pub kind: SourceKind,

    /// The identifier for this source: a hostname or a task ARN.
    pub identifier: String,
}

impl Source {
    /// Creates a hostname source.
    pub fn hostname<S: Into<String>>(hostname: S) -> Self {
        Self {
            kind: SourceKind::Hostname,
            identifier: hostname.into(),
        }
    }

    /// Returns a tag representation of this source.
    pub fn tag(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.identifier)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Provides the source to use when a resource does not identify one itself.
pub trait SourceProvider: Send + Sync {
    /// Returns the fallback source.
    ///
    /// # Errors
    ///
    /// If the source cannot be determined, an error is returned.
    fn source(&self) -> Result<Source, GenericError>;
}

impl<P> SourceProvider for std::sync::Arc<P>
where
    P: SourceProvider + ?Sized,
{
    fn source(&self) -> Result<Source, GenericError> {
        (**self).source()
    }
}

/// A `SourceProvider` that always returns an empty hostname.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSourceProvider;

impl SourceProvider for NoopSourceProvider {
    fn source(&self) -> Result<Source, GenericError> {
        Ok(Source::hostname(""))
    }
}

/// Resolves the source from OTLP resource attributes.
///
/// ECS Fargate resources resolve to their task ARN. Otherwise `datadog.host.name` or `host.name` is used, in that
/// order. Returns `None` when the resource does not identify its source.
pub fn resource_to_source(resource: &Resource) -> Option<Source> {
    let attributes = &resource.attributes;

    if get_string_attribute(attributes, CLOUD_PROVIDER) == Some("aws")
        && get_string_attribute(attributes, CLOUD_PLATFORM) == Some("aws_ecs")
        && get_string_attribute(attributes, AWS_ECS_LAUNCHTYPE) == Some("fargate")
    {
        if let Some(task_arn) = get_string_attribute(attributes, AWS_ECS_TASK_ARN) {
            return Some(Source {
                kind: SourceKind::AwsEcsFargate,
                identifier: task_arn.to_string(),
            });
        }
    }

    [DATADOG_HOST_NAME, HOST_NAME]
        .into_iter()
        .find_map(|key| get_string_attribute(attributes, key).filter(|host| !host.is_empty()))
        .map(Source::hostname)
}
