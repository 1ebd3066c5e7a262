//! Translator configuration.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use otlp_attributes::{NoopSourceProvider, SourceProvider};
use serde::Deserialize;
use snafu::Snafu;
use tracing::warn;

const DEFAULT_DELTA_TTL_SECS: i64 = 3600;

/// Configuration error.
#[derive(Clone, Debug, Eq, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigError {
    /// The delta TTL was zero or negative.
    #[snafu(display("time to live must be positive: {}", ttl))]
    NonPositiveDeltaTtl {
        /// The rejected TTL, in seconds.
        ttl: i64,
    },

    /// The histogram mode was not recognized.
    #[snafu(display("unknown histogram mode: {:?}", mode))]
    UnknownHistogramMode {
        /// The rejected mode.
        mode: String,
    },

    /// The number mode was not recognized.
    #[snafu(display("unknown number mode: {:?}", mode))]
    UnknownNumberMode {
        /// The rejected mode.
        mode: String,
    },

    /// The summary mode was not recognized.
    #[snafu(display("unknown summary mode: {:?}", mode))]
    UnknownSummaryMode {
        /// The rejected mode.
        mode: String,
    },
}

/// Export mode for OTLP histograms.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HistogramMode {
    /// Buckets are not exported. Only `.count` and `.sum` are.
    NoBuckets,

    /// Each bucket is exported as a count tagged with its bounds.
    Counters,

    /// Buckets are exported as a single distribution.
    #[default]
    Distributions,
}

impl HistogramMode {
    /// Returns the configuration name of the mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoBuckets => "nobuckets",
            Self::Counters => "counters",
            Self::Distributions => "distributions",
        }
    }
}

impl FromStr for HistogramMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nobuckets" => Ok(Self::NoBuckets),
            "counters" => Ok(Self::Counters),
            "distributions" => Ok(Self::Distributions),
            other => UnknownHistogramMode { mode: other }.fail(),
        }
    }
}

impl AsRef<str> for HistogramMode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for HistogramMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export mode for cumulative monotonic sums.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NumberMode {
    /// Deltas are computed between consecutive points and reported as counts.
    #[default]
    CumulativeToDelta,

    /// The raw cumulative value is reported as a gauge.
    RawValue,
}

impl NumberMode {
    /// Returns the configuration name of the mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CumulativeToDelta => "cumulative_to_delta",
            Self::RawValue => "raw_value",
        }
    }
}

impl FromStr for NumberMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cumulative_to_delta" => Ok(Self::CumulativeToDelta),
            "raw_value" => Ok(Self::RawValue),
            other => UnknownNumberMode { mode: other }.fail(),
        }
    }
}

impl AsRef<str> for NumberMode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for NumberMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which instrumentation scope metadata, if any, is added as tags.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ScopeMetadataTags {
    /// No scope metadata tags.
    #[default]
    None,

    /// `instrumentation_library` and `instrumentation_library_version` tags.
    InstrumentationLibrary,

    /// `instrumentation_scope` and `instrumentation_scope_version` tags, plus the scope's string attributes.
    InstrumentationScope,
}

/// Translator configuration.
///
/// Built with [`TranslatorConfig::builder`] and immutable afterwards.
#[derive(Clone)]
pub struct TranslatorConfig {
    histogram_mode: HistogramMode,
    number_mode: NumberMode,
    quantiles: bool,
    send_histogram_aggregations: bool,
    resource_attributes_as_tags: bool,
    scope_metadata_tags: ScopeMetadataTags,
    delta_ttl: Duration,
    sweep_interval: Duration,
    fallback_source_provider: Arc<dyn SourceProvider>,
}

impl TranslatorConfig {
    /// Creates a builder with the default settings.
    pub fn builder() -> TranslatorConfigBuilder {
        TranslatorConfigBuilder::default()
    }

    /// Returns the histogram export mode.
    pub fn histogram_mode(&self) -> HistogramMode {
        self.histogram_mode
    }

    /// Returns the number export mode.
    pub fn number_mode(&self) -> NumberMode {
        self.number_mode
    }

    /// Returns `true` if cumulative monotonic sums are converted to deltas.
    pub fn send_monotonic(&self) -> bool {
        self.number_mode == NumberMode::CumulativeToDelta
    }

    /// Returns `true` if summary quantiles are exported.
    pub fn quantiles(&self) -> bool {
        self.quantiles
    }

    /// Returns `true` if histogram `.count`, `.sum`, `.min` and `.max` series are exported.
    pub fn send_histogram_aggregations(&self) -> bool {
        self.send_histogram_aggregations
    }

    /// Returns `true` if raw resource attributes are added as tags.
    pub fn resource_attributes_as_tags(&self) -> bool {
        self.resource_attributes_as_tags
    }

    /// Returns which scope metadata is added as tags.
    pub fn scope_metadata_tags(&self) -> ScopeMetadataTags {
        self.scope_metadata_tags
    }

    /// Returns how long an idle series is kept in the delta cache.
    pub fn delta_ttl(&self) -> Duration {
        self.delta_ttl
    }

    /// Returns how often the delta cache is swept.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Returns the source provider used when a resource does not identify its own source.
    pub fn fallback_source_provider(&self) -> &dyn SourceProvider {
        self.fallback_source_provider.as_ref()
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        let delta_ttl_secs = DEFAULT_DELTA_TTL_SECS as u64;
        Self {
            histogram_mode: HistogramMode::default(),
            number_mode: NumberMode::default(),
            quantiles: false,
            send_histogram_aggregations: false,
            resource_attributes_as_tags: false,
            scope_metadata_tags: ScopeMetadataTags::None,
            delta_ttl: Duration::from_secs(delta_ttl_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs(delta_ttl_secs)),
            fallback_source_provider: Arc::new(NoopSourceProvider),
        }
    }
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("histogram_mode", &self.histogram_mode)
            .field("number_mode", &self.number_mode)
            .field("quantiles", &self.quantiles)
            .field("send_histogram_aggregations", &self.send_histogram_aggregations)
            .field("resource_attributes_as_tags", &self.resource_attributes_as_tags)
            .field("scope_metadata_tags", &self.scope_metadata_tags)
            .field("delta_ttl", &self.delta_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TranslatorConfig`].
///
/// Settings are validated as they are applied. The first invalid setting is reported by [`build`][Self::build].
pub struct TranslatorConfigBuilder {
    config: TranslatorConfig,
    instrumentation_library_metadata_as_tags: bool,
    instrumentation_scope_metadata_as_tags: bool,
    error: Option<ConfigError>,
}

impl Default for TranslatorConfigBuilder {
    fn default() -> Self {
        Self {
            config: TranslatorConfig::default(),
            instrumentation_library_metadata_as_tags: false,
            instrumentation_scope_metadata_as_tags: false,
            error: None,
        }
    }
}

impl TranslatorConfigBuilder {
    fn record_error(&mut self, error: ConfigError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Sets the delta TTL, in seconds.
    ///
    /// The sweep interval is derived from it: half the TTL, or one second for a TTL of one second.
    ///
    /// Defaults to 3600 seconds.
    pub fn with_delta_ttl(mut self, ttl_secs: i64) -> Self {
        if ttl_secs <= 0 {
            self.record_error(NonPositiveDeltaTtl { ttl: ttl_secs }.build());
            return self;
        }

        let ttl_secs = ttl_secs as u64;
        self.config.delta_ttl = Duration::from_secs(ttl_secs);
        self.config.sweep_interval = Duration::from_secs(sweep_interval_secs(ttl_secs));
        self
    }

    /// Sets the histogram export mode, either by name or as a [`HistogramMode`].
    ///
    /// Defaults to `distributions`.
    pub fn with_histogram_mode<M: AsRef<str>>(mut self, mode: M) -> Self {
        match mode.as_ref().parse() {
            Ok(mode) => self.config.histogram_mode = mode,
            Err(e) => self.record_error(e),
        }
        self
    }

    /// Sets the number export mode, either by name or as a [`NumberMode`].
    ///
    /// Defaults to `cumulative_to_delta`.
    pub fn with_number_mode<M: AsRef<str>>(mut self, mode: M) -> Self {
        match mode.as_ref().parse() {
            Ok(mode) => self.config.number_mode = mode,
            Err(e) => self.record_error(e),
        }
        self
    }

    /// Enables exporting summary quantiles.
    pub fn with_quantiles(mut self) -> Self {
        self.config.quantiles = true;
        self
    }

    /// Enables exporting histogram `.count`, `.sum`, `.min` and `.max` series.
    pub fn with_histogram_aggregations(mut self) -> Self {
        self.config.send_histogram_aggregations = true;
        self
    }

    /// Adds every resource attribute as a tag, in addition to the remapped ones.
    pub fn with_resource_attributes_as_tags(mut self) -> Self {
        self.config.resource_attributes_as_tags = true;
        self
    }

    /// Adds instrumentation library metadata as tags.
    ///
    /// Superseded by [`with_instrumentation_scope_metadata_as_tags`][Self::with_instrumentation_scope_metadata_as_tags]
    /// when both are set.
    pub fn with_instrumentation_library_metadata_as_tags(mut self) -> Self {
        self.instrumentation_library_metadata_as_tags = true;
        self
    }

    /// Adds instrumentation scope metadata as tags.
    pub fn with_instrumentation_scope_metadata_as_tags(mut self) -> Self {
        self.instrumentation_scope_metadata_as_tags = true;
        self
    }

    /// Sets the source provider used when a resource does not identify its own source.
    ///
    /// Defaults to a provider returning an empty hostname.
    pub fn with_fallback_source_provider<P>(mut self, provider: P) -> Self
    where
        P: SourceProvider + 'static,
    {
        self.config.fallback_source_provider = Arc::new(provider);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// If any setting was invalid, the first such error is returned.
    pub fn build(self) -> Result<TranslatorConfig, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut config = self.config;
        config.scope_metadata_tags = match (
            self.instrumentation_library_metadata_as_tags,
            self.instrumentation_scope_metadata_as_tags,
        ) {
            (true, true) => {
                warn!(
                    "Both instrumentation library and instrumentation scope metadata tags are enabled. Using \
                     instrumentation scope metadata tags only."
                );
                ScopeMetadataTags::InstrumentationScope
            }
            (false, true) => ScopeMetadataTags::InstrumentationScope,
            (true, false) => ScopeMetadataTags::InstrumentationLibrary,
            (false, false) => ScopeMetadataTags::None,
        };

        Ok(config)
    }
}

fn sweep_interval_secs(ttl_secs: u64) -> u64 {
    if ttl_secs > 1 {
        ttl_secs / 2
    } else {
        1
    }
}

/// Histogram settings of a [`MetricsConfiguration`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistogramsConfiguration {
    /// Histogram export mode: `nobuckets`, `counters` or `distributions`.
    pub mode: Option<String>,

    /// Whether to export `.count`, `.sum`, `.min` and `.max` series.
    pub send_aggregation_metrics: bool,
}

/// Sum settings of a [`MetricsConfiguration`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SumsConfiguration {
    /// Cumulative monotonic sum mode: `to_delta` or `raw_value`.
    pub cumulative_monotonic_mode: Option<String>,
}

/// Summary settings of a [`MetricsConfiguration`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummariesConfiguration {
    /// Summary mode: `noquantiles` or `gauges`.
    pub mode: Option<String>,
}

/// Metrics translation settings, in the shape used by the Datadog exporter configuration.
///
/// ```yaml
/// delta_ttl: 3600
/// resource_attributes_as_tags: false
/// instrumentation_scope_metadata_as_tags: false
/// histograms:
///   mode: distributions
///   send_aggregation_metrics: false
/// sums:
///   cumulative_monotonic_mode: to_delta
/// summaries:
///   mode: gauges
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfiguration {
    /// Delta TTL, in seconds.
    pub delta_ttl: Option<i64>,

    /// Whether to add every resource attribute as a tag.
    pub resource_attributes_as_tags: bool,

    /// Whether to add instrumentation scope metadata as tags.
    pub instrumentation_scope_metadata_as_tags: bool,

    /// Histogram settings.
    pub histograms: HistogramsConfiguration,

    /// Sum settings.
    pub sums: SumsConfiguration,

    /// Summary settings.
    pub summaries: SummariesConfiguration,
}

impl MetricsConfiguration {
    /// Converts this configuration into a [`TranslatorConfigBuilder`].
    ///
    /// Further settings, such as a fallback source provider, can be applied to the builder before building it.
    pub fn into_builder(self) -> TranslatorConfigBuilder {
        let mut builder = TranslatorConfig::builder();

        if let Some(ttl) = self.delta_ttl {
            builder = builder.with_delta_ttl(ttl);
        }

        if let Some(mode) = self.histograms.mode {
            builder = builder.with_histogram_mode(mode);
        }

        if self.histograms.send_aggregation_metrics {
            builder = builder.with_histogram_aggregations();
        }

        match self.sums.cumulative_monotonic_mode.as_deref() {
            None | Some("to_delta") => {}
            Some("raw_value") => builder = builder.with_number_mode(NumberMode::RawValue),
            Some(other) => builder.record_error(UnknownNumberMode { mode: other }.build()),
        }

        match self.summaries.mode.as_deref() {
            None | Some("noquantiles") => {}
            Some("gauges") => builder = builder.with_quantiles(),
            Some(other) => builder.record_error(UnknownSummaryMode { mode: other }.build()),
        }

        if self.resource_attributes_as_tags {
            builder = builder.with_resource_attributes_as_tags();
        }

        if self.instrumentation_scope_metadata_as_tags {
            builder = builder.with_instrumentation_scope_metadata_as_tags();
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use otlp_attributes::{GenericError, Source};
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn defaults() {
        let config = TranslatorConfig::builder().build().unwrap();
        assert_eq!(config.histogram_mode(), HistogramMode::Distributions);
        assert_eq!(config.number_mode(), NumberMode::CumulativeToDelta);
        assert!(config.send_monotonic());
        assert!(!config.quantiles());
        assert!(!config.send_histogram_aggregations());
        assert!(!config.resource_attributes_as_tags());
        assert_eq!(config.scope_metadata_tags(), ScopeMetadataTags::None);
        assert_eq!(config.delta_ttl(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.fallback_source_provider().source().unwrap(), Source::hostname(""));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        for ttl in [0, -1, i64::MIN] {
            let err = TranslatorConfig::builder().with_delta_ttl(ttl).build().unwrap_err();
            assert_eq!(err, ConfigError::NonPositiveDeltaTtl { ttl });
            assert_eq!(err.to_string(), format!("time to live must be positive: {}", ttl));
        }
    }

    #[test]
    fn ttl_of_one_sweeps_every_second() {
        let config = TranslatorConfig::builder().with_delta_ttl(1).build().unwrap();
        assert_eq!(config.delta_ttl(), Duration::from_secs(1));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_modes_are_rejected() {
        let err = TranslatorConfig::builder()
            .with_histogram_mode("buckets")
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown histogram mode: \"buckets\"");

        let err = TranslatorConfig::builder()
            .with_number_mode("delta")
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown number mode: \"delta\"");
    }

    #[test]
    fn first_error_wins() {
        let err = TranslatorConfig::builder()
            .with_number_mode("delta")
            .with_delta_ttl(-5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNumberMode { .. }));
    }

    #[test]
    fn modes_by_name_and_value() {
        let config = TranslatorConfig::builder()
            .with_histogram_mode("counters")
            .with_number_mode(NumberMode::RawValue)
            .build()
            .unwrap();
        assert_eq!(config.histogram_mode(), HistogramMode::Counters);
        assert_eq!(config.number_mode(), NumberMode::RawValue);
        assert!(!config.send_monotonic());

        let config = TranslatorConfig::builder()
            .with_histogram_mode(HistogramMode::NoBuckets)
            .build()
            .unwrap();
        assert_eq!(config.histogram_mode(), HistogramMode::NoBuckets);
    }

    #[test]
    fn scope_metadata_wins_over_library_metadata() {
        let config = TranslatorConfig::builder()
            .with_instrumentation_library_metadata_as_tags()
            .build()
            .unwrap();
        assert_eq!(config.scope_metadata_tags(), ScopeMetadataTags::InstrumentationLibrary);

        let config = TranslatorConfig::builder()
            .with_instrumentation_library_metadata_as_tags()
            .with_instrumentation_scope_metadata_as_tags()
            .build()
            .unwrap();
        assert_eq!(config.scope_metadata_tags(), ScopeMetadataTags::InstrumentationScope);
    }

    #[test]
    fn fallback_source_provider() {
        struct Failing;

        impl SourceProvider for Failing {
            fn source(&self) -> Result<Source, GenericError> {
                Err(anyhow::anyhow!("no hostname"))
            }
        }

        let config = TranslatorConfig::builder()
            .with_fallback_source_provider(Failing)
            .build()
            .unwrap();
        assert!(config.fallback_source_provider().source().is_err());
    }

    #[test]
    fn metrics_configuration_from_yaml() {
        let raw = r#"
delta_ttl: 60
resource_attributes_as_tags: true
histograms:
  mode: counters
  send_aggregation_metrics: true
sums:
  cumulative_monotonic_mode: raw_value
summaries:
  mode: gauges
"#;
        let parsed: MetricsConfiguration = serde_yaml::from_str(raw).unwrap();
        let config = parsed.into_builder().build().unwrap();

        assert_eq!(config.delta_ttl(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.histogram_mode(), HistogramMode::Counters);
        assert!(config.send_histogram_aggregations());
        assert_eq!(config.number_mode(), NumberMode::RawValue);
        assert!(config.quantiles());
        assert!(config.resource_attributes_as_tags());
        assert_eq!(config.scope_metadata_tags(), ScopeMetadataTags::None);
    }

    #[test]
    fn metrics_configuration_from_json_defaults() {
        let parsed: MetricsConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, MetricsConfiguration::default());

        let config = parsed.into_builder().build().unwrap();
        assert_eq!(config.histogram_mode(), HistogramMode::Distributions);
        assert_eq!(config.delta_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn metrics_configuration_rejects_unknown_modes() {
        let parsed: MetricsConfiguration =
            serde_json::from_str(r#"{"sums": {"cumulative_monotonic_mode": "sometimes"}}"#).unwrap();
        assert_eq!(
            parsed.into_builder().build().unwrap_err(),
            ConfigError::UnknownNumberMode {
                mode: "sometimes".to_string()
            }
        );

        let parsed: MetricsConfiguration = serde_json::from_str(r#"{"summaries": {"mode": "always"}}"#).unwrap();
        assert_eq!(
            parsed.into_builder().build().unwrap_err(),
            ConfigError::UnknownSummaryMode {
                mode: "always".to_string()
            }
        );

        let parsed: MetricsConfiguration = serde_json::from_str(r#"{"delta_ttl": 0}"#).unwrap();
        assert!(parsed.into_builder().build().is_err());
    }

    proptest! {
        #[test]
        fn property_sweep_interval_is_half_ttl(ttl in 1i64..=1_000_000) {
            let config = TranslatorConfig::builder().with_delta_ttl(ttl).build().unwrap();
            let expected = std::cmp::max(1, ttl / 2) as u64;
            prop_assert_eq!(config.sweep_interval(), Duration::from_secs(expected));
            prop_assert_eq!(config.delta_ttl(), Duration::from_secs(ttl as u64));
        }
    }
}
