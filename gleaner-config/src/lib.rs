//! Loader for gleaner configuration with YAML + environment overlays.
//!
//! Files and inline snippets are merged in the order they are added; then
//! `GLEANER__SECTION__KEY` environment variables override them. String values
//! may reference `${VAR}`; references are expanded after merging.
use config::{Config, Environment, File};
use gleaner_common::settings::{
    AlertSettings, BrowserSettings, FeedSettings, LlmSettings, RuleSet, Timeouts,
    TranscriptSelectors,
};
use gleaner_common::{FieldRule, GleanerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Whole configuration document. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GleanerConfig {
    pub version: Option<String>,
    pub browser: BrowserSettings,
    pub timeouts: Timeouts,
    pub feed: FeedSettings,
    pub transcript: TranscriptSelectors,
    pub alerts: AlertSettings,
    pub rules: RuleSet,
    pub llm: LlmSettings,
}

impl GleanerConfig {
    /// Reject settings that would only fail later, mid-job.
    pub fn validate(&self) -> Result<(), GleanerError> {
        self.rules.validate()?;
        let t = &self.timeouts;
        for (name, ms) in [
            ("job", t.job_ms),
            ("navigation", t.navigation_ms),
            ("selector", t.selector_ms),
            ("interaction", t.interaction_ms),
        ] {
            if ms == 0 {
                return Err(GleanerError::Config(format!(
                    "timeouts.{name}_ms must be greater than zero"
                )));
            }
        }
        if self.feed.root_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(GleanerError::Config(
                "feed.root_markers must name at least one tag".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read configuration sources: {0}")]
    Source(#[from] config::ConfigError),
    #[error("configuration has the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] GleanerError),
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut cur = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let expanded = shellexpand::env(&cur)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| cur.clone());
                if expanded == cur {
                    break;
                }
                cur = expanded;
            }
            *s = cur;
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring.
pub struct GleanerConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for GleanerConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GleanerConfigLoader {
    /// Start with no sources; environment overrides are applied by [`Self::load`].
    ///
    /// ```
    /// use gleaner_config::GleanerConfigLoader;
    ///
    /// let config = GleanerConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for deployments configured purely by
    /// environment.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use gleaner_config::GleanerConfigLoader;
    ///
    /// let cfg = GleanerConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// timeouts:
    ///   selector_ms: 750
    /// rules:
    ///   base:
    ///     - selector: "h1"
    ///       property_name: "headline"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.timeouts.selector_ms, 750);
    /// assert_eq!(cfg.rules.base.len(), 1);
    /// assert!(!cfg.rules.base[0].multi_valued);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` references, deserialize, and validate.
    ///
    /// ```
    /// use gleaner_common::settings::LlmSettings;
    /// use gleaner_config::GleanerConfigLoader;
    ///
    /// unsafe { std::env::set_var("SUMMARY_MODEL", "llama3.2:3b"); }
    ///
    /// let config = GleanerConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: "ollama"
    ///   model: "${SUMMARY_MODEL}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match &config.llm {
    ///     LlmSettings::Ollama { model, endpoint, pull_missing, .. } => {
    ///         assert_eq!(model, "llama3.2:3b");
    ///         assert_eq!(endpoint, "http://localhost:11434");
    ///         assert!(*pull_missing);
    ///     }
    ///     _ => panic!("expected Ollama settings"),
    /// }
    ///
    /// unsafe { std::env::remove_var("SUMMARY_MODEL"); }
    /// ```
    pub fn load(self) -> Result<GleanerConfig, ConfigLoadError> {
        let merged = self
            .builder
            .add_source(
                Environment::with_prefix("GLEANER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut value: Value = merged.try_deserialize()?;
        expand_env_in_value(&mut value);

        let typed: GleanerConfig = serde_json::from_value(value)?;
        typed.validate()?;
        Ok(typed)
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    rules: Vec<FieldRule>,
}

/// Read a standalone rule list (a YAML/JSON document with a top-level
/// `rules:` sequence) used to override the configured rule set for one job.
pub fn load_rules_file<P: AsRef<Path>>(path: P) -> Result<Vec<FieldRule>, ConfigLoadError> {
    let doc: RulesFile = Config::builder()
        .add_source(File::from(path.as_ref()).required(true))
        .build()?
        .try_deserialize()?;
    if doc.rules.is_empty() {
        return Err(ConfigLoadError::Invalid(GleanerError::Config(format!(
            "{} declares no rules",
            path.as_ref().display()
        ))));
    }
    Ok(doc.rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("HOST", Some("chrome")), ("PORT", Some("4444"))], || {
            let mut v = json!([
                "http://$HOST",
                { "webdriver_url": "http://${HOST}:${PORT}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["http://chrome", { "webdriver_url": "http://chrome:4444" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_through_nested_references() {
        temp_env::with_vars(
            [
                ("INNER", Some("qux")),
                ("MIDDLE", Some("mid-${INNER}")),
                ("OUTER", Some("start-${MIDDLE}-end")),
            ],
            || {
                let mut v = json!("X=${OUTER}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn cyclic_references_terminate() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST_GLEANER}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST_GLEANER}"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut cfg = GleanerConfig::default();
        cfg.timeouts.selector_ms = 0;
        assert!(matches!(cfg.validate(), Err(GleanerError::Config(_))));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = GleanerConfigLoader::new().with_yaml_str("{}").load().unwrap();
        assert_eq!(cfg.feed.root_markers.len(), 3);
        assert!(matches!(cfg.llm, LlmSettings::None));
        assert!(!cfg.rules.base.is_empty());
    }
}
