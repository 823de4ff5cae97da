use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::QuillError;

/// Environment variable holding the generation service API key.
pub const ENV_API_KEY: &str = "API_KEY";
/// Environment variable holding the model (or deployment) name.
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";
/// Environment variable holding the maximum output token budget.
pub const ENV_MAX_TOKENS: &str = "MAX_TOKENS";
/// Environment variable selecting the Azure OpenAI endpoint.
pub const ENV_USE_AZURE: &str = "USE_AZURE";
/// Environment variable holding the Azure endpoint base URL.
pub const ENV_BASE_URL: &str = "BASE_URL";

/// Generation service settings, read once from the environment at startup.
///
/// Construction validates every required value; a successfully built
/// `LlmConfig` is complete and never changes for the rest of the run.
///
/// # Examples
///
/// ```
/// use quill_core::LlmConfig;
///
/// let config = LlmConfig::from_lookup(|key| match key {
///     "API_KEY" => Some("sk-test".into()),
///     "MODEL_NAME" => Some("gpt-4o".into()),
///     "MAX_TOKENS" => Some("1000".into()),
///     "USE_AZURE" => Some("false".into()),
///     _ => None,
/// })
/// .unwrap();
/// assert_eq!(config.max_tokens, 1000);
/// assert!(!config.use_azure);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// API key for the provider.
    pub api_key: String,
    /// Model identifier (deployment name when `use_azure` is set).
    pub model: String,
    /// Maximum output tokens per request.
    pub max_tokens: u32,
    /// Route requests to an Azure OpenAI deployment instead of the public API.
    pub use_azure: bool,
    /// Endpoint base URL. Required when `use_azure` is set.
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Read and validate the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] naming every missing or unparsable variable.
    pub fn from_env() -> Result<Self, QuillError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read and validate the configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] when `API_KEY` or `MODEL_NAME` is missing
    /// or empty, when `MAX_TOKENS` is not an unsigned integer, when `USE_AZURE`
    /// is not a boolean, or when `USE_AZURE=true` and `BASE_URL` is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QuillError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(ENV_API_KEY);
        let model = non_empty(ENV_MODEL_NAME);
        let max_tokens = non_empty(ENV_MAX_TOKENS).and_then(|v| v.trim().parse::<u32>().ok());
        let use_azure = non_empty(ENV_USE_AZURE).and_then(|v| parse_bool(&v));

        let mut problems = Vec::new();
        if api_key.is_none() {
            problems.push(ENV_API_KEY);
        }
        if model.is_none() {
            problems.push(ENV_MODEL_NAME);
        }
        if max_tokens.is_none() {
            problems.push(ENV_MAX_TOKENS);
        }
        if use_azure.is_none() {
            problems.push(ENV_USE_AZURE);
        }

        let (Some(api_key), Some(model), Some(max_tokens), Some(use_azure)) =
            (api_key, model, max_tokens, use_azure)
        else {
            return Err(QuillError::Config(format!(
                "missing or invalid environment variables: {}",
                problems.join(", ")
            )));
        };

        let base_url = non_empty(ENV_BASE_URL).map(|u| u.trim().trim_end_matches('/').to_string());
        if use_azure && base_url.is_none() {
            return Err(QuillError::Config(format!(
                "{ENV_BASE_URL} is required when {ENV_USE_AZURE}=true"
            )));
        }

        Ok(Self {
            api_key,
            model,
            max_tokens,
            use_azure,
            base_url,
        })
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("use_azure", &self.use_azure)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Top-level configuration loaded from `.quill.toml`.
///
/// Every section is optional; missing values fall back to the built-in
/// defaults of each variant.
///
/// # Examples
///
/// ```
/// use quill_core::QuillConfig;
///
/// let config = QuillConfig::default();
/// assert_eq!(config.pipeline.jitter_ceiling_secs, 180);
/// assert!(config.pipeline.max_concurrency.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Settings shared by every variant.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Overrides for the pull request review variant.
    #[serde(default)]
    pub review: VariantOverrides,
    /// Overrides for the unit test variant.
    #[serde(default)]
    pub unit_tests: VariantOverrides,
    /// Overrides for the specification document variant.
    #[serde(default)]
    pub specs: VariantOverrides,
}

impl QuillConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Io`] if the file cannot be read, or
    /// [`QuillError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, QuillError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::QuillConfig;
    ///
    /// let toml = r#"
    /// [pipeline]
    /// max_concurrency = 4
    /// "#;
    /// let config = QuillConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.pipeline.max_concurrency, Some(4));
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, QuillError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve the effective settings of `variant`: built-in defaults with
    /// this file's overrides applied on top.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::{QuillConfig, Variant};
    ///
    /// let settings = QuillConfig::default().variant(Variant::UnitTests);
    /// assert_eq!(settings.marker.as_deref(), Some("UnitTestSubject"));
    /// assert!(settings.resolve_context);
    /// ```
    pub fn variant(&self, variant: Variant) -> VariantSettings {
        let overrides = match variant {
            Variant::Review => &self.review,
            Variant::UnitTests => &self.unit_tests,
            Variant::Specs => &self.specs,
        };
        overrides.apply(variant.defaults())
    }
}

/// Settings shared by all generation variants.
///
/// # Examples
///
/// ```
/// use quill_core::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.output_path.to_str(), Some("result.json"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound, in seconds, of the random delay before each request (default: 180).
    #[serde(default = "default_jitter_ceiling_secs")]
    pub jitter_ceiling_secs: u64,
    /// Maximum number of generation requests in flight. Unset means one
    /// concurrent request per eligible file.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Where the aggregate result is written (default: `result.json`).
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_jitter_ceiling_secs() -> u64 {
    180
}

fn default_output_path() -> PathBuf {
    PathBuf::from("result.json")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jitter_ceiling_secs: default_jitter_ceiling_secs(),
            max_concurrency: None,
            output_path: default_output_path(),
        }
    }
}

/// The generation tools sharing the pipeline.
///
/// # Examples
///
/// ```
/// use quill_core::Variant;
///
/// assert_eq!(Variant::Specs.to_string(), "specs");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Review comments for every changed file of a pull request.
    Review,
    /// Unit tests for annotated source files, with related types as context.
    UnitTests,
    /// One specification document per controller in the working tree.
    Specs,
}

impl Variant {
    /// Built-in settings of this variant.
    pub fn defaults(self) -> VariantSettings {
        match self {
            Variant::Review => VariantSettings {
                prompt_path: PathBuf::from("tools/PullRequestReviewer/prompt.txt"),
                extensions: Vec::new(),
                marker: None,
                name_contains: None,
                patterns: Vec::new(),
                include_diff: true,
                resolve_context: false,
                fallback_message: "A review could not be created because an error occurred."
                    .into(),
                document_suffix: "Review".into(),
            },
            Variant::UnitTests => VariantSettings {
                prompt_path: PathBuf::from("tools/UnitTestCreator/prompt.txt"),
                extensions: vec![".cs".into()],
                marker: Some("UnitTestSubject".into()),
                name_contains: None,
                patterns: Vec::new(),
                include_diff: false,
                resolve_context: true,
                fallback_message: "Unit tests could not be created because an error occurred."
                    .into(),
                document_suffix: "Test".into(),
            },
            Variant::Specs => VariantSettings {
                prompt_path: PathBuf::from("tools/SpecificationsCreator/prompt.txt"),
                extensions: vec![".cs".into()],
                marker: None,
                name_contains: Some("controller".into()),
                patterns: Vec::new(),
                include_diff: false,
                resolve_context: false,
                fallback_message: "A document could not be created because an error occurred."
                    .into(),
                document_suffix: "Specification".into(),
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Review => write!(f, "review"),
            Variant::UnitTests => write!(f, "unit-tests"),
            Variant::Specs => write!(f, "specs"),
        }
    }
}

/// Effective settings of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSettings {
    /// Text file holding the system prompt.
    pub prompt_path: PathBuf,
    /// Accepted path suffixes (e.g. `".cs"`). Empty accepts every path.
    pub extensions: Vec<String>,
    /// Attribute / annotation name a file must carry.
    pub marker: Option<String>,
    /// Case-insensitive fragment the file name must contain.
    pub name_contains: Option<String>,
    /// Glob patterns the path must match (any of them).
    pub patterns: Vec<String>,
    /// Include the unified patch in the prompt.
    pub include_diff: bool,
    /// Attach the source of referenced classes and interfaces.
    pub resolve_context: bool,
    /// Sentence appended to the path header when generation fails.
    pub fallback_message: String,
    /// Suffix of per-unit document file names.
    pub document_suffix: String,
}

/// Partial variant settings as written in `.quill.toml`.
///
/// # Examples
///
/// ```
/// use quill_core::QuillConfig;
/// use quill_core::Variant;
///
/// let config = QuillConfig::from_toml("[review]\nextensions = [\".rs\"]\n").unwrap();
/// let review = config.variant(Variant::Review);
/// assert_eq!(review.extensions, vec![".rs".to_string()]);
/// assert!(review.include_diff);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantOverrides {
    /// Text file holding the system prompt.
    pub prompt_path: Option<PathBuf>,
    /// Accepted path suffixes.
    pub extensions: Option<Vec<String>>,
    /// Attribute / annotation name a file must carry.
    pub marker: Option<String>,
    /// Case-insensitive fragment the file name must contain.
    pub name_contains: Option<String>,
    /// Glob patterns the path must match.
    pub patterns: Option<Vec<String>>,
    /// Include the unified patch in the prompt.
    pub include_diff: Option<bool>,
    /// Attach the source of referenced classes and interfaces.
    pub resolve_context: Option<bool>,
    /// Sentence appended to the path header when generation fails.
    pub fallback_message: Option<String>,
    /// Suffix of per-unit document file names.
    pub document_suffix: Option<String>,
}

impl VariantOverrides {
    fn apply(&self, mut base: VariantSettings) -> VariantSettings {
        if let Some(v) = &self.prompt_path {
            base.prompt_path = v.clone();
        }
        if let Some(v) = &self.extensions {
            base.extensions = v.clone();
        }
        if let Some(v) = &self.marker {
            base.marker = Some(v.clone()).filter(|m| !m.is_empty());
        }
        if let Some(v) = &self.name_contains {
            base.name_contains = Some(v.clone()).filter(|n| !n.is_empty());
        }
        if let Some(v) = &self.patterns {
            base.patterns = v.clone();
        }
        if let Some(v) = self.include_diff {
            base.include_diff = v;
        }
        if let Some(v) = self.resolve_context {
            base.resolve_context = v;
        }
        if let Some(v) = &self.fallback_message {
            base.fallback_message = v.clone();
        }
        if let Some(v) = &self.document_suffix {
            base.document_suffix = v.clone();
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("API_KEY", "sk-test"),
            ("MODEL_NAME", "gpt-4o"),
            ("MAX_TOKENS", "2000"),
            ("USE_AZURE", "False"),
        ]
    }

    #[test]
    fn complete_environment_is_accepted() {
        let config = LlmConfig::from_lookup(lookup_from(&complete_env())).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 2000);
        assert!(!config.use_azure);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn missing_values_are_all_reported() {
        let err = LlmConfig::from_lookup(lookup_from(&[("MODEL_NAME", "gpt-4o")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("API_KEY"));
        assert!(msg.contains("MAX_TOKENS"));
        assert!(msg.contains("USE_AZURE"));
        assert!(!msg.contains("MODEL_NAME"));
    }

    #[test]
    fn unparsable_max_tokens_is_rejected() {
        let mut env = complete_env();
        env[2] = ("MAX_TOKENS", "lots");
        let err = LlmConfig::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let mut env = complete_env();
        env[0] = ("API_KEY", "  ");
        assert!(LlmConfig::from_lookup(lookup_from(&env)).is_err());
    }

    #[test]
    fn azure_requires_base_url() {
        let mut env = complete_env();
        env[3] = ("USE_AZURE", "true");
        let err = LlmConfig::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("BASE_URL"));

        env.push(("BASE_URL", "https://example.openai.azure.com/"));
        let config = LlmConfig::from_lookup(lookup_from(&env)).unwrap();
        assert!(config.use_azure);
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://example.openai.azure.com")
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = LlmConfig::from_lookup(lookup_from(&complete_env())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-test"));
        assert!(debug.contains("gpt-4o"));
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = QuillConfig::default();
        assert_eq!(config.pipeline.jitter_ceiling_secs, 180);
        assert!(config.pipeline.max_concurrency.is_none());
        assert_eq!(config.pipeline.output_path, PathBuf::from("result.json"));

        let review = config.variant(Variant::Review);
        assert!(review.include_diff);
        assert!(review.extensions.is_empty());

        let specs = config.variant(Variant::Specs);
        assert_eq!(specs.name_contains.as_deref(), Some("controller"));
        assert_eq!(specs.document_suffix, "Specification");
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = QuillConfig::from_toml("").unwrap();
        assert_eq!(config.pipeline.jitter_ceiling_secs, 180);
        assert_eq!(
            config.variant(Variant::UnitTests),
            Variant::UnitTests.defaults()
        );
    }

    #[test]
    fn overrides_merge_with_variant_defaults() {
        let toml = r#"
[pipeline]
jitter_ceiling_secs = 30
max_concurrency = 8
output_path = "out/result.json"

[unit_tests]
extensions = [".java"]
marker = "GenerateTests"
"#;
        let config = QuillConfig::from_toml(toml).unwrap();
        assert_eq!(config.pipeline.jitter_ceiling_secs, 30);
        assert_eq!(config.pipeline.max_concurrency, Some(8));

        let unit_tests = config.variant(Variant::UnitTests);
        assert_eq!(unit_tests.extensions, vec![".java".to_string()]);
        assert_eq!(unit_tests.marker.as_deref(), Some("GenerateTests"));
        assert!(unit_tests.resolve_context);
        assert_eq!(
            unit_tests.prompt_path,
            PathBuf::from("tools/UnitTestCreator/prompt.txt")
        );
    }

    #[test]
    fn empty_marker_disables_marker_policy() {
        let config = QuillConfig::from_toml("[unit_tests]\nmarker = \"\"\n").unwrap();
        assert!(config.variant(Variant::UnitTests).marker.is_none());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = QuillConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }
}
