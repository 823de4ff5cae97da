//! Orchestration: changed files → units → concurrent generation → aggregate.
//!
//! Repository access is synchronous and happens entirely in
//! [`GenerationPipeline::diff_units`], before any task is spawned, because a
//! `git2::Repository` cannot be shared across threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use git2::Repository;
use quill_context::{walk_repo, ContextResolver, Language, SourceFile, WorkspaceAnalyzer};
use quill_core::{
    AggregateResult, GenerationOutcome, GenerationUnit, LlmConfig, PipelineConfig, QuillConfig,
    QuillError, Variant, VariantSettings,
};
use quill_gitscan::{eligible_changes, BranchDiff};
use tracing::{debug, info};

use crate::dispatch::{DispatchSettings, JitterSource, RateLimitedDispatcher};
use crate::filter::SubjectFilter;
use crate::llm::Generator;
use crate::output::aggregate;
use crate::prompt::load_system_prompt;

/// Largest head-snapshot file indexed for related context (1 MB).
const MAX_INDEXED_SIZE: usize = 1_048_576;

/// Read-only settings of one run, built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Which tool is running.
    pub variant: Variant,
    /// The variant's defaults merged with `.quill.toml` overrides.
    pub settings: VariantSettings,
    /// Dispatch and output settings shared by all variants.
    pub pipeline: PipelineConfig,
    /// Text of the variant's prompt file.
    pub system_prompt: String,
    /// Output token budget per request.
    pub max_tokens: u32,
}

impl PipelineContext {
    /// Resolve the variant's settings and read its system prompt.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::FileNotFound`] if the prompt file is missing.
    pub fn load(
        variant: Variant,
        config: &QuillConfig,
        llm: &LlmConfig,
    ) -> Result<Self, QuillError> {
        let settings = config.variant(variant);
        let system_prompt = load_system_prompt(&settings.prompt_path)?;
        Ok(Self {
            variant,
            settings,
            pipeline: config.pipeline.clone(),
            system_prompt,
            max_tokens: llm.max_tokens,
        })
    }

    fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            jitter_ceiling: Duration::from_secs(self.pipeline.jitter_ceiling_secs),
            max_concurrency: self.pipeline.max_concurrency,
            max_tokens: self.max_tokens,
            fallback_message: self.settings.fallback_message.clone(),
        }
    }
}

/// Drives one variant from subject selection to the aggregate result.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use quill_core::{LlmConfig, QuillConfig, Variant};
/// use quill_generate::llm::LlmClient;
/// use quill_generate::pipeline::{GenerationPipeline, PipelineContext};
///
/// # async fn run() -> quill_core::Result<()> {
/// let llm = LlmConfig::from_env()?;
/// let context = PipelineContext::load(Variant::Review, &QuillConfig::default(), &llm)?;
/// let pipeline = GenerationPipeline::new(context, Arc::new(LlmClient::new(&llm)?))?;
///
/// let repo = quill_gitscan::discover_repository(Path::new("."))?;
/// let units = pipeline.diff_units(&repo, "develop", "feature/x")?;
/// drop(repo);
///
/// let (_outcomes, result) = pipeline.run(units).await;
/// println!("{}", result.comment);
/// # Ok(())
/// # }
/// ```
pub struct GenerationPipeline {
    context: PipelineContext,
    filter: SubjectFilter,
    dispatcher: RateLimitedDispatcher,
}

impl GenerationPipeline {
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if the variant's glob patterns are invalid.
    pub fn new(context: PipelineContext, generator: Arc<dyn Generator>) -> Result<Self, QuillError> {
        let filter = SubjectFilter::from_settings(&context.settings)?;
        let dispatcher = RateLimitedDispatcher::new(generator, context.dispatch_settings());
        Ok(Self {
            context,
            filter,
            dispatcher,
        })
    }

    /// Replace the random delay source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.dispatcher = self.dispatcher.with_jitter(jitter);
        self
    }

    /// Settings of this run.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Build one unit per added or modified file that passes the subject filter.
    ///
    /// Content comes from the head snapshot. Deleted files, binary files and
    /// submodule entries never become units. When the variant resolves
    /// context, the index is built from the head snapshot too.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::RefNotFound`] if a ref does not resolve, or
    /// [`QuillError::Git`] / [`QuillError::Parse`] on repository or parser failures.
    pub fn diff_units(
        &self,
        repo: &Repository,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<Vec<GenerationUnit>, QuillError> {
        let diff = BranchDiff::new(repo, base_ref, head_ref)?;
        let changes = diff.changes()?;
        let total = changes.len();

        let mut units = Vec::new();
        for change in eligible_changes(changes) {
            let path = change.path;
            if !self.filter.may_accept_path(&path) {
                debug!(path = %path, "not a subject");
                continue;
            }
            let Some(content) = diff.head_content(&path)? else {
                debug!(path = %path, "skipping non-text entry");
                continue;
            };
            if !self.filter.is_eligible(&path, &content)? {
                continue;
            }

            let mut unit = GenerationUnit::new(path, content);
            if self.context.settings.include_diff {
                unit.diff_patch = Some(diff.patch_for(&unit.path)?);
            }
            units.push(unit);
        }
        info!(
            variant = %self.context.variant,
            changed = total,
            subjects = units.len(),
            "collected subjects"
        );

        if self.context.settings.resolve_context && !units.is_empty() {
            let analyzer = WorkspaceAnalyzer::from_files(head_sources(&diff)?)?;
            attach_context(&mut units, analyzer)?;
        }

        Ok(units)
    }

    /// Build one unit per working-tree file under `root` that passes the subject filter.
    ///
    /// The unit path is `{parent directory}/{file name}`.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::FileNotFound`] if `root` does not exist, or
    /// [`QuillError::Parse`] if a grammar cannot be loaded.
    pub fn workspace_units(&self, root: &Path) -> Result<Vec<GenerationUnit>, QuillError> {
        let files = walk_repo(root)?;

        let mut subjects: Vec<(PathBuf, GenerationUnit)> = Vec::new();
        for file in &files {
            let rel = file.path.to_string_lossy();
            if !self.filter.is_eligible(&rel, &file.content)? {
                continue;
            }
            let unit = GenerationUnit::new(subject_name(&file.path), file.content.clone());
            subjects.push((file.path.clone(), unit));
        }
        info!(
            variant = %self.context.variant,
            files = files.len(),
            subjects = subjects.len(),
            "collected subjects"
        );

        if self.context.settings.resolve_context && !subjects.is_empty() {
            let resolver = ContextResolver::new(Arc::new(WorkspaceAnalyzer::from_files(files)?));
            for (path, unit) in &mut subjects {
                // Resolve against the real path so the unit's own file is excluded
                let probe = GenerationUnit::new(path.to_string_lossy(), unit.primary_content.clone());
                unit.related_context = Some(resolver.resolve(&probe)?);
            }
        }

        Ok(subjects.into_iter().map(|(_, unit)| unit).collect())
    }

    /// Dispatch every unit and aggregate the outcomes.
    pub async fn run(&self, units: Vec<GenerationUnit>) -> (Vec<GenerationOutcome>, AggregateResult) {
        let outcomes = self
            .dispatcher
            .dispatch(units, &self.context.system_prompt)
            .await;
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            variant = %self.context.variant,
            outcomes = outcomes.len(),
            failed,
            "generation finished"
        );
        let result = aggregate(&outcomes);
        (outcomes, result)
    }
}

fn attach_context(units: &mut [GenerationUnit], analyzer: WorkspaceAnalyzer) -> Result<(), QuillError> {
    let resolver = ContextResolver::new(Arc::new(analyzer));
    for unit in units {
        unit.related_context = Some(resolver.resolve(unit)?);
    }
    Ok(())
}

/// Parseable text files of the head snapshot.
fn head_sources(diff: &BranchDiff<'_>) -> Result<Vec<SourceFile>, QuillError> {
    let mut files = Vec::new();
    for path in diff.head_paths()? {
        let language = Language::from_path(Path::new(&path));
        if language == Language::Unknown {
            continue;
        }
        let Some(content) = diff.head_content(&path)? else {
            continue;
        };
        if content.len() > MAX_INDEXED_SIZE {
            continue;
        }
        files.push(SourceFile {
            path: PathBuf::from(path),
            language,
            content,
        });
    }
    Ok(files)
}

fn subject_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    match path
        .parent()
        .and_then(|p| p.file_name())
        .map(|p| p.to_string_lossy())
    {
        Some(parent) => format!("{parent}/{file_name}"),
        None => file_name,
    }
}
