use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing::Level;

use quill_core::{LlmConfig, QuillConfig, Variant};
use quill_generate::github::CommentPoster;
use quill_generate::llm::LlmClient;
use quill_generate::output::{read_result, write_documents, write_result};
use quill_generate::pipeline::{GenerationPipeline, PipelineContext};

const CONFIG_FILE: &str = ".quill.toml";

#[derive(Parser)]
#[command(
    name = "quill",
    version,
    about = "LLM-generated reviews, unit tests and specifications for pull requests",
    long_about = "Quill compares two branches, picks the changed files that matter, and asks an\n\
                   LLM to write something about each of them, one request per file.\n\n\
                   The generation service is configured through API_KEY, MODEL_NAME, MAX_TOKENS\n\
                   and USE_AZURE (plus BASE_URL when USE_AZURE=true).\n\n\
                   Examples:\n  \
                     quill review develop feature/x       Review every changed file\n  \
                     quill unit-tests develop feature/x   Unit tests for marked classes\n  \
                     quill specs docs/specs               One document per controller\n  \
                     quill post result.json 1296269 42    Publish result.json on PR #42\n  \
                     quill init                           Write a default .quill.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .quill.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write a review comment for every file changed between two branches
    #[command(long_about = "Write a review comment for every file changed between two branches.\n\n\
        Every added or modified file is sent with its content and unified diff.\n\
        Replies are joined into result.json.\n\n\
        Examples:\n  quill review develop feature/x")]
    Review {
        /// Base branch (or revision)
        base: String,
        /// Head branch (or revision)
        head: String,
    },
    /// Write unit tests for marked classes changed between two branches
    #[command(long_about = "Write unit tests for marked classes changed between two branches.\n\n\
        Only added or modified .cs files carrying the [UnitTestSubject] attribute are\n\
        sent. The source of every class and interface they reference is attached\n\
        as related context. Replies are joined into result.json.\n\n\
        Examples:\n  quill unit-tests develop feature/x")]
    UnitTests {
        /// Base branch (or revision)
        base: String,
        /// Head branch (or revision)
        head: String,
    },
    /// Write a specification document for every controller in the working tree
    #[command(long_about = "Write a specification document for every controller in the working tree.\n\n\
        Every .cs file whose name contains 'controller' is sent on its own and the\n\
        reply is written to OUT_DIR/{name}Specification.txt.\n\n\
        Examples:\n  quill specs docs/specs")]
    Specs {
        /// Directory receiving the documents (created when missing)
        out_dir: PathBuf,
    },
    /// Post a result file as a pull request comment
    #[command(long_about = "Post a result file as a pull request comment.\n\n\
        Reads the comment field of a result file and publishes it on the pull\n\
        request. Requires GITHUB_TOKEN.\n\n\
        Examples:\n  quill post result.json 1296269 42")]
    Post {
        /// Result file written by review or unit-tests
        file: PathBuf,
        /// Numeric GitHub repository id
        repository_id: u64,
        /// Pull request number
        pull_request_id: u64,
    },
    /// Create a default .quill.toml in the current directory
    Init,
}

const DEFAULT_CONFIG: &str = r#"# Quill Configuration
# Every value below is optional; the commented values are the defaults.

[pipeline]
# Upper bound, in seconds, of the random delay before each request
# jitter_ceiling_secs = 180
# Maximum requests in flight (unset: one per subject)
# max_concurrency = 4
# Where review and unit-tests write their result
# output_path = "result.json"

[review]
# prompt_path = "tools/PullRequestReviewer/prompt.txt"
# extensions = []
# patterns = ["src/**"]
# include_diff = true

[unit_tests]
# prompt_path = "tools/UnitTestCreator/prompt.txt"
# extensions = [".cs"]
# marker = "UnitTestSubject"
# resolve_context = true

[specs]
# prompt_path = "tools/SpecificationsCreator/prompt.txt"
# extensions = [".cs"]
# name_contains = "controller"
# document_suffix = "Specification"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    quill_core::telemetry::init_tracing(cli.log_json, level);

    match cli.command {
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Review { ref base, ref head } => {
            let config = load_config(cli.config.as_deref())?;
            run_diff_variant(Variant::Review, &config, base, head).await?;
        }
        Command::UnitTests { ref base, ref head } => {
            let config = load_config(cli.config.as_deref())?;
            run_diff_variant(Variant::UnitTests, &config, base, head).await?;
        }
        Command::Specs { ref out_dir } => {
            let config = load_config(cli.config.as_deref())?;
            run_specs(&config, out_dir).await?;
        }
        Command::Post {
            ref file,
            repository_id,
            pull_request_id,
        } => {
            let result = read_result(file).wrap_err(format!("reading {}", file.display()))?;
            if result.comment.trim().is_empty() {
                miette::bail!(miette::miette!(
                    help = "run 'quill review' or 'quill unit-tests' to produce a result first",
                    "{} has an empty comment",
                    file.display()
                ));
            }
            let poster = CommentPoster::new(None)?;
            let id = poster
                .post_comment(repository_id, pull_request_id, &result.comment)
                .await?;
            println!("Posted comment {id} on pull request #{pull_request_id}");
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<QuillConfig> {
    let config = match explicit {
        Some(path) => QuillConfig::from_file(path)
            .wrap_err(format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                QuillConfig::from_file(default_path).wrap_err(format!("loading {CONFIG_FILE}"))?
            } else {
                QuillConfig::default()
            }
        }
    };
    Ok(config)
}

/// Validate the environment and read the prompt before touching the repository.
fn build_pipeline(variant: Variant, config: &QuillConfig) -> Result<GenerationPipeline> {
    let llm = LlmConfig::from_env()?;
    let context = PipelineContext::load(variant, config, &llm)
        .wrap_err(format!("loading the {variant} system prompt"))?;
    let generator = Arc::new(LlmClient::new(&llm)?);
    Ok(GenerationPipeline::new(context, generator)?)
}

async fn run_diff_variant(
    variant: Variant,
    config: &QuillConfig,
    base: &str,
    head: &str,
) -> Result<()> {
    let pipeline = build_pipeline(variant, config)?;

    let units = {
        let repo = quill_gitscan::discover_repository(Path::new("."))?;
        pipeline.diff_units(&repo, base, head)?
    };

    let subjects = units.len();
    let (outcomes, result) = pipeline.run(units).await;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();

    let output_path = &config.pipeline.output_path;
    write_result(&result, output_path).wrap_err(format!("writing {}", output_path.display()))?;
    println!(
        "Wrote {} ({subjects} subjects, {failed} failed)",
        output_path.display()
    );
    Ok(())
}

async fn run_specs(config: &QuillConfig, out_dir: &Path) -> Result<()> {
    let pipeline = build_pipeline(Variant::Specs, config)?;

    let units = pipeline.workspace_units(Path::new("."))?;
    let (outcomes, _result) = pipeline.run(units).await;
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();

    let suffix = &pipeline.context().settings.document_suffix;
    let written = write_documents(&outcomes, out_dir, suffix)
        .wrap_err(format!("writing documents to {}", out_dir.display()))?;
    println!(
        "Wrote {} documents to {} ({failed} failed)",
        written.len(),
        out_dir.display()
    );
    Ok(())
}
