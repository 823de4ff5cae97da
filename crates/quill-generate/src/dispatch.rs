//! Concurrent, jittered dispatch of generation units.
//!
//! Every unit gets its own task. Each task sleeps for a random delay before
//! calling the generator, so a burst of units spreads out over the jitter
//! window instead of hitting the service at once. A failing or panicking task
//! becomes a failed outcome for its unit and never affects its siblings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use quill_core::{GenerationOutcome, GenerationUnit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::llm::Generator;
use crate::prompt::{fallback_text, GenerationTask};

/// Source of per-task delays.
pub trait JitterSource: Send + Sync {
    /// A delay between zero and `ceiling`, inclusive.
    fn next_delay(&self, ceiling: Duration) -> Duration;
}

/// Uniformly random whole-second delays.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use quill_generate::dispatch::{JitterSource, RandomJitter};
///
/// let jitter = RandomJitter::seeded(7);
/// let delay = jitter.next_delay(Duration::from_secs(180));
/// assert!(delay <= Duration::from_secs(180));
/// ```
pub struct RandomJitter {
    rng: StdMutex<StdRng>,
}

impl RandomJitter {
    /// Seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdMutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic sequence for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdMutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterSource for RandomJitter {
    fn next_delay(&self, ceiling: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_secs(rng.random_range(0..=ceiling.as_secs()))
    }
}

/// The same delay every time, capped at the ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn next_delay(&self, ceiling: Duration) -> Duration {
        self.0.min(ceiling)
    }
}

/// Knobs of one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Upper bound of the pre-request delay.
    pub jitter_ceiling: Duration,
    /// Maximum generation calls in flight; `None` is unbounded.
    pub max_concurrency: Option<usize>,
    /// Output token budget passed to the generator.
    pub max_tokens: u32,
    /// Sentence used in the fallback text of failed units.
    pub fallback_message: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            jitter_ceiling: Duration::from_secs(180),
            max_concurrency: None,
            max_tokens: 1000,
            fallback_message: "A review could not be created because an error occurred.".into(),
        }
    }
}

/// Fans generation units out to concurrent tasks and gathers their outcomes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use quill_core::{GenerationUnit, QuillError};
/// use quill_generate::dispatch::{DispatchSettings, FixedJitter, RateLimitedDispatcher};
/// use quill_generate::llm::Generator;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Generator for Echo {
///     async fn generate(&self, _system: &str, user: &str, _max: u32) -> Result<String, QuillError> {
///         Ok(user.lines().nth(1).unwrap_or_default().to_string())
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let dispatcher = RateLimitedDispatcher::new(Arc::new(Echo), DispatchSettings::default())
///     .with_jitter(Arc::new(FixedJitter(Duration::ZERO)));
/// let outcomes = dispatcher
///     .dispatch(vec![GenerationUnit::new("src/A.cs", "class A {}")], "system")
///     .await;
/// assert_eq!(outcomes.len(), 1);
/// assert_eq!(outcomes[0].text(), "src/A.cs");
/// # });
/// ```
pub struct RateLimitedDispatcher {
    generator: Arc<dyn Generator>,
    jitter: Arc<dyn JitterSource>,
    settings: DispatchSettings,
}

impl RateLimitedDispatcher {
    /// A dispatcher with OS-seeded random jitter.
    pub fn new(generator: Arc<dyn Generator>, settings: DispatchSettings) -> Self {
        Self {
            generator,
            jitter: Arc::new(RandomJitter::new()),
            settings,
        }
    }

    /// Replace the random delay source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Settings this dispatcher runs with.
    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run one generation task per unit and wait for all of them.
    ///
    /// Returns exactly one outcome per unit, in completion order. Generator
    /// errors and task panics become [`GenerationOutcome::Failed`] with the
    /// path-tagged fallback text. There is no retry.
    pub async fn dispatch(
        &self,
        units: Vec<GenerationUnit>,
        system_prompt: &str,
    ) -> Vec<GenerationOutcome> {
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(units.len())));
        let semaphore = self
            .settings
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let system_prompt: Arc<str> = Arc::from(system_prompt);

        let mut join_set = JoinSet::new();
        let mut pending = HashMap::new();

        for unit in units {
            let generator = Arc::clone(&self.generator);
            let jitter = Arc::clone(&self.jitter);
            let outcomes = Arc::clone(&outcomes);
            let semaphore = semaphore.clone();
            let system_prompt = Arc::clone(&system_prompt);
            let settings = self.settings.clone();
            let task_unit = unit.clone();

            let handle = join_set.spawn(async move {
                let outcome = run_unit(
                    task_unit,
                    &system_prompt,
                    generator.as_ref(),
                    jitter.as_ref(),
                    semaphore,
                    &settings,
                )
                .await;
                outcomes.lock().await.push(outcome);
            });
            pending.insert(handle.id(), unit);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    pending.remove(&id);
                }
                Err(join_error) => {
                    let Some(unit) = pending.remove(&join_error.id()) else {
                        continue;
                    };
                    error!(subject = %unit.path, error = %join_error, "generation task aborted");
                    let text = fallback_text(&unit.path, &self.settings.fallback_message);
                    outcomes.lock().await.push(GenerationOutcome::Failed {
                        unit,
                        text,
                        error: join_error.to_string(),
                    });
                }
            }
        }

        let mut collected = outcomes.lock().await;
        std::mem::take(&mut *collected)
    }
}

async fn run_unit(
    unit: GenerationUnit,
    system_prompt: &str,
    generator: &dyn Generator,
    jitter: &dyn JitterSource,
    semaphore: Option<Arc<Semaphore>>,
    settings: &DispatchSettings,
) -> GenerationOutcome {
    let delay = jitter.next_delay(settings.jitter_ceiling);
    info!(
        subject = %unit.path,
        seconds = delay.as_secs(),
        "waiting to avoid rate limits"
    );
    tokio::time::sleep(delay).await;

    // A closed semaphore only happens on shutdown; proceed unthrottled then
    let _permit = match semaphore {
        Some(semaphore) => semaphore.acquire_owned().await.ok(),
        None => None,
    };

    info!(subject = %unit.path, "creating");
    let task = GenerationTask::new(unit, system_prompt);

    match generator
        .generate(&task.system_prompt, &task.user_message, settings.max_tokens)
        .await
    {
        Ok(text) => {
            info!(subject = %task.unit.path, "done");
            GenerationOutcome::Generated {
                unit: task.unit,
                text,
            }
        }
        Err(e) => {
            error!(subject = %task.unit.path, error = %e, "generation failed");
            let text = fallback_text(&task.unit.path, &settings.fallback_message);
            GenerationOutcome::Failed {
                unit: task.unit,
                text,
                error: e.to_string(),
            }
        }
    }
}
