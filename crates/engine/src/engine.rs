//! Evaluation engine: runs controls against a target and records outcomes.

use crate::matchers;
use hostspec_profile::{
    Assertion, Control, ControlResult, Expectation, Outcome, OutcomeCategory, OutcomeKind,
};
use hostspec_providers::{
    Executor, ProviderRegistry, ResolveError, Resource, ResourceError, ResourceScope,
};
use hostspec_redaction::Redactor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on each resource construction and each property read.
    pub timeout: Duration,
    /// Controls evaluated at the same time.
    pub jobs: usize,
    /// Scrub secrets out of diagnostics.
    pub redact: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            jobs: 4,
            redact: true,
        }
    }
}

/// Results of a run, in the order the controls were given.
#[derive(Debug, Clone)]
pub struct RunResults {
    pub results: Vec<ControlResult>,
    pub cancelled: bool,
}

/// Evaluates controls with a provider registry and one target executor.
#[derive(Clone)]
pub struct Engine {
    providers: ProviderRegistry,
    executor: Arc<dyn Executor>,
    config: EngineConfig,
    redactor: Redactor,
}

impl Engine {
    pub fn new(
        providers: ProviderRegistry,
        executor: Arc<dyn Executor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            providers,
            executor,
            config,
            redactor: Redactor::new(),
        }
    }

    /// Use a custom redactor (extra patterns, hash placeholders).
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Evaluate every control to completion.
    pub async fn run(&self, controls: &[Arc<Control>]) -> Vec<ControlResult> {
        let (_keep_open, cancel) = watch::channel(false);
        self.run_until(controls, cancel).await.results
    }

    /// Evaluate controls until `cancel` turns `true`.
    ///
    /// Controls that finished before cancellation keep their outcomes; the
    /// rest are reported as skipped. Every control appears in the result.
    pub async fn run_until(
        &self,
        controls: &[Arc<Control>],
        cancel: watch::Receiver<bool>,
    ) -> RunResults {
        let jobs = self.config.jobs.max(1);
        info!(
            "Evaluating {} controls on {} ({} workers)",
            controls.len(),
            self.executor.describe(),
            jobs
        );

        let context = Arc::new(self.context(controls.iter().map(|c| &**c)));
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut tasks = JoinSet::new();

        for (index, control) in controls.iter().enumerate() {
            let control = Arc::clone(control);
            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let work = async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    Some(context.evaluate(&control).await)
                };
                tokio::select! {
                    biased;
                    _ = wait_cancelled(cancel) => (index, None),
                    result = work => (index, result),
                }
            });
        }

        let mut slots: Vec<Option<ControlResult>> = vec![None; controls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = result,
                Err(e) => warn!("Control evaluation task failed: {}", e),
            }
        }

        let cancelled = *cancel.borrow();
        if cancelled {
            warn!("Run cancelled, unfinished controls are reported as skipped");
        }

        let results = controls
            .iter()
            .zip(slots)
            .map(|(control, slot)| slot.unwrap_or_else(|| unfinished(control, cancelled)))
            .collect();

        RunResults { results, cancelled }
    }

    /// Evaluate a single control.
    pub async fn evaluate_control(&self, control: &Control) -> ControlResult {
        self.context(std::iter::once(control)).evaluate(control).await
    }

    fn context<'a>(&self, controls: impl Iterator<Item = &'a Control>) -> RunContext {
        RunContext {
            providers: self.providers.clone(),
            executor: Arc::clone(&self.executor),
            timeout: self.config.timeout,
            redactor: self
                .config
                .redact
                .then(|| self.redactor.with_secrets(self.providers.secret_values(controls))),
        }
    }
}

/// Everything one run needs, shared by its tasks.
struct RunContext {
    providers: ProviderRegistry,
    executor: Arc<dyn Executor>,
    timeout: Duration,
    redactor: Option<Redactor>,
}

impl RunContext {
    async fn evaluate(&self, control: &Control) -> ControlResult {
        let started = Instant::now();
        if control.assertions.is_empty() {
            let outcome = Outcome::skipped(
                None,
                "",
                OutcomeCategory::NoAssertions,
                "control has no assertions",
            );
            return ControlResult::new(control, vec![outcome], 0);
        }

        // Handles and sessions live exactly as long as this control.
        let mut scope = ResourceScope::new(Arc::clone(&self.executor));
        let mut outcomes = Vec::with_capacity(control.assertions.len());

        for (index, assertion) in control.assertions.iter().enumerate() {
            let assertion_started = Instant::now();
            let label = self.providers.label(&assertion.resource);

            let resolved = timeout(
                self.timeout,
                self.providers.resolve(&assertion.resource, &mut scope),
            )
            .await;
            let handle = match resolved {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => {
                    let category = match e {
                        ResolveError::UnknownResource(_) => OutcomeCategory::UnknownResource,
                        ResolveError::Construction { .. } => OutcomeCategory::Construction,
                    };
                    outcomes.push(
                        self.error(index, &label, assertion, category, &e.to_string())
                            .with_duration(elapsed_ms(assertion_started)),
                    );
                    break;
                }
                Err(_) => {
                    let message = format!(
                        "constructing {} timed out after {}ms",
                        label,
                        self.timeout.as_millis()
                    );
                    outcomes.push(
                        self.error(index, &label, assertion, OutcomeCategory::Timeout, &message)
                            .with_duration(elapsed_ms(assertion_started)),
                    );
                    break;
                }
            };

            let outcome = self
                .check(index, &label, assertion, handle)
                .await
                .with_duration(elapsed_ms(assertion_started));
            // A connection refused on first use counts as a construction failure.
            let unreachable = outcome.kind == OutcomeKind::Error
                && outcome.category == Some(OutcomeCategory::Construction);
            outcomes.push(outcome);
            if unreachable {
                break;
            }
        }

        let result = ControlResult::new(control, outcomes, elapsed_ms(started));
        debug!(
            "Control {} finished: {} ({} outcomes)",
            result.id(),
            result.status,
            result.outcomes.len()
        );
        result
    }

    async fn check(
        &self,
        index: usize,
        label: &str,
        assertion: &Assertion,
        handle: Arc<dyn Resource>,
    ) -> Outcome {
        let expectation = &assertion.expectation;
        let actual = match timeout(self.timeout, handle.get(&expectation.property)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                return self.error(index, label, assertion, category_of(&e), &e.to_string());
            }
            Err(_) => {
                let message = format!(
                    "reading {} of {} timed out after {}ms",
                    expectation.property,
                    label,
                    self.timeout.as_millis()
                );
                return self.error(index, label, assertion, OutcomeCategory::Timeout, &message);
            }
        };

        match matchers::evaluate(expectation, &actual) {
            Ok(verdict) => Outcome::verdict(
                index,
                verdict.passed,
                label,
                expectation.property.clone(),
                expectation.matcher,
                expectation.negate,
                expectation.expected.clone(),
                actual,
                verdict.diagnostic.map(|d| self.scrub(&d)),
            ),
            Err(e) => {
                let mut outcome =
                    self.error(index, label, assertion, OutcomeCategory::Matcher, &e.to_string());
                outcome.actual = Some(actual);
                outcome
            }
        }
    }

    fn error(
        &self,
        index: usize,
        label: &str,
        assertion: &Assertion,
        category: OutcomeCategory,
        message: &str,
    ) -> Outcome {
        let Expectation {
            property,
            matcher,
            expected,
            negate,
        } = &assertion.expectation;
        let mut outcome = Outcome::error(index, label, category, self.scrub(message))
            .with_expectation(property.clone(), *matcher, expected.clone());
        outcome.negate = *negate;
        outcome
    }

    fn scrub(&self, message: &str) -> String {
        match &self.redactor {
            Some(redactor) => redactor.redact_str(message),
            None => message.to_string(),
        }
    }
}

fn category_of(error: &ResourceError) -> OutcomeCategory {
    match error {
        ResourceError::PropertyNotFound { .. } => OutcomeCategory::PropertyNotFound,
        ResourceError::Connection(_) => OutcomeCategory::Construction,
        ResourceError::Timeout(_) => OutcomeCategory::Timeout,
        ResourceError::Query(_) | ResourceError::InvalidArguments(_) => OutcomeCategory::Query,
    }
}

fn unfinished(control: &Control, cancelled: bool) -> ControlResult {
    let outcome = if cancelled {
        Outcome::skipped(
            None,
            "",
            OutcomeCategory::Cancelled,
            "run cancelled before the control completed",
        )
    } else {
        Outcome::error(
            0,
            "",
            OutcomeCategory::Query,
            "evaluation task ended without a result",
        )
    };
    ControlResult::new(control, vec![outcome], 0)
}

/// Resolves once the flag is `true`; never resolves if the sender is gone
/// without having cancelled.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostspec_common::OsType;
    use hostspec_profile::{Expectation, OutcomeKind, ResourceRef, Value};
    use hostspec_providers::{CommandOutput, ScriptedExecutor};

    fn engine(executor: ScriptedExecutor) -> Engine {
        Engine::new(
            ProviderRegistry::with_defaults(),
            Arc::new(executor),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_control_is_skipped() {
        let control = Control::builder("empty").build().unwrap();
        let result = engine(ScriptedExecutor::new(OsType::Linux))
            .evaluate_control(&control)
            .await;
        assert_eq!(result.status, OutcomeKind::Skipped);
        assert_eq!(
            result.outcomes[0].category,
            Some(OutcomeCategory::NoAssertions)
        );
    }

    #[tokio::test]
    async fn test_property_not_found_is_error_and_continues() {
        let executor = ScriptedExecutor::new(OsType::Linux).on(
            "dpkg-query",
            CommandOutput::ok("install ok installed\t14.9-1\n"),
        );
        let package = ResourceRef::new("package", ["postgresql-14"]);
        let control = Control::builder("c")
            .describe(package.clone(), Expectation::be("enabled"))
            .describe(package, Expectation::be("installed"))
            .build()
            .unwrap();

        let result = engine(executor).evaluate_control(&control).await;
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[0].kind, OutcomeKind::Error);
        assert_eq!(
            result.outcomes[0].category,
            Some(OutcomeCategory::PropertyNotFound)
        );
        assert_eq!(result.outcomes[1].kind, OutcomeKind::Pass);
        assert_eq!(result.status, OutcomeKind::Error);
    }

    #[tokio::test]
    async fn test_matcher_error_keeps_actual() {
        let executor = ScriptedExecutor::new(OsType::Linux).on(
            "dpkg-query",
            CommandOutput::ok("install ok installed\t14.9-1\n"),
        );
        let control = Control::builder("c")
            .describe(
                ResourceRef::new("package", ["postgresql-14"]),
                Expectation::eq("installed", "yes"),
            )
            .build()
            .unwrap();

        let result = engine(executor).evaluate_control(&control).await;
        let outcome = &result.outcomes[0];
        assert_eq!(outcome.category, Some(OutcomeCategory::Matcher));
        assert_eq!(outcome.actual, Some(Value::Bool(true)));
        assert_eq!(outcome.expected, Some(Value::from("yes")));
    }

    #[tokio::test]
    async fn test_wait_cancelled_ignores_dropped_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let waited =
            tokio::time::timeout(Duration::from_millis(20), wait_cancelled(rx)).await;
        assert!(waited.is_err());
    }
}
