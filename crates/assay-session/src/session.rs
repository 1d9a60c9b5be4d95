//! The item attempt lifecycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use assay_core::error::Diagnostic;
use assay_core::expression::Environment;
use assay_core::model::{
    InteractionKind, ItemDefinition, VariableClass, COMPLETION_STATUS, DURATION,
};
use assay_core::random::{from_entropy, seeded, shuffle_unfixed, RandomSource};
use assay_core::state::{AttemptState, InMemoryAttemptState};
use assay_core::value::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::binding::{DefaultBinder, ResponseBinder};
use crate::config::EngineConfig;
use crate::error::{BindingError, SessionError};
use crate::processing::{AttemptEnv, ItemProcessor, TemplateReport, MAX_TEMPLATE_RETRIES};
use crate::validation::validate_interaction;

/// Where one item attempt stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub identifier: String,
    pub presented: bool,
    pub responded: bool,
    /// `None` when the item declares no correct responses.
    pub correct: Option<bool>,
    pub attempts: u32,
    pub completion_status: String,
    pub outcomes: BTreeMap<String, Value>,
}

/// One candidate's attempt at one item.
///
/// The definition is shared; all attempt data lives in the state store.
pub struct ItemSession<S = InMemoryAttemptState> {
    item: Arc<ItemDefinition>,
    state: S,
    rng: RandomSource,
    binder: Box<dyn ResponseBinder>,
    max_template_retries: u32,
    diagnostics: Vec<Diagnostic>,
    template_report: Option<TemplateReport>,
}

impl ItemSession<InMemoryAttemptState> {
    pub fn new(item: Arc<ItemDefinition>) -> Self {
        Self::with_state(item, InMemoryAttemptState::new())
    }
}

impl<S: AttemptState> ItemSession<S> {
    /// Resume or start an attempt over an existing state store.
    pub fn with_state(item: Arc<ItemDefinition>, state: S) -> Self {
        Self {
            item,
            state,
            rng: from_entropy(),
            binder: Box::new(DefaultBinder),
            max_template_retries: MAX_TEMPLATE_RETRIES,
            diagnostics: Vec::new(),
            template_report: None,
        }
    }

    pub fn with_rng(mut self, rng: RandomSource) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(seeded(seed))
    }

    pub fn with_binder(mut self, binder: impl ResponseBinder + 'static) -> Self {
        self.binder = Box::new(binder);
        self
    }

    pub fn with_max_template_retries(mut self, max_template_retries: u32) -> Self {
        self.max_template_retries = max_template_retries;
        self
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_template_retries = config.max_template_retries;
        if let Some(seed) = config.seed {
            self.rng = seeded(seed);
        }
        self
    }

    pub fn item(&self) -> &ItemDefinition {
        &self.item
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Diagnostics collected by every phase so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Outcome of template processing, when this session ran it.
    pub fn template_report(&self) -> Option<&TemplateReport> {
        self.template_report.as_ref()
    }

    /// Current value of a variable; NULL when unset.
    pub fn value(&self, identifier: &str) -> Value {
        self.state.value(identifier).cloned().unwrap_or_default()
    }

    fn require_initialized(&self, operation: &str) -> Result<(), SessionError> {
        if self.state.is_initialized() {
            return Ok(());
        }
        error!(item = %self.item.identifier, operation, "attempt used before initialization");
        Err(SessionError::NotInitialized(self.item.identifier.clone()))
    }

    /// Run template processing and set every other variable to its default.
    ///
    /// Does nothing and returns `None` when the attempt is already
    /// initialized.
    pub fn initialize_attempt(
        &mut self,
        external_template_defaults: &BTreeMap<String, Value>,
    ) -> Option<TemplateReport> {
        if self.state.is_initialized() {
            debug!(item = %self.item.identifier, "attempt already initialized");
            return None;
        }
        let item = Arc::clone(&self.item);
        let report = ItemProcessor::new(&item)
            .with_max_retries(self.max_template_retries)
            .template_processing(
                &mut self.state,
                external_template_defaults,
                &mut self.rng,
                &mut self.diagnostics,
            );

        let defaults: Vec<(String, Value)> = {
            let env = AttemptEnv::new(&item, &self.state);
            item.declarations
                .iter()
                .filter(|d| d.class != VariableClass::Template)
                .map(|d| (d.identifier.clone(), env.default_value(&d.identifier)))
                .collect()
        };
        for (identifier, value) in defaults {
            self.state.set_value(&identifier, value);
        }
        self.state.set_attempt_count(0);
        self.state.set_duration(0.0);

        for interaction in &item.interactions {
            if let Some(choices) = interaction.shuffled_choices() {
                let order = shuffle_unfixed(choices.to_vec(), |c| c.fixed, &mut self.rng);
                self.state.set_shuffle_order(
                    &interaction.response_identifier,
                    order.into_iter().map(|c| c.identifier).collect(),
                );
            }
        }

        self.state.set_initialized(true);
        self.template_report = Some(report);
        info!(
            item = %item.identifier,
            template_state = ?report.state,
            template_attempts = report.attempts,
            "initialized attempt"
        );
        Some(report)
    }

    /// Bind raw submitted strings to response variables.
    ///
    /// Returns the identifiers that could not be bound; the rest are stored.
    /// End-attempt controls missing from `raw` were not triggered by this
    /// submission and are set to false.
    pub fn bind_responses(
        &mut self,
        raw: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeSet<String>, SessionError> {
        self.require_initialized("bind_responses")?;
        let mut failed = BTreeSet::new();
        for (identifier, values) in raw {
            let bound = match self.item.declaration(identifier) {
                Some(d) if d.class == VariableClass::Response && d.is_builtin() => {
                    Err(BindingError::Reserved(identifier.clone()))
                }
                Some(d) if d.class == VariableClass::Response => self.binder.bind(d, values),
                _ => Err(BindingError::NotAResponse(identifier.clone())),
            };
            match bound {
                Ok(value) => {
                    debug!(item = %self.item.identifier, response = %identifier, %value, "bound response");
                    self.state.set_value(identifier, value);
                }
                Err(e) => {
                    warn!(item = %self.item.identifier, error = %e, "response binding failed");
                    failed.insert(identifier.clone());
                }
            }
        }
        for interaction in &self.item.interactions {
            if matches!(interaction.kind, InteractionKind::EndAttempt { .. })
                && !raw.contains_key(&interaction.response_identifier)
            {
                self.state
                    .set_value(&interaction.response_identifier, Value::boolean(false));
            }
        }
        Ok(failed)
    }

    /// Whether the current submission counts as an attempt: it does unless
    /// an end-attempt control configured not to count was triggered.
    fn counts_attempt(&self) -> bool {
        !self.item.interactions.iter().any(|interaction| {
            matches!(
                interaction.kind,
                InteractionKind::EndAttempt {
                    count_attempt: false
                }
            ) && self
                .state
                .value(&interaction.response_identifier)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
    }

    /// Run response processing over the bound responses.
    pub fn process_responses(&mut self) -> Result<(), SessionError> {
        self.require_initialized("process_responses")?;
        let count_attempt = self.counts_attempt();
        let item = Arc::clone(&self.item);
        ItemProcessor::new(&item)
            .with_max_retries(self.max_template_retries)
            .response_processing(
                &mut self.state,
                count_attempt,
                &mut self.rng,
                &mut self.diagnostics,
            );
        info!(
            item = %item.identifier,
            attempts = self.state.attempt_count(),
            counted = count_attempt,
            "processed responses"
        );
        Ok(())
    }

    /// Response identifiers whose current value fails its interaction's
    /// constraints.
    pub fn validate_responses(&self) -> Result<BTreeSet<String>, SessionError> {
        self.require_initialized("validate_responses")?;
        Ok(self
            .item
            .interactions
            .iter()
            .filter(|interaction| {
                let value = self.value(&interaction.response_identifier);
                !validate_interaction(interaction, &value)
            })
            .map(|interaction| interaction.response_identifier.clone())
            .collect())
    }

    /// Add time spent on the attempt.
    pub fn record_duration(&mut self, seconds: f64) {
        let total = self.state.duration() + seconds.max(0.0);
        self.state.set_duration(total);
        self.state.set_value(DURATION, Value::float(total));
    }

    /// Whether every response with a correct response matches it.
    fn is_correct(&self) -> Option<bool> {
        let env = AttemptEnv::new(&self.item, &self.state);
        let mut any = false;
        for declaration in self.item.declarations_of(VariableClass::Response) {
            if declaration.is_builtin() {
                continue;
            }
            let correct = env.correct_response(&declaration.identifier);
            if correct.is_null() {
                continue;
            }
            any = true;
            if env.value(&declaration.identifier) != correct {
                return Some(false);
            }
        }
        any.then_some(true)
    }

    pub fn summary(&self) -> ItemSummary {
        let outcomes = self
            .item
            .declarations_of(VariableClass::Outcome)
            .map(|d| (d.identifier.clone(), self.value(&d.identifier)))
            .collect();
        let completion_status = self
            .state
            .value(COMPLETION_STATUS)
            .map(ToString::to_string)
            .unwrap_or_default();
        ItemSummary {
            identifier: self.item.identifier.clone(),
            presented: self.state.is_initialized(),
            responded: self.state.attempt_count() > 0,
            correct: self.is_correct(),
            attempts: self.state.attempt_count(),
            completion_status,
            outcomes,
        }
    }

    /// Choice order for a shuffled interaction, as recorded at
    /// initialization.
    pub fn shuffle_order(&self, response_identifier: &str) -> Option<&[String]> {
        self.state.shuffle_order(response_identifier)
    }
}
