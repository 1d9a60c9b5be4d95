//! A candidate's attempt at a whole test.

use std::collections::BTreeMap;
use std::sync::Arc;

use assay_assembly::{assemble_test, RuntimeItem, RuntimeTree};
use assay_core::assessment::{TestDefinition, TestNode};
use assay_core::error::Diagnostic;
use assay_core::expression::{ItemCount, ItemFilter, TestQuery};
use assay_core::random::{from_entropy, seeded, RandomSource};
use assay_core::state::{AttemptState, InMemoryAttemptState};
use assay_core::value::{Scalar, Value};
use rand::Rng;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::processing::{ItemResults, OutcomeProcessor};
use crate::session::{ItemSession, ItemSummary};

/// One delivered item and its attempt.
pub struct ItemRecord {
    pub item: RuntimeItem,
    pub categories: Vec<String>,
    pub session: ItemSession,
}

/// Item records as seen by test-level outcome processing.
struct Records<'a>(&'a [ItemRecord]);

fn matching<'f>(
    records: &'f [ItemRecord],
    filter: &'f ItemFilter,
) -> impl Iterator<Item = &'f ItemRecord> + 'f {
    records.iter().filter(move |record| {
        let sections: Vec<&str> = record.item.sections.iter().map(String::as_str).collect();
        filter.matches(&sections, &record.categories)
    })
}

impl ItemResults for Records<'_> {
    fn item_value(&self, item: &str, identifier: &str) -> Option<Value> {
        self.0
            .iter()
            .find(|record| record.item.identifier == item)
            .map(|record| record.session.value(identifier))
    }

    fn query(&self, query: &TestQuery<'_>) -> Option<Value> {
        match query {
            TestQuery::Count { what, filter } => {
                let count = matching(self.0, filter)
                    .filter(|record| counted(*what, &record.session.summary()))
                    .count();
                Some(Value::integer(count as i64))
            }
            TestQuery::Variables {
                identifier,
                base_type,
                filter,
            } => {
                let mut integers: i64 = 0;
                let mut floats = 0.0;
                let mut any_float = false;
                let mut any = false;
                for record in matching(self.0, filter) {
                    let Value::Single(scalar) = record.session.value(identifier) else {
                        continue;
                    };
                    if base_type.is_some_and(|b| b != scalar.base_type()) {
                        continue;
                    }
                    match scalar {
                        Scalar::Integer(i) => integers = integers.checked_add(i)?,
                        Scalar::Float(f) => {
                            floats += f;
                            any_float = true;
                        }
                        _ => continue,
                    }
                    any = true;
                }
                match (any, any_float) {
                    (false, _) => None,
                    (true, false) => Some(Value::integer(integers)),
                    (true, true) => Some(Value::float(integers as f64 + floats)),
                }
            }
        }
    }
}

fn counted(what: ItemCount, summary: &ItemSummary) -> bool {
    match what {
        ItemCount::Selected => true,
        ItemCount::Presented => summary.presented,
        ItemCount::Responded => summary.responded,
        ItemCount::Correct => summary.correct == Some(true),
        ItemCount::Incorrect => summary.responded && summary.correct != Some(true),
    }
}

/// Assembles a test once and holds one item session per delivered item.
pub struct TestSession {
    test: Arc<TestDefinition>,
    tree: RuntimeTree,
    records: Vec<ItemRecord>,
    outcomes: InMemoryAttemptState,
    rng: RandomSource,
    diagnostics: Vec<Diagnostic>,
}

impl TestSession {
    pub fn new(test: Arc<TestDefinition>, config: &EngineConfig) -> Result<Self, SessionError> {
        let rng = config.seed.map(seeded).unwrap_or_else(from_entropy);
        Self::with_rng(test, rng, config.max_template_retries)
    }

    /// Assemble the runtime tree from `rng` and open a session per item.
    /// Item sessions draw their own seeds from `rng`.
    pub fn with_rng(
        test: Arc<TestDefinition>,
        mut rng: RandomSource,
        max_template_retries: u32,
    ) -> Result<Self, SessionError> {
        let tree = assemble_test(&test, &mut rng);
        let mut records = Vec::new();
        for runtime in tree.items() {
            let missing = || SessionError::MissingItem {
                href: runtime.href.clone(),
            };
            let Some(TestNode::Item(item_ref)) = test.node(runtime.node) else {
                return Err(missing());
            };
            let definition = test.item_definition(item_ref).cloned().ok_or_else(missing)?;
            let session = ItemSession::new(definition)
                .with_rng(seeded(rng.gen()))
                .with_max_template_retries(max_template_retries);
            records.push(ItemRecord {
                item: runtime.clone(),
                categories: item_ref.categories.clone(),
                session,
            });
        }

        let mut outcomes = InMemoryAttemptState::new();
        for declaration in &test.declarations {
            outcomes.set_value(
                &declaration.identifier,
                declaration.default_value.clone().unwrap_or_default(),
            );
        }
        outcomes.set_initialized(true);
        info!(test = %test.identifier, items = records.len(), "opened test session");

        Ok(Self {
            test,
            tree,
            records,
            outcomes,
            rng,
            diagnostics: Vec::new(),
        })
    }

    pub fn tree(&self) -> &RuntimeTree {
        &self.tree
    }

    pub fn records(&self) -> &[ItemRecord] {
        &self.records
    }

    /// Test-level diagnostics from outcome processing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The first delivered instance of an item.
    pub fn item_mut(&mut self, identifier: &str) -> Result<&mut ItemSession, SessionError> {
        self.records
            .iter_mut()
            .find(|record| record.item.identifier == identifier)
            .map(|record| &mut record.session)
            .ok_or_else(|| SessionError::UnknownItem(identifier.to_string()))
    }

    /// Initialize every delivered item's attempt.
    pub fn initialize_items(&mut self) {
        let none = BTreeMap::new();
        for record in &mut self.records {
            record.session.initialize_attempt(&none);
        }
    }

    /// Run test-level outcome processing over the current item results.
    pub fn process_outcomes(&mut self) {
        let test = Arc::clone(&self.test);
        OutcomeProcessor::new(&test).run(
            &mut self.outcomes,
            &Records(&self.records),
            &mut self.rng,
            &mut self.diagnostics,
        );
        info!(test = %test.identifier, "processed test outcomes");
    }

    pub fn outcome(&self, identifier: &str) -> Value {
        self.outcomes.value(identifier).cloned().unwrap_or_default()
    }

    pub fn outcomes(&self) -> BTreeMap<String, Value> {
        self.test
            .declarations
            .iter()
            .map(|d| (d.identifier.clone(), self.outcome(&d.identifier)))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ItemSummary> {
        self.records
            .iter()
            .map(|record| record.session.summary())
            .collect()
    }
}
