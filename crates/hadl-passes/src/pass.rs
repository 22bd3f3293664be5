//! Pass infrastructure: keyed passes run in a fixed order, each result
//! cached for later passes to consume.
//!
//! Keys identify results, so a duplicate key is a configuration error
//! rejected when the order is assembled, not at lookup time deep into a
//! run. Results are stored in execution order and retrieved with a typed
//! downcast.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::spec::Specification;

/// Identity of one pass application within an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassKey(pub String);

impl PassKey {
    pub fn new(key: impl Into<String>) -> Self {
        PassKey(key.into())
    }
}

impl fmt::Display for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whatever a pass produces; consumers downcast through
/// [`PassResults::get_as`].
pub type PassOutput = Box<dyn Any>;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("duplicate pass key '{key}'")]
    DuplicateKey { key: String },

    #[error("no result recorded under key '{key}'")]
    MissingResult { key: String },

    #[error("result under key '{key}' has an unexpected type")]
    WrongResultType { key: String },

    #[error("pass '{pass}' failed: {message}")]
    Execution { pass: String, message: String },
}

/// A transformation or analysis over a whole specification.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Run over the specification, reading earlier results as needed.
    fn execute(
        &self,
        results: &PassResults,
        spec: &mut Specification,
    ) -> Result<PassOutput, PassError>;
}

/// Results of executed passes, in execution order.
#[derive(Default)]
pub struct PassResults {
    store: IndexMap<PassKey, PassOutput>,
}

impl PassResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PassKey) -> Option<&PassOutput> {
        self.store.get(key)
    }

    pub fn get_as<T: 'static>(&self, key: &PassKey) -> Option<&T> {
        self.store.get(key)?.downcast_ref()
    }

    pub fn expect_as<T: 'static>(&self, key: &PassKey) -> Result<&T, PassError> {
        let output = self.store.get(key).ok_or_else(|| PassError::MissingResult {
            key: key.0.clone(),
        })?;
        output.downcast_ref().ok_or_else(|| PassError::WrongResultType {
            key: key.0.clone(),
        })
    }

    /// Keys in execution order.
    pub fn keys(&self) -> impl Iterator<Item = &PassKey> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl fmt::Debug for PassResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassResults")
            .field("keys", &self.store.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An ordered sequence of keyed passes.
#[derive(Default)]
pub struct PassOrder {
    steps: Vec<(PassKey, Box<dyn Pass>)>,
    counters: HashMap<&'static str, u32>,
}

impl PassOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass under a generated key: the pass name, suffixed with
    /// a counter from the second occurrence on.
    pub fn add(&mut self, pass: impl Pass + 'static) -> &mut Self {
        let name = pass.name();
        let count = self.counters.entry(name).or_insert(0);
        let key = loop {
            *count += 1;
            let key = if *count == 1 {
                PassKey::new(name)
            } else {
                PassKey::new(format!("{}#{}", name, *count))
            };
            if !self.steps.iter().any(|(k, _)| *k == key) {
                break key;
            }
        };
        self.steps.push((key, Box::new(pass)));
        self
    }

    /// Append a pass under an explicit key, rejecting duplicates.
    pub fn add_keyed(
        &mut self,
        key: PassKey,
        pass: impl Pass + 'static,
    ) -> Result<&mut Self, PassError> {
        if self.steps.iter().any(|(k, _)| *k == key) {
            return Err(PassError::DuplicateKey { key: key.0 });
        }
        self.steps.push((key, Box::new(pass)));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for PassOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassOrder")
            .field(
                "steps",
                &self.steps.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Executes a [`PassOrder`] front to back.
pub struct PassManager;

impl PassManager {
    /// Run every pass in order, caching each result under its key. The
    /// first failing pass aborts the run.
    pub fn run(order: PassOrder, spec: &mut Specification) -> Result<PassResults, PassError> {
        let mut results = PassResults::new();
        for (key, pass) in order.steps {
            debug!(pass = %key, "running pass");
            let output = pass.execute(&results, spec)?;
            results.store.insert(key, output);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record(&'static str, u32);

    impl Pass for Record {
        fn name(&self) -> &'static str {
            self.0
        }

        fn execute(
            &self,
            _results: &PassResults,
            _spec: &mut Specification,
        ) -> Result<PassOutput, PassError> {
            Ok(Box::new(self.1))
        }
    }

    struct Fails;

    impl Pass for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        fn execute(
            &self,
            _results: &PassResults,
            _spec: &mut Specification,
        ) -> Result<PassOutput, PassError> {
            Err(PassError::Execution {
                pass: "fails".into(),
                message: "boom".into(),
            })
        }
    }

    #[test]
    fn duplicate_explicit_key_is_rejected() {
        let mut order = PassOrder::new();
        order.add_keyed(PassKey::new("a"), Record("r", 1)).unwrap();
        let err = order.add_keyed(PassKey::new("a"), Record("r", 2)).unwrap_err();
        assert!(matches!(err, PassError::DuplicateKey { .. }));
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn generated_keys_count_repeated_passes() {
        let mut order = PassOrder::new();
        order.add(Record("simplify", 1));
        order.add(Record("simplify", 2));
        let mut spec = Specification::new("s");
        let results = PassManager::run(order, &mut spec).unwrap();
        let keys: Vec<String> = results.keys().map(|k| k.0.clone()).collect();
        assert_eq!(keys, vec!["simplify", "simplify#2"]);
    }

    #[test]
    fn results_are_retrievable_by_key_in_execution_order() {
        let mut order = PassOrder::new();
        order.add(Record("first", 10));
        order.add(Record("second", 20));
        let mut spec = Specification::new("s");
        let results = PassManager::run(order, &mut spec).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results.get_as::<u32>(&PassKey::new("first")),
            Some(&10)
        );
        assert_eq!(
            results.expect_as::<u32>(&PassKey::new("second")).unwrap(),
            &20
        );
    }

    #[test]
    fn typed_retrieval_reports_missing_and_mismatched() {
        let mut order = PassOrder::new();
        order.add(Record("first", 10));
        let mut spec = Specification::new("s");
        let results = PassManager::run(order, &mut spec).unwrap();
        assert!(matches!(
            results.expect_as::<u32>(&PassKey::new("absent")),
            Err(PassError::MissingResult { .. })
        ));
        assert!(matches!(
            results.expect_as::<String>(&PassKey::new("first")),
            Err(PassError::WrongResultType { .. })
        ));
    }

    #[test]
    fn failing_pass_aborts_the_run() {
        let mut order = PassOrder::new();
        order.add(Record("first", 1));
        order.add(Fails);
        order.add(Record("second", 2));
        let mut spec = Specification::new("s");
        let err = PassManager::run(order, &mut spec).unwrap_err();
        assert!(matches!(err, PassError::Execution { .. }));
    }
}
