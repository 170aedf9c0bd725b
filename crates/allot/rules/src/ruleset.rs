//! Compiled rule sets and per-product dispatch.

use crate::ast::FunctionDef;
use crate::context::{RuleContext, RuleOutcome};
use crate::errors::{RuleError, RuleResult};
use crate::interpreter::Interpreter;
use allot_types::ProductId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Suffix of the fallback function for each phase.
pub const GLOBAL_TARGET: &str = "global";

/// The three evaluation phases a rule function can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
    SelectPool,
}

impl Phase {
    /// Function-name prefix, including the trailing underscore.
    pub fn prefix(self) -> &'static str {
        match self {
            Phase::Pre => "pre_",
            Phase::Post => "post_",
            Phase::SelectPool => "select_pool_",
        }
    }

    /// Name of the function handling `target` in this phase.
    pub fn function_name(self, target: &str) -> String {
        format!("{}{}", self.prefix(), target)
    }

    /// Split a function name into its phase and target. The target may be
    /// empty; callers decide whether that is acceptable.
    pub fn classify(name: &str) -> Option<(Phase, &str)> {
        // select_pool_ before the shorter prefixes.
        [Phase::SelectPool, Phase::Pre, Phase::Post]
            .into_iter()
            .find_map(|phase| name.strip_prefix(phase.prefix()).map(|target| (phase, target)))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
            Phase::SelectPool => "select_pool",
        };
        f.write_str(name)
    }
}

/// A callable rule. Compiled functions and native closures both implement it.
pub trait RuleFunction: Send + Sync {
    fn invoke(&self, ctx: &RuleContext, outcome: &mut RuleOutcome) -> RuleResult<()>;
}

impl<F> RuleFunction for F
where
    F: Fn(&RuleContext, &mut RuleOutcome) -> RuleResult<()> + Send + Sync,
{
    fn invoke(&self, ctx: &RuleContext, outcome: &mut RuleOutcome) -> RuleResult<()> {
        self(ctx, outcome)
    }
}

/// A function body from the rule language.
pub(crate) struct CompiledFunction {
    def: FunctionDef,
}

impl CompiledFunction {
    pub(crate) fn new(def: FunctionDef) -> Self {
        Self { def }
    }
}

impl RuleFunction for CompiledFunction {
    fn invoke(&self, ctx: &RuleContext, outcome: &mut RuleOutcome) -> RuleResult<()> {
        Interpreter::new(&self.def.name, ctx).run(&self.def.body, outcome)
    }
}

/// Result of dispatching a phase for a product.
#[derive(Debug)]
pub enum Dispatch {
    /// A function ran to completion.
    Invoked {
        function: String,
        outcome: RuleOutcome,
    },
    /// Neither the product-specific nor the global function exists.
    NotFound,
}

/// Immutable table of rule functions keyed by name.
#[derive(Clone, Default)]
pub struct RuleSet {
    functions: HashMap<String, Arc<dyn RuleFunction>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    /// Run the product-specific function for `phase`, falling back to the
    /// global one. At most one function runs.
    #[instrument(skip(self, ctx))]
    pub fn invoke(
        &self,
        phase: Phase,
        product_id: &ProductId,
        ctx: &RuleContext,
    ) -> RuleResult<Dispatch> {
        let specific = phase.function_name(product_id.as_str());
        let global = phase.function_name(GLOBAL_TARGET);

        let (name, function) = match self.functions.get(&specific) {
            Some(f) => (specific, f),
            None => match self.functions.get(&global) {
                Some(f) => (global, f),
                None => {
                    debug!(%phase, "No rule function found");
                    return Ok(Dispatch::NotFound);
                }
            },
        };

        debug!(function = %name, "Invoking rule function");
        let mut outcome = RuleOutcome::new();
        function.invoke(ctx, &mut outcome).map_err(|e| match e {
            RuleError::Execution { .. } => e,
            other => RuleError::execution(name.clone(), other.to_string()),
        })?;

        Ok(Dispatch::Invoked {
            function: name,
            outcome,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("functions", &self.function_names())
            .finish()
    }
}

/// Collects functions and validates their names on [`build`](Self::build).
#[derive(Default)]
pub struct RuleSetBuilder {
    functions: Vec<(String, Arc<dyn RuleFunction>)>,
}

impl RuleSetBuilder {
    /// Register a native function.
    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: RuleFunction + 'static,
    {
        self.functions.push((name.into(), Arc::new(function)));
        self
    }

    pub(crate) fn compiled(mut self, def: FunctionDef) -> Self {
        let name = def.name.clone();
        self.functions
            .push((name, Arc::new(CompiledFunction::new(def))));
        self
    }

    pub fn build(self) -> RuleResult<RuleSet> {
        let mut functions = HashMap::with_capacity(self.functions.len());
        for (name, function) in self.functions {
            match Phase::classify(&name) {
                Some((_, target)) if !target.is_empty() => {}
                _ => return Err(RuleError::UnrecognizedFunction(name)),
            }
            if functions.contains_key(&name) {
                return Err(RuleError::DuplicateFunction(name));
            }
            functions.insert(name, function);
        }
        Ok(RuleSet { functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allot_types::{Consumer, OwnerId, ReadOnlyConsumer};
    use chrono::Utc;

    fn ctx() -> RuleContext {
        let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"));
        RuleContext::select_pool(Utc::now(), ReadOnlyConsumer::from(&consumer), vec![])
    }

    fn tagging(
        tag: &'static str,
    ) -> impl Fn(&RuleContext, &mut RuleOutcome) -> RuleResult<()> + Send + Sync {
        move |_ctx, out| {
            out.add_warning(tag);
            Ok(())
        }
    }

    fn invoked_tag(dispatch: Dispatch) -> (String, String) {
        match dispatch {
            Dispatch::Invoked { function, outcome } => {
                (function, outcome.validation.warnings[0].message.clone())
            }
            Dispatch::NotFound => panic!("expected a dispatch"),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(Phase::classify("pre_global"), Some((Phase::Pre, "global")));
        assert_eq!(
            Phase::classify("select_pool_monitoring"),
            Some((Phase::SelectPool, "monitoring"))
        );
        assert_eq!(Phase::classify("post_"), Some((Phase::Post, "")));
        assert_eq!(Phase::classify("validate_x"), None);
    }

    #[test]
    fn test_product_specific_beats_global() {
        let rules = RuleSet::builder()
            .function("pre_monitoring", tagging("specific"))
            .function("pre_global", tagging("global"))
            .build()
            .unwrap();

        let (name, tag) =
            invoked_tag(rules.invoke(Phase::Pre, &ProductId::new("monitoring"), &ctx()).unwrap());
        assert_eq!(name, "pre_monitoring");
        assert_eq!(tag, "specific");

        let (name, tag) =
            invoked_tag(rules.invoke(Phase::Pre, &ProductId::new("other"), &ctx()).unwrap());
        assert_eq!(name, "pre_global");
        assert_eq!(tag, "global");
    }

    #[test]
    fn test_product_match_is_exact() {
        let rules = RuleSet::builder()
            .function("post_Monitoring", tagging("upper"))
            .build()
            .unwrap();
        let dispatch = rules
            .invoke(Phase::Post, &ProductId::new("monitoring"), &ctx())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::NotFound));
    }

    #[test]
    fn test_phases_do_not_cross() {
        let rules = RuleSet::builder()
            .function("pre_global", tagging("pre"))
            .build()
            .unwrap();
        let dispatch = rules
            .invoke(Phase::SelectPool, &ProductId::new("x"), &ctx())
            .unwrap();
        assert!(matches!(dispatch, Dispatch::NotFound));
    }

    #[test]
    fn test_build_rejects_bad_names() {
        let err = RuleSet::builder()
            .function("validate_x", tagging("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleError::UnrecognizedFunction(_)));

        let err = RuleSet::builder()
            .function("pre_", tagging("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleError::UnrecognizedFunction(_)));

        let err = RuleSet::builder()
            .function("pre_x", tagging("a"))
            .function("pre_x", tagging("b"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateFunction(_)));
    }

    #[test]
    fn test_native_errors_become_execution_errors() {
        let rules = RuleSet::builder()
            .function("pre_global", |_: &RuleContext, _: &mut RuleOutcome| {
                Err(RuleError::SourceUnavailable("gone".into()))
            })
            .build()
            .unwrap();
        let err = rules
            .invoke(Phase::Pre, &ProductId::new("x"), &ctx())
            .unwrap_err();
        match err {
            RuleError::Execution { function, .. } => assert_eq!(function, "pre_global"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_rule_set() {
        let rules = RuleSet::empty();
        assert!(rules.is_empty());
        assert!(matches!(
            rules.invoke(Phase::Pre, &ProductId::new("x"), &ctx()).unwrap(),
            Dispatch::NotFound
        ));
    }
}
