//! Rule loading: read a source once, parse it, validate it and compile it
//! into a [`RuleSet`].

use crate::ast::{Program, Stmt};
use crate::errors::{RuleError, RuleResult};
use crate::parser::Parser;
use crate::ruleset::{Phase, RuleSet};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// The only language header the loader accepts.
pub const RULE_LANGUAGE: &str = "allot-rules/1";

/// Where rule text comes from.
pub trait RuleSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    fn rules(&self) -> RuleResult<String>;
}

/// Rule text held in memory.
#[derive(Clone, Debug)]
pub struct StaticRuleSource {
    text: String,
}

impl StaticRuleSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl RuleSource for StaticRuleSource {
    fn describe(&self) -> String {
        "<static>".to_string()
    }

    fn rules(&self) -> RuleResult<String> {
        Ok(self.text.clone())
    }
}

/// Rule text read from a file on each call to [`RuleSource::rules`].
#[derive(Clone, Debug)]
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleSource for FileRuleSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn rules(&self) -> RuleResult<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| RuleError::SourceUnavailable(format!("{}: {}", self.path.display(), e)))
    }
}

pub struct RuleLoader;

impl RuleLoader {
    /// Parse and compile rule text.
    pub fn load(text: &str) -> RuleResult<RuleSet> {
        Self::compile(Parser::parse(text)?)
    }

    /// Read `source` once and compile it.
    #[instrument(skip(source), fields(source = %source.describe()))]
    pub fn load_from(source: &dyn RuleSource) -> RuleResult<RuleSet> {
        let rules = Self::load(&source.rules()?)?;
        info!(functions = rules.len(), "Rule set loaded");
        Ok(rules)
    }

    /// Validate a parsed program and build its dispatch table.
    pub fn compile(program: Program) -> RuleResult<RuleSet> {
        if let Some(language) = &program.language {
            if language != RULE_LANGUAGE {
                return Err(RuleError::UnsupportedLanguage(language.clone()));
            }
        }

        let mut builder = RuleSet::builder();
        for def in program.functions {
            let phase = match Phase::classify(&def.name) {
                Some((phase, target)) if !target.is_empty() => phase,
                _ => return Err(RuleError::UnrecognizedFunction(def.name)),
            };
            check_phase(&def.name, phase, &def.body)?;
            builder = builder.compiled(def);
        }
        builder.build()
    }
}

fn allowed_in(stmt: &Stmt, phase: Phase) -> bool {
    match stmt {
        Stmt::If { .. } | Stmt::Fail(_) | Stmt::Return => true,
        Stmt::Require { .. } | Stmt::Error(_) | Stmt::Warn(_) => phase == Phase::Pre,
        Stmt::CreatePool { .. } | Stmt::Record { .. } => phase == Phase::Post,
        Stmt::Select { .. } => phase == Phase::SelectPool,
    }
}

fn check_phase(function: &str, phase: Phase, body: &[Stmt]) -> RuleResult<()> {
    for stmt in body {
        if !allowed_in(stmt, phase) {
            return Err(RuleError::PhaseMismatch {
                function: function.to_string(),
                statement: stmt.keyword().to_string(),
                phase,
            });
        }
        if let Stmt::If {
            then_branch,
            else_branch,
            ..
        } = stmt
        {
            check_phase(function, phase, then_branch)?;
            check_phase(function, phase, else_branch)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RULES: &str = r#"
        language "allot-rules/1"

        fn pre_global { require consumer.type != "" else "Consumer type is required" }
        fn "pre_rhel-server" {
            if consumer.type == "hypervisor" { error "Hypervisors may not consume " + product.id }
        }
        fn post_virt_host { create_pool "virt_guest" quantity 4  record "virt.host" = consumer.id }
        fn select_pool_global { select where pool.available order by pool.end_date asc }
    "#;

    #[test]
    fn test_load_builds_dispatch_table() {
        let rules = RuleLoader::load(RULES).unwrap();
        assert_eq!(
            rules.function_names(),
            vec!["post_virt_host", "pre_global", "pre_rhel-server", "select_pool_global"]
        );
    }

    #[test]
    fn test_missing_header_is_accepted() {
        let rules = RuleLoader::load("fn pre_global { return }").unwrap();
        assert!(rules.contains("pre_global"));
    }

    #[test]
    fn test_unknown_language_is_fatal() {
        let err = RuleLoader::load(r#"language "javascript" fn pre_global { return }"#).unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedLanguage(_)));
        assert!(err.is_boot_fatal());
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let err = RuleLoader::load("fn pre_global { require }").unwrap_err();
        assert!(err.is_boot_fatal());
    }

    #[test]
    fn test_unrecognized_name_is_fatal() {
        let err = RuleLoader::load("fn check_global { return }").unwrap_err();
        assert!(matches!(err, RuleError::UnrecognizedFunction(name) if name == "check_global"));
    }

    #[test]
    fn test_duplicate_name_is_fatal() {
        let err = RuleLoader::load("fn pre_x { return } fn pre_x { return }").unwrap_err();
        assert!(matches!(err, RuleError::DuplicateFunction(_)));
    }

    #[test]
    fn test_statement_in_wrong_phase_is_fatal() {
        let err = RuleLoader::load(r#"fn post_x { if true { error "nope" } }"#).unwrap_err();
        match err {
            RuleError::PhaseMismatch {
                function,
                statement,
                phase,
            } => {
                assert_eq!(function, "post_x");
                assert_eq!(statement, "error");
                assert_eq!(phase, Phase::Post);
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert!(RuleLoader::load("fn pre_x { select }").is_err());
        assert!(RuleLoader::load(r#"fn select_pool_x { create_pool "a" quantity 1 }"#).is_err());
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RULES.as_bytes()).unwrap();

        let source = FileRuleSource::new(file.path());
        let rules = RuleLoader::load_from(&source).unwrap();
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileRuleSource::new(dir.path().join("absent.rules"));
        let err = RuleLoader::load_from(&source).unwrap_err();
        assert!(matches!(err, RuleError::SourceUnavailable(_)));
    }

    #[test]
    fn test_static_source() {
        let source = StaticRuleSource::new("fn select_pool_global { select }");
        assert!(RuleLoader::load_from(&source).unwrap().contains("select_pool_global"));
    }
}
