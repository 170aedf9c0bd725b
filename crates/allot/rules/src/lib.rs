//! Allot Rules - pool policy rule language
//!
//! Rule text is parsed and compiled once into a [`RuleSet`], a table of
//! functions keyed by name. Each function belongs to one phase (`pre_`,
//! `post_` or `select_pool_`) and one target: a product id or `global`.
//! Dispatch looks up the product-specific function first and falls back to
//! the global one.
//!
//! # Rule Syntax
//!
//! ```text
//! language "allot-rules/1"
//!
//! fn pre_global {
//!     require consumer.type != "" else "Consumer type is required"
//! }
//!
//! fn "pre_rhel-server" {
//!     if consumer.type == "hypervisor" { error "Hypervisors may not consume " + product.id }
//!     if pool.end_date < now + days(30) { warn "Subscription expires within 30 days" }
//! }
//!
//! fn post_virt_host {
//!     create_pool "virt_guest" quantity 4
//! }
//!
//! fn select_pool_global {
//!     select where pool.available order by pool.end_date asc
//! }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use allot_rules::{Dispatch, Phase, RuleContext, RuleLoader};
//! use allot_types::{Consumer, OwnerId, ProductId, ReadOnlyConsumer};
//! use chrono::Utc;
//!
//! let rules = RuleLoader::load("fn select_pool_global { select }").unwrap();
//! let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"));
//! let ctx = RuleContext::select_pool(Utc::now(), ReadOnlyConsumer::from(&consumer), vec![]);
//!
//! let dispatch = rules.invoke(Phase::SelectPool, &ProductId::new("any"), &ctx).unwrap();
//! assert!(matches!(dispatch, Dispatch::Invoked { .. }));
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod ast;
mod context;
mod errors;
mod interpreter;
mod lexer;
mod loader;
mod parser;
mod ruleset;
mod value;

pub use ast::{Expr, FunctionDef, Program, Stmt};
pub use context::{PostAction, RuleContext, RuleOutcome};
pub use errors::{RuleError, RuleResult};
pub use lexer::{Lexer, Token, TokenKind};
pub use loader::{FileRuleSource, RuleLoader, RuleSource, StaticRuleSource, RULE_LANGUAGE};
pub use parser::Parser;
pub use ruleset::{Dispatch, Phase, RuleFunction, RuleSet, RuleSetBuilder, GLOBAL_TARGET};
pub use value::Value;
