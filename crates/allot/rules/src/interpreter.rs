//! Tree-walking evaluator for compiled rule bodies.
//!
//! Every failure here is a rule-execution error naming the function that
//! was running; the interpreter never swallows one.

use crate::ast::{BinaryOp, Expr, SortOrder, Stmt, UnaryOp};
use crate::context::{RuleContext, RuleOutcome};
use crate::errors::{RuleError, RuleResult};
use crate::value::Value;
use allot_types::{ProductId, ReadOnlyPool};
use chrono::Duration;
use std::cmp::Ordering;

enum Flow {
    Continue,
    Return,
}

pub(crate) struct Interpreter<'a> {
    function: &'a str,
    ctx: &'a RuleContext,
    /// The pool bound by an enclosing `select` clause.
    candidate: Option<&'a ReadOnlyPool>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(function: &'a str, ctx: &'a RuleContext) -> Self {
        Self {
            function,
            ctx,
            candidate: None,
        }
    }

    pub(crate) fn run(&self, body: &[Stmt], out: &mut RuleOutcome) -> RuleResult<()> {
        self.exec_block(body, out).map(|_| ())
    }

    fn with_candidate(&self, pool: &'a ReadOnlyPool) -> Interpreter<'a> {
        Interpreter {
            function: self.function,
            ctx: self.ctx,
            candidate: Some(pool),
        }
    }

    fn fail(&self, message: impl Into<String>) -> RuleError {
        RuleError::execution(self.function, message)
    }

    fn exec_block(&self, body: &[Stmt], out: &mut RuleOutcome) -> RuleResult<Flow> {
        for stmt in body {
            if let Flow::Return = self.exec(stmt, out)? {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Continue)
    }

    fn exec(&self, stmt: &Stmt, out: &mut RuleOutcome) -> RuleResult<Flow> {
        match stmt {
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(condition, "if")? {
                    self.exec_block(then_branch, out)
                } else {
                    self.exec_block(else_branch, out)
                }
            }
            Stmt::Require { condition, message } => {
                if !self.eval_bool(condition, "require")? {
                    out.add_error(self.eval(message)?.to_string());
                }
                Ok(Flow::Continue)
            }
            Stmt::Error(message) => {
                out.add_error(self.eval(message)?.to_string());
                Ok(Flow::Continue)
            }
            Stmt::Warn(message) => {
                out.add_warning(self.eval(message)?.to_string());
                Ok(Flow::Continue)
            }
            Stmt::Fail(message) => Err(self.fail(self.eval(message)?.to_string())),
            Stmt::CreatePool { product, quantity } => {
                let product = match self.eval(product)? {
                    Value::Str(id) => ProductId::new(id),
                    other => {
                        return Err(self.fail(format!(
                            "create_pool expects a product id string, got {}",
                            other.type_name()
                        )))
                    }
                };
                let quantity = match self.eval(quantity)? {
                    Value::Int(n) => n,
                    other => {
                        return Err(self.fail(format!(
                            "create_pool quantity must be an int, got {}",
                            other.type_name()
                        )))
                    }
                };
                out.create_pool(product, quantity);
                Ok(Flow::Continue)
            }
            Stmt::Record { key, value } => {
                let key = match self.eval(key)? {
                    Value::Str(key) => key,
                    other => {
                        return Err(self.fail(format!(
                            "record key must be a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                out.record(key, self.eval(value)?.to_string());
                Ok(Flow::Continue)
            }
            Stmt::Select { filter, order } => {
                self.exec_select(filter.as_ref(), order.as_ref(), out)?;
                Ok(Flow::Continue)
            }
            Stmt::Return => Ok(Flow::Return),
        }
    }

    fn exec_select(
        &self,
        filter: Option<&Expr>,
        order: Option<&(Expr, SortOrder)>,
        out: &mut RuleOutcome,
    ) -> RuleResult<()> {
        let mut matches: Vec<(&ReadOnlyPool, Value)> = Vec::new();
        for pool in self.ctx.pools() {
            let scoped = self.with_candidate(pool);
            if let Some(filter) = filter {
                if !scoped.eval_bool(filter, "select where")? {
                    continue;
                }
            }
            let key = match order {
                Some((key, _)) => scoped.eval(key)?,
                None => Value::None,
            };
            matches.push((pool, key));
        }

        if let Some((_, direction)) = order {
            if let Some((_, first)) = matches.first() {
                for (_, key) in &matches {
                    if first.compare(key).is_none() {
                        return Err(self.fail(format!(
                            "cannot order by {} and {} values",
                            first.type_name(),
                            key.type_name()
                        )));
                    }
                }
            }
            // Stable: ties keep query order.
            matches.sort_by(|(_, a), (_, b)| {
                let ordering = a.compare(b).unwrap_or(Ordering::Equal);
                match direction {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        out.select(matches.first().map(|(pool, _)| pool.id().clone()));
        Ok(())
    }

    fn eval_bool(&self, expr: &Expr, position: &str) -> RuleResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(self.fail(format!(
                "{} condition must be a bool, got {}",
                position,
                other.type_name()
            ))),
        }
    }

    fn eval(&self, expr: &Expr) -> RuleResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Now => Ok(Value::Date(self.ctx.now())),
            Expr::Root(name) => Err(self.fail(format!(
                "{} cannot be used as a value; read one of its fields",
                name
            ))),
            Expr::Field(base, field) => match base.as_ref() {
                Expr::Root(root) => self.root_field(root, field),
                other => {
                    let value = self.eval(other)?;
                    Err(self.fail(format!(
                        "{} value has no field '{}'",
                        value.type_name(),
                        field
                    )))
                }
            },
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                match (base, index) {
                    (Value::Map(map), Value::Str(key)) => {
                        Ok(Value::from_option(map.get(&key).map(String::as_str)))
                    }
                    (base, index) => Err(self.fail(format!(
                        "cannot index {} with {}",
                        base.type_name(),
                        index.type_name()
                    ))),
                }
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<RuleResult<Vec<_>>>()?;
                self.call(name, args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| self.fail("integer overflow")),
                    (UnaryOp::Neg, Value::Duration(d)) => Duration::zero()
                        .checked_sub(&d)
                        .map(Value::Duration)
                        .ok_or_else(|| self.fail("duration overflow")),
                    (UnaryOp::Not, other) => {
                        Err(self.fail(format!("cannot negate {} with !", other.type_name())))
                    }
                    (UnaryOp::Neg, other) => {
                        Err(self.fail(format!("cannot negate {} with -", other.type_name())))
                    }
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                Ok(Value::Bool(
                    self.eval_bool(left, "&&")? && self.eval_bool(right, "&&")?,
                ))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                Ok(Value::Bool(
                    self.eval_bool(left, "||")? || self.eval_bool(right, "||")?,
                ))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> RuleResult<Value> {
        match op {
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::NotEq => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = left.compare(&right).ok_or_else(|| {
                    self.fail(format!(
                        "cannot compare {} {} {}",
                        left.type_name(),
                        op,
                        right.type_name()
                    ))
                })?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            BinaryOp::Add => match (left, right) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| self.fail("integer overflow")),
                (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
                (Value::Date(d), Value::Duration(delta)) => d
                    .checked_add_signed(delta)
                    .map(Value::Date)
                    .ok_or_else(|| self.fail("date overflow")),
                (Value::Duration(a), Value::Duration(b)) => a
                    .checked_add(&b)
                    .map(Value::Duration)
                    .ok_or_else(|| self.fail("duration overflow")),
                (a, b) => Err(self.fail(format!(
                    "cannot add {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
            BinaryOp::Sub => match (left, right) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_sub(b)
                    .map(Value::Int)
                    .ok_or_else(|| self.fail("integer overflow")),
                (Value::Date(d), Value::Duration(delta)) => d
                    .checked_sub_signed(delta)
                    .map(Value::Date)
                    .ok_or_else(|| self.fail("date overflow")),
                (Value::Date(a), Value::Date(b)) => Ok(Value::Duration(a.signed_duration_since(b))),
                (Value::Duration(a), Value::Duration(b)) => a
                    .checked_sub(&b)
                    .map(Value::Duration)
                    .ok_or_else(|| self.fail("duration overflow")),
                (a, b) => Err(self.fail(format!(
                    "cannot subtract {} from {}",
                    b.type_name(),
                    a.type_name()
                ))),
            },
            BinaryOp::And | BinaryOp::Or => Err(self.fail(format!(
                "{} requires bool operands, got {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> RuleResult<Value> {
        let arity = |expected: usize| -> RuleResult<()> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(self.fail(format!(
                    "{}() takes {} argument(s), got {}",
                    name,
                    expected,
                    args.len()
                )))
            }
        };

        match name {
            "days" => {
                arity(1)?;
                match &args[0] {
                    Value::Int(n) => Duration::try_days(*n)
                        .map(Value::Duration)
                        .ok_or_else(|| self.fail(format!("days({}) is out of range", n))),
                    other => Err(self.fail(format!("days() expects an int, got {}", other.type_name()))),
                }
            }
            "int" => {
                arity(1)?;
                match &args[0] {
                    Value::Int(n) => Ok(Value::Int(*n)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| self.fail(format!("int() cannot parse '{}'", s))),
                    other => Err(self.fail(format!("int() expects a string, got {}", other.type_name()))),
                }
            }
            "len" => {
                arity(1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                    other => Err(self.fail(format!("len() expects a string or map, got {}", other.type_name()))),
                }
            }
            other => Err(self.fail(format!("unknown function '{}'", other))),
        }
    }

    fn root_field(&self, root: &str, field: &str) -> RuleResult<Value> {
        let missing = || self.fail(format!("{} is not available in this rule", root));
        let value = match root {
            "consumer" => {
                let consumer = self.ctx.consumer().ok_or_else(missing)?;
                match field {
                    "id" => Some(Value::from(consumer.id().as_str())),
                    "name" => Some(Value::from(consumer.name())),
                    "type" => Some(Value::from(consumer.consumer_type())),
                    "owner" => Some(Value::from(consumer.owner_id().as_str())),
                    "facts" => Some(Value::from(consumer.facts())),
                    _ => None,
                }
            }
            "product" => {
                let product = self.ctx.product().ok_or_else(missing)?;
                match field {
                    "id" => Some(Value::from(product.id().as_str())),
                    "name" => Some(Value::from(product.name())),
                    "attributes" => Some(Value::from(product.attributes())),
                    _ => None,
                }
            }
            "pool" => {
                let pool = self.candidate.or(self.ctx.pool()).ok_or_else(missing)?;
                pool_field(pool, field)
            }
            "entitlement" => {
                let entitlement = self.ctx.entitlement().ok_or_else(missing)?;
                match field {
                    "id" => Some(Value::from(entitlement.id().as_str())),
                    "pool_id" => Some(Value::from(entitlement.pool_id().as_str())),
                    "product_id" => Some(Value::from(entitlement.product_id().as_str())),
                    "consumer_id" => Some(Value::from(entitlement.consumer_id().as_str())),
                    "start_date" => Some(Value::Date(entitlement.start_date())),
                    "quantity" => Some(Value::Int(entitlement.quantity())),
                    _ => None,
                }
            }
            _ => None,
        };

        value.ok_or_else(|| self.fail(format!("{} has no field '{}'", root, field)))
    }
}

fn pool_field(pool: &ReadOnlyPool, field: &str) -> Option<Value> {
    let value = match field {
        "id" => Value::from(pool.id().as_str()),
        "product_id" => Value::from(pool.product_id().as_str()),
        "owner" => Value::from(pool.owner_id().as_str()),
        "consumer" => Value::from_option(pool.consumer_id().map(|id| id.as_str())),
        "subscription_id" => Value::from_option(pool.subscription_id().map(|id| id.as_str())),
        "source_entitlement" => {
            Value::from_option(pool.source_entitlement().map(|id| id.as_str()))
        }
        "active" => Value::Bool(pool.is_active()),
        "max_members" => Value::Int(pool.max_members()),
        "current_members" => Value::Int(pool.current_members()),
        "unlimited" => Value::Bool(pool.is_unlimited()),
        "available" => Value::Bool(pool.entitlements_available()),
        "expired" => Value::Bool(pool.is_expired()),
        "start_date" => Value::Date(pool.start_date()),
        "end_date" => Value::Date(pool.end_date()),
        "attributes" => Value::from(pool.attributes()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use allot_types::{
        Consumer, EntitlementPool, OwnerId, Product, ReadOnlyConsumer, ReadOnlyProduct,
    };
    use chrono::Utc;

    fn pre_context(pool: &EntitlementPool) -> RuleContext {
        let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"))
            .with_fact("cpu.sockets", "4");
        let product = Product::new("monitoring", "Monitoring").with_attribute("sockets", "2");
        let now = Utc::now();
        RuleContext::pre(
            now,
            ReadOnlyConsumer::from(&consumer),
            ReadOnlyProduct::from(&product),
            ReadOnlyPool::new(pool, now),
        )
    }

    fn pool(max_members: i64, end_in_days: i64) -> EntitlementPool {
        let now = Utc::now();
        EntitlementPool::new(
            OwnerId::new("acme"),
            ProductId::new("monitoring"),
            max_members,
            now - Duration::days(1),
            now + Duration::days(end_in_days),
        )
    }

    fn run(source: &str, ctx: &RuleContext) -> RuleResult<RuleOutcome> {
        let program = Parser::parse(source).unwrap();
        let function = &program.functions[0];
        let mut out = RuleOutcome::new();
        Interpreter::new(&function.name, ctx).run(&function.body, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_errors_and_warnings_accumulate() {
        let ctx = pre_context(&pool(1, 10));
        let out = run(
            r#"fn pre_x {
                require consumer.type == "person" else "Only people"
                if pool.end_date < now + days(30) { warn "Expires within 30 days" }
                error "Product " + product.id + " limited to " + pool.max_members
            }"#,
            &ctx,
        )
        .unwrap();

        let errors: Vec<_> = out.validation.errors.iter().map(|e| e.message.clone()).collect();
        assert_eq!(errors, vec!["Only people", "Product monitoring limited to 1"]);
        assert_eq!(out.validation.warnings[0].message, "Expires within 30 days");
    }

    #[test]
    fn test_map_lookup_and_int_builtin() {
        let ctx = pre_context(&pool(1, 10));
        let out = run(
            r#"fn pre_x {
                if int(consumer.facts["cpu.sockets"]) > int(product.attributes["sockets"]) {
                    error "Too many sockets"
                }
                if product.attributes["missing"] == none { warn "no attr" }
            }"#,
            &ctx,
        )
        .unwrap();
        assert_eq!(out.validation.errors.len(), 1);
        assert_eq!(out.validation.warnings.len(), 1);
    }

    #[test]
    fn test_return_stops_execution() {
        let ctx = pre_context(&pool(1, 10));
        let out = run(r#"fn pre_x { if true { return } error "unreachable" }"#, &ctx).unwrap();
        assert!(out.validation.is_successful());
    }

    #[test]
    fn test_fail_is_execution_error() {
        let ctx = pre_context(&pool(1, 10));
        let err = run(r#"fn pre_x { fail "broken rule" }"#, &ctx).unwrap_err();
        match err {
            RuleError::Execution { function, message } => {
                assert_eq!(function, "pre_x");
                assert_eq!(message, "broken rule");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_type_errors_are_execution_errors() {
        let ctx = pre_context(&pool(1, 10));
        assert!(run(r#"fn pre_x { if consumer.name { return } }"#, &ctx).is_err());
        assert!(run(r#"fn pre_x { if pool.max_members < "3" { return } }"#, &ctx).is_err());
        assert!(run(r#"fn pre_x { error consumer.nickname }"#, &ctx).is_err());
        assert!(run(r#"fn pre_x { error entitlement.id }"#, &ctx).is_err());
        assert!(run(r#"fn pre_x { error int("four") }"#, &ctx).is_err());
    }

    #[test]
    fn test_select_filters_and_orders() {
        let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"));
        let full = {
            let mut p = pool(1, 5);
            p.current_members = 1;
            p
        };
        let late = pool(10, 90);
        let early = pool(10, 20);
        let now = Utc::now();
        let ctx = RuleContext::select_pool(
            now,
            ReadOnlyConsumer::from(&consumer),
            vec![
                ReadOnlyPool::new(&full, now),
                ReadOnlyPool::new(&late, now),
                ReadOnlyPool::new(&early, now),
            ],
        );

        let out = run(
            "fn select_pool_global { select where pool.available order by pool.end_date asc }",
            &ctx,
        )
        .unwrap();
        assert_eq!(out.selected.as_ref(), Some(&early.id));

        let out = run(
            "fn select_pool_global { select order by pool.end_date desc }",
            &ctx,
        )
        .unwrap();
        assert_eq!(out.selected.as_ref(), Some(&late.id));

        let out = run(
            "fn select_pool_global { select where pool.max_members > 100 }",
            &ctx,
        )
        .unwrap();
        assert_eq!(out.selected, None);
    }

    #[test]
    fn test_pool_outside_select_is_unavailable() {
        let consumer = Consumer::new("c1", "box", "system", OwnerId::new("acme"));
        let ctx = RuleContext::select_pool(Utc::now(), ReadOnlyConsumer::from(&consumer), vec![]);
        let err = run("fn select_pool_x { if pool.available { return } }", &ctx).unwrap_err();
        assert!(err.to_string().contains("pool is not available"));
    }

    #[test]
    fn test_arithmetic_overflow_is_an_execution_error() {
        let ctx = pre_context(&pool(1, 10));
        for (source, message) in [
            (r#"fn pre_x { if now + days(100000000) > now { warn "x" } }"#, "date overflow"),
            (r#"fn pre_x { if now - days(100000000) < now { warn "x" } }"#, "date overflow"),
            (r#"fn pre_x { if days(9223372036854775807) > days(0) { warn "x" } }"#, "out of range"),
            (r#"fn pre_x { if -(0 - 9223372036854775807 - 1) > 0 { warn "x" } }"#, "integer overflow"),
        ] {
            let err = run(source, &ctx).unwrap_err();
            match &err {
                RuleError::Execution { function, message: m } => {
                    assert_eq!(function, "pre_x");
                    assert!(m.contains(message), "{}: {}", source, m);
                }
                other => panic!("expected execution error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_duration_sum_overflow_is_an_execution_error() {
        let ctx = pre_context(&pool(1, 10));
        let err = run(
            r#"fn pre_x { if days(100000000000000) + days(100000000000000) > days(0) { warn "x" } }"#,
            &ctx,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duration overflow"));
    }
}
