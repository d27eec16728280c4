//! AST nodes and the tree-walking evaluator.
//!
//! Every node executes against a scope and a host context and yields an
//! [`ExecResult`]: either the node's value, or a `return` travelling to the
//! nearest enclosing [`Statement::MethodBody`]. Intermediate nodes let a
//! `return` pass through untouched; only the method-body frame converts it
//! back into a plain value.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::runtime::{self, Class, Closure, Context, ObjectHandle, RuntimeError};

/// Outcome of executing one node.
#[derive(Debug)]
pub enum ExecResult {
    /// Normal completion with the node's value (possibly the empty handle).
    Value(ObjectHandle),
    /// A `return` unwinding towards the enclosing method body.
    Return(ObjectHandle),
}

impl ExecResult {
    /// The carried handle, whichever way execution ended. Call boundaries
    /// use this so that a `return` leaking out of an unwrapped body still
    /// becomes the call's result.
    pub fn into_value(self) -> ObjectHandle {
        match self {
            ExecResult::Value(handle) | ExecResult::Return(handle) => handle,
        }
    }
}

/// Comparison selector for [`Statement::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Comparator {
    fn compare(
        self,
        lhs: &ObjectHandle,
        rhs: &ObjectHandle,
        context: &mut dyn Context,
    ) -> Result<bool, RuntimeError> {
        match self {
            Comparator::Equal => runtime::equal(lhs, rhs, context),
            Comparator::NotEqual => runtime::not_equal(lhs, rhs, context),
            Comparator::Less => runtime::less(lhs, rhs, context),
            Comparator::Greater => runtime::greater(lhs, rhs, context),
            Comparator::LessOrEqual => runtime::less_or_equal(lhs, rhs, context),
            Comparator::GreaterOrEqual => runtime::greater_or_equal(lhs, rhs, context),
        }
    }
}

/// Evaluates a child node to a plain value, letting a `return` pass through
/// the current node unchanged.
macro_rules! eval {
    ($node:expr, $closure:expr, $context:expr) => {
        match $node.execute($closure, $context)? {
            ExecResult::Value(handle) => handle,
            returning @ ExecResult::Return(_) => return Ok(returning),
        }
    };
}

/// An executable AST node.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Integer literal.
    NumericConst(i64),
    /// String literal.
    StringConst(String),
    /// Boolean literal.
    BoolConst(bool),
    /// The `None` literal: evaluates to the empty handle.
    NoneConst,
    /// Dotted name lookup `a.b.c`, descending through instance field tables.
    VariableValue { dotted_ids: Vec<String> },
    /// `var = rv` in the current scope; yields the stored handle.
    Assignment { var: String, rv: Box<Statement> },
    /// `object.field = rv` in the instance's field table.
    FieldAssignment {
        object: Box<Statement>,
        field_name: String,
        rv: Box<Statement>,
    },
    /// `print arg, ...`: arguments separated by single spaces, then a
    /// newline. Empty handles print as `None`.
    Print { args: Vec<Statement> },
    /// `object.method(args...)`; yields the empty handle when no matching
    /// method exists.
    MethodCall {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    /// Conversion of a value to its printed form as a `String` object.
    Stringify { arg: Box<Statement> },
    Add {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Sub {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Mult {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Div {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Statements executed in order.
    Compound { statements: Vec<Statement> },
    /// `return expr`.
    Return { statement: Box<Statement> },
    /// Binds the class object under its own name in the current scope.
    ClassDefinition { class: ObjectHandle },
    IfElse {
        condition: Box<Statement>,
        if_body: Box<Statement>,
        else_body: Option<Box<Statement>>,
    },
    /// Short-circuit `or`; always yields a Bool.
    Or {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Short-circuit `and`; always yields a Bool.
    And {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Not { arg: Box<Statement> },
    Comparison {
        cmp: Comparator,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    /// Instantiates `class`, running a matching `__init__` if one exists.
    NewInstance {
        class: Rc<Class>,
        args: Vec<Statement>,
    },
    /// Method body frame: converts a `return` into the call's result.
    MethodBody { body: Box<Statement> },
}

impl Statement {
    /// Lookup of a single, undotted name.
    pub fn variable(name: impl Into<String>) -> Statement {
        Statement::VariableValue {
            dotted_ids: vec![name.into()],
        }
    }

    /// `print name` — the common print-a-variable form.
    pub fn print_variable(name: impl Into<String>) -> Statement {
        Statement::Print {
            args: vec![Statement::variable(name)],
        }
    }

    /// Executes this node in `closure` against `context`.
    pub fn execute(
        &self,
        closure: &mut Closure,
        context: &mut dyn Context,
    ) -> Result<ExecResult, RuntimeError> {
        match self {
            Statement::NumericConst(value) => Ok(ExecResult::Value(ObjectHandle::number(*value))),
            Statement::StringConst(value) => {
                Ok(ExecResult::Value(ObjectHandle::string(value.clone())))
            }
            Statement::BoolConst(value) => Ok(ExecResult::Value(ObjectHandle::boolean(*value))),
            Statement::NoneConst => Ok(ExecResult::Value(ObjectHandle::none())),

            Statement::VariableValue { dotted_ids } => {
                let mut ids = dotted_ids.iter();
                let first = ids.next().ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: String::new(),
                })?;
                let mut handle =
                    closure
                        .get(first)
                        .cloned()
                        .ok_or_else(|| RuntimeError::UndefinedVariable {
                            name: first.clone(),
                        })?;
                for id in ids {
                    handle = handle
                        .field(id)
                        .ok_or_else(|| RuntimeError::UndefinedVariable { name: id.clone() })?;
                }
                Ok(ExecResult::Value(handle))
            }

            Statement::Assignment { var, rv } => {
                let value = eval!(rv, closure, context);
                closure.insert(var.clone(), value.clone());
                Ok(ExecResult::Value(value))
            }

            Statement::FieldAssignment {
                object,
                field_name,
                rv,
            } => {
                let object = eval!(object, closure, context);
                let value = eval!(rv, closure, context);
                object.set_field(field_name, value.clone())?;
                Ok(ExecResult::Value(value))
            }

            Statement::Print { args } => {
                let mut first = true;
                for arg in args {
                    let handle = eval!(arg, closure, context);
                    if !first {
                        context.output_stream().write_char(' ')?;
                    }
                    first = false;
                    let mut piece = String::new();
                    handle.print(&mut piece, context)?;
                    context.output_stream().write_str(&piece)?;
                }
                context.output_stream().write_char('\n')?;
                Ok(ExecResult::Value(ObjectHandle::none()))
            }

            Statement::MethodCall {
                object,
                method,
                args,
            } => {
                let object = eval!(object, closure, context);
                let mut actual = Vec::with_capacity(args.len());
                for arg in args {
                    actual.push(eval!(arg, closure, context));
                }
                if object.has_method(method, actual.len()) {
                    let result = object.call_method(method, &actual, context)?;
                    return Ok(ExecResult::Value(result));
                }
                Ok(ExecResult::Value(ObjectHandle::none()))
            }

            Statement::Stringify { arg } => {
                let handle = eval!(arg, closure, context);
                let mut rendered = String::new();
                handle.print(&mut rendered, context)?;
                Ok(ExecResult::Value(ObjectHandle::string(rendered)))
            }

            Statement::Add { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                let rhs = eval!(rhs, closure, context);
                if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
                    return Ok(ExecResult::Value(ObjectHandle::number(l + r)));
                }
                if let (Some(l), Some(r)) = (lhs.as_string(), rhs.as_string()) {
                    return Ok(ExecResult::Value(ObjectHandle::string(l + &r)));
                }
                if lhs.has_method("__add__", 1) {
                    let result = lhs.call_method("__add__", &[rhs], context)?;
                    return Ok(ExecResult::Value(result));
                }
                Err(RuntimeError::UnsupportedOperation {
                    operation: "addition",
                })
            }

            Statement::Sub { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                let rhs = eval!(rhs, closure, context);
                if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
                    return Ok(ExecResult::Value(ObjectHandle::number(l - r)));
                }
                Err(RuntimeError::UnsupportedOperation {
                    operation: "subtraction",
                })
            }

            Statement::Mult { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                let rhs = eval!(rhs, closure, context);
                if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
                    return Ok(ExecResult::Value(ObjectHandle::number(l * r)));
                }
                Err(RuntimeError::UnsupportedOperation {
                    operation: "multiplication",
                })
            }

            Statement::Div { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                let rhs = eval!(rhs, closure, context);
                if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
                    if r == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    return Ok(ExecResult::Value(ObjectHandle::number(l / r)));
                }
                Err(RuntimeError::UnsupportedOperation {
                    operation: "division",
                })
            }

            Statement::Compound { statements } => {
                for statement in statements {
                    eval!(statement, closure, context);
                }
                Ok(ExecResult::Value(ObjectHandle::none()))
            }

            Statement::Return { statement } => {
                let value = eval!(statement, closure, context);
                Ok(ExecResult::Return(value))
            }

            Statement::ClassDefinition { class } => {
                let name = class
                    .as_class()
                    .map(|class| class.name().to_string())
                    .ok_or(RuntimeError::NotAClass)?;
                closure.insert(name, class.clone());
                Ok(ExecResult::Value(ObjectHandle::none()))
            }

            Statement::IfElse {
                condition,
                if_body,
                else_body,
            } => {
                let condition = eval!(condition, closure, context);
                if runtime::is_true(&condition) {
                    eval!(if_body, closure, context);
                } else if let Some(else_body) = else_body {
                    eval!(else_body, closure, context);
                }
                Ok(ExecResult::Value(ObjectHandle::none()))
            }

            Statement::Or { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                if runtime::is_true(&lhs) {
                    return Ok(ExecResult::Value(ObjectHandle::boolean(true)));
                }
                let rhs = eval!(rhs, closure, context);
                Ok(ExecResult::Value(ObjectHandle::boolean(runtime::is_true(
                    &rhs,
                ))))
            }

            Statement::And { lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                if !runtime::is_true(&lhs) {
                    return Ok(ExecResult::Value(ObjectHandle::boolean(false)));
                }
                let rhs = eval!(rhs, closure, context);
                Ok(ExecResult::Value(ObjectHandle::boolean(runtime::is_true(
                    &rhs,
                ))))
            }

            Statement::Not { arg } => {
                let arg = eval!(arg, closure, context);
                Ok(ExecResult::Value(ObjectHandle::boolean(!runtime::is_true(
                    &arg,
                ))))
            }

            Statement::Comparison { cmp, lhs, rhs } => {
                let lhs = eval!(lhs, closure, context);
                let rhs = eval!(rhs, closure, context);
                let result = cmp.compare(&lhs, &rhs, context)?;
                Ok(ExecResult::Value(ObjectHandle::boolean(result)))
            }

            Statement::NewInstance { class, args } => {
                let instance = ObjectHandle::instance(class.clone());
                if instance.has_method("__init__", args.len()) {
                    let mut actual = Vec::with_capacity(args.len());
                    for arg in args {
                        actual.push(eval!(arg, closure, context));
                    }
                    instance.call_method("__init__", &actual, context)?;
                }
                Ok(ExecResult::Value(instance))
            }

            Statement::MethodBody { body } => match body.execute(closure, context)? {
                ExecResult::Return(handle) => Ok(ExecResult::Value(handle)),
                ExecResult::Value(_) => Ok(ExecResult::Value(ObjectHandle::none())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DummyContext, Method};

    fn int(value: i64) -> Statement {
        Statement::NumericConst(value)
    }

    fn string(value: &str) -> Statement {
        Statement::StringConst(value.to_string())
    }

    fn boxed(statement: Statement) -> Box<Statement> {
        Box::new(statement)
    }

    fn print_args(args: Vec<Statement>) -> Statement {
        Statement::Print { args }
    }

    /// Runs `statement` in a fresh global scope and returns the produced
    /// output together with the execution result.
    fn run(statement: &Statement) -> (String, Result<ExecResult, RuntimeError>) {
        let mut closure = Closure::new();
        run_in(statement, &mut closure)
    }

    fn run_in(
        statement: &Statement,
        closure: &mut Closure,
    ) -> (String, Result<ExecResult, RuntimeError>) {
        let mut context = DummyContext::default();
        let result = statement.execute(closure, &mut context);
        (context.output, result)
    }

    fn value_of(statement: &Statement) -> ObjectHandle {
        let (_, result) = run(statement);
        match result.expect("execution failed") {
            ExecResult::Value(handle) => handle,
            ExecResult::Return(_) => panic!("unexpected return"),
        }
    }

    #[test]
    fn constants_evaluate_to_their_values() {
        assert_eq!(value_of(&int(42)).as_number(), Some(42));
        assert_eq!(value_of(&string("hi")).as_string().as_deref(), Some("hi"));
        assert_eq!(value_of(&Statement::BoolConst(true)).as_bool(), Some(true));
        assert!(value_of(&Statement::NoneConst).is_empty());
    }

    #[test]
    fn arithmetic_on_numbers() {
        let sum = Statement::Add {
            lhs: boxed(int(2)),
            rhs: boxed(int(3)),
        };
        assert_eq!(value_of(&sum).as_number(), Some(5));

        let difference = Statement::Sub {
            lhs: boxed(int(2)),
            rhs: boxed(int(3)),
        };
        assert_eq!(value_of(&difference).as_number(), Some(-1));

        let product = Statement::Mult {
            lhs: boxed(int(4)),
            rhs: boxed(int(5)),
        };
        assert_eq!(value_of(&product).as_number(), Some(20));

        let quotient = Statement::Div {
            lhs: boxed(int(7)),
            rhs: boxed(int(2)),
        };
        assert_eq!(value_of(&quotient).as_number(), Some(3));
    }

    #[test]
    fn add_concatenates_strings() {
        let concat = Statement::Add {
            lhs: boxed(string("foo")),
            rhs: boxed(string("bar")),
        };
        assert_eq!(value_of(&concat).as_string().as_deref(), Some("foobar"));
    }

    #[test]
    fn division_by_zero_fails() {
        let division = Statement::Div {
            lhs: boxed(int(7)),
            rhs: boxed(int(0)),
        };
        let (_, result) = run(&division);
        let err = result.expect_err("division by zero must fail");
        assert_eq!(err, RuntimeError::DivisionByZero);
        assert_eq!(err.to_string(), "Error. Division by zero");
    }

    #[test]
    fn mixed_operand_arithmetic_fails() {
        let bad = Statement::Add {
            lhs: boxed(int(1)),
            rhs: boxed(Statement::BoolConst(true)),
        };
        let (_, result) = run(&bad);
        assert_eq!(
            result.expect_err("mixed operands must fail"),
            RuntimeError::UnsupportedOperation {
                operation: "addition"
            }
        );

        let bad = Statement::Sub {
            lhs: boxed(string("a")),
            rhs: boxed(string("b")),
        };
        let (_, result) = run(&bad);
        assert_eq!(
            result.expect_err("strings do not subtract"),
            RuntimeError::UnsupportedOperation {
                operation: "subtraction"
            }
        );
    }

    #[test]
    fn assignment_binds_and_yields_the_value() {
        let mut closure = Closure::new();
        let assignment = Statement::Assignment {
            var: "x".to_string(),
            rv: boxed(int(7)),
        };
        let (_, result) = run_in(&assignment, &mut closure);
        let handle = result.expect("assignment failed").into_value();
        assert_eq!(handle.as_number(), Some(7));
        assert_eq!(
            closure.get("x").and_then(ObjectHandle::as_number),
            Some(7)
        );
    }

    #[test]
    fn variable_lookup_fails_for_unknown_names() {
        let (_, result) = run(&Statement::variable("missing"));
        assert_eq!(
            result.expect_err("unknown name must fail"),
            RuntimeError::UndefinedVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn dotted_lookup_descends_into_field_tables() {
        let inner_class = Class::new("Inner", vec![], None);
        let outer_class = Class::new("Outer", vec![], None);
        let inner = ObjectHandle::instance(inner_class);
        inner.set_field("value", ObjectHandle::number(9)).unwrap();
        let outer = ObjectHandle::instance(outer_class);
        outer.set_field("inner", inner).unwrap();

        let mut closure = Closure::new();
        closure.insert("outer".to_string(), outer);

        let lookup = Statement::VariableValue {
            dotted_ids: vec!["outer".to_string(), "inner".to_string(), "value".to_string()],
        };
        let (_, result) = run_in(&lookup, &mut closure);
        assert_eq!(
            result.expect("lookup failed").into_value().as_number(),
            Some(9)
        );

        let bad = Statement::VariableValue {
            dotted_ids: vec!["outer".to_string(), "absent".to_string()],
        };
        let (_, result) = run_in(&bad, &mut closure);
        assert_eq!(
            result.expect_err("missing field must fail"),
            RuntimeError::UndefinedVariable {
                name: "absent".to_string()
            }
        );
    }

    #[test]
    fn field_assignment_stores_into_the_instance() {
        let class = Class::new("Box", vec![], None);
        let mut closure = Closure::new();
        closure.insert("b".to_string(), ObjectHandle::instance(class));

        let assignment = Statement::FieldAssignment {
            object: boxed(Statement::variable("b")),
            field_name: "value".to_string(),
            rv: boxed(int(3)),
        };
        let (_, result) = run_in(&assignment, &mut closure);
        assert_eq!(
            result.expect("assignment failed").into_value().as_number(),
            Some(3)
        );
        let stored = closure.get("b").and_then(|b| b.field("value"));
        assert_eq!(stored.and_then(|v| v.as_number()), Some(3));
    }

    #[test]
    fn field_assignment_rejects_non_instances() {
        let assignment = Statement::FieldAssignment {
            object: boxed(int(1)),
            field_name: "value".to_string(),
            rv: boxed(int(3)),
        };
        let (_, result) = run(&assignment);
        assert_eq!(
            result.expect_err("numbers have no fields"),
            RuntimeError::NotAnInstance
        );
    }

    #[test]
    fn print_separates_arguments_and_ends_the_line() {
        let statement = print_args(vec![
            int(1),
            string("hi"),
            Statement::BoolConst(true),
            Statement::NoneConst,
        ]);
        let (output, result) = run(&statement);
        assert!(result.expect("print failed").into_value().is_empty());
        assert_eq!(output, "1 hi True None\n");
    }

    #[test]
    fn print_with_no_arguments_emits_a_bare_newline() {
        let (output, result) = run(&print_args(vec![]));
        result.expect("print failed");
        assert_eq!(output, "\n");
    }

    #[test]
    fn stringify_yields_the_printed_form() {
        assert_eq!(
            value_of(&Statement::Stringify { arg: boxed(int(7)) })
                .as_string()
                .as_deref(),
            Some("7")
        );
        assert_eq!(
            value_of(&Statement::Stringify {
                arg: boxed(Statement::NoneConst)
            })
            .as_string()
            .as_deref(),
            Some("None")
        );
        assert_eq!(
            value_of(&Statement::Stringify {
                arg: boxed(Statement::BoolConst(false))
            })
            .as_string()
            .as_deref(),
            Some("False")
        );
    }

    #[test]
    fn compound_runs_statements_in_order() {
        let statement = Statement::Compound {
            statements: vec![
                print_args(vec![int(1)]),
                print_args(vec![int(2)]),
                print_args(vec![int(3)]),
            ],
        };
        let (output, result) = run(&statement);
        assert!(result.expect("compound failed").into_value().is_empty());
        assert_eq!(output, "1\n2\n3\n");
    }

    #[test]
    fn if_else_picks_a_branch_by_truthiness() {
        let branch = |condition: Statement| Statement::IfElse {
            condition: boxed(condition),
            if_body: boxed(print_args(vec![string("then")])),
            else_body: Some(boxed(print_args(vec![string("else")]))),
        };
        let (output, _) = run(&branch(int(1)));
        assert_eq!(output, "then\n");
        let (output, _) = run(&branch(int(0)));
        assert_eq!(output, "else\n");
        let (output, _) = run(&branch(string("")));
        assert_eq!(output, "else\n");

        let without_else = Statement::IfElse {
            condition: boxed(Statement::BoolConst(false)),
            if_body: boxed(print_args(vec![string("then")])),
            else_body: None,
        };
        let (output, result) = run(&without_else);
        result.expect("if failed");
        assert_eq!(output, "");
    }

    #[test]
    fn and_short_circuits_on_a_falsy_left_side() {
        let statement = Statement::And {
            lhs: boxed(Statement::BoolConst(false)),
            rhs: boxed(print_args(vec![string("evaluated")])),
        };
        let (output, result) = run(&statement);
        let handle = result.expect("and failed").into_value();
        assert_eq!(handle.as_bool(), Some(false));
        assert_eq!(output, "", "right operand must not be evaluated");

        let statement = Statement::And {
            lhs: boxed(Statement::BoolConst(true)),
            rhs: boxed(print_args(vec![string("evaluated")])),
        };
        let (output, result) = run(&statement);
        // `print` yields the empty handle, which is falsy.
        assert_eq!(result.expect("and failed").into_value().as_bool(), Some(false));
        assert_eq!(output, "evaluated\n");
    }

    #[test]
    fn or_short_circuits_on_a_truthy_left_side() {
        let statement = Statement::Or {
            lhs: boxed(Statement::BoolConst(true)),
            rhs: boxed(print_args(vec![string("evaluated")])),
        };
        let (output, result) = run(&statement);
        assert_eq!(result.expect("or failed").into_value().as_bool(), Some(true));
        assert_eq!(output, "", "right operand must not be evaluated");

        let statement = Statement::Or {
            lhs: boxed(Statement::BoolConst(false)),
            rhs: boxed(int(5)),
        };
        assert_eq!(value_of(&statement).as_bool(), Some(true));
    }

    #[test]
    fn not_negates_truthiness() {
        let statement = Statement::Not {
            arg: boxed(Statement::NoneConst),
        };
        assert_eq!(value_of(&statement).as_bool(), Some(true));
        let statement = Statement::Not { arg: boxed(int(3)) };
        assert_eq!(value_of(&statement).as_bool(), Some(false));
    }

    #[test]
    fn comparison_nodes_yield_bools() {
        let compare = |cmp, lhs: i64, rhs: i64| {
            let statement = Statement::Comparison {
                cmp,
                lhs: boxed(int(lhs)),
                rhs: boxed(int(rhs)),
            };
            value_of(&statement).as_bool().expect("expected a Bool")
        };
        assert!(compare(Comparator::Equal, 2, 2));
        assert!(compare(Comparator::NotEqual, 2, 3));
        assert!(compare(Comparator::Less, 2, 3));
        assert!(compare(Comparator::Greater, 3, 2));
        assert!(compare(Comparator::LessOrEqual, 2, 2));
        assert!(compare(Comparator::GreaterOrEqual, 2, 2));
        assert!(!compare(Comparator::Less, 3, 2));
    }

    #[test]
    fn class_definition_binds_the_class_name() {
        let class = Class::new("Widget", vec![], None);
        let mut closure = Closure::new();
        let definition = Statement::ClassDefinition {
            class: ObjectHandle::class(class),
        };
        let (_, result) = run_in(&definition, &mut closure);
        assert!(result.expect("definition failed").into_value().is_empty());
        let bound = closure.get("Widget").and_then(ObjectHandle::as_class);
        assert_eq!(bound.map(|class| class.name().to_string()).as_deref(), Some("Widget"));
    }

    #[test]
    fn method_call_on_a_missing_method_yields_the_empty_handle() {
        let class = Class::new("Silent", vec![], None);
        let mut closure = Closure::new();
        closure.insert("s".to_string(), ObjectHandle::instance(class));
        let call = Statement::MethodCall {
            object: boxed(Statement::variable("s")),
            method: "absent".to_string(),
            args: vec![],
        };
        let (_, result) = run_in(&call, &mut closure);
        assert!(result.expect("call failed").into_value().is_empty());
    }

    #[test]
    fn return_stops_the_method_body() {
        let body = Statement::MethodBody {
            body: boxed(Statement::Compound {
                statements: vec![
                    print_args(vec![string("before")]),
                    Statement::Return {
                        statement: boxed(int(42)),
                    },
                    print_args(vec![string("after")]),
                ],
            }),
        };
        let (output, result) = run(&body);
        let handle = result.expect("body failed").into_value();
        assert_eq!(handle.as_number(), Some(42));
        assert_eq!(output, "before\n", "statements after return must not run");
    }

    #[test]
    fn return_unwinds_through_nested_if_blocks() {
        let body = Statement::MethodBody {
            body: boxed(Statement::Compound {
                statements: vec![
                    Statement::IfElse {
                        condition: boxed(Statement::BoolConst(true)),
                        if_body: boxed(Statement::Compound {
                            statements: vec![Statement::Return {
                                statement: boxed(string("early")),
                            }],
                        }),
                        else_body: None,
                    },
                    print_args(vec![string("unreachable")]),
                ],
            }),
        };
        let (output, result) = run(&body);
        let handle = result.expect("body failed").into_value();
        assert_eq!(handle.as_string().as_deref(), Some("early"));
        assert_eq!(output, "");
    }

    #[test]
    fn method_body_without_return_yields_the_empty_handle() {
        let body = Statement::MethodBody {
            body: boxed(print_args(vec![int(1)])),
        };
        let (output, result) = run(&body);
        assert!(result.expect("body failed").into_value().is_empty());
        assert_eq!(output, "1\n");
    }

    #[test]
    fn new_instance_runs_a_matching_init() {
        let init_body = Statement::MethodBody {
            body: boxed(Statement::FieldAssignment {
                object: boxed(Statement::variable("self")),
                field_name: "value".to_string(),
                rv: boxed(Statement::variable("v")),
            }),
        };
        let class = Class::new(
            "Box",
            vec![Method::new("__init__", vec!["v".to_string()], init_body)],
            None,
        );
        let new_instance = Statement::NewInstance {
            class,
            args: vec![int(11)],
        };
        let handle = value_of(&new_instance);
        assert!(handle.is_instance());
        assert_eq!(handle.field("value").and_then(|v| v.as_number()), Some(11));
    }

    #[test]
    fn new_instance_without_matching_init_skips_it() {
        let class = Class::new("Plain", vec![], None);
        let new_instance = Statement::NewInstance {
            class,
            args: vec![int(1)],
        };
        // No one-argument __init__ exists, so the argument is ignored.
        let handle = value_of(&new_instance);
        assert!(handle.is_instance());
    }

    #[test]
    fn new_instance_keeps_the_object_alive_after_the_node_is_gone() {
        let class = Class::new("Plain", vec![], None);
        let new_instance = Statement::NewInstance {
            class,
            args: vec![],
        };
        let handle = value_of(&new_instance);
        drop(new_instance);
        assert!(handle.is_instance(), "instance must outlive the node");
    }

    #[test]
    fn add_delegates_to_add_method_on_instances() {
        let add_body = Statement::MethodBody {
            body: boxed(Statement::Return {
                statement: boxed(Statement::Add {
                    lhs: boxed(Statement::VariableValue {
                        dotted_ids: vec!["self".to_string(), "value".to_string()],
                    }),
                    rhs: boxed(Statement::variable("other")),
                }),
            }),
        };
        let class = Class::new(
            "Adder",
            vec![Method::new("__add__", vec!["other".to_string()], add_body)],
            None,
        );
        let instance = ObjectHandle::instance(class);
        instance.set_field("value", ObjectHandle::number(10)).unwrap();
        let mut closure = Closure::new();
        closure.insert("a".to_string(), instance);

        let sum = Statement::Add {
            lhs: boxed(Statement::variable("a")),
            rhs: boxed(int(5)),
        };
        let (_, result) = run_in(&sum, &mut closure);
        assert_eq!(
            result.expect("add failed").into_value().as_number(),
            Some(15)
        );
    }
}
