//! Guard-condition compiler.
//!
//! Translates the condition of each `require(...)` in a function body into at most one
//! [`Constraint`] on one argument. Comparisons are the only translated shape: one side must be
//! an argument, the other a literal or a zero-argument state read. Anything else is either not
//! actionable (`Ok(None)`) or rejected as an [`UnsupportedConstruct`].
//!
//! A bare `require(getter())` constrains no argument. It is kept as a function-level
//! [`Precondition`] instead.

use super::{FunctionDefinition, Node, SourceLocation};
use crate::abi::Scalar;
use crate::constraints::{Bound, Constraint, ConstraintKind, Literal, Origin};
use crate::env::StateReader;
use crate::error::{StateReadError, UnsupportedConstruct};
use std::collections::HashMap;
use tracing::{debug, warn};

const GUARD_PRIMITIVE: &str = "require";

enum Side {
    Argument(String),
    Bound(Bound),
    /// A call with arguments, or a call through a member access.
    Opaque,
}

fn location_of(node: &Node) -> String {
    node.src().map(ToString::to_string).unwrap_or_default()
}

fn classify(node: &Node, parameters: &[String]) -> Result<Side, UnsupportedConstruct> {
    match node {
        Node::Identifier { name, .. } if parameters.iter().any(|p| p == name) => {
            Ok(Side::Argument(name.clone()))
        }
        Node::Identifier { name, .. } => Ok(Side::Bound(Bound::StateRead(name.clone()))),
        Node::Literal {
            value,
            hex_value,
            kind,
            subdenomination,
            src,
        } => {
            if kind != "number" && kind != "bool" {
                return Err(UnsupportedConstruct::new(
                    format!("{kind} literal"),
                    src.to_string(),
                ));
            }
            let text = match (value, hex_value) {
                (Some(v), _) => v.clone(),
                (None, Some(hex)) => format!("0x{hex}"),
                (None, None) => {
                    return Err(UnsupportedConstruct::new("literal without value", src.to_string()))
                }
            };
            Ok(Side::Bound(Bound::Literal(Literal {
                text,
                subdenomination: subdenomination.clone(),
            })))
        }
        Node::FunctionCall { arguments, .. } => match node.callee() {
            Some(name) if arguments.is_empty() => Ok(Side::Bound(Bound::StateRead(name.to_string()))),
            _ => Ok(Side::Opaque),
        },
        other => Err(UnsupportedConstruct::new(
            format!("{} operand", other.node_type()),
            location_of(other),
        )),
    }
}

/// Compiles one guard condition against the enclosing function's argument names.
pub fn compile_guard(
    condition: &Node,
    parameters: &[String],
) -> Result<Option<Constraint>, UnsupportedConstruct> {
    match condition {
        Node::BinaryOperation {
            operator,
            left_expression,
            right_expression,
            src,
        } => {
            let kind = ConstraintKind::from_operator(operator).ok_or_else(|| {
                UnsupportedConstruct::new(format!("binary operator `{operator}`"), src.to_string())
            })?;
            let left = classify(left_expression, parameters)?;
            let right = classify(right_expression, parameters)?;
            let (argument, kind, bound) = match (left, right) {
                (Side::Argument(arg), Side::Bound(bound)) => (arg, kind, bound),
                (Side::Bound(bound), Side::Argument(arg)) => (arg, kind.mirrored(), bound),
                (Side::Argument(a), Side::Argument(b)) => {
                    debug!(location = %src, left = %a, right = %b, "cross-argument comparison discarded");
                    return Ok(None);
                }
                (Side::Opaque, _) | (_, Side::Opaque) => {
                    debug!(location = %src, "comparison against a call with arguments discarded");
                    return Ok(None);
                }
                (Side::Bound(_), Side::Bound(_)) => {
                    debug!(location = %src, "argument-independent comparison discarded");
                    return Ok(None);
                }
            };
            Ok(Some(Constraint {
                kind,
                bound,
                origin: Origin::Source {
                    location: src.clone(),
                    related_args: vec![argument],
                },
            }))
        }
        Node::UnaryOperation { operator, src, .. } => Err(UnsupportedConstruct::new(
            format!("unary operator `{operator}`"),
            src.to_string(),
        )),
        Node::FunctionCall { arguments, src, .. } => {
            debug!(
                location = %src,
                arguments = arguments.len(),
                "bare call guard relates to no argument"
            );
            Ok(None)
        }
        other => Err(UnsupportedConstruct::new(
            format!("{} guard", other.node_type()),
            location_of(other),
        )),
    }
}

/// A guard that calls a zero-argument getter and requires it to be true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub getter: String,
    pub location: SourceLocation,
}

impl Precondition {
    /// Reads the getter now; non-zero means the guard passes. Nothing is cached between calls.
    pub fn holds(&self, reader: &mut dyn StateReader) -> Result<bool, StateReadError> {
        Ok(reader.read(&self.getter)? != Scalar::ZERO)
    }
}

/// The precondition behind a `require(getter())` condition, if it has that shape.
pub fn compile_precondition(condition: &Node) -> Option<Precondition> {
    match condition {
        Node::FunctionCall { arguments, src, .. } if arguments.is_empty() => {
            condition.callee().map(|getter| Precondition {
                getter: getter.to_string(),
                location: src.clone(),
            })
        }
        _ => None,
    }
}

/// Source-derived constraints per `(contract, function)`, in source order.
#[derive(Debug, Clone, Default)]
pub struct GuardIndex {
    functions: HashMap<(String, String), Vec<Constraint>>,
    preconditions: HashMap<(String, String), Vec<Precondition>>,
}

impl GuardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source_unit(unit: &Node) -> Self {
        let mut index = Self::new();
        index.add_source_unit(unit);
        index
    }

    pub fn add_source_unit(&mut self, unit: &Node) {
        for node in unit.statements() {
            if let Node::ContractDefinition { name, nodes } = node {
                for member in nodes {
                    if let Node::FunctionDefinition(def) = member {
                        self.add_function(name, def);
                    }
                }
            }
        }
    }

    /// Overloads share a name; their guards are concatenated and filtered per argument later.
    pub fn add_function(&mut self, contract: &str, function: &FunctionDefinition) {
        let collected = collect(function);
        debug!(
            contract,
            function = %function.name,
            guards = collected.constraints.len(),
            preconditions = collected.preconditions.len(),
            "indexed function guards"
        );
        let key = (contract.to_string(), function.name.clone());
        if !collected.preconditions.is_empty() {
            let entry = self.preconditions.entry(key.clone()).or_default();
            entry.extend(collected.preconditions);
            entry.sort_by(|a, b| a.location.cmp(&b.location));
        }
        let entry = self.functions.entry(key).or_default();
        entry.extend(collected.constraints);
        entry.sort_by(|a, b| source_position(a).cmp(&source_position(b)));
    }

    pub fn preconditions(&self, contract: &str, function: &str) -> &[Precondition] {
        self.preconditions
            .get(&(contract.to_string(), function.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn constraints(&self, contract: &str, function: &str) -> &[Constraint] {
        self.functions
            .get(&(contract.to_string(), function.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Constraints whose related arguments include `argument`.
    pub fn constraints_for<'a>(
        &'a self,
        contract: &str,
        function: &str,
        argument: &'a str,
    ) -> impl Iterator<Item = &'a Constraint> + 'a {
        self.constraints(contract, function)
            .iter()
            .filter(move |c| c.related_args().iter().any(|a| a == argument))
    }

    pub fn len(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn source_position(constraint: &Constraint) -> Option<&SourceLocation> {
    match &constraint.origin {
        Origin::Source { location, .. } => Some(location),
        Origin::RuleFile { .. } => None,
    }
}

#[derive(Default)]
struct Collected {
    constraints: Vec<Constraint>,
    preconditions: Vec<Precondition>,
}

fn collect(function: &FunctionDefinition) -> Collected {
    let parameters = function.parameter_names();
    let mut out = Collected::default();
    if let Some(body) = &function.body {
        walk(body, &parameters, &mut out);
    }
    out
}

/// Every translatable `require` condition in the function body, in source order.
pub fn collect_guards(function: &FunctionDefinition) -> Vec<Constraint> {
    collect(function).constraints
}

/// Every bare `require(getter())` in the function body, in source order.
pub fn collect_preconditions(function: &FunctionDefinition) -> Vec<Precondition> {
    collect(function).preconditions
}

fn walk(node: &Node, parameters: &[String], out: &mut Collected) {
    if let Node::ExpressionStatement { expression } = node {
        if let Node::FunctionCall { arguments, .. } = expression.as_ref() {
            if expression.callee() == Some(GUARD_PRIMITIVE) {
                if let Some(condition) = arguments.first() {
                    if let Some(precondition) = compile_precondition(condition) {
                        out.preconditions.push(precondition);
                        return;
                    }
                    match compile_guard(condition, parameters) {
                        Ok(Some(constraint)) => out.constraints.push(constraint),
                        Ok(None) => {}
                        Err(err) => warn!(
                            construct = %err.construct,
                            location = %err.location,
                            "guard skipped"
                        ),
                    }
                }
            }
        }
        return;
    }
    for child in node.statements() {
        walk(child, parameters, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> String {
        format!(r#"{{"nodeType":"Identifier","name":"{name}","src":"0:1:0"}}"#)
    }

    fn number(value: &str) -> String {
        format!(r#"{{"nodeType":"Literal","kind":"number","value":"{value}","src":"0:1:0"}}"#)
    }

    fn binary(op: &str, left: &str, right: &str, src: &str) -> Node {
        serde_json::from_str(&format!(
            r#"{{"nodeType":"BinaryOperation","operator":"{op}","leftExpression":{left},"rightExpression":{right},"src":"{src}"}}"#
        ))
        .expect("valid node")
    }

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn argument_on_the_left_keeps_orientation() {
        let node = binary(">", &ident("x"), &number("5"), "10:5:0");
        let constraint = compile_guard(&node, &params(&["x"])).expect("compiles").expect("actionable");
        assert_eq!(constraint.kind, ConstraintKind::GreaterThan);
        assert_eq!(constraint.bound, Bound::Literal(Literal::new("5")));
        assert_eq!(constraint.related_args(), ["x".to_string()]);
    }

    #[test]
    fn argument_on_the_right_is_mirrored() {
        let node = binary(">", &number("100"), &ident("x"), "10:5:0");
        let constraint = compile_guard(&node, &params(&["x"])).expect("compiles").expect("actionable");
        assert_eq!(constraint.kind, ConstraintKind::LessThan);

        let node = binary("<=", &ident("limit"), &ident("x"), "10:5:0");
        let constraint = compile_guard(&node, &params(&["x"])).expect("compiles").expect("actionable");
        assert_eq!(constraint.kind, ConstraintKind::GreaterOrEqual);
        assert_eq!(constraint.bound, Bound::StateRead("limit".to_string()));
    }

    #[test]
    fn non_actionable_comparisons_yield_nothing() {
        let p = params(&["a", "b"]);
        assert!(compile_guard(&binary("==", &ident("a"), &ident("b"), "0:1:0"), &p)
            .expect("compiles")
            .is_none());
        assert!(compile_guard(&binary("!=", &ident("owner"), &number("0"), "0:1:0"), &p)
            .expect("compiles")
            .is_none());
        let call_with_args = r#"{"nodeType":"FunctionCall","expression":{"nodeType":"Identifier","name":"f"},"arguments":[{"nodeType":"Identifier","name":"a"}]}"#;
        assert!(compile_guard(&binary("<", &ident("a"), call_with_args, "0:1:0"), &p)
            .expect("compiles")
            .is_none());
    }

    #[test]
    fn zero_argument_calls_become_state_reads() {
        let call = r#"{"nodeType":"FunctionCall","expression":{"nodeType":"Identifier","name":"cap"},"arguments":[]}"#;
        let node = binary("<=", &ident("x"), call, "0:1:0");
        let constraint = compile_guard(&node, &params(&["x"])).expect("compiles").expect("actionable");
        assert_eq!(constraint.bound, Bound::StateRead("cap".to_string()));
    }

    #[test]
    fn negation_connectives_and_arithmetic_fail_loudly() {
        let p = params(&["x"]);
        let negation: Node = serde_json::from_str(&format!(
            r#"{{"nodeType":"UnaryOperation","operator":"!","subExpression":{},"src":"4:2:0"}}"#,
            ident("x")
        ))
        .expect("valid node");
        let err = compile_guard(&negation, &p).expect_err("unsupported");
        assert_eq!(err.location, "4:2:0");

        let conjunction = binary("&&", &ident("x"), &ident("x"), "7:9:0");
        assert!(compile_guard(&conjunction, &p).is_err());

        let cmp: Node = serde_json::from_str(&format!(
            r#"{{"nodeType":"BinaryOperation","operator":">","leftExpression":{{"nodeType":"BinaryOperation","operator":"+","leftExpression":{},"rightExpression":{}}},"rightExpression":{},"src":"0:9:0"}}"#,
            ident("x"),
            number("1"),
            number("2")
        ))
        .expect("valid node");
        assert!(compile_guard(&cmp, &p).is_err());
    }

    #[test]
    fn guards_are_collected_in_source_order_and_bad_ones_skipped() {
        let function: FunctionDefinition = serde_json::from_str(
            r#"{
                "name": "deposit",
                "parameters": {"parameters": [{"name": "amount"}, {"name": "to"}]},
                "src": "0:500:0",
                "body": {"nodeType": "Block", "statements": [
                    {"nodeType": "ExpressionStatement", "expression": {
                        "nodeType": "FunctionCall",
                        "expression": {"nodeType": "Identifier", "name": "require"},
                        "arguments": [{"nodeType": "BinaryOperation", "operator": ">",
                            "leftExpression": {"nodeType": "Identifier", "name": "amount"},
                            "rightExpression": {"nodeType": "Literal", "kind": "number", "value": "0"},
                            "src": "20:10:0"}]
                    }},
                    {"nodeType": "ExpressionStatement", "expression": {
                        "nodeType": "FunctionCall",
                        "expression": {"nodeType": "Identifier", "name": "require"},
                        "arguments": [{"nodeType": "UnaryOperation", "operator": "!",
                            "subExpression": {"nodeType": "Identifier", "name": "paused"},
                            "src": "40:7:0"}]
                    }},
                    {"nodeType": "IfStatement",
                     "condition": {"nodeType": "Identifier", "name": "flag"},
                     "trueBody": {"nodeType": "Block", "statements": [
                        {"nodeType": "ExpressionStatement", "expression": {
                            "nodeType": "FunctionCall",
                            "expression": {"nodeType": "Identifier", "name": "require"},
                            "arguments": [{"nodeType": "BinaryOperation", "operator": "<",
                                "leftExpression": {"nodeType": "Identifier", "name": "amount"},
                                "rightExpression": {"nodeType": "Literal", "kind": "number", "value": "1", "subdenomination": "ether"},
                                "src": "80:12:0"}]
                        }}
                     ]}},
                    {"nodeType": "EmitStatement"}
                ]}
            }"#,
        )
        .expect("valid function");
        let guards = collect_guards(&function);
        assert_eq!(guards.len(), 2);
        assert_eq!(guards[0].kind, ConstraintKind::GreaterThan);
        assert_eq!(guards[1].kind, ConstraintKind::LessThan);
        assert_eq!(
            guards[1].bound,
            Bound::Literal(Literal {
                text: "1".to_string(),
                subdenomination: Some("ether".to_string())
            })
        );

        let mut index = GuardIndex::new();
        index.add_function("Vault", &function);
        assert_eq!(index.constraints_for("Vault", "deposit", "amount").count(), 2);
        assert_eq!(index.constraints_for("Vault", "deposit", "to").count(), 0);
        assert!(index.constraints("Other", "deposit").is_empty());
    }

    #[test]
    fn bare_getter_guards_become_preconditions() {
        let function: FunctionDefinition = serde_json::from_str(
            r#"{
                "name": "claim",
                "parameters": {"parameters": [{"name": "amount"}]},
                "body": {"nodeType": "Block", "statements": [
                    {"nodeType": "ExpressionStatement", "expression": {
                        "nodeType": "FunctionCall",
                        "expression": {"nodeType": "Identifier", "name": "require"},
                        "arguments": [{"nodeType": "FunctionCall",
                            "expression": {"nodeType": "Identifier", "name": "isOpen"},
                            "arguments": [], "src": "30:8:0"}]
                    }},
                    {"nodeType": "ExpressionStatement", "expression": {
                        "nodeType": "FunctionCall",
                        "expression": {"nodeType": "Identifier", "name": "require"},
                        "arguments": [{"nodeType": "FunctionCall",
                            "expression": {"nodeType": "Identifier", "name": "allowed"},
                            "arguments": [{"nodeType": "Identifier", "name": "amount"}],
                            "src": "50:15:0"}]
                    }}
                ]}
            }"#,
        )
        .expect("valid function");
        assert!(collect_guards(&function).is_empty());
        let preconditions = collect_preconditions(&function);
        assert_eq!(preconditions.len(), 1);
        assert_eq!(preconditions[0].getter, "isOpen");
        assert_eq!(preconditions[0].location.to_string(), "30:8:0");

        let mut index = GuardIndex::new();
        index.add_function("Sale", &function);
        assert_eq!(index.preconditions("Sale", "claim"), preconditions.as_slice());
        assert!(index.constraints("Sale", "claim").is_empty());
        assert!(index.preconditions("Sale", "other").is_empty());

        let mut reads = 0;
        let mut reader = |name: &str| {
            assert_eq!(name, "isOpen");
            reads += 1;
            Ok::<_, StateReadError>(Scalar::from_u64(reads % 2))
        };
        assert_eq!(preconditions[0].holds(&mut reader), Ok(true));
        assert_eq!(preconditions[0].holds(&mut reader), Ok(false));
        assert_eq!(
            preconditions[0].holds(&mut crate::env::DetachedReader),
            Err(StateReadError::Unbound("isOpen".to_string()))
        );
    }
}
