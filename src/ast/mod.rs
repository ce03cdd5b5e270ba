//! Typed view of the solc compact JSON AST.
//!
//! Only the node kinds the guard compiler inspects are modelled; every other `nodeType`
//! deserializes to [`Node::Unknown`], which has no children and is skipped by every walk.

pub mod compiler;

pub use compiler::{compile_guard, compile_precondition, GuardIndex, Precondition};

use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;

/// `start:length:file` byte range as emitted in solc `src` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub struct SourceLocation {
    pub start: usize,
    pub length: usize,
    pub file: i64,
}

impl SourceLocation {
    /// Lenient parse; missing or malformed components become zero.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(':');
        let start = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
        let length = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
        let file = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
        Self {
            start,
            length,
            file,
        }
    }
}

impl From<String> for SourceLocation {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl Ord for SourceLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.file, self.start, self.length).cmp(&(other.file, other.start, other.length))
    }
}

impl PartialOrd for SourceLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.length, self.file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub parameters: ParameterList,
    #[serde(default)]
    pub body: Option<Box<Node>>,
    #[serde(default)]
    pub src: SourceLocation,
}

impl FunctionDefinition {
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterList {
    #[serde(default)]
    pub parameters: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDeclaration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_descriptions: Option<TypeDescriptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptions {
    #[serde(default)]
    pub type_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "nodeType")]
pub enum Node {
    SourceUnit {
        #[serde(default)]
        nodes: Vec<Node>,
    },
    ContractDefinition {
        name: String,
        #[serde(default)]
        nodes: Vec<Node>,
    },
    FunctionDefinition(FunctionDefinition),
    Block {
        #[serde(default)]
        statements: Vec<Node>,
    },
    UncheckedBlock {
        #[serde(default)]
        statements: Vec<Node>,
    },
    ExpressionStatement {
        expression: Box<Node>,
    },
    #[serde(rename_all = "camelCase")]
    IfStatement {
        condition: Box<Node>,
        true_body: Box<Node>,
        #[serde(default)]
        false_body: Option<Box<Node>>,
    },
    ForStatement {
        body: Box<Node>,
    },
    WhileStatement {
        body: Box<Node>,
    },
    DoWhileStatement {
        body: Box<Node>,
    },
    FunctionCall {
        expression: Box<Node>,
        #[serde(default)]
        arguments: Vec<Node>,
        #[serde(default)]
        src: SourceLocation,
    },
    #[serde(rename_all = "camelCase")]
    BinaryOperation {
        operator: String,
        left_expression: Box<Node>,
        right_expression: Box<Node>,
        #[serde(default)]
        src: SourceLocation,
    },
    #[serde(rename_all = "camelCase")]
    UnaryOperation {
        operator: String,
        sub_expression: Box<Node>,
        #[serde(default)]
        src: SourceLocation,
    },
    Identifier {
        name: String,
        #[serde(default)]
        src: SourceLocation,
    },
    #[serde(rename_all = "camelCase")]
    Literal {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        hex_value: Option<String>,
        kind: String,
        #[serde(default)]
        subdenomination: Option<String>,
        #[serde(default)]
        src: SourceLocation,
    },
    #[serde(other)]
    Unknown,
}

impl Node {
    pub fn node_type(&self) -> &'static str {
        match self {
            Self::SourceUnit { .. } => "SourceUnit",
            Self::ContractDefinition { .. } => "ContractDefinition",
            Self::FunctionDefinition(_) => "FunctionDefinition",
            Self::Block { .. } => "Block",
            Self::UncheckedBlock { .. } => "UncheckedBlock",
            Self::ExpressionStatement { .. } => "ExpressionStatement",
            Self::IfStatement { .. } => "IfStatement",
            Self::ForStatement { .. } => "ForStatement",
            Self::WhileStatement { .. } => "WhileStatement",
            Self::DoWhileStatement { .. } => "DoWhileStatement",
            Self::FunctionCall { .. } => "FunctionCall",
            Self::BinaryOperation { .. } => "BinaryOperation",
            Self::UnaryOperation { .. } => "UnaryOperation",
            Self::Identifier { .. } => "Identifier",
            Self::Literal { .. } => "Literal",
            Self::Unknown => "unrecognised node",
        }
    }

    pub fn src(&self) -> Option<&SourceLocation> {
        match self {
            Self::FunctionDefinition(def) => Some(&def.src),
            Self::FunctionCall { src, .. }
            | Self::BinaryOperation { src, .. }
            | Self::UnaryOperation { src, .. }
            | Self::Identifier { src, .. }
            | Self::Literal { src, .. } => Some(src),
            _ => None,
        }
    }

    /// Statement-level children, in source order. Expressions are not descended into.
    pub fn statements(&self) -> Vec<&Node> {
        match self {
            Self::SourceUnit { nodes } | Self::ContractDefinition { nodes, .. } => {
                nodes.iter().collect()
            }
            Self::FunctionDefinition(def) => def.body.iter().map(Box::as_ref).collect(),
            Self::Block { statements } | Self::UncheckedBlock { statements } => {
                statements.iter().collect()
            }
            Self::IfStatement {
                true_body,
                false_body,
                ..
            } => std::iter::once(true_body.as_ref())
                .chain(false_body.iter().map(Box::as_ref))
                .collect(),
            Self::ForStatement { body }
            | Self::WhileStatement { body }
            | Self::DoWhileStatement { body } => vec![body.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Callee name when this is a call through a plain identifier.
    pub fn callee(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { expression, .. } => match expression.as_ref() {
                Self::Identifier { name, .. } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parses a compact JSON AST as produced by `solc --combined-json ast` or standard JSON output.
pub fn parse_source_unit(json: &str) -> serde_json::Result<Node> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_kinds_deserialize_as_no_ops() {
        let node: Node = serde_json::from_str(
            r#"{"nodeType":"Block","statements":[
                {"nodeType":"EmitStatement","eventCall":{}},
                {"nodeType":"ExpressionStatement","expression":{"nodeType":"Identifier","name":"x","src":"1:1:0"}}
            ]}"#,
        )
        .expect("parses");
        let statements = node.statements();
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Node::Unknown));
        assert!(statements[0].statements().is_empty());
        assert_eq!(statements[1].node_type(), "ExpressionStatement");
    }

    #[test]
    fn source_locations_order_by_file_then_offset() {
        let a = SourceLocation::parse("10:4:0");
        let b = SourceLocation::parse("2:40:1");
        let c = SourceLocation::parse("30:1:0");
        let mut all = vec![b.clone(), c.clone(), a.clone()];
        all.sort();
        assert_eq!(all, vec![a, c, b]);
        assert_eq!(SourceLocation::parse("garbage").to_string(), "0:0:0");
    }
}
