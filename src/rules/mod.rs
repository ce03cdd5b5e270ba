//! Declarative rule files.
//!
//! A rule file is a JSON document `contract -> function -> type -> {rules, selector?}` where
//! contract and function may be `"*"`. Entries are flattened into one map keyed by
//! [`RuleKey`] and validated against their type when loaded, so a bad rule never reaches a
//! generator.

use crate::abi::{AbiType, Scalar};
use crate::constraints::{accepts, Constraint, ConstraintKind, Literal};
use crate::error::InvalidRuleSpec;
use crate::generators::NumericDomain;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub contract: String,
    pub function: String,
    pub type_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    First,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub rule_type: String,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRules {
    pub ty: AbiType,
    pub rules: Vec<Rule>,
    pub selection: Selection,
}

impl TypeRules {
    /// Constraints of the rules picked by the entry's selector, in declaration order.
    pub fn selected(&self) -> impl Iterator<Item = &Constraint> {
        let take = match self.selection {
            Selection::All => self.rules.len(),
            Selection::First => 1,
        };
        self.rules.iter().take(take).flat_map(|r| r.constraints.iter())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    entries: HashMap<RuleKey, TypeRules>,
    contracts: HashSet<String>,
    functions: HashSet<(String, String)>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, InvalidRuleSpec> {
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .map_err(|err| InvalidRuleSpec::new(&shown, format!("unreadable: {err}")))?;
        let rules = Self::from_json_str(&text)?;
        tracing::info!(path = %shown, entries = rules.len(), "rule file loaded");
        Ok(rules)
    }

    pub fn from_json_str(text: &str) -> Result<Self, InvalidRuleSpec> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| InvalidRuleSpec::new("$", format!("invalid JSON: {err}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(document: &Value) -> Result<Self, InvalidRuleSpec> {
        let mut set = Self::empty();
        for (contract, functions) in object(document, "$")? {
            for (function, types) in object(functions, contract)? {
                let at = format!("{contract}.{function}");
                for (type_name, entry) in object(types, &at)? {
                    let at = format!("{at}.{type_name}");
                    let rules = parse_entry(type_name, entry, &at)?;
                    set.contracts.insert(contract.clone());
                    set.functions.insert((contract.clone(), function.clone()));
                    set.entries.insert(
                        RuleKey {
                            contract: contract.clone(),
                            function: function.clone(),
                            type_name: type_name.clone(),
                        },
                        rules,
                    );
                }
            }
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rules for `ty` in `function` of `contract`.
    ///
    /// Contract resolves to an exact match, else `*`; function likewise inside it; the type
    /// must match exactly (canonical name or alias). If the exact contract yields nothing the
    /// lookup is retried under contract `*`.
    pub fn lookup(&self, contract: &str, function: &str, ty: &AbiType) -> Option<&TypeRules> {
        let names = ty.rule_names();
        self.resolve(contract, function, &names)
            .or_else(|| self.resolve(WILDCARD, function, &names))
    }

    fn resolve(&self, contract: &str, function: &str, names: &[String]) -> Option<&TypeRules> {
        let contract = if self.contracts.contains(contract) {
            contract
        } else if self.contracts.contains(WILDCARD) {
            WILDCARD
        } else {
            return None;
        };
        let has = |f: &str| self.functions.contains(&(contract.to_string(), f.to_string()));
        let function = if has(function) {
            function
        } else if has(WILDCARD) {
            WILDCARD
        } else {
            return None;
        };
        names.iter().find_map(|name| {
            self.entries.get(&RuleKey {
                contract: contract.to_string(),
                function: function.to_string(),
                type_name: name.clone(),
            })
        })
    }
}

fn object<'a>(value: &'a Value, at: &str) -> Result<&'a Map<String, Value>, InvalidRuleSpec> {
    value
        .as_object()
        .ok_or_else(|| InvalidRuleSpec::new(at, "expected an object"))
}

fn parse_entry(type_name: &str, entry: &Value, at: &str) -> Result<TypeRules, InvalidRuleSpec> {
    let ty = AbiType::parse(type_name).map_err(|err| InvalidRuleSpec::new(at, err.to_string()))?;
    let entry = object(entry, at)?;
    let raw_rules = entry
        .get("rules")
        .ok_or_else(|| InvalidRuleSpec::new(at, "types must define rules when declared"))?
        .as_array()
        .ok_or_else(|| InvalidRuleSpec::new(format!("{at}.rules"), "expected an array"))?;

    let selection = match entry.get("selector") {
        None | Some(Value::Null) => Selection::All,
        Some(selector) => {
            let path = format!("{at}.selector");
            let kind = object(selector, &path)?
                .get("selector-type")
                .and_then(Value::as_str)
                .ok_or_else(|| InvalidRuleSpec::new(&path, "missing `selector-type`"))?;
            match kind {
                "all" => Selection::All,
                "first" => Selection::First,
                other => {
                    return Err(InvalidRuleSpec::new(
                        path,
                        format!("unknown selector type `{other}`"),
                    ))
                }
            }
        }
    };

    let rules = raw_rules
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_rule(&ty, raw, &format!("{at}.rules[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TypeRules {
        ty,
        rules,
        selection,
    })
}

fn parse_rule(ty: &AbiType, raw: &Value, at: &str) -> Result<Rule, InvalidRuleSpec> {
    let rule = object(raw, at)?;
    let rule_type = rule
        .get("rule-type")
        .and_then(Value::as_str)
        .ok_or_else(|| InvalidRuleSpec::new(at, "missing `rule-type`"))?;

    let param = |name: &str| -> Result<Literal, InvalidRuleSpec> {
        let path = format!("{at}.{name}");
        let text = match rule.get(name) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => return Err(InvalidRuleSpec::new(path, "expected a number or string")),
            None => {
                return Err(InvalidRuleSpec::new(
                    path,
                    format!("`{rule_type}` requires `{name}`"),
                ))
            }
        };
        Ok(Literal::new(text))
    };

    let parts: Vec<(ConstraintKind, Literal)> = match rule_type {
        "limits" => vec![
            (ConstraintKind::GreaterOrEqual, param("min")?),
            (ConstraintKind::LessOrEqual, param("max")?),
        ],
        "constant" => vec![(ConstraintKind::Equal, param("value")?)],
        "not-equal" => vec![(ConstraintKind::NotEqual, param("value")?)],
        "greater-than" => vec![(ConstraintKind::GreaterThan, param("min")?)],
        "greater-than-equal" => vec![(ConstraintKind::GreaterOrEqual, param("min")?)],
        "less-than" => vec![(ConstraintKind::LessThan, param("max")?)],
        "less-than-equal" => vec![(ConstraintKind::LessOrEqual, param("max")?)],
        other => {
            return Err(InvalidRuleSpec::new(
                at,
                format!("unknown rule type `{other}`"),
            ))
        }
    };

    let mut constraints = Vec::with_capacity(parts.len());
    for (kind, literal) in parts {
        if !accepts(ty.kind(), kind) {
            return Err(InvalidRuleSpec::new(
                at,
                format!("`{rule_type}` does not apply to {} `{ty}`", ty.kind().as_str()),
            ));
        }
        let value = Scalar::parse_literal(&literal.text, None, ty.decimals())
            .map_err(|err| InvalidRuleSpec::new(at, err.to_string()))?;
        if !NumericDomain::bounded(ty).is_legal(value) {
            return Err(InvalidRuleSpec::new(
                at,
                format!("{} is outside the range of `{ty}`", literal.text),
            ));
        }
        constraints.push(Constraint::from_rule(kind, literal, rule_type));
    }
    Ok(Rule {
        rule_type: rule_type.to_string(),
        constraints,
    })
}
