//! Category rule sets.
//!
//! A rule set is an ordered mapping from a new category name to a boolean
//! expression over the original tags of a grouping column. Rules are parsed
//! once, then compiled against the tag universe of the data they will be
//! evaluated on.

pub mod expr;

pub use expr::{Compiled, Expr, SyntaxError};

use crate::error::{DashError, Result};
use crate::models::UnknownTagPolicy;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// One category definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    /// Label assigned to matching entities.
    pub name: String,
    /// Expression text as written in the configuration.
    pub expression: String,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// Parse the expression, naming this rule on failure.
    pub fn parse(&self) -> Result<Expr> {
        Expr::parse(&self.expression).map_err(|e| DashError::RuleSyntax {
            rule: self.name.clone(),
            text: self.expression.clone(),
            message: e.to_string(),
        })
    }

    /// Parse and resolve tag literals against `universe`.
    pub fn compile(&self, universe: &[String], policy: UnknownTagPolicy) -> Result<CompiledRule> {
        let expr = self.parse()?;
        let index: HashMap<&str, usize> = universe
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.as_str(), i))
            .collect();

        let program = lower(&expr, &index, universe.len(), policy, &self.name)?;
        Ok(CompiledRule {
            name: self.name.clone(),
            program,
        })
    }
}

fn lower(
    expr: &Expr,
    index: &HashMap<&str, usize>,
    width: usize,
    policy: UnknownTagPolicy,
    rule: &str,
) -> Result<Compiled> {
    let lowered = match expr {
        Expr::Tag(name) => match index.get(name.as_str()) {
            Some(&i) => Compiled::Var(i),
            None => match policy {
                UnknownTagPolicy::Error => {
                    return Err(DashError::UnknownTag {
                        rule: rule.to_string(),
                        tag: name.clone(),
                    })
                }
                UnknownTagPolicy::Ignore => {
                    debug!("Rule '{}': tag '{}' never occurs, treating as absent", rule, name);
                    Compiled::Const(false)
                }
            },
        },
        Expr::Not(inner) => Compiled::Not(Box::new(lower(inner, index, width, policy, rule)?)),
        Expr::And(lhs, rhs) => Compiled::And(
            Box::new(lower(lhs, index, width, policy, rule)?),
            Box::new(lower(rhs, index, width, policy, rule)?),
        ),
        Expr::Or(lhs, rhs) => Compiled::Or(
            Box::new(lower(lhs, index, width, policy, rule)?),
            Box::new(lower(rhs, index, width, policy, rule)?),
        ),
        Expr::Only(inner) => {
            let mentioned = inner.mentioned_tags();
            let mut unmentioned = vec![true; width];
            for tag in &mentioned {
                if let Some(&i) = index.get(tag) {
                    unmentioned[i] = false;
                }
            }
            let others = Compiled::any_of(
                unmentioned
                    .iter()
                    .enumerate()
                    .filter(|(_, keep)| **keep)
                    .map(|(i, _)| i),
            );
            Compiled::And(
                Box::new(lower(inner, index, width, policy, rule)?),
                Box::new(Compiled::Not(Box::new(others))),
            )
        }
    };
    Ok(lowered)
}

/// A rule ready to be evaluated against membership vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub name: String,
    program: Compiled,
}

impl CompiledRule {
    pub fn matches(&self, membership: &[bool]) -> bool {
        self.program.eval(membership)
    }
}

/// Ordered collection of category rules for one grouping column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; later rules win over earlier ones.
    pub fn push(&mut self, rule: CategoryRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Category names in declaration order.
    pub fn category_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name.clone()).collect()
    }

    /// Check that every expression parses.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            rule.parse()?;
        }
        Ok(())
    }

    /// Compile every rule against `universe`, keeping declaration order.
    pub fn compile(&self, universe: &[String], policy: UnknownTagPolicy) -> Result<Vec<CompiledRule>> {
        self.rules
            .iter()
            .map(|rule| rule.compile(universe, policy))
            .collect()
    }
}

impl From<IndexMap<String, String>> for RuleSet {
    fn from(map: IndexMap<String, String>) -> Self {
        Self {
            rules: map
                .iter()
                .map(|(name, expr)| CategoryRule::new(name, expr.clone()))
                .collect(),
        }
    }
}

impl From<RuleSet> for IndexMap<String, String> {
    fn from(set: RuleSet) -> Self {
        set.rules
            .into_iter()
            .map(|rule| (rule.name, rule.expression))
            .collect()
    }
}

impl FromIterator<CategoryRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = CategoryRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Where the labels of one rule set are read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingTarget {
    /// Column whose tags the rules are evaluated over.
    pub source_column: String,
    /// Column that receives the labels.
    pub output_column: String,
}

impl GroupingTarget {
    /// Parse a rule-set key.
    ///
    /// `"Research Topics"` relabels that column in place;
    /// `"Broad Topics [Research Topics]"` writes labels derived from
    /// `Research Topics` into a new `Broad Topics` column.
    pub fn parse(key: &str) -> Result<Self> {
        static RENAME: OnceLock<Regex> = OnceLock::new();
        let rename = RENAME.get_or_init(|| {
            Regex::new(r"^(.*?)\s\[([^\[\]]+)\]$").expect("rename pattern is valid")
        });

        if key.matches('[').count() > 1 {
            return Err(DashError::Config(format!(
                "new category key '{}' cannot have multiple sets of brackets",
                key
            )));
        }

        match rename.captures(key) {
            Some(caps) => Ok(Self {
                output_column: caps[1].to_string(),
                source_column: caps[2].to_string(),
            }),
            None => Ok(Self {
                source_column: key.to_string(),
                output_column: key.to_string(),
            }),
        }
    }

    pub fn is_rename(&self) -> bool {
        self.source_column != self.output_column
    }
}
