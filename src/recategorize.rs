//! Disjoint recategorization of multi-tag entities.
//!
//! Exploded data carries one row per (entity, tag). This module rebuilds
//! each entity's tag set as a boolean membership vector and assigns every
//! entity exactly one label: the label of the last matching rule, else its
//! single tag (unless single categories are combined), else `"Other"`.

use crate::data::{Dataset, Value};
use crate::error::{DashError, Result};
use crate::models::{LabelCount, UnknownTagPolicy, OTHER_LABEL};
use crate::rules::{GroupingTarget, RuleSet};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Options controlling label assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecategorizeOptions {
    /// Send single-tag entities that match no rule to `"Other"` instead of
    /// labeling them with their own tag.
    pub combine_single_categories: bool,
    /// Handling of rule tags that never occur in the data.
    pub unknown_tags: UnknownTagPolicy,
}

/// Which tags each entity carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipMatrix {
    ids: Vec<String>,
    tags: Vec<String>,
    cells: Vec<Vec<bool>>,
}

impl MembershipMatrix {
    /// Build from (id, tag) pairs; `None` registers an id without a tag.
    ///
    /// Ids keep first-appearance order and tags are sorted, so results are
    /// deterministic. A pair seen twice is a consistency error.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut ids: Vec<String> = Vec::new();
        let mut id_index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashSet<(usize, String)> = HashSet::new();
        let mut duplicated: BTreeSet<String> = BTreeSet::new();
        let mut tag_set: BTreeSet<String> = BTreeSet::new();

        let mut memberships: Vec<(usize, String)> = Vec::new();
        for (id, tag) in pairs {
            let row = *id_index.entry(id.clone()).or_insert_with(|| {
                ids.push(id.clone());
                ids.len() - 1
            });
            if let Some(tag) = tag {
                if !seen.insert((row, tag.clone())) {
                    duplicated.insert(id);
                    continue;
                }
                tag_set.insert(tag.clone());
                memberships.push((row, tag));
            }
        }

        if !duplicated.is_empty() {
            return Err(DashError::consistency_with_ids(
                "categorization cannot proceed: a tag shows up multiple times for a single id",
                duplicated.into_iter().collect(),
            ));
        }

        let tags: Vec<String> = tag_set.into_iter().collect();
        let tag_index: HashMap<&str, usize> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut cells = vec![vec![false; tags.len()]; ids.len()];
        for (row, tag) in &memberships {
            cells[*row][tag_index[tag.as_str()]] = true;
        }

        Ok(Self { ids, tags, cells })
    }

    /// Build from an exploded dataset.
    ///
    /// `context_columns` are the other exploded columns: rows that repeat an
    /// (id, tag) pair while differing in a context column are artifacts of
    /// exploding several columns and are merged. Rows identical in id, tag
    /// and every context column are a consistency error.
    pub fn from_dataset(
        data: &Dataset,
        id_column: &str,
        tag_column: &str,
        context_columns: &[String],
    ) -> Result<Self> {
        let id_idx = data.column_index(id_column)?;
        let tag_idx = data.column_index(tag_column)?;
        let context_idx = context_columns
            .iter()
            .map(|c| data.column_index(c))
            .collect::<Result<Vec<_>>>()?;

        let mut seen: HashSet<(String, String, Vec<String>)> = HashSet::new();
        let mut duplicated: BTreeSet<String> = BTreeSet::new();
        let mut pairs: Vec<(String, Option<String>)> = Vec::with_capacity(data.len());
        let mut pair_seen: HashSet<(String, String)> = HashSet::new();

        for row in data.rows() {
            let id = row[id_idx].key();
            let tag = match &row[tag_idx] {
                Value::Missing => {
                    pairs.push((id, None));
                    continue;
                }
                value => value.key(),
            };

            let context: Vec<String> = context_idx.iter().map(|&i| row[i].key()).collect();
            if !seen.insert((id.clone(), tag.clone(), context)) {
                duplicated.insert(id);
                continue;
            }
            if pair_seen.insert((id.clone(), tag.clone())) {
                pairs.push((id, Some(tag)));
            }
        }

        if !duplicated.is_empty() {
            return Err(DashError::consistency_with_ids(
                format!(
                    "categorization cannot proceed: a '{}' value shows up multiple times for a single id",
                    tag_column
                ),
                duplicated.into_iter().collect(),
            ));
        }

        Self::from_pairs(pairs)
    }

    /// Entity ids, one per row.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Tag universe, one per column.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Membership vector of the `i`th entity.
    pub fn row(&self, i: usize) -> &[bool] {
        &self.cells[i]
    }

    /// Number of tags carried by each entity.
    pub fn tags_per_id(&self) -> Vec<usize> {
        self.cells
            .iter()
            .map(|row| row.iter().filter(|&&b| b).count())
            .collect()
    }

    pub fn contains(&self, id: &str, tag: &str) -> bool {
        let row = self.ids.iter().position(|i| i == id);
        let col = self.tags.iter().position(|t| t == tag);
        matches!((row, col), (Some(r), Some(c)) if self.cells[r][c])
    }
}

/// One label per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recategorization {
    ids: Vec<String>,
    labels: Vec<String>,
}

impl Recategorization {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn label_of(&self, id: &str) -> Option<&str> {
        self.ids
            .iter()
            .position(|i| i == id)
            .map(|i| self.labels[i].as_str())
    }

    /// (id, label) pairs in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().map(String::as_str))
    }

    /// Entities per label, most common first.
    pub fn label_counts(&self) -> Vec<LabelCount> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_default() += 1;
        }

        let mut counts: Vec<LabelCount> = counts
            .into_iter()
            .map(|(label, entities)| LabelCount {
                label: label.to_string(),
                entities,
            })
            .collect();
        counts.sort_by(|a, b| b.entities.cmp(&a.entities).then_with(|| a.label.cmp(&b.label)));
        counts
    }

    fn lookup(&self) -> HashMap<&str, &str> {
        self.iter().collect()
    }
}

/// Assign one label per entity.
///
/// Rules run in declaration order and a later match overwrites an earlier
/// one, including the single-tag default.
pub fn recategorize(
    matrix: &MembershipMatrix,
    rules: &RuleSet,
    options: RecategorizeOptions,
) -> Result<Recategorization> {
    let compiled = rules.compile(matrix.tags(), options.unknown_tags)?;
    let mut labels = vec![OTHER_LABEL.to_string(); matrix.ids().len()];

    if !options.combine_single_categories {
        for (i, n_tags) in matrix.tags_per_id().into_iter().enumerate() {
            if n_tags != 1 {
                continue;
            }
            if let Some(col) = matrix.row(i).iter().position(|&b| b) {
                labels[i] = matrix.tags()[col].clone();
            }
        }
    }

    for rule in &compiled {
        let mut matched = 0usize;
        for (i, label) in labels.iter_mut().enumerate() {
            if rule.matches(matrix.row(i)) {
                *label = rule.name.clone();
                matched += 1;
            }
        }
        debug!("Rule '{}' matched {} entities", rule.name, matched);
    }

    Ok(Recategorization {
        ids: matrix.ids().to_vec(),
        labels,
    })
}

/// Label every entity of `data` by the rules for one grouping column.
pub fn label_entities(
    data: &Dataset,
    id_column: &str,
    target: &GroupingTarget,
    rules: &RuleSet,
    context_columns: &[String],
    options: RecategorizeOptions,
) -> Result<Recategorization> {
    let matrix =
        MembershipMatrix::from_dataset(data, id_column, &target.source_column, context_columns)?;
    let labels = recategorize(&matrix, rules, options)?;
    debug!(
        "Recategorized '{}' into '{}': {} entities, {} labels",
        target.source_column,
        target.output_column,
        labels.len(),
        labels.label_counts().len()
    );
    Ok(labels)
}

/// Recategorize one grouping column of an exploded dataset.
///
/// Every input row is kept; the output column holds the entity's label.
pub fn recategorize_column(
    data: &Dataset,
    id_column: &str,
    target: &GroupingTarget,
    rules: &RuleSet,
    context_columns: &[String],
    options: RecategorizeOptions,
) -> Result<(Dataset, Recategorization)> {
    let labels = label_entities(data, id_column, target, rules, context_columns, options)?;
    let relabeled = apply_labels(data, id_column, &target.output_column, &labels)?;
    Ok((relabeled, labels))
}

fn apply_labels(
    data: &Dataset,
    id_column: &str,
    output_column: &str,
    labels: &Recategorization,
) -> Result<Dataset> {
    let lookup = labels.lookup();
    let values = data
        .column_values(id_column)?
        .into_iter()
        .map(|id| {
            lookup
                .get(id.key().as_str())
                .map(|label| Value::text(*label))
                .unwrap_or(Value::Missing)
        })
        .collect();
    data.with_column(output_column, values)
}

/// Apply every configured rule set to an exploded dataset.
///
/// Membership is always computed from the input, so relabeling one column
/// never changes how another is recategorized. Returns the relabeled data
/// and the per-output-column recategorization.
pub fn recategorize_dataset(
    data: &Dataset,
    id_column: &str,
    new_categories: &IndexMap<String, RuleSet>,
    exploded_columns: &[String],
    options: RecategorizeOptions,
) -> Result<(Dataset, IndexMap<String, Recategorization>)> {
    let mut out = data.clone();
    let mut results = IndexMap::new();

    for (key, rules) in new_categories.iter() {
        let target = GroupingTarget::parse(key)?;
        let context: Vec<String> = exploded_columns
            .iter()
            .filter(|c| **c != target.source_column && data.has_column(c))
            .cloned()
            .collect();

        let labels = label_entities(data, id_column, &target, rules, &context, options)?;
        out = apply_labels(&out, id_column, &target.output_column, &labels)?;
        results.insert(target.output_column, labels);
    }

    Ok((out, results))
}
