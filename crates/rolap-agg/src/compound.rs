//! Compound predicates: "any of these tuples" constraints built from aggregation lists.
//!
//! Tuples are grouped by the set of columns they constrain. Each group becomes an OR of
//! per-tuple ANDs, and the groups are OR-ed together. Keeping the groups around lets SQL
//! generation render a group whose tuples share their columns as a multi-column `IN` list.
use crate::predicate::{PredicateColumn, StarPredicate};
use crate::star::StarColumn;
use crate::value::Value;
use rolap_schema::BitKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tuples that constrain exactly the same columns.
#[derive(Clone, Debug)]
pub struct CompoundGroup {
    bitkey: BitKey,
    columns: Vec<Arc<StarColumn>>,
    tuples: Vec<Vec<Value>>,
}

impl CompoundGroup {
    pub fn bitkey(&self) -> &BitKey {
        &self.bitkey
    }

    /// The group's columns, in bit order.
    pub fn columns(&self) -> &[Arc<StarColumn>] {
        &self.columns
    }

    /// One value per column for every distinct tuple, in first-appearance order.
    pub fn tuples(&self) -> &[Vec<Value>] {
        &self.tuples
    }

    pub fn predicate(&self) -> StarPredicate {
        StarPredicate::or(
            self.tuples
                .iter()
                .map(|tuple| {
                    StarPredicate::and(
                        self.columns
                            .iter()
                            .zip(tuple)
                            .map(|(column, value)| StarPredicate::equals(column, value.clone()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn in_list(&self) -> InListPredicate {
        InListPredicate {
            columns: self.columns.iter().map(|c| c.as_ref().into()).collect(),
            rows: self.tuples.clone(),
        }
    }
}

/// `(a, b) IN ((1, 2), (3, 4))`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InListPredicate {
    pub columns: Vec<PredicateColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl fmt::Display for InListPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.qualified_name.as_str())
            .collect();
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                if values.len() == 1 {
                    values.join("")
                } else {
                    format!("({})", values.join(", "))
                }
            })
            .collect();
        if names.len() == 1 {
            write!(f, "{} IN ({})", names[0], rows.join(", "))
        } else {
            write!(f, "({}) IN ({})", names.join(", "), rows.join(", "))
        }
    }
}

/// The combined constraint of one aggregation list.
#[derive(Clone, Debug)]
pub struct CompoundPredicate {
    bitkey: BitKey,
    groups: Vec<CompoundGroup>,
    predicate: Arc<StarPredicate>,
    unsatisfiable_tuples: usize,
}

impl CompoundPredicate {
    /// Group resolved tuples. `None` entries are unsatisfiable tuples; every `Some` holds
    /// `(column, value)` pairs in bit order with at least one pair. Returns `None` when no
    /// tuple is satisfiable.
    pub(crate) fn from_tuples(
        tuples: impl IntoIterator<Item = Option<Vec<(Arc<StarColumn>, Value)>>>,
    ) -> Option<Self> {
        let mut groups: Vec<CompoundGroup> = Vec::new();
        let mut index: HashMap<BitKey, usize> = HashMap::new();
        let mut unsatisfiable_tuples = 0;

        for tuple in tuples {
            let Some(tuple) = tuple.filter(|t| !t.is_empty()) else {
                unsatisfiable_tuples += 1;
                continue;
            };
            let bitkey = BitKey::from_positions(tuple.iter().map(|(c, _)| c.bit_position()));
            let values: Vec<Value> = tuple.iter().map(|(_, v)| v.clone()).collect();
            match index.get(&bitkey) {
                Some(&i) => {
                    let group = &mut groups[i];
                    if !group.tuples.contains(&values) {
                        group.tuples.push(values);
                    }
                }
                None => {
                    index.insert(bitkey.clone(), groups.len());
                    groups.push(CompoundGroup {
                        bitkey,
                        columns: tuple.into_iter().map(|(c, _)| c).collect(),
                        tuples: vec![values],
                    });
                }
            }
        }

        if groups.is_empty() {
            return None;
        }
        let mut bitkey = BitKey::new();
        for group in &groups {
            bitkey.or_inplace(&group.bitkey);
        }
        let predicate = Arc::new(StarPredicate::or(
            groups.iter().map(CompoundGroup::predicate).collect(),
        ));
        Some(Self {
            bitkey,
            groups,
            predicate,
            unsatisfiable_tuples,
        })
    }

    /// Union of the groups' column sets.
    pub fn bitkey(&self) -> &BitKey {
        &self.bitkey
    }

    pub fn groups(&self) -> &[CompoundGroup] {
        &self.groups
    }

    pub fn predicate(&self) -> &Arc<StarPredicate> {
        &self.predicate
    }

    pub fn unsatisfiable_tuples(&self) -> usize {
        self.unsatisfiable_tuples
    }

    /// Number of distinct satisfiable tuples.
    pub fn tuple_count(&self) -> usize {
        self.groups.iter().map(|g| g.tuples.len()).sum()
    }
}
