use crate::star::StarColumn;
use crate::value::Value;
use rolap_schema::BitKey;
use std::fmt;

/// The column side of a predicate: its bit in the star and its qualified name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateColumn {
    pub bit_position: usize,
    pub qualified_name: String,
}

impl From<&StarColumn> for PredicateColumn {
    fn from(column: &StarColumn) -> Self {
        Self {
            bit_position: column.bit_position(),
            qualified_name: column.qualified_name(),
        }
    }
}

/// A constraint over star columns that is handed to SQL generation as structure, never as
/// text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StarPredicate {
    Equals { column: PredicateColumn, value: Value },
    And(Vec<StarPredicate>),
    Or(Vec<StarPredicate>),
}

impl StarPredicate {
    pub fn equals(column: &StarColumn, value: Value) -> Self {
        StarPredicate::Equals {
            column: column.into(),
            value,
        }
    }

    /// Conjunction of `parts`; nested conjunctions are flattened and a single part is
    /// returned as is.
    pub fn and(parts: Vec<StarPredicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StarPredicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        StarPredicate::And(flat)
    }

    /// Disjunction of `parts`, flattened like [`StarPredicate::and`].
    pub fn or(parts: Vec<StarPredicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StarPredicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        StarPredicate::Or(flat)
    }

    /// The same predicate with the children of every `And`/`Or` sorted and deduplicated, so
    /// that predicates differing only in operand order compare equal.
    pub fn canonical(&self) -> StarPredicate {
        match self {
            StarPredicate::Equals { .. } => self.clone(),
            StarPredicate::And(parts) => StarPredicate::and(canonical_parts(parts)),
            StarPredicate::Or(parts) => StarPredicate::or(canonical_parts(parts)),
        }
    }

    /// Bits of every column the predicate mentions.
    pub fn constrained_columns(&self) -> BitKey {
        let mut key = BitKey::new();
        self.collect_columns(&mut key);
        key
    }

    fn collect_columns(&self, key: &mut BitKey) {
        match self {
            StarPredicate::Equals { column, .. } => key.set(column.bit_position),
            StarPredicate::And(parts) | StarPredicate::Or(parts) => {
                for part in parts {
                    part.collect_columns(key);
                }
            }
        }
    }

    /// Evaluate against a row; `lookup` maps a bit position to the row's value, if any.
    /// An empty `And` is true and an empty `Or` is false.
    pub fn evaluate<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(usize) -> Option<&'a Value>,
    {
        match self {
            StarPredicate::Equals { column, value } => lookup(column.bit_position) == Some(value),
            StarPredicate::And(parts) => parts.iter().all(|p| p.evaluate(lookup)),
            StarPredicate::Or(parts) => parts.iter().any(|p| p.evaluate(lookup)),
        }
    }
}

impl fmt::Display for StarPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarPredicate::Equals { column, value } => {
                write!(f, "{} = {}", column.qualified_name, value)
            }
            StarPredicate::And(parts) => write_joined(f, parts, "AND"),
            StarPredicate::Or(parts) => write_joined(f, parts, "OR"),
        }
    }
}

fn canonical_parts(parts: &[StarPredicate]) -> Vec<StarPredicate> {
    let mut parts: Vec<StarPredicate> = parts.iter().map(StarPredicate::canonical).collect();
    parts.sort();
    parts.dedup();
    parts
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[StarPredicate], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn eq(bit: usize, name: &str, value: &str) -> StarPredicate {
        StarPredicate::Equals {
            column: PredicateColumn {
                bit_position: bit,
                qualified_name: name.to_string(),
            },
            value: value.into(),
        }
    }

    #[test]
    fn builders_flatten_and_collapse() {
        let single = StarPredicate::and(vec![eq(0, "t.a", "x")]);
        assert_eq!(single, eq(0, "t.a", "x"));

        let nested = StarPredicate::or(vec![
            StarPredicate::or(vec![eq(0, "t.a", "x"), eq(0, "t.a", "y")]),
            eq(0, "t.a", "z"),
        ]);
        assert_eq!(
            nested,
            StarPredicate::Or(vec![eq(0, "t.a", "x"), eq(0, "t.a", "y"), eq(0, "t.a", "z")])
        );
    }

    #[test]
    fn columns_evaluation_and_display() {
        let pred = StarPredicate::or(vec![
            StarPredicate::and(vec![eq(0, "t.a", "x"), eq(3, "t.b", "it's")]),
            eq(0, "t.a", "y"),
        ]);
        assert_eq!(pred.constrained_columns(), BitKey::from_positions([0, 3]));
        assert_eq!(pred.to_string(), "((t.a = 'x' AND t.b = 'it''s') OR t.a = 'y')");

        let row: HashMap<usize, Value> = HashMap::from([(0, "y".into()), (3, "q".into())]);
        assert!(pred.evaluate(&|bit: usize| row.get(&bit)));
        let row: HashMap<usize, Value> = HashMap::from([(0, "x".into()), (3, "q".into())]);
        assert!(!pred.evaluate(&|bit: usize| row.get(&bit)));
    }

    #[test]
    fn canonical_form_ignores_operand_order() {
        let ca_m = StarPredicate::and(vec![eq(0, "t.a", "M"), eq(3, "t.b", "CA")]);
        let ca_f = StarPredicate::and(vec![eq(3, "t.b", "CA"), eq(0, "t.a", "F")]);
        let forward = StarPredicate::or(vec![ca_m.clone(), ca_f.clone()]);
        let backward = StarPredicate::or(vec![ca_f.clone(), ca_m.clone(), ca_f]);
        assert_ne!(forward, backward);
        assert_eq!(forward.canonical(), backward.canonical());
        assert_eq!(
            backward.canonical().to_string(),
            "((t.a = 'F' AND t.b = 'CA') OR (t.a = 'M' AND t.b = 'CA'))"
        );

        // Duplicates can leave a single operand behind.
        let twice = StarPredicate::Or(vec![eq(0, "t.a", "x"), eq(0, "t.a", "x")]);
        assert_eq!(twice.canonical(), eq(0, "t.a", "x"));
        assert_eq!(StarPredicate::Or(Vec::new()).canonical(), StarPredicate::Or(Vec::new()));
    }
}
