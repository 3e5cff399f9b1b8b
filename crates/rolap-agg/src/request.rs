//! Translating a coordinate (one member per hierarchy, measure first) into a [`CellRequest`].
use crate::compound::CompoundPredicate;
use crate::config::UnrelatedDimensionPolicy;
use crate::error::{AggError, AggResult};
use crate::measure_group::MeasureGroup;
use crate::olap::{Cube, Level, Member, MemberKind};
use crate::predicate::StarPredicate;
use crate::segment::AggregationKey;
use crate::star::StarColumn;
use crate::value::Value;
use rolap_schema::BitKey;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A constraint that is not a plain column equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompoundConstraint {
    pub bitkey: BitKey,
    pub predicate: Arc<StarPredicate>,
}

/// The column constraints of one coordinate against one star.
///
/// Columns map to a required value, or to `None` for columns that are selected but do not
/// constrain (drill-through detail columns).
#[derive(Clone, Debug)]
pub struct CellRequest {
    star: Arc<str>,
    measure: Arc<StarColumn>,
    columns: BTreeMap<usize, (Arc<StarColumn>, Option<Value>)>,
    constrained: BitKey,
    compound: Vec<CompoundConstraint>,
    drill_through: bool,
    select_list: Vec<Arc<StarColumn>>,
}

impl CellRequest {
    pub(crate) fn new(star: Arc<str>, measure: Arc<StarColumn>, drill_through: bool) -> Self {
        Self {
            star,
            measure,
            columns: BTreeMap::new(),
            constrained: BitKey::new(),
            compound: Vec::new(),
            drill_through,
            select_list: Vec::new(),
        }
    }

    pub fn star_name(&self) -> &str {
        &self.star
    }

    pub fn measure(&self) -> &Arc<StarColumn> {
        &self.measure
    }

    /// Add a column constraint. Returns `false`, leaving the request unchanged, when the
    /// column is already constrained to a different value.
    pub fn add_constrained_column(&mut self, column: &Arc<StarColumn>, value: Option<Value>) -> bool {
        let bit = column.bit_position();
        match self.columns.get_mut(&bit) {
            Some((_, Some(existing))) => {
                if let Some(value) = value {
                    if *existing != value {
                        return false;
                    }
                }
            }
            Some((_, slot @ None)) => {
                if value.is_some() {
                    *slot = value;
                    self.constrained.set(bit);
                }
            }
            None => {
                if value.is_some() {
                    self.constrained.set(bit);
                }
                self.columns.insert(bit, (column.clone(), value));
            }
        }
        true
    }

    /// Add a compound constraint in canonical form. Constraints are kept sorted and
    /// deduplicated, so the aggregation key does not depend on tuple or list order.
    pub fn add_compound(&mut self, bitkey: BitKey, predicate: Arc<StarPredicate>) {
        let canonical = predicate.canonical();
        let predicate = if canonical == *predicate {
            predicate
        } else {
            Arc::new(canonical)
        };
        match self
            .compound
            .binary_search_by(|c| c.predicate.as_ref().cmp(predicate.as_ref()))
        {
            Ok(_) => {}
            Err(at) => self
                .compound
                .insert(at, CompoundConstraint { bitkey, predicate }),
        }
    }

    /// Append to the drill-through select list. Level columns are also recorded as
    /// non-constraining columns.
    pub(crate) fn select(&mut self, column: &Arc<StarColumn>) {
        let bit = column.bit_position();
        if self.select_list.iter().any(|c| c.bit_position() == bit) {
            return;
        }
        if !column.is_measure() {
            self.add_constrained_column(column, None);
        }
        self.select_list.push(column.clone());
    }

    pub fn constrained_columns(&self) -> &BitKey {
        &self.constrained
    }

    /// Every column of the request in bit order, with its value if it constrains.
    pub fn columns(&self) -> impl Iterator<Item = (&Arc<StarColumn>, Option<&Value>)> {
        self.columns.values().map(|(c, v)| (c, v.as_ref()))
    }

    pub fn value_of(&self, bit_position: usize) -> Option<&Value> {
        self.columns
            .get(&bit_position)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Values of the constraining columns, in bit order.
    pub fn coordinates(&self) -> Vec<Value> {
        self.columns
            .values()
            .filter_map(|(_, v)| v.clone())
            .collect()
    }

    pub fn compound_constraints(&self) -> &[CompoundConstraint] {
        &self.compound
    }

    pub fn is_drill_through(&self) -> bool {
        self.drill_through
    }

    /// Columns a drill-through query selects, in output order; the measure comes last.
    pub fn drill_through_columns(&self) -> &[Arc<StarColumn>] {
        &self.select_list
    }

    /// Plain constraints and compound constraints combined into one predicate.
    pub fn to_predicate(&self) -> StarPredicate {
        let mut parts: Vec<StarPredicate> = self
            .columns
            .values()
            .filter_map(|(c, v)| v.as_ref().map(|v| StarPredicate::equals(c, v.clone())))
            .collect();
        parts.extend(self.compound.iter().map(|c| (*c.predicate).clone()));
        StarPredicate::and(parts)
    }

    pub fn aggregation_key(&self) -> AggregationKey {
        AggregationKey::new(
            self.star.clone(),
            self.constrained.clone(),
            self.compound.iter().map(|c| c.predicate.clone()).collect(),
        )
    }
}

enum Resolution {
    Columns(Vec<(Arc<StarColumn>, Value)>),
    NoConstraint,
    Unsatisfiable,
}

/// Builds requests for coordinates of one cube.
///
/// The unrelated-dimension policy defaults to the star's configuration and can be
/// overridden per builder.
#[derive(Clone, Copy, Debug)]
pub struct CellRequestBuilder<'a> {
    cube: &'a Cube,
    policy: Option<UnrelatedDimensionPolicy>,
}

impl<'a> CellRequestBuilder<'a> {
    pub fn new(cube: &'a Cube) -> Self {
        Self { cube, policy: None }
    }

    pub fn with_policy(mut self, policy: UnrelatedDimensionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the request for `members`, whose first member must be a stored measure.
    ///
    /// Returns `Ok(None)` when the coordinate cannot have data: a calculated measure, a null
    /// or calculated member, conflicting keys, or (under the strict policy) a member of a
    /// dimension that does not link to the measure's fact table.
    pub fn make_request(&self, members: &[Member]) -> AggResult<Option<CellRequest>> {
        let Some((group, measure)) = self.resolve_measure(members)? else {
            return Ok(None);
        };
        let policy = self.policy_for(&group);
        let mut request = CellRequest::new(group.star().name_arc().clone(), measure, false);
        for member in &members[1..] {
            match self.member_constraints(&group, member, policy)? {
                Resolution::Unsatisfiable => return Ok(None),
                Resolution::NoConstraint => {}
                Resolution::Columns(columns) => {
                    for (column, value) in columns {
                        if !request.add_constrained_column(&column, Some(value)) {
                            return Ok(None);
                        }
                    }
                }
            }
        }
        Ok(Some(request))
    }

    /// Group the tuples of an aggregation list by the columns they constrain.
    ///
    /// Returns `Ok(None)` when the list is empty or no tuple is satisfiable. A tuple that
    /// constrains no column is unsatisfiable.
    pub fn make_compound_group(
        &self,
        group: &MeasureGroup,
        tuples: &[Vec<Member>],
    ) -> AggResult<Option<CompoundPredicate>> {
        let policy = self.policy_for(group);
        let mut resolved = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            resolved.push(self.tuple_constraints(group, tuple, policy)?);
        }
        Ok(CompoundPredicate::from_tuples(resolved))
    }

    /// [`Self::make_request`] plus one compound constraint per aggregation list. Any list
    /// without a satisfiable tuple makes the whole request unsatisfiable.
    pub fn make_request_with_aggregates(
        &self,
        members: &[Member],
        lists: &[Vec<Vec<Member>>],
    ) -> AggResult<Option<CellRequest>> {
        let Some((group, _)) = self.resolve_measure(members)? else {
            return Ok(None);
        };
        let Some(mut request) = self.make_request(members)? else {
            return Ok(None);
        };
        for list in lists {
            let Some(compound) = self.make_compound_group(&group, list)? else {
                return Ok(None);
            };
            request.add_compound(compound.bitkey().clone(), compound.predicate().clone());
        }
        Ok(Some(request))
    }

    /// Build a drill-through request: the coordinate's constraints plus detail columns.
    ///
    /// Members are visited in the cube's dimension order, then by hierarchy declaration order
    /// within a dimension. Without `projection`, each member
    /// selects its own level and every level below it. With `projection`, exactly the named
    /// levels (unique names) are selected, in the given order; levels of unrelated dimensions
    /// are skipped. The measure is always the last selected column.
    pub fn make_drill_through_request(
        &self,
        members: &[Member],
        projection: Option<&[&str]>,
    ) -> AggResult<Option<CellRequest>> {
        let Some((group, measure)) = self.resolve_measure(members)? else {
            return Ok(None);
        };
        let policy = self.policy_for(&group);
        let mut request =
            CellRequest::new(group.star().name_arc().clone(), measure.clone(), true);

        let mut ordered: Vec<&Member> = members[1..].iter().collect();
        ordered.sort_by_key(|m| {
            m.level()
                .map(|l| (l.dimension(), l.hierarchy_ordinal()))
                .unwrap_or((usize::MAX, usize::MAX))
        });

        for member in ordered {
            match self.member_constraints(&group, member, policy)? {
                Resolution::Unsatisfiable => return Ok(None),
                Resolution::NoConstraint => {}
                Resolution::Columns(columns) => {
                    for (column, value) in columns {
                        if !request.add_constrained_column(&column, Some(value)) {
                            return Ok(None);
                        }
                    }
                }
            }
            if projection.is_some() {
                continue;
            }
            let Some(level) = member.level() else {
                continue;
            };
            if !group.is_linked(level.dimension()) {
                continue;
            }
            self.select_level(&group, &mut request, level)?;
            for below in self.cube.levels_below(level) {
                self.select_level(&group, &mut request, &below)?;
            }
        }

        if let Some(projection) = projection {
            for name in projection {
                let level = self
                    .cube
                    .level(name)
                    .ok_or_else(|| AggError::UnknownProjection {
                        name: name.to_string(),
                    })?
                    .clone();
                self.select_level(&group, &mut request, &level)?;
            }
        }

        request.select(&measure);
        Ok(Some(request))
    }

    fn policy_for(&self, group: &MeasureGroup) -> UnrelatedDimensionPolicy {
        self.policy
            .unwrap_or(group.star().config().unrelated_dimensions)
    }

    fn resolve_measure(
        &self,
        members: &[Member],
    ) -> AggResult<Option<(Arc<MeasureGroup>, Arc<StarColumn>)>> {
        let Some(first) = members.first() else {
            return Err(AggError::Internal("empty coordinate".into()));
        };
        match first.kind() {
            MemberKind::StoredMeasure { measure } => self
                .cube
                .find_measure(measure)
                .map(Some)
                .ok_or_else(|| AggError::UnknownMeasure {
                    cube: self.cube.name().to_string(),
                    measure: measure.clone(),
                }),
            MemberKind::CalculatedMeasure | MemberKind::Null => Ok(None),
            _ => Err(AggError::Internal(format!(
                "coordinate must start with a measure, got {}",
                first.unique_name()
            ))),
        }
    }

    fn member_constraints(
        &self,
        group: &MeasureGroup,
        member: &Member,
        policy: UnrelatedDimensionPolicy,
    ) -> AggResult<Resolution> {
        match member.kind() {
            MemberKind::Null | MemberKind::Calculated => return Ok(Resolution::Unsatisfiable),
            MemberKind::All => return Ok(Resolution::NoConstraint),
            MemberKind::StoredMeasure { .. } | MemberKind::CalculatedMeasure => {
                return Err(AggError::Internal(format!(
                    "coordinate has more than one measure: {}",
                    member.unique_name()
                )));
            }
            MemberKind::Regular => {}
        }

        let Some(level) = member.level() else {
            return Err(AggError::Internal(format!(
                "member {} has no level",
                member.unique_name()
            )));
        };
        if self.cube.level(level.unique_name()) != Some(level) {
            return Err(AggError::Internal(format!(
                "member {} belongs to a level of another cube",
                member.unique_name()
            )));
        }
        if level.is_all() || member.key().len() != level.key().len() {
            return Err(AggError::Internal(format!(
                "member {} has {} key values, level {} has {} key columns",
                member.unique_name(),
                member.key().len(),
                level.unique_name(),
                level.key().len()
            )));
        }

        let Some(columns) = group.resolve_key(level)? else {
            return Ok(match policy {
                UnrelatedDimensionPolicy::Ignore => Resolution::NoConstraint,
                UnrelatedDimensionPolicy::Unsatisfiable => Resolution::Unsatisfiable,
            });
        };
        Ok(Resolution::Columns(
            columns.into_iter().zip(member.key().iter().cloned()).collect(),
        ))
    }

    /// `None` for an unsatisfiable tuple; otherwise its constraints in bit order.
    fn tuple_constraints(
        &self,
        group: &MeasureGroup,
        tuple: &[Member],
        policy: UnrelatedDimensionPolicy,
    ) -> AggResult<Option<Vec<(Arc<StarColumn>, Value)>>> {
        let mut constraints: BTreeMap<usize, (Arc<StarColumn>, Value)> = BTreeMap::new();
        for member in tuple {
            match self.member_constraints(group, member, policy)? {
                Resolution::Unsatisfiable => return Ok(None),
                Resolution::NoConstraint => {}
                Resolution::Columns(columns) => {
                    for (column, value) in columns {
                        let bit = column.bit_position();
                        if let Some((_, existing)) = constraints.get(&bit) {
                            if *existing != value {
                                return Ok(None);
                            }
                            continue;
                        }
                        constraints.insert(bit, (column, value));
                    }
                }
            }
        }
        if constraints.is_empty() {
            return Ok(None);
        }
        Ok(Some(constraints.into_values().collect()))
    }

    /// Select the key and name columns of `level`; unrelated levels select nothing.
    fn select_level(
        &self,
        group: &MeasureGroup,
        request: &mut CellRequest,
        level: &Level,
    ) -> AggResult<()> {
        let Some(key) = group.resolve_key(level)? else {
            return Ok(());
        };
        for column in &key {
            request.select(column);
        }
        if let Some(name_column) = level.name_column() {
            if let Some(column) = group.resolve_column(level, name_column)? {
                request.select(&column);
            }
        }
        Ok(())
    }
}
