//! Segments: blocks of computed cell values for one measure over a region of a star.
use crate::error::{AggError, AggResult};
use crate::predicate::StarPredicate;
use crate::request::CellRequest;
use crate::value::Value;
use rolap_schema::BitKey;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Identity of an aggregation: the star, the plainly constrained columns, and the compound
/// predicates that could not be reduced to column equalities.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    star: Arc<str>,
    constrained: BitKey,
    compound: Vec<Arc<StarPredicate>>,
}

impl AggregationKey {
    pub fn new(star: Arc<str>, constrained: BitKey, compound: Vec<Arc<StarPredicate>>) -> Self {
        Self {
            star,
            constrained,
            compound,
        }
    }

    pub fn star(&self) -> &str {
        &self.star
    }

    pub fn constrained_columns(&self) -> &BitKey {
        &self.constrained
    }

    pub fn compound_predicates(&self) -> &[Arc<StarPredicate>] {
        &self.compound
    }
}

/// The values of one constrained column a segment holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentAxis {
    /// Every value of the column.
    Any,
    Values(BTreeSet<Value>),
}

impl SegmentAxis {
    pub fn accepts(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (SegmentAxis::Any, Some(_)) => true,
            (SegmentAxis::Values(values), Some(value)) => values.contains(value),
            (_, None) => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u64);

impl SegmentId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SegmentId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cells of one measure over the region spanned by its axes.
///
/// Storage is sparse: a coordinate inside the region with no stored cell is a known null.
#[derive(Debug)]
pub struct Segment {
    id: SegmentId,
    key: AggregationKey,
    measure: usize,
    axes: Vec<(usize, SegmentAxis)>,
    cells: HashMap<Vec<Value>, Value>,
    pins: AtomicUsize,
}

impl Segment {
    /// A one-cell segment holding `value` for exactly the cell `request` asks for.
    pub fn for_request(request: &CellRequest, value: Value) -> Arc<Segment> {
        let axes = request
            .constrained_columns()
            .iter()
            .map(|bit| {
                let values = request.value_of(bit).cloned().into_iter().collect();
                (bit, SegmentAxis::Values(values))
            })
            .collect();
        Arc::new(Segment {
            id: SegmentId::next(),
            key: request.aggregation_key(),
            measure: request.measure().bit_position(),
            axes,
            cells: HashMap::from([(request.coordinates(), value)]),
            pins: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    /// Bit position of the measure.
    pub fn measure(&self) -> usize {
        self.measure
    }

    pub fn axes(&self) -> &[(usize, SegmentAxis)] {
        &self.axes
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether `request` asks for a cell inside this segment's region.
    pub fn contains(&self, request: &CellRequest) -> bool {
        request.measure().bit_position() == self.measure
            && request.star_name() == self.key.star()
            && request.constrained_columns() == self.key.constrained_columns()
            && request
                .compound_constraints()
                .iter()
                .map(|c| &c.predicate)
                .eq(self.key.compound.iter())
            && self
                .axes
                .iter()
                .all(|(bit, axis)| axis.accepts(request.value_of(*bit)))
    }

    /// The requested cell, `Some(Value::Null)` for a known empty cell, `None` when the
    /// request falls outside this segment.
    pub fn cell_value(&self, request: &CellRequest) -> Option<Value> {
        if !self.contains(request) {
            return None;
        }
        Some(
            self.cells
                .get(&request.coordinates())
                .cloned()
                .unwrap_or(Value::Null),
        )
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let _ = self
            .pins
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Builds a segment covering a region around a request, typically from the rows of one SQL
/// query.
///
/// Axes start as [`SegmentAxis::Any`] for every column the request constrains; narrow them
/// with [`SegmentBuilder::with_axis`].
#[derive(Debug)]
pub struct SegmentBuilder {
    key: AggregationKey,
    measure: usize,
    axes: BTreeMap<usize, SegmentAxis>,
    cells: HashMap<Vec<Value>, Value>,
}

impl SegmentBuilder {
    pub fn new(request: &CellRequest) -> Self {
        Self {
            key: request.aggregation_key(),
            measure: request.measure().bit_position(),
            axes: request
                .constrained_columns()
                .iter()
                .map(|bit| (bit, SegmentAxis::Any))
                .collect(),
            cells: HashMap::new(),
        }
    }

    pub fn with_axis(mut self, bit_position: usize, values: impl IntoIterator<Item = Value>) -> Self {
        self.axes
            .insert(bit_position, SegmentAxis::Values(values.into_iter().collect()));
        self
    }

    /// `coordinates` holds one value per constrained column, in bit order. Null values are
    /// not stored.
    pub fn with_cell(mut self, coordinates: Vec<Value>, value: Value) -> Self {
        if !value.is_null() {
            self.cells.insert(coordinates, value);
        }
        self
    }

    pub fn build(self) -> AggResult<Arc<Segment>> {
        let axes: Vec<(usize, SegmentAxis)> = self.axes.into_iter().collect();
        if !axes
            .iter()
            .map(|(bit, _)| *bit)
            .eq(self.key.constrained_columns().iter())
        {
            return Err(AggError::Internal(
                "segment axes do not match the constrained columns".into(),
            ));
        }
        for coordinates in self.cells.keys() {
            let inside = coordinates.len() == axes.len()
                && axes
                    .iter()
                    .zip(coordinates)
                    .all(|((_, axis), value)| axis.accepts(Some(value)));
            if !inside {
                return Err(AggError::Internal(format!(
                    "cell {coordinates:?} lies outside the segment's axes"
                )));
            }
        }
        Ok(Arc::new(Segment {
            id: SegmentId::next(),
            key: self.key,
            measure: self.measure,
            axes,
            cells: self.cells,
            pins: AtomicUsize::new(0),
        }))
    }
}

/// The segments of one [`AggregationKey`] known to a statement.
///
/// References are weak: the shared tier or a pin set owns the segments, so a segment evicted
/// everywhere else disappears here too.
#[derive(Debug)]
pub struct Aggregation {
    key: AggregationKey,
    segments: Vec<Weak<Segment>>,
}

impl Aggregation {
    pub fn new(key: AggregationKey) -> Self {
        Self {
            key,
            segments: Vec::new(),
        }
    }

    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    pub fn add(&mut self, segment: &Arc<Segment>) {
        let id = segment.id();
        let known = self
            .segments
            .iter()
            .filter_map(Weak::upgrade)
            .any(|s| s.id() == id);
        if !known {
            self.segments.push(Arc::downgrade(segment));
        }
    }

    /// The first live segment containing the requested cell. Dead references are dropped.
    pub fn find(&mut self, request: &CellRequest) -> Option<Arc<Segment>> {
        self.segments.retain(|s| s.strong_count() > 0);
        self.segments
            .iter()
            .filter_map(Weak::upgrade)
            .find(|s| s.contains(request))
    }

    pub fn segment_count(&self) -> usize {
        self.segments.iter().filter(|s| s.strong_count() > 0).count()
    }
}
