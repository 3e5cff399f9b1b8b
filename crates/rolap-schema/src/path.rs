use crate::error::{PhysSchemaError, SchemaResult};
use crate::relation::{LinkId, RelationId};
use crate::schema::PhysSchema;

/// One step of a join path: the relation reached and the link used to reach it.
///
/// `forward` is true when the link was traversed in foreign-key direction, i.e. from the
/// relation holding the foreign key (the link's target) to the relation owning the key (the
/// link's source). The first hop of a path has no link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysHop {
    pub relation: RelationId,
    pub link: Option<LinkId>,
    pub forward: bool,
}

impl PhysHop {
    pub fn start(relation: RelationId) -> Self {
        Self {
            relation,
            link: None,
            forward: true,
        }
    }

    pub fn new(relation: RelationId, link: LinkId, forward: bool) -> Self {
        Self {
            relation,
            link: Some(link),
            forward,
        }
    }
}

/// An ordered list of hops. Hop 0 carries no link; every later hop's link connects the
/// previous hop's relation to its own, respecting `forward`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysPath {
    hops: Vec<PhysHop>,
}

impl PhysPath {
    pub fn new(start: RelationId) -> Self {
        Self {
            hops: vec![PhysHop::start(start)],
        }
    }

    /// Build a path from raw hops, checking them against `schema`.
    pub fn from_hops(hops: Vec<PhysHop>, schema: &PhysSchema) -> SchemaResult<Self> {
        let path = Self { hops };
        path.validate(schema)?;
        Ok(path)
    }

    pub fn hops(&self) -> &[PhysHop] {
        &self.hops
    }

    /// Number of links traversed.
    pub fn link_count(&self) -> usize {
        self.hops.len() - 1
    }

    pub fn first(&self) -> RelationId {
        self.hops[0].relation
    }

    pub fn last(&self) -> RelationId {
        self.hops[self.hops.len() - 1].relation
    }

    pub(crate) fn push(&mut self, hop: PhysHop) {
        self.hops.push(hop);
    }

    pub(crate) fn pop(&mut self) {
        if self.hops.len() > 1 {
            self.hops.pop();
        }
    }

    pub fn contains(&self, relation: RelationId) -> bool {
        self.hops.iter().any(|h| h.relation == relation)
    }

    /// Append `tail`, which must start where `self` ends.
    pub fn concat(&self, tail: &PhysPath) -> SchemaResult<PhysPath> {
        if tail.first() != self.last() {
            return Err(PhysSchemaError::InvalidPath(format!(
                "cannot append a path starting at relation #{} to a path ending at relation #{}",
                tail.first().index(),
                self.last().index()
            )));
        }
        let mut hops = self.hops.clone();
        hops.extend_from_slice(&tail.hops[1..]);
        Ok(PhysPath { hops })
    }

    /// Check every hop against `schema`. Ids that `schema` does not know are reported as
    /// [`PhysSchemaError::InvalidPath`].
    pub fn validate(&self, schema: &PhysSchema) -> SchemaResult<()> {
        let Some(first) = self.hops.first() else {
            return Err(PhysSchemaError::InvalidPath("path has no hops".into()));
        };
        if first.link.is_some() {
            return Err(PhysSchemaError::InvalidPath(
                "the first hop of a path must not carry a link".into(),
            ));
        }
        alias_of(schema, first.relation)?;
        for pair in self.hops.windows(2) {
            let (prev, hop) = (pair[0], pair[1]);
            let to_alias = alias_of(schema, hop.relation)?;
            let Some(link_id) = hop.link else {
                return Err(PhysSchemaError::InvalidPath(format!(
                    "hop to {to_alias} has no link"
                )));
            };
            let Some(link) = schema.find_link(link_id) else {
                return Err(PhysSchemaError::InvalidPath(format!(
                    "unknown link #{}",
                    link_id.index()
                )));
            };
            let (from, to) = if hop.forward {
                (link.target(), link.source())
            } else {
                (link.source(), link.target())
            };
            if from != prev.relation || to != hop.relation {
                return Err(PhysSchemaError::InvalidPath(format!(
                    "link #{} does not connect {} to {to_alias}",
                    link_id.index(),
                    alias_of(schema, prev.relation)?,
                )));
            }
        }
        Ok(())
    }

    /// Render as `sales -> store -> region` using relation aliases.
    pub fn describe(&self, schema: &PhysSchema) -> String {
        self.hops
            .iter()
            .map(|h| schema.relation(h.relation).alias())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn alias_of(schema: &PhysSchema, relation: RelationId) -> SchemaResult<&str> {
    schema
        .find_relation(relation)
        .map(|r| r.alias())
        .ok_or_else(|| {
            PhysSchemaError::InvalidPath(format!("unknown relation #{}", relation.index()))
        })
}
