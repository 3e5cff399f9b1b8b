//! Join-path resolution over a [`PhysSchema`].
//!
//! Relations are nodes and foreign-key links are edges. A *directed* search only walks links
//! in foreign-key direction (fact -> dimension -> outrigger) and requires the path to be
//! unique: a second path means the schema is ambiguous and has to be disambiguated by the
//! schema author. An *undirected* search walks links either way and settles for the path
//! with the fewest hops.
//!
//! Adjacency lists are kept in link declaration order, so enumeration (and therefore the
//! tie-break of undirected searches) does not depend on hash-map iteration order.
use crate::error::{PhysSchemaError, SchemaResult};
use crate::path::{PhysHop, PhysPath};
use crate::relation::{LinkId, RelationId};
use crate::schema::PhysSchema;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
struct Edge {
    link: LinkId,
    to: RelationId,
    forward: bool,
}

#[derive(Clone, Debug)]
pub struct PhysSchemaGraph {
    schema: Arc<PhysSchema>,
    adjacency: Vec<Vec<Edge>>,
}

impl PhysSchemaGraph {
    pub fn new(schema: Arc<PhysSchema>) -> Self {
        let mut adjacency = vec![Vec::new(); schema.relation_count()];
        for (id, link) in schema.links() {
            adjacency[link.target().index()].push(Edge {
                link: id,
                to: link.source(),
                forward: true,
            });
            if link.source() != link.target() {
                adjacency[link.source().index()].push(Edge {
                    link: id,
                    to: link.target(),
                    forward: false,
                });
            }
        }
        Self { schema, adjacency }
    }

    pub fn schema(&self) -> &Arc<PhysSchema> {
        &self.schema
    }

    /// Find the join path from `start` to the first of `targets` that is reachable.
    ///
    /// Candidates are tried in slice order. A candidate with no path is skipped. In directed
    /// mode a candidate with more than one path is an [`PhysSchemaError::AmbiguousPath`]; in
    /// undirected mode the path with the fewest hops wins, ties going to the path found first.
    pub fn find_path(
        &self,
        start: RelationId,
        targets: &[RelationId],
        directed: bool,
    ) -> SchemaResult<PhysPath> {
        if targets.is_empty() {
            return Err(PhysSchemaError::EmptyTargets {
                from: self.alias(start).to_string(),
            });
        }

        // Directed search stops at the second path: one is the answer, two is an error.
        let limit = if directed { 2 } else { usize::MAX };
        for &target in targets {
            let mut found = Vec::new();
            self.collect_paths(&mut PhysPath::new(start), target, directed, limit, &mut found);
            let mut paths = found.into_iter();
            let Some(first) = paths.next() else {
                continue;
            };
            let rest: Vec<PhysPath> = paths.collect();
            if rest.is_empty() {
                return Ok(first);
            }
            if directed {
                return Err(PhysSchemaError::AmbiguousPath {
                    from: self.alias(start).to_string(),
                    to: self.alias(target).to_string(),
                    count: rest.len() + 1,
                });
            }
            return Ok(self.shortest(first, rest));
        }

        Err(PhysSchemaError::NoPath {
            from: self.alias(start).to_string(),
            targets: targets
                .iter()
                .map(|&t| self.alias(t))
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Every simple path (no relation visited twice) from `start` to `target`, in
    /// enumeration order.
    pub fn all_paths(&self, start: RelationId, target: RelationId, directed: bool) -> Vec<PhysPath> {
        let mut out = Vec::new();
        let mut path = PhysPath::new(start);
        self.collect_paths(&mut path, target, directed, usize::MAX, &mut out);
        out
    }

    /// Whether every relation can reach every other one when links are walked both ways.
    pub fn is_connected(&self) -> bool {
        let n = self.adjacency.len();
        if n == 0 {
            return true;
        }
        let mut seen = vec![false; n];
        let mut queue = VecDeque::from([0usize]);
        seen[0] = true;
        let mut reached = 1;
        while let Some(rel) = queue.pop_front() {
            for edge in &self.adjacency[rel] {
                let next = edge.to.index();
                if !seen[next] {
                    seen[next] = true;
                    reached += 1;
                    queue.push_back(next);
                }
            }
        }
        reached == n
    }

    fn collect_paths(
        &self,
        path: &mut PhysPath,
        target: RelationId,
        directed: bool,
        limit: usize,
        out: &mut Vec<PhysPath>,
    ) {
        let current = path.last();
        if current == target {
            out.push(path.clone());
            return;
        }
        for edge in &self.adjacency[current.index()] {
            if out.len() >= limit {
                return;
            }
            if directed && !edge.forward {
                continue;
            }
            if path.contains(edge.to) {
                continue;
            }
            path.push(PhysHop::new(edge.to, edge.link, edge.forward));
            self.collect_paths(path, target, directed, limit, out);
            path.pop();
        }
    }

    fn shortest(&self, first: PhysPath, rest: Vec<PhysPath>) -> PhysPath {
        let mut best = first;
        let mut tied = false;
        for path in rest {
            if path.link_count() < best.link_count() {
                best = path;
                tied = false;
            } else if path.link_count() == best.link_count() {
                tied = true;
            }
        }
        if tied {
            log::warn!(
                "several join paths of length {} from {} to {}; using {}",
                best.link_count(),
                self.alias(best.first()),
                self.alias(best.last()),
                best.describe(&self.schema)
            );
        }
        best
    }

    fn alias(&self, relation: RelationId) -> &str {
        self.schema.relation(relation).alias()
    }
}
