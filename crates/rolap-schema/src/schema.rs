use crate::error::{PhysSchemaError, SchemaResult};
use crate::relation::{KeyId, LinkId, PhysKey, PhysRelation, RelationId};
use std::collections::HashMap;

/// A foreign-key link.
///
/// The *target* relation holds the foreign-key `columns`; they reference the *source* key,
/// which lives on another relation (typically its primary key). A fact table is therefore
/// the target of the links to its dimension tables. Equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysLink {
    source_key: KeyId,
    target: RelationId,
    columns: Vec<String>,
}

impl PhysLink {
    pub fn source_key(&self) -> KeyId {
        self.source_key
    }

    /// The relation owning the referenced key.
    pub fn source(&self) -> RelationId {
        self.source_key.relation
    }

    /// The relation holding the foreign-key columns.
    pub fn target(&self) -> RelationId {
        self.target
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Relations and links of one schema, populated once at load time.
///
/// Relations are stored in an arena indexed by [`RelationId`] and links in declaration order;
/// that order is what path enumeration follows.
#[derive(Clone, Debug, Default)]
pub struct PhysSchema {
    relations: Vec<PhysRelation>,
    aliases: HashMap<String, RelationId>,
    links: Vec<PhysLink>,
}

impl PhysSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relation(&mut self, relation: PhysRelation) -> SchemaResult<RelationId> {
        if self.aliases.contains_key(relation.alias()) {
            return Err(PhysSchemaError::DuplicateAlias {
                alias: relation.alias().to_string(),
            });
        }
        let id = RelationId(self.relations.len());
        self.aliases.insert(relation.alias().to_string(), id);
        self.relations.push(relation);
        Ok(id)
    }

    pub fn relation(&self, id: RelationId) -> &PhysRelation {
        &self.relations[id.0]
    }

    /// Like [`Self::relation`], but `None` for an id this schema did not hand out.
    pub fn find_relation(&self, id: RelationId) -> Option<&PhysRelation> {
        self.relations.get(id.0)
    }

    pub fn relation_id(&self, alias: &str) -> Option<RelationId> {
        self.aliases.get(alias).copied()
    }

    pub fn lookup(&self, alias: &str) -> SchemaResult<RelationId> {
        self.relation_id(alias)
            .ok_or_else(|| PhysSchemaError::UnknownRelation(alias.to_string()))
    }

    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &PhysRelation)> {
        self.relations
            .iter()
            .enumerate()
            .map(|(idx, rel)| (RelationId(idx), rel))
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn key_id(&self, relation: RelationId, key: &str) -> SchemaResult<KeyId> {
        let rel = self.relation(relation);
        let index = rel.key_index(key).ok_or_else(|| PhysSchemaError::UnknownKey {
            relation: rel.alias().to_string(),
            key: key.to_string(),
        })?;
        Ok(KeyId { relation, index })
    }

    pub fn key(&self, key: KeyId) -> &PhysKey {
        &self.relation(key.relation).keys()[key.index]
    }

    /// Declare that `target.columns` references `source_key`.
    ///
    /// Declaring a link that is structurally equal to an existing one returns the existing id.
    pub fn add_link(
        &mut self,
        target: RelationId,
        source_key: KeyId,
        columns: Vec<impl Into<String>>,
    ) -> SchemaResult<LinkId> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let target_rel = self.relation(target);
        for column in &columns {
            target_rel.require_column(column)?;
        }
        let key = self.key(source_key);
        if key.columns().len() != columns.len() {
            return Err(PhysSchemaError::LinkArityMismatch {
                from: target_rel.alias().to_string(),
                relation: self.relation(source_key.relation).alias().to_string(),
                key: key.name().to_string(),
                expected: key.columns().len(),
                actual: columns.len(),
            });
        }

        let link = PhysLink {
            source_key,
            target,
            columns,
        };
        if let Some(existing) = self.links.iter().position(|l| *l == link) {
            return Ok(LinkId(existing));
        }
        self.links.push(link);
        Ok(LinkId(self.links.len() - 1))
    }

    /// Convenience for the common case: `target(columns) -> source(primary key)`.
    pub fn link(
        &mut self,
        target: &str,
        columns: Vec<&str>,
        source: &str,
    ) -> SchemaResult<LinkId> {
        let target = self.lookup(target)?;
        let source_id = self.lookup(source)?;
        let key_name = self
            .relation(source_id)
            .primary_key()
            .map(|k| k.name().to_string())
            .ok_or_else(|| PhysSchemaError::UnknownKey {
                relation: source.to_string(),
                key: "primary".to_string(),
            })?;
        let key_id = self.key_id(source_id, &key_name)?;
        self.add_link(target, key_id, columns)
    }

    pub fn get_link(&self, id: LinkId) -> &PhysLink {
        &self.links[id.0]
    }

    pub fn find_link(&self, id: LinkId) -> Option<&PhysLink> {
        self.links.get(id.0)
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &PhysLink)> {
        self.links
            .iter()
            .enumerate()
            .map(|(idx, link)| (LinkId(idx), link))
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// A fresh alias derived from `base` that no relation uses yet: `base` itself if free,
    /// otherwise `base_1`, `base_2`, ...
    pub fn new_alias(&self, base: &str) -> String {
        if !self.aliases.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let alias = format!("{base}_{n}");
            if !self.aliases.contains_key(&alias) {
                return alias;
            }
            n += 1;
        }
    }

    /// Register a copy of `relation` (columns and keys, not links) under a fresh alias.
    ///
    /// Used when one dimension table plays several roles against the same fact table.
    pub fn clone_relation(&mut self, relation: RelationId) -> SchemaResult<RelationId> {
        let mut copy = self.relation(relation).clone();
        let alias = self.new_alias(copy.alias());
        copy.set_alias(alias);
        self.add_relation(copy)
    }
}
