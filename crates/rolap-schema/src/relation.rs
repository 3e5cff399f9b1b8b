use crate::error::{PhysSchemaError, SchemaResult};
use std::collections::HashMap;

/// Index of a relation within its [`crate::PhysSchema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub(crate) usize);

impl RelationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A key of a relation: the relation plus the key's position in [`PhysRelation::keys`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId {
    pub relation: RelationId,
    pub(crate) index: usize,
}

/// Index of a link in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Integer,
    Numeric,
    String,
    Boolean,
    Date,
    Timestamp,
}

impl DataType {
    /// Nominal width in bytes, used to estimate relation volume.
    pub fn byte_width(self) -> u64 {
        match self {
            DataType::Integer => 4,
            DataType::Numeric => 8,
            DataType::String => 20,
            DataType::Boolean => 1,
            DataType::Date => 4,
            DataType::Timestamp => 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    Table { schema: Option<String>, name: String },
    View { sql: String },
    /// Rows declared inline in the schema (each row as literal text).
    Inline { rows: Vec<Vec<String>> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysColumnKind {
    Real,
    /// A column computed from other columns of the same relation.
    Calculated {
        expression: String,
        depends_on: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysColumn {
    name: String,
    datatype: DataType,
    kind: PhysColumnKind,
}

impl PhysColumn {
    pub fn real(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            kind: PhysColumnKind::Real,
        }
    }

    pub fn calculated(
        name: impl Into<String>,
        datatype: DataType,
        expression: impl Into<String>,
        depends_on: Vec<impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            datatype,
            kind: PhysColumnKind::Calculated {
                expression: expression.into(),
                depends_on: depends_on.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn kind(&self) -> &PhysColumnKind {
        &self.kind
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self.kind, PhysColumnKind::Calculated { .. })
    }
}

/// A named list of columns usable as a join target. Keys need not be unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysKey {
    name: String,
    columns: Vec<String>,
}

impl PhysKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// A table, view or inline table registered under a schema-unique alias.
#[derive(Clone, Debug)]
pub struct PhysRelation {
    alias: String,
    kind: RelationKind,
    columns: Vec<PhysColumn>,
    column_index: HashMap<String, usize>,
    keys: Vec<PhysKey>,
    row_count: Option<u64>,
}

impl PhysRelation {
    pub fn new(alias: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            alias: alias.into(),
            kind,
            columns: Vec::new(),
            column_index: HashMap::new(),
            keys: Vec::new(),
            row_count: None,
        }
    }

    /// A base table whose alias is its table name.
    pub fn table(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            name.clone(),
            RelationKind::Table { schema: None, name },
        )
    }

    pub fn view(alias: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(alias, RelationKind::View { sql: sql.into() })
    }

    pub fn inline(alias: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self::new(alias, RelationKind::Inline { rows })
    }

    /// Builder form of [`PhysRelation::add_column`] for real columns.
    pub fn with_column(mut self, name: impl Into<String>, datatype: DataType) -> SchemaResult<Self> {
        self.add_column(PhysColumn::real(name, datatype))?;
        Ok(self)
    }

    /// Builder form of [`PhysRelation::add_key`].
    pub fn with_key(mut self, name: impl Into<String>, columns: Vec<&str>) -> SchemaResult<Self> {
        self.add_key(name, columns)?;
        Ok(self)
    }

    /// Declared approximate row count; takes precedence over the statistics provider.
    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn add_column(&mut self, column: PhysColumn) -> SchemaResult<()> {
        if self.column_index.contains_key(column.name()) {
            return Err(PhysSchemaError::DuplicateColumn {
                relation: self.alias.clone(),
                column: column.name().to_string(),
            });
        }
        if let PhysColumnKind::Calculated { depends_on, .. } = column.kind() {
            for dep in depends_on {
                if !self.column_index.contains_key(dep) {
                    return Err(PhysSchemaError::UnknownColumn {
                        relation: self.alias.clone(),
                        column: dep.clone(),
                    });
                }
            }
        }

        self.column_index
            .insert(column.name().to_string(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    pub fn add_key(
        &mut self,
        name: impl Into<String>,
        columns: Vec<impl Into<String>>,
    ) -> SchemaResult<()> {
        let name = name.into();
        if self.keys.iter().any(|k| k.name == name) {
            return Err(PhysSchemaError::DuplicateKey {
                relation: self.alias.clone(),
                key: name,
            });
        }
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for column in &columns {
            self.require_column(column)?;
        }
        self.keys.push(PhysKey { name, columns });
        Ok(())
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn set_alias(&mut self, alias: String) {
        self.alias = alias;
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn columns(&self) -> &[PhysColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&PhysColumn> {
        self.column_index.get(name).map(|&idx| &self.columns[idx])
    }

    pub fn require_column(&self, name: &str) -> SchemaResult<&PhysColumn> {
        self.column(name).ok_or_else(|| PhysSchemaError::UnknownColumn {
            relation: self.alias.clone(),
            column: name.to_string(),
        })
    }

    pub fn keys(&self) -> &[PhysKey] {
        &self.keys
    }

    pub fn key_index(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| k.name == name)
    }

    /// The key named `primary`, or the first declared key.
    pub fn primary_key(&self) -> Option<&PhysKey> {
        self.keys
            .iter()
            .find(|k| k.name == "primary")
            .or_else(|| self.keys.first())
    }

    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Sum of the nominal byte widths of all columns.
    pub fn row_width(&self) -> u64 {
        self.columns.iter().map(|c| c.datatype.byte_width()).sum()
    }
}
