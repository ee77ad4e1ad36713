//! Cube and view records produced by the compiler.
//!
//! These are plain data. Builders append to them, the view builder reads them
//! and the renderer turns them into YAML text. Optional attributes stay `None`
//! rather than empty strings so the renderer can omit them.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cube {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sql_table: Option<String>,
    pub joins: Vec<Join>,
    pub dimensions: Vec<Field>,
    pub measures: Vec<Field>,
}

impl Cube {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Dimension names followed by measure names, in stored order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .chain(self.measures.iter())
            .map(|field| field.name.as_str())
    }

    /// Secondary cube names this cube joins to.
    pub fn join_targets(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|join| join.name.as_str())
    }
}

/// A dimension or a measure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sql: Option<String>,
    pub field_type: Option<String>,
    /// Only meaningful on dimensions.
    pub primary_key: Option<bool>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Join {
    pub name: String,
    pub relationship: Option<String>,
    pub sql: Option<String>,
}

impl Join {
    /// Builds a join, synthesizing `pk=sk` SQL when no explicit condition exists.
    pub fn with_keys(
        name: impl Into<String>,
        relationship: Option<String>,
        sql: Option<String>,
        primary_key_column: Option<&str>,
        secondary_key_column: Option<&str>,
    ) -> Self {
        let sql = sql.or_else(|| match (primary_key_column, secondary_key_column) {
            (Some(pk), Some(sk)) => Some(format!("{pk}={sk}")),
            _ => None,
        });
        Self {
            name: name.into(),
            relationship,
            sql,
        }
    }
}

/// A field reference inside a view. Later duplicates are kept as
/// `Suppressed` so the output records which cube owned the name first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    Live(String),
    Suppressed { name: String, first_owner: String },
}

impl FieldRef {
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Live(name) => name,
            FieldRef::Suppressed { name, .. } => name,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, FieldRef::Live(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
    /// Cube names from the root, in traversal order.
    pub cubes: Vec<String>,
    pub includes: Vec<FieldRef>,
}

impl JoinPath {
    /// Dot-separated form used in rendered output, e.g. `orders.customers`.
    pub fn path(&self) -> String {
        self.cubes.join(".")
    }

    /// The cube this path ends at.
    pub fn target(&self) -> &str {
        self.cubes.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub includes: Vec<FieldRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub title: String,
    pub description: String,
    pub cubes: Vec<JoinPath>,
    pub folders: Vec<Folder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_synthesizes_sql_from_key_columns() {
        let join = Join::with_keys(
            "customers",
            Some("many_to_one".into()),
            None,
            Some("customer_id"),
            Some("id"),
        );
        assert_eq!(join.sql.as_deref(), Some("customer_id=id"));

        let explicit = Join::with_keys(
            "customers",
            None,
            Some("{CUBE}.customer_id = {customers}.id".into()),
            Some("customer_id"),
            Some("id"),
        );
        assert_eq!(
            explicit.sql.as_deref(),
            Some("{CUBE}.customer_id = {customers}.id")
        );

        let partial = Join::with_keys("customers", None, None, Some("customer_id"), None);
        assert!(partial.sql.is_none());
    }

    #[test]
    fn field_names_lists_dimensions_before_measures() {
        let mut cube = Cube::new("orders");
        cube.measures.push(Field::new("count"));
        cube.dimensions.push(Field::new("id"));
        cube.dimensions.push(Field::new("status"));
        assert_eq!(
            cube.field_names().collect::<Vec<_>>(),
            vec!["id", "status", "count"]
        );
    }

    #[test]
    fn join_path_renders_dotted() {
        let path = JoinPath {
            cubes: vec!["orders".into(), "customers".into()],
            includes: Vec::new(),
        };
        assert_eq!(path.path(), "orders.customers");
        assert_eq!(path.target(), "customers");
    }
}
