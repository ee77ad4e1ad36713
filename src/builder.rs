//! Merges routed rows into cube records.
//!
//! Two entry points share the attachment rules:
//!
//! - [`build_cubes`] consumes the sections of a classified workbook;
//! - [`build_cubes_from_records`] consumes rows of the flat semantic store.
//!
//! Fields and joins are appended in source order and never deduplicated here.
//! Anything that cannot be placed is reported on the [`RunContext`] and dropped.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::{
    cell::{clean_optional, coerce_boolean, collapse_whitespace, split_multi_value_cell},
    context::{Defect, RunContext},
    model::{Cube, Field, Join},
    section::{Row, SectionKind, Sections},
    store::{DIMENSION_FLAG, MEASURE_FLAG, SemanticRecord},
};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Restrict the run to a single cube by name.
    pub only_cube: Option<String>,
}

/// Cube lookup tables maintained while cubes are created.
#[derive(Debug, Default)]
struct CubeIndex {
    cubes: Vec<Cube>,
    by_name: HashMap<String, usize>,
    declared_tables: Vec<(String, String)>,
}

impl CubeIndex {
    fn push(&mut self, cube: Cube, declared_table: Option<String>) {
        if let Some(table) = declared_table {
            self.declared_tables.push((cube.name.clone(), table));
        }
        self.by_name.insert(cube.name.clone(), self.cubes.len());
        self.cubes.push(cube);
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn declared_table(&self, cube: &str) -> Option<&str> {
        self.declared_tables
            .iter()
            .find(|(name, _)| name == cube)
            .map(|(_, table)| table.as_str())
    }

    fn by_declared_table(&self, table: &str) -> Option<usize> {
        self.declared_tables
            .iter()
            .find(|(_, declared)| declared == table)
            .and_then(|(name, _)| self.by_name.get(name).copied())
    }

    /// The single-cube filter, when it names a cube that exists.
    fn focus<'a>(&self, options: &'a BuildOptions) -> Option<&'a str> {
        options
            .only_cube
            .as_deref()
            .filter(|name| self.contains(name))
    }

    fn sole(&self) -> Option<usize> {
        (self.cubes.len() == 1).then_some(0)
    }

    fn resolve_join_target(
        &self,
        options: &BuildOptions,
        primary_table: Option<&str>,
    ) -> Result<usize, String> {
        if let Some(focus) = self.focus(options) {
            if let Some(primary) = primary_table {
                let matches = primary == focus || self.declared_table(focus) == Some(primary);
                if !matches {
                    return Err(format!(
                        "primary table '{primary}' does not belong to cube '{focus}'"
                    ));
                }
            }
            return Ok(self.by_name[focus]);
        }
        if let Some(idx) = self.sole() {
            return Ok(idx);
        }
        let Some(primary) = primary_table else {
            return Err("no primary table and more than one cube".to_string());
        };
        self.by_name
            .get(primary)
            .copied()
            .or_else(|| self.by_declared_table(primary))
            .ok_or_else(|| format!("primary table '{primary}' matches no cube"))
    }

    fn resolve_field_target(
        &self,
        options: &BuildOptions,
        cube_hint: Option<&str>,
    ) -> Result<usize, String> {
        if let Some(focus) = self.focus(options) {
            return Ok(self.by_name[focus]);
        }
        if let Some(idx) = self.sole() {
            return Ok(idx);
        }
        match cube_hint {
            Some(hint) => self
                .by_name
                .get(hint)
                .copied()
                .ok_or_else(|| format!("cube hint '{hint}' matches no cube")),
            None => Err("no cube hint and more than one cube".to_string()),
        }
    }
}

/// Builds cubes from the sections of a classified workbook.
pub fn build_cubes(sections: &Sections, options: &BuildOptions, ctx: &mut RunContext) -> Vec<Cube> {
    let mut index = CubeIndex::default();

    for (idx, row) in sections.cubes.iter().enumerate() {
        let row_number = idx + 1;
        let Some(name) = row.get("name") else {
            ctx.report(missing_field(SectionKind::Cubes, row_number, "name"));
            continue;
        };
        if options.only_cube.as_deref().is_some_and(|only| only != name) {
            continue;
        }
        if index.contains(name) {
            ctx.report(Defect::DuplicateCube {
                name: name.to_string(),
                row: row_number,
            });
            continue;
        }
        let cube = Cube {
            name: name.to_string(),
            title: row.get("title").map(str::to_string),
            description: row.get("description").map(|d| collapse_whitespace(d).into_owned()),
            sql_table: row.get("sql_table").map(str::to_string),
            ..Cube::default()
        };
        index.push(cube, row.get("table").map(str::to_string));
    }
    debug!("Created {} cube(s) from cube rows", index.cubes.len());

    for (idx, row) in sections.joins.iter().enumerate() {
        attach_join_row(&mut index, row, idx + 1, options, ctx);
    }
    for (idx, row) in sections.dimensions.iter().enumerate() {
        attach_field_row(&mut index, SectionKind::Dimensions, row, idx + 1, options, ctx);
    }
    for (idx, row) in sections.measures.iter().enumerate() {
        attach_field_row(&mut index, SectionKind::Measures, row, idx + 1, options, ctx);
    }

    index.cubes
}

fn attach_join_row(
    index: &mut CubeIndex,
    row: &Row,
    row_number: usize,
    options: &BuildOptions,
    ctx: &mut RunContext,
) {
    let targets = row
        .get("secondary_table")
        .map(split_multi_value_cell)
        .unwrap_or_default();
    if targets.is_empty() {
        ctx.report(missing_field(SectionKind::Joins, row_number, "secondary_table"));
        return;
    }
    let primary = row.get("primary_table");
    let cube_idx = match index.resolve_join_target(options, primary) {
        Ok(idx) => idx,
        Err(reason) => {
            ctx.report(Defect::UnresolvedAttachment {
                section: SectionKind::Joins.to_string(),
                item: format!("{} -> {}", primary.unwrap_or("?"), targets.join(", ")),
                reason,
            });
            return;
        }
    };
    let relationship = row.get("relationship").map(str::to_string);
    let sql = row.get("sql").map(str::to_string);
    for target in targets {
        index.cubes[cube_idx].joins.push(Join::with_keys(
            target,
            relationship.clone(),
            sql.clone(),
            row.get("primary_table_key_column"),
            row.get("secondary_table_key_column"),
        ));
    }
}

fn attach_field_row(
    index: &mut CubeIndex,
    kind: SectionKind,
    row: &Row,
    row_number: usize,
    options: &BuildOptions,
    ctx: &mut RunContext,
) {
    let Some(name) = row.get("name") else {
        ctx.report(missing_field(kind, row_number, "name"));
        return;
    };
    let cube_idx = match index.resolve_field_target(options, row.get("cube")) {
        Ok(idx) => idx,
        Err(reason) => {
            ctx.report(Defect::UnresolvedAttachment {
                section: kind.to_string(),
                item: name.to_string(),
                reason,
            });
            return;
        }
    };
    let mut field = Field {
        name: name.to_string(),
        title: row.get("title").map(str::to_string),
        description: row.get("description").map(|d| collapse_whitespace(d).into_owned()),
        sql: row.get("sql").map(str::to_string),
        field_type: row.get("type").map(str::to_string),
        primary_key: None,
    };
    let cube = &mut index.cubes[cube_idx];
    if kind == SectionKind::Dimensions {
        field.primary_key = coerce_boolean(row.get("primarykey"));
        cube.dimensions.push(field);
    } else {
        cube.measures.push(field);
    }
}

fn missing_field(kind: SectionKind, row: usize, field: &str) -> Defect {
    Defect::MissingRequiredField {
        section: kind.to_string(),
        row,
        field: field.to_string(),
    }
}

/// Builds cubes from semantic store rows, grouped by cube name in
/// lexicographic order. `only_cubes`, when non-empty, limits the output.
pub fn build_cubes_from_records(
    records: &[SemanticRecord],
    only_cubes: &HashSet<String>,
    ctx: &mut RunContext,
) -> Vec<Cube> {
    let mut groups: BTreeMap<String, Vec<&SemanticRecord>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        match clean_optional(record.cube_name.as_deref()) {
            Some(name) => groups.entry(name).or_default().push(record),
            None => ctx.report(Defect::MissingRequiredField {
                section: "store".to_string(),
                row: idx + 2,
                field: "cube_name".to_string(),
            }),
        }
    }

    groups
        .into_iter()
        .filter(|(name, _)| only_cubes.is_empty() || only_cubes.contains(name))
        .map(|(name, rows)| cube_from_group(name, &rows, ctx))
        .collect()
}

fn first_value<'a>(
    rows: &[&'a SemanticRecord],
    pick: impl Fn(&'a SemanticRecord) -> Option<&'a str>,
) -> Option<String> {
    rows.iter().find_map(|row| clean_optional(pick(*row)))
}

fn cube_from_group(name: String, rows: &[&SemanticRecord], ctx: &mut RunContext) -> Cube {
    let mut cube = Cube::new(name);
    cube.sql_table = first_value(rows, |r| r.cube_sql_table.as_deref());
    cube.title = first_value(rows, |r| r.cube_title.as_deref());
    cube.description = first_value(rows, |r| r.cube_description.as_deref())
        .map(|d| collapse_whitespace(&d).into_owned());

    let mut seen_joins = HashSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let secondary = clean_optional(row.join_secondary_table.as_deref());
        let sql = clean_optional(row.join_sql.as_deref());
        let relationship = clean_optional(row.join_relationship.as_deref());
        if secondary.is_none() && sql.is_none() && relationship.is_none() {
            continue;
        }
        let targets = secondary
            .as_deref()
            .map(split_multi_value_cell)
            .unwrap_or_default();
        if targets.is_empty() {
            ctx.report(Defect::MissingRequiredField {
                section: format!("{} joins", cube.name),
                row: idx + 1,
                field: "join_secondary_table".to_string(),
            });
            continue;
        }
        for target in targets {
            let key = (target.clone(), sql.clone(), relationship.clone());
            if seen_joins.insert(key) {
                cube.joins.push(Join {
                    name: target,
                    relationship: relationship.clone(),
                    sql: sql.clone(),
                });
            }
        }
    }

    for (idx, row) in rows.iter().enumerate() {
        let flag = clean_optional(row.dimension_measure_flag.as_deref())
            .map(|f| f.to_ascii_lowercase());
        let is_dimension = match flag.as_deref() {
            Some(DIMENSION_FLAG) => true,
            Some(MEASURE_FLAG) => false,
            _ => continue,
        };
        let Some(field_name) = clean_optional(row.dimension_name.as_deref()) else {
            ctx.report(Defect::MissingRequiredField {
                section: format!("{} {}s", cube.name, flag.as_deref().unwrap_or_default()),
                row: idx + 1,
                field: "dimension_name".to_string(),
            });
            continue;
        };
        let mut field = Field {
            name: field_name,
            title: clean_optional(row.dimension_title.as_deref()),
            description: clean_optional(row.dimension_description.as_deref())
                .map(|d| collapse_whitespace(&d).into_owned()),
            sql: clean_optional(row.dimension_sql.as_deref()),
            field_type: clean_optional(row.dimension_type.as_deref()),
            primary_key: None,
        };
        if is_dimension {
            if coerce_boolean(row.primary_key.as_deref()) == Some(true) {
                field.primary_key = Some(true);
            }
            cube.dimensions.push(field);
        } else {
            cube.measures.push(field);
        }
    }
    cube
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> Row {
        let mut row = Row::default();
        for (key, value) in cells {
            row.insert(key, value.to_string());
        }
        row
    }

    fn two_cube_sections() -> Sections {
        Sections {
            cubes: vec![
                row(&[("name", "orders"), ("table", "raw_orders"), ("sql_table", "p.d.orders")]),
                row(&[("name", "customers"), ("sql_table", "p.d.customers")]),
            ],
            ..Sections::default()
        }
    }

    #[test]
    fn cube_row_scenario_produces_named_cube() {
        let sections = Sections {
            cubes: vec![row(&[
                ("name", "orders"),
                ("sql_table", "proj.ds.orders"),
                ("title", "Orders"),
            ])],
            ..Sections::default()
        };
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &BuildOptions::default(), &mut ctx);
        assert_eq!(cubes.len(), 1);
        assert_eq!(cubes[0].name, "orders");
        assert_eq!(cubes[0].sql_table.as_deref(), Some("proj.ds.orders"));
        assert_eq!(cubes[0].title.as_deref(), Some("Orders"));
        assert!(!ctx.has_defects());
    }

    #[test]
    fn nameless_and_duplicate_cube_rows_are_reported() {
        let sections = Sections {
            cubes: vec![
                row(&[("title", "Orphan")]),
                row(&[("name", "orders")]),
                row(&[("name", "orders"), ("title", "Again")]),
            ],
            ..Sections::default()
        };
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &BuildOptions::default(), &mut ctx);
        assert_eq!(cubes.len(), 1);
        assert!(cubes[0].title.is_none());
        let kinds = ctx.defects().iter().map(Defect::kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec!["missing-required-field", "duplicate-cube"]);
    }

    #[test]
    fn duplicate_dimensions_survive_attachment() {
        let sections = Sections {
            cubes: vec![row(&[("name", "orders")])],
            dimensions: vec![
                row(&[("name", "id"), ("type", "number")]),
                row(&[("name", "id"), ("type", "number")]),
            ],
            ..Sections::default()
        };
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &BuildOptions::default(), &mut ctx);
        assert_eq!(cubes[0].dimensions.len(), 2);
        assert!(cubes[0].dimensions.iter().all(|d| d.name == "id"));
    }

    #[test]
    fn joins_match_cube_name_then_declared_table() {
        let mut sections = two_cube_sections();
        sections.joins = vec![
            row(&[
                ("primary_table", "raw_orders"),
                ("secondary_table", "customers"),
                ("relationship", "many_to_one"),
                ("primary_table_key_column", "customer_id"),
                ("secondary_table_key_column", "id"),
            ]),
            row(&[("primary_table", "customers"), ("secondary_table", "regions, stores")]),
            row(&[("primary_table", "unknown"), ("secondary_table", "orders")]),
        ];
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &BuildOptions::default(), &mut ctx);
        let orders = &cubes[0];
        assert_eq!(orders.joins.len(), 1);
        assert_eq!(orders.joins[0].name, "customers");
        assert_eq!(orders.joins[0].sql.as_deref(), Some("customer_id=id"));
        let customers = &cubes[1];
        assert_eq!(
            customers.join_targets().collect::<Vec<_>>(),
            vec!["regions", "stores"]
        );
        assert!(matches!(
            ctx.defects(),
            [Defect::UnresolvedAttachment { .. }]
        ));
    }

    #[test]
    fn single_cube_filter_gates_joins_by_primary_table() {
        let mut sections = two_cube_sections();
        sections.joins = vec![
            row(&[("primary_table", "raw_orders"), ("secondary_table", "customers")]),
            row(&[("primary_table", "customers"), ("secondary_table", "regions")]),
            row(&[("secondary_table", "stores")]),
        ];
        let options = BuildOptions {
            only_cube: Some("orders".into()),
        };
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &options, &mut ctx);
        assert_eq!(cubes.len(), 1);
        assert_eq!(
            cubes[0].join_targets().collect::<Vec<_>>(),
            vec!["customers", "stores"]
        );
        assert_eq!(ctx.defects().len(), 1);
    }

    #[test]
    fn fields_use_cube_hint_when_several_cubes_exist() {
        let mut sections = two_cube_sections();
        sections.dimensions = vec![
            row(&[("name", "id"), ("cube", "customers"), ("primarykey", "yes")]),
            row(&[("name", "status"), ("cube", "orders"), ("primarykey", "perhaps")]),
            row(&[("name", "stray")]),
        ];
        sections.measures = vec![row(&[
            ("name", "count"),
            ("cube", "orders"),
            ("type", "count"),
            ("description", "Number of\norders"),
        ])];
        let mut ctx = RunContext::new();
        let cubes = build_cubes(&sections, &BuildOptions::default(), &mut ctx);
        assert_eq!(cubes[1].dimensions[0].primary_key, Some(true));
        assert_eq!(cubes[0].dimensions[0].primary_key, Some(false));
        assert_eq!(
            cubes[0].measures[0].description.as_deref(),
            Some("Number of orders")
        );
        assert!(matches!(
            &ctx.defects()[0],
            Defect::UnresolvedAttachment { item, .. } if item == "stray"
        ));
    }

    fn store_row(cube: &str, flag: &str, name: &str) -> SemanticRecord {
        SemanticRecord {
            cube_name: Some(cube.into()),
            dimension_measure_flag: Some(flag.into()),
            dimension_name: Some(name.into()),
            ..SemanticRecord::default()
        }
    }

    #[test]
    fn store_records_group_by_cube_in_name_order() {
        let mut first = store_row("orders", "dimension", "order_id");
        first.primary_key = Some("TRUE".into());
        first.cube_sql_table = Some("p.sales.orders".into());
        first.cube_title = Some("Orders".into());
        first.join_secondary_table = Some("customers".into());
        first.join_sql = Some("{CUBE}.customer_id = {customers}.id".into());
        first.join_relationship = Some("many_to_one".into());
        let mut repeat = store_row("orders", "Measure", "count_distinct_order_id");
        repeat.join_secondary_table = first.join_secondary_table.clone();
        repeat.join_sql = first.join_sql.clone();
        repeat.join_relationship = first.join_relationship.clone();
        let records = vec![
            first,
            store_row("customers", "dimension", "id"),
            repeat,
            SemanticRecord {
                dimension_name: Some("orphan".into()),
                ..SemanticRecord::default()
            },
        ];
        let mut ctx = RunContext::new();
        let cubes = build_cubes_from_records(&records, &HashSet::new(), &mut ctx);
        let names = cubes.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["customers", "orders"]);
        let orders = &cubes[1];
        assert_eq!(orders.title.as_deref(), Some("Orders"));
        assert_eq!(orders.joins.len(), 1);
        assert_eq!(orders.dimensions[0].primary_key, Some(true));
        assert_eq!(orders.measures[0].name, "count_distinct_order_id");
        assert_eq!(ctx.defects().len(), 1);
    }

    #[test]
    fn store_only_cubes_filter_limits_output() {
        let records = vec![
            store_row("orders", "dimension", "id"),
            store_row("customers", "dimension", "id"),
        ];
        let only = HashSet::from(["orders".to_string()]);
        let mut ctx = RunContext::new();
        let cubes = build_cubes_from_records(&records, &only, &mut ctx);
        assert_eq!(cubes.len(), 1);
        assert_eq!(cubes[0].name, "orders");
    }
}
