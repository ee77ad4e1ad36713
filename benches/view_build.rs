use std::collections::HashSet;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use cubegen::builder::build_cubes_from_records;
use cubegen::context::RunContext;
use cubegen::model::{Cube, Field, Join};
use cubegen::render::render_view;
use cubegen::store::{self, SemanticRecord, SemanticStore};
use cubegen::view::{ViewSettings, build_view};
use tempfile::TempDir;

fn join_to(target: &str) -> Join {
    Join {
        name: target.to_string(),
        relationship: Some("many_to_one".to_string()),
        sql: None,
    }
}

/// A fact cube joined to `width` dimension cubes, each of which joins the
/// next one, so the walk reaches every cube along several paths.
fn snowflake(width: usize, fields: usize) -> Vec<Cube> {
    let mut fact = Cube::new("fact_sales");
    fact.dimensions = (0..fields).map(|f| Field::new(format!("sale_{f}"))).collect();
    fact.measures.push(Field::new("count"));
    let mut cubes = Vec::with_capacity(width + 1);
    for idx in 0..width {
        let name = format!("dim_{idx}");
        fact.joins.push(join_to(&name));
        let mut cube = Cube::new(name.clone());
        cube.dimensions = (0..fields)
            .map(|f| Field::new(if f % 3 == 0 { "id".to_string() } else { format!("attr_{f}") }))
            .collect();
        if idx + 1 < width {
            cube.joins.push(join_to(&format!("dim_{}", idx + 1)));
        }
        cubes.push(cube);
    }
    cubes.insert(0, fact);
    cubes
}

fn write_store(cubes: &[Cube]) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let path = temp_dir.path().join("semantic_all.csv");
    let mut store = SemanticStore::open(&path).expect("open store");
    for cube in cubes {
        let joins = cube.joins.iter().map(|join| join.name.as_str()).collect::<Vec<_>>();
        let rows = cube
            .dimensions
            .iter()
            .map(|field| SemanticRecord {
                cube_name: Some(cube.name.clone()),
                dimension_name: Some(field.name.clone()),
                dimension_measure_flag: Some("dimension".into()),
                dimension_sql: Some(format!("{{CUBE}}.{}", field.name)),
                dimension_type: Some("string".into()),
                join_secondary_table: (!joins.is_empty()).then(|| joins.join(",")),
                join_relationship: (!joins.is_empty()).then(|| "many_to_one".to_string()),
                ..SemanticRecord::default()
            })
            .collect();
        store.upsert(&cube.name, rows);
    }
    store.save().expect("save store");
    (temp_dir, path)
}

fn bench_view_build(c: &mut Criterion) {
    let cubes = snowflake(12, 40);
    let settings = ViewSettings {
        root: Some("sales".to_string()),
        ..ViewSettings::default()
    };
    let (temp_dir, store_path) = write_store(&cubes);

    let mut group = c.benchmark_group("view_build");

    group.bench_function("build_and_render", |b| {
        b.iter(|| {
            let view = build_view(&cubes, &settings).expect("build view");
            render_view(&view)
        });
    });

    group.bench_function("store_to_view", |b| {
        b.iter_batched(
            RunContext::new,
            |mut ctx| {
                let records = store::read_records(&store_path).expect("read store");
                let rebuilt = build_cubes_from_records(&records, &HashSet::new(), &mut ctx);
                build_view(&rebuilt, &settings).expect("build view")
            },
            BatchSize::SmallInput,
        );
    });

    drop(temp_dir);
    group.finish();
}

criterion_group!(benches, bench_view_build);
criterion_main!(benches);
