pub mod builder;
pub mod catalog;
pub mod cell;
pub mod cli;
pub mod context;
pub mod inference;
pub mod io_utils;
pub mod model;
pub mod render;
pub mod runlog;
pub mod section;
pub mod standards;
pub mod store;
pub mod table;
pub mod view;
pub mod yaml;

use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    builder::BuildOptions,
    catalog::{FileCatalog, TableRef},
    cli::{Cli, Commands},
    context::{Defect, RunContext},
    inference::CubeOverrides,
    model::Cube,
    render::CubeLayout,
    section::{RawTable, SectionRegistry},
    store::SemanticStore,
    view::ViewSettings,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cubegen", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Detect(args) => handle_detect(&args),
        Commands::Catalog(args) => handle_catalog(&args),
        Commands::FromCsv(args) => handle_from_csv(&args),
        Commands::View(args) => handle_view(&args),
        Commands::Standards(args) => handle_standards(&args),
    }
}

fn load_registry(path: Option<&Path>) -> Result<SectionRegistry> {
    match path {
        Some(path) => SectionRegistry::load(path)
            .with_context(|| format!("Loading section registry from {path:?}")),
        None => Ok(SectionRegistry::default()),
    }
}

/// Reads every sheet; unreadable ones are reported and skipped.
fn load_sheets(input: &cli::SheetInput, ctx: &mut RunContext) -> Result<Vec<RawTable>> {
    let encoding = io_utils::resolve_encoding(input.input_encoding.as_deref())?;
    let paths = io_utils::collect_sheet_paths(&input.inputs)?;
    if paths.is_empty() {
        bail!("No .csv or .tsv sheets found in the given inputs");
    }
    info!(
        "Reading {} sheet(s) with delimiter '{}'",
        paths.len(),
        printable_delimiter(input.delimiter)
    );
    let mut tables = Vec::with_capacity(paths.len());
    for path in &paths {
        match io_utils::load_table(path, input.delimiter, encoding) {
            Ok(table) => {
                debug!("Loaded sheet '{}' with {} row(s)", table.name, table.rows.len());
                tables.push(table);
            }
            Err(err) => ctx.report(Defect::SourceParse {
                source_name: path.display().to_string(),
                message: format!("{err:#}"),
            }),
        }
    }
    if tables.is_empty() {
        bail!("None of the {} sheet(s) could be read", paths.len());
    }
    Ok(tables)
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let mut ctx = RunContext::new();
    let registry = load_registry(args.input.sections.as_deref())?;
    let tables = load_sheets(&args.input, &mut ctx)?;
    let (sections, _) = section::route_tables(&tables, &registry, &mut ctx);
    let logs_dir = logs_dir_beside_file(args.logs_dir.as_ref(), &args.output);
    if sections.is_empty() {
        finish_run(&ctx, &logs_dir, "Sheets to Semantic Run")?;
        bail!("No sheet matched a cube, join, dimension or measure layout");
    }

    let options = BuildOptions {
        only_cube: args.only_cube.clone(),
    };
    let cubes = builder::build_cubes(&sections, &options, &mut ctx);
    if let (Some(only), true) = (&args.only_cube, cubes.is_empty()) {
        warn!("Cube '{only}' was not found in the cube rows");
    }
    let mut text = render::render_cubes(&cubes, CubeLayout::DescriptionFirst);
    for cube in &cubes {
        ctx.record_document(
            cube.name.clone(),
            render::render_cubes(std::slice::from_ref(cube), CubeLayout::DescriptionFirst),
        );
    }

    if args.wants_view() {
        let settings = ViewSettings {
            name: args.view_name.clone(),
            title: args.view_title.clone(),
            description: args.view_description.clone(),
            root: args.view_root.clone(),
            folder_overrides: args.view_folders.iter().cloned().collect(),
            ..ViewSettings::default()
        };
        match view::build_view(&cubes, &settings) {
            Ok(view) => {
                let view_text = render::render_view(&view);
                text.push('\n');
                text.push_str(&view_text);
                ctx.record_view(view.name.clone(), view_text);
            }
            Err(defect) => ctx.report(defect),
        }
    }

    write_text(&args.output, &text)?;
    info!("Wrote {} cube(s) to {:?}", cubes.len(), args.output);
    finish_run(&ctx, &logs_dir, "Sheets to Semantic Run")
}

fn handle_detect(args: &cli::DetectArgs) -> Result<()> {
    let mut ctx = RunContext::new();
    let registry = load_registry(args.input.sections.as_deref())?;
    let tables = load_sheets(&args.input, &mut ctx)?;
    let (_, decisions) = section::route_tables(&tables, &registry, &mut ctx);
    print!("{}", table::render_classifications(&decisions));
    let accepted = decisions.iter().filter(|d| d.accepted()).count();
    info!(
        "{} of {} sheet(s) accepted into a section",
        accepted,
        tables.len()
    );
    Ok(())
}

fn handle_catalog(args: &cli::CatalogArgs) -> Result<()> {
    let table_ids = args.table_ids();
    if table_ids.is_empty() {
        bail!("Provide one or more tables via --table or --tables");
    }
    let catalog = FileCatalog::load(&args.catalog)
        .with_context(|| format!("Loading catalog from {:?}", args.catalog))?;
    let mut store = SemanticStore::open(&args.store)
        .with_context(|| format!("Opening semantic store {:?}", args.store))?;
    let overrides = CubeOverrides {
        title: args.cube_title.clone(),
        description: args.cube_description.clone(),
    };

    let mut ctx = RunContext::new();
    let mut processed = HashSet::new();
    for table_id in &table_ids {
        let generated = table_id.parse::<TableRef>().and_then(|table| {
            inference::generate_records_for_table(&catalog, &table, &overrides)
        });
        match generated {
            Ok((cube_name, records)) => {
                store.upsert(&cube_name, records);
                info!("Upserted store rows for cube '{cube_name}'");
                processed.insert(cube_name);
            }
            Err(err) => ctx.report(Defect::SourceParse {
                source_name: table_id.clone(),
                message: format!("{err:#}"),
            }),
        }
    }
    if processed.is_empty() {
        let logs_dir = logs_dir_for(args.logs_dir.as_ref(), &args.output_dir);
        finish_run(&ctx, &logs_dir, "Catalog to Semantic Run")?;
        bail!("No catalog table could be processed");
    }
    store
        .save()
        .with_context(|| format!("Writing semantic store {:?}", store.path()))?;

    let cubes = builder::build_cubes_from_records(store.records(), &processed, &mut ctx);
    write_yaml_per_cube(&cubes, &args.output_dir, CubeLayout::NameFirst, &mut ctx)?;
    let logs_dir = logs_dir_for(args.logs_dir.as_ref(), &args.output_dir);
    finish_run(&ctx, &logs_dir, "Catalog to Semantic Run")
}

fn handle_from_csv(args: &cli::FromCsvArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("CSV file not found: {:?}", args.input);
    }
    let records = store::read_records(&args.input)
        .with_context(|| format!("Reading semantic store {:?}", args.input))?;
    let only = args.only_cubes.iter().cloned().collect::<HashSet<_>>();
    let mut ctx = RunContext::new();
    let cubes = builder::build_cubes_from_records(&records, &only, &mut ctx);
    if cubes.is_empty() {
        warn!("No cubes found in {:?}", args.input);
    }
    write_yaml_per_cube(&cubes, &args.output_dir, CubeLayout::DescriptionFirst, &mut ctx)?;
    let logs_dir = logs_dir_for(args.logs_dir.as_ref(), &args.output_dir);
    finish_run(&ctx, &logs_dir, "Semantic CSV Rebuild Run")
}

fn handle_view(args: &cli::ViewArgs) -> Result<()> {
    let records = store::read_records(&args.input)
        .with_context(|| format!("Reading semantic store {:?}", args.input))?;
    let mut ctx = RunContext::new();
    let cubes = builder::build_cubes_from_records(&records, &HashSet::new(), &mut ctx);

    let mut settings = ViewSettings::from_records(&records);
    settings.root = args.root.clone();
    if args.name.is_some() {
        settings.name = args.name.clone();
    }
    if args.title.is_some() {
        settings.title = args.title.clone();
    }
    if args.description.is_some() {
        settings.description = args.description.clone();
    }

    let logs_dir = logs_dir_beside_file(args.logs_dir.as_ref(), &args.output);
    let view = match view::build_view(&cubes, &settings) {
        Ok(view) => view,
        Err(defect) => {
            let err = anyhow!(defect.clone());
            ctx.report(defect);
            finish_run(&ctx, &logs_dir, "Semantic View Run")?;
            return Err(err.context(format!("Building view from {:?}", args.input)));
        }
    };
    let text = render::render_view(&view);
    write_text(&args.output, &text)?;
    info!(
        "Wrote view '{}' with {} join path(s) to {:?}",
        view.name,
        view.cubes.len(),
        args.output
    );
    ctx.record_view(view.name.clone(), text);
    finish_run(&ctx, &logs_dir, "Semantic View Run")
}

fn handle_standards(args: &cli::StandardsArgs) -> Result<()> {
    if !args.input.is_file() {
        bail!("File not found: {:?}", args.input);
    }
    let report = standards::check_cube_file(&args.input)
        .with_context(|| format!("Checking standards of {:?}", args.input))?;
    let text = report.render();
    print!("{text}");
    let stem = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let log_path = runlog::write_standards_log(&args.logs_dir, &stem, &runlog::timestamp(), &text)?;
    info!(
        "Standards result for {:?}: {} (report mirrored to {:?})",
        args.input,
        if report.passed() { "PASS" } else { "FAIL" },
        log_path
    );
    Ok(())
}

fn logs_dir_for(explicit: Option<&PathBuf>, output_dir: &Path) -> PathBuf {
    explicit
        .cloned()
        .unwrap_or_else(|| runlog::default_logs_dir(output_dir))
}

/// Explicit directory, or the default beside the directory holding `output`.
fn logs_dir_beside_file(explicit: Option<&PathBuf>, output: &Path) -> PathBuf {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    logs_dir_for(explicit, parent)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    fs::write(path, text).with_context(|| format!("Writing output file {path:?}"))
}

fn write_yaml_per_cube(
    cubes: &[Cube],
    output_dir: &Path,
    layout: CubeLayout,
    ctx: &mut RunContext,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;
    for cube in cubes {
        let text = render::render_cubes(std::slice::from_ref(cube), layout);
        let path = output_dir.join(format!("{}.yml", cube.name));
        fs::write(&path, &text).with_context(|| format!("Writing cube YAML {path:?}"))?;
        info!("Wrote YAML to {path:?}");
        ctx.record_document(cube.name.clone(), text);
    }
    Ok(())
}

fn finish_run(ctx: &RunContext, logs_dir: &Path, heading: &str) -> Result<()> {
    let stamp = runlog::timestamp();
    let error_log = runlog::write_error_log(logs_dir, &stamp, ctx.defects())?;
    let log_path =
        runlog::write_run_log(
            logs_dir,
            &stamp,
            heading,
            ctx.documents(),
            ctx.views(),
            error_log.as_deref(),
        )?;
    info!("Created log file: {log_path:?}");
    if let Some(error_log) = error_log {
        warn!(
            "{} defect(s) captured in {:?}",
            ctx.defects().len(),
            error_log
        );
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: Option<u8>) -> String {
    match delimiter {
        None => "auto".to_string(),
        Some(b',') => ",".to_string(),
        Some(b'\t') => "\\t".to_string(),
        Some(other) => (other as char).to_string(),
    }
}
