use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Compile schema sheets and catalogs into semantic cube and view YAML",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build cube YAML (and optionally a view) from CSV sheets
    Sheets(SheetsArgs),
    /// Show how each sheet is classified without building anything
    Detect(DetectArgs),
    /// Generate store rows and cube YAML for catalog tables
    Catalog(CatalogArgs),
    /// Rebuild one YAML file per cube from a semantic store CSV
    FromCsv(FromCsvArgs),
    /// Build a view over the cubes of a semantic store CSV
    View(ViewArgs),
    /// Check a cube YAML file against naming and documentation standards
    Standards(StandardsArgs),
}

#[derive(Debug, Args)]
pub struct SheetInput {
    /// Sheet files or directories of sheets (.csv/.tsv)
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// YAML file overriding the built-in section aliases and keywords
    #[arg(long = "sections")]
    pub sections: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    #[command(flatten)]
    pub input: SheetInput,
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Only build this cube; its joins are kept only when they belong to it
    #[arg(long = "only-cube")]
    pub only_cube: Option<String>,
    /// Append a view to the output
    #[arg(long = "view")]
    pub view: bool,
    /// Root cube of the view (implies --view)
    #[arg(long = "view-root")]
    pub view_root: Option<String>,
    /// View name (implies --view; defaults to `<root>_view`)
    #[arg(long = "view-name")]
    pub view_name: Option<String>,
    /// View title (defaults to the titleized view name)
    #[arg(long = "view-title")]
    pub view_title: Option<String>,
    /// View description
    #[arg(long = "view-description")]
    pub view_description: Option<String>,
    /// Folder override for a cube's fields, as `cube=Folder Name`
    #[arg(long = "view-folder", value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub view_folders: Vec<(String, String)>,
    /// Directory for run logs (defaults to `logs` next to the output file)
    #[arg(long = "logs-dir")]
    pub logs_dir: Option<PathBuf>,
}

impl SheetsArgs {
    pub fn wants_view(&self) -> bool {
        self.view || self.view_root.is_some() || self.view_name.is_some()
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub input: SheetInput,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Catalog document (.yml/.yaml/.json) describing table columns
    #[arg(long = "catalog")]
    pub catalog: PathBuf,
    /// Table in project.dataset.table form; repeatable
    #[arg(long = "table", action = clap::ArgAction::Append)]
    pub tables: Vec<String>,
    /// Comma-separated tables in project.dataset.table form
    #[arg(long = "tables", value_delimiter = ',')]
    pub table_list: Vec<String>,
    /// Semantic store CSV to upsert generated rows into
    #[arg(long = "store", default_value = "input/semantic_all.csv")]
    pub store: PathBuf,
    /// Directory receiving one YAML file per cube
    #[arg(long = "output-dir", default_value = "output")]
    pub output_dir: PathBuf,
    /// Cube title applied to every table of this run
    #[arg(long = "cube-title")]
    pub cube_title: Option<String>,
    /// Cube description applied to every table of this run
    #[arg(long = "cube-description")]
    pub cube_description: Option<String>,
    /// Directory for run logs
    #[arg(long = "logs-dir")]
    pub logs_dir: Option<PathBuf>,
}

impl CatalogArgs {
    /// Every requested table id, trimmed, in argument order.
    pub fn table_ids(&self) -> Vec<String> {
        self.tables
            .iter()
            .chain(self.table_list.iter())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Args)]
pub struct FromCsvArgs {
    /// Semantic store CSV
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory receiving one YAML file per cube
    #[arg(long = "output-dir", default_value = "output")]
    pub output_dir: PathBuf,
    /// Restrict the rebuild to these cubes; repeatable
    #[arg(long = "only-cube", action = clap::ArgAction::Append)]
    pub only_cubes: Vec<String>,
    /// Directory for run logs
    #[arg(long = "logs-dir")]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Semantic store CSV
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Root cube (falls back to `fact_<root>`, then the most-joined cube)
    #[arg(long = "root")]
    pub root: Option<String>,
    /// View name; overrides `view_name` from the store
    #[arg(long = "name")]
    pub name: Option<String>,
    /// View title; overrides `view_title` from the store
    #[arg(long = "title")]
    pub title: Option<String>,
    /// View description; overrides `view_description` from the store
    #[arg(long = "description")]
    pub description: Option<String>,
    /// Directory for run logs (defaults to `logs` next to the output file)
    #[arg(long = "logs-dir")]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StandardsArgs {
    /// Cube YAML file to check
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory for the mirrored report
    #[arg(long = "logs-dir", default_value = "logs")]
    pub logs_dir: PathBuf,
}

pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    let (key, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected `cube=Folder`, got '{value}'"))?;
    let key = key.trim();
    let rest = rest.trim();
    if key.is_empty() || rest.is_empty() {
        return Err(format!("Expected `cube=Folder`, got '{value}'"));
    }
    Ok((key.to_string(), rest.to_string()))
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_and_characters_are_accepted() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn folder_assignment_requires_both_sides() {
        assert_eq!(
            parse_assignment("orders = Sales Orders"),
            Ok(("orders".to_string(), "Sales Orders".to_string()))
        );
        assert!(parse_assignment("orders").is_err());
        assert!(parse_assignment("=Sales").is_err());
    }

    #[test]
    fn catalog_table_ids_merge_both_flags() {
        let cli = Cli::parse_from([
            "cubegen",
            "catalog",
            "--catalog",
            "catalog.yml",
            "--table",
            "p.d.orders",
            "--tables",
            "p.d.customers, ,p.d.stores",
        ]);
        let Commands::Catalog(args) = cli.command else {
            panic!("expected catalog command");
        };
        assert_eq!(
            args.table_ids(),
            vec!["p.d.orders", "p.d.customers", "p.d.stores"]
        );
    }
}
