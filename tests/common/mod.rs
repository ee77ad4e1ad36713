#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

/// A small sheet workbook: cubes, joins, dimensions and measures exported to
/// one CSV file each, with loose header spellings.
pub const CUBES_SHEET: &str = "\
Cube Name,SqlTable,Title,Description
orders,proj.sales.orders,Orders,\"All orders
placed online\"
customers,proj.sales.customers,Customers,
";

pub const JOINS_SHEET: &str = "\
Primary Table,Secondary Table,Relationship,Primary Key Column,Secondary Key Column
orders,customers,many_to_one,customer_id,id
";

pub const DIMENSIONS_SHEET: &str = "\
name,sql,type,cube,Primary Key,title
id,{CUBE}.id,number,orders,yes,Order ID
customer_id,{CUBE}.customer_id,number,orders,,Customer ID
id,{CUBE}.id,number,customers,true,Customer ID
name,{CUBE}.name,string,customers,,Name
";

pub const MEASURES_SHEET: &str = "\
name,sql,type,cube
count,{CUBE}.id,count,orders
count,{CUBE}.id,count,customers
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.join(name)).expect("read workspace file")
    }

    /// Writes the sample workbook into `dir` and returns its path.
    pub fn write_workbook(&self, dir: &str) -> PathBuf {
        self.write(&format!("{dir}/cubes.csv"), CUBES_SHEET);
        self.write(&format!("{dir}/joins.csv"), JOINS_SHEET);
        self.write(&format!("{dir}/dimensions.csv"), DIMENSIONS_SHEET);
        self.write(&format!("{dir}/measures.csv"), MEASURES_SHEET);
        self.join(dir)
    }

    /// Names of the files directly inside `dir`, sorted.
    pub fn list(&self, dir: &str) -> Vec<String> {
        let mut names = fs::read_dir(self.join(dir))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

pub fn cubegen() -> Command {
    Command::cargo_bin("cubegen").expect("binary exists")
}

pub fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}
