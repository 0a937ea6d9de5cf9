#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use service_report_loader::{
    fields::CanonicalSchema,
    warehouse::{CsvWarehouse, Warehouse},
};
use tempfile::{TempDir, tempdir};

/// A typical export: leading row number, Jalali timestamps, aliased columns,
/// and one column the table does not know.
pub const EXPORT_CSV: &str = "\
Row,CDT,UserServiceId,Creator,ServiceName,Username,ServiceStatus,ServicePrice,SavingOffUsed,PayPlan
1,1402/01/15 10:00,105,ali,Unlimited,u105,active,120000,50,monthly
2,1402/01/16 11:30,106,sara,Monthly 10G,u106,active,90000,0,monthly
3,2023-04-06,107,ali,Unlimited,u107,expired,120000,,yearly
4,1402/01/17,99,reza,Monthly 10G,u099,active,90000,10,monthly
5,1402/01/18,abc,reza,Monthly 10G,u100,active,90000,10,monthly
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

    /// Directory used as the warehouse root.
    pub fn warehouse_dir(&self) -> PathBuf {
        self.temp_dir.path().join("warehouse")
    }

    pub fn warehouse(&self) -> CsvWarehouse {
        CsvWarehouse::open(self.warehouse_dir())
    }

    /// Creates `table` with the standard layout.
    pub fn init_table(&self, table: &str) -> CsvWarehouse {
        let mut warehouse = self.warehouse();
        warehouse
            .create_table(table, &CanonicalSchema::standard())
            .expect("create table");
        warehouse
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).expect("read workspace file")
    }
}
