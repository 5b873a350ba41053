mod common;

use common::{config_in, write_workbook};
use std::process::Command;
use tempfile::TempDir;

const DUPLICATE_FNSKU_CONFIG: &str = r#"
[paths]
data_dir = "data"
workbook = "data/uploads/stock_report.xlsx"
exports_dir = "data/exports"
backups_dir = "data/backups"
logs_dir = "logs"

[[products]]
weight_kg = 1.0
pouch_size = "9*12"
fnsku = "X00289HWX7"

[[products]]
weight_kg = 2.0
pouch_size = "11*16"
fnsku = "X00289HWX7"
"#;

fn small_inventory(dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_small-inventory"));
    command
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["--config", "inventory.toml"]);
    command
}

#[test]
fn test_record_rejects_duplicate_fnsku_config() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_1.0KG", 40)]);
    let before = std::fs::read(&config.paths.workbook).unwrap();
    std::fs::write(dir.path().join("inventory.toml"), DUPLICATE_FNSKU_CONFIG).unwrap();

    let output = small_inventory(&dir)
        .args([
            "record",
            "sale",
            "-f",
            "date=2025-06-08",
            "-f",
            "product=1.0kg",
            "-f",
            "channel=Amazon FBA",
            "-f",
            "quantity=3",
            "-f",
            "unit_price=100",
        ])
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(stderr.contains("products[1].fnsku"), "stderr: {}", stderr);
    assert_eq!(std::fs::read(&config.paths.workbook).unwrap(), before);
    assert!(!config.paths.backups_dir.exists());
}

#[test]
fn test_check_reports_instead_of_rejecting_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("inventory.toml"), DUPLICATE_FNSKU_CONFIG).unwrap();

    let output = small_inventory(&dir).arg("check").output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("Running diagnostics"), "stdout: {}", stdout);
    assert!(!stderr.contains("Configuration validation failed"), "stderr: {}", stderr);
    assert!(!output.status.success());
}
