#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub fn write_manifest(root: &Path, port: &str, board: &str, variants: &[(&str, &str)], deploy: &[&str]) {
    let dir = root.join("ports").join(port).join("boards").join(board);
    fs::create_dir_all(&dir).unwrap();
    let variants: serde_json::Map<String, serde_json::Value> = variants
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let manifest = serde_json::json!({
        "deploy": deploy,
        "docs": "",
        "features": ["USB"],
        "images": [format!("{board}.jpg")],
        "mcu": "stm32f4",
        "product": format!("{board} product"),
        "thumbnail": "",
        "url": "",
        "variants": variants,
        "vendor": "Example Vendor"
    });
    fs::write(dir.join("board.json"), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
}

pub fn add_special_port(root: &Path, port: &str, variants: &[&str]) {
    let dir = root.join("ports").join(port);
    fs::create_dir_all(&dir).unwrap();
    for v in variants {
        fs::create_dir_all(dir.join("variants").join(v)).unwrap();
    }
}

/// A small MicroPython-shaped tree:
/// stm32 (PYBV10, PYBV11 with DP/THREAD, X with DP), rp2 (RPI_PICO2 with
/// RISCV), esp32 (ESP32_GENERIC) and unix (coverage, standard).
pub fn micropython_tree() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("mpy-cross")).unwrap();

    write_manifest(root, "stm32", "PYBV10", &[("DP", "Double-precision float")], &["deploy.md"]);
    fs::write(
        root.join("ports/stm32/boards/PYBV10/deploy.md"),
        "Hold USR and press RST to enter DFU mode.\n",
    )
    .unwrap();
    write_manifest(
        root,
        "stm32",
        "PYBV11",
        &[("THREAD", "Threading"), ("DP", "Double-precision float")],
        &["../PYBV10/deploy.md"],
    );
    write_manifest(root, "stm32", "X", &[("DP", "Double-precision float")], &[]);
    write_manifest(root, "rp2", "RPI_PICO2", &[("RISCV", "RISC-V")], &[]);
    write_manifest(root, "esp32", "ESP32_GENERIC", &[], &[]);
    add_special_port(root, "unix", &["standard", "coverage"]);
    tmp
}

/// Create the firmware file a successful build would leave behind.
pub fn touch(path: &Path) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"firmware").unwrap();
    path.to_path_buf()
}
