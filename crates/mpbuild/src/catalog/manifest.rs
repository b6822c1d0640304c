//! `board.json` parsing.
//!
//! Example (`ports/stm32/boards/PYBV11/board.json`):
//!
//! ```json
//! {
//!     "deploy": ["../PYBV10/deploy.md"],
//!     "images": ["PYBv1_1.jpg", "PYBv1_1-C.jpg"],
//!     "mcu": "stm32f4",
//!     "product": "Pyboard v1.1",
//!     "url": "https://store.micropython.org/product/PYBv1.1",
//!     "variants": {
//!         "DP": "Double-precision float",
//!         "THREAD": "Threading"
//!     },
//!     "vendor": "George Robotics"
//! }
//! ```
//!
//! Unknown keys (`docs`, `features`, `thumbnail`, ...) are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "board.json";

/// Used when a manifest leaves `url` out or empty.
pub const FALLBACK_URL: &str = "https://micropython.org/download/";

#[derive(Debug, Clone, Deserialize)]
pub struct BoardManifest {
    #[serde(default)]
    pub url: Option<String>,
    pub mcu: String,
    pub product: String,
    pub vendor: String,
    pub images: Vec<String>,
    pub deploy: Vec<String>,
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
}

impl BoardManifest {
    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &data)
    }

    pub fn parse(path: &Path, data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn url_or_fallback(&self, board: &str) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => format!("{FALLBACK_URL}{board}/"),
        }
    }
}
