//! In-memory graph of ports, boards and variants.
//!
//! The catalog owns every [`Port`] and [`Board`]; each board owns its
//! [`Variant`] list. Back-references (variant -> board, board -> port) are
//! stored as names and resolved through the catalog, so the graph has no
//! ownership cycles. A catalog is immutable once loaded; load a fresh one to
//! pick up changes on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub mod loader;
pub mod manifest;

/// Name of the default variant of every board.
pub const DEFAULT_VARIANT: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    /// `<root>/ports/<name>`
    pub directory: PathBuf,
    boards: Vec<String>,
}

impl Port {
    pub(crate) fn new(name: impl Into<String>, directory: PathBuf) -> Self {
        Self {
            name: name.into(),
            directory,
            boards: Vec::new(),
        }
    }

    /// Board names of this port, sorted.
    pub fn board_names(&self) -> &[String] {
        &self.boards
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Empty for the default variant. Example: `DP_THREAD`.
    pub name: String,
    /// Example: `Double precision float + Threads`.
    pub text: String,
    /// Name of the owning board.
    pub board: String,
}

impl Variant {
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_VARIANT
    }

    /// `PYBV11` for the default variant, `PYBV11-DP_THREAD` otherwise.
    pub fn name_full(&self) -> String {
        crate::error::target_name(&self.board, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub name: String,
    /// Name of the owning port.
    pub port: String,
    /// Default variant first, the rest sorted by name. Never empty.
    pub variants: Vec<Variant>,
    pub url: String,
    pub mcu: String,
    pub product: String,
    pub vendor: String,
    pub images: Vec<String>,
    /// Deploy documents, relative to the board directory.
    pub deploy: Vec<String>,
    /// `false` for port-level targets such as `unix` that have no manifest.
    pub physical_board: bool,
}

impl Board {
    /// `None` only for a hand-built board that never went through [`Board::with_variants`].
    pub fn default_variant(&self) -> Option<&Variant> {
        self.variants.first().filter(|v| v.is_default())
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    /// Directory holding the board's `board.json`.
    pub fn directory(&self, port: &Port) -> PathBuf {
        port.directory.join("boards").join(&self.name)
    }

    pub(crate) fn with_variants(mut self, names: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut named: Vec<(String, String)> = names
            .into_iter()
            .filter(|(n, _)| n != DEFAULT_VARIANT)
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named.dedup_by(|a, b| a.0 == b.0);

        let mut variants = Vec::with_capacity(named.len() + 1);
        variants.push(Variant {
            name: DEFAULT_VARIANT.into(),
            text: String::new(),
            board: self.name.clone(),
        });
        for (name, text) in named {
            variants.push(Variant {
                name,
                text,
                board: self.name.clone(),
            });
        }
        self.variants = variants;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    root: PathBuf,
    ports: BTreeMap<String, Port>,
    boards: BTreeMap<String, Board>,
}

impl Catalog {
    /// Load every board under `<root>/ports`. See [`loader::load`].
    pub fn load(root: &Path) -> Result<Self> {
        loader::load(root)
    }

    pub(crate) fn empty(root: PathBuf) -> Self {
        Self {
            root,
            ports: BTreeMap::new(),
            boards: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, board: Board, port_dir: PathBuf) -> Result<()> {
        if let Some(existing) = self.boards.get(&board.name) {
            return Err(Error::DuplicateBoard {
                name: board.name.clone(),
                first_port: existing.port.clone(),
                second_port: board.port.clone(),
            });
        }
        let port = self
            .ports
            .entry(board.port.clone())
            .or_insert_with(|| Port::new(board.port.clone(), port_dir));
        let pos = port.boards.binary_search(&board.name).unwrap_or_else(|p| p);
        port.boards.insert(pos, board.name.clone());
        self.boards.insert(board.name.clone(), board);
        Ok(())
    }

    /// The MicroPython checkout this catalog was loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ports sorted by name.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Boards sorted by name.
    pub fn boards(&self) -> impl Iterator<Item = &Board> {
        self.boards.values()
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    pub fn board(&self, name: &str) -> Result<&Board> {
        self.boards.get(name).ok_or_else(|| Error::UnknownBoard {
            board: name.to_string(),
        })
    }

    /// Resolve a board and an optional variant name; `None` and `""` both select the default.
    pub fn variant(&self, board: &str, variant: Option<&str>) -> Result<&Variant> {
        let b = self.board(board)?;
        let name = variant.unwrap_or(DEFAULT_VARIANT);
        b.variant(name).ok_or_else(|| Error::UnknownVariant {
            board: b.name.clone(),
            variant: name.to_string(),
            valid: b.variant_names(),
        })
    }

    /// Port owning `board`. Fails for a board that is not part of this catalog.
    pub fn port_of(&self, board: &Board) -> Result<&Port> {
        self.ports.get(&board.port).ok_or_else(|| Error::UnknownBoard {
            board: board.name.clone(),
        })
    }

    /// Board owning `variant`. Fails for a variant minted outside this catalog.
    pub fn board_of(&self, variant: &Variant) -> Result<&Board> {
        self.board(&variant.board)
    }

    /// Boards of one port, sorted by name.
    pub fn boards_of<'a>(&'a self, port: &'a Port) -> impl Iterator<Item = &'a Board> + 'a {
        port.boards.iter().filter_map(|n| self.boards.get(n))
    }

    /// Every variant of every board of one port, boards in name order.
    pub fn variants_of_port<'a>(&'a self, port: &'a Port) -> impl Iterator<Item = &'a Variant> + 'a {
        self.boards_of(port).flat_map(|b| b.variants.iter())
    }

    /// Absolute path of the board's first deploy document, if it exists on disk.
    pub fn deploy_doc(&self, board: &Board) -> Option<PathBuf> {
        let first = board.deploy.first()?;
        let dir = board.directory(self.port_of(board).ok()?);
        let path = crate::workspace::resolve_relative(&dir, first);
        path.is_file().then_some(path)
    }

    /// Hex SHA-256 over the ordered entity set. Two loads of an unchanged
    /// tree produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for port in self.ports.values() {
            hasher.update(b"port\0");
            hasher.update(port.name.as_bytes());
            hasher.update(b"\0");
            for board in self.boards_of(port) {
                hasher.update(b"board\0");
                for field in [
                    board.name.as_str(),
                    board.url.as_str(),
                    board.mcu.as_str(),
                    board.product.as_str(),
                    board.vendor.as_str(),
                    if board.physical_board { "1" } else { "0" },
                ] {
                    hasher.update(field.as_bytes());
                    hasher.update(b"\0");
                }
                for list in [&board.images, &board.deploy] {
                    hasher.update(list.join("\u{1f}").as_bytes());
                    hasher.update(b"\0");
                }
                for v in &board.variants {
                    hasher.update(b"variant\0");
                    hasher.update(v.name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(v.text.as_bytes());
                    hasher.update(b"\0");
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(name: &str, port: &str) -> Board {
        Board {
            name: name.into(),
            port: port.into(),
            variants: Vec::new(),
            url: String::new(),
            mcu: String::new(),
            product: String::new(),
            vendor: String::new(),
            images: Vec::new(),
            deploy: Vec::new(),
            physical_board: true,
        }
    }

    #[test]
    fn default_variant_is_first_and_rest_sorted() {
        let b = board("PYBV11", "stm32").with_variants([
            ("THREAD".to_string(), "Threading".to_string()),
            ("DP".to_string(), "Double-precision float".to_string()),
            ("NETWORK".to_string(), "Wiznet 5200 Driver".to_string()),
        ]);
        let names: Vec<&str> = b.variants.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["", "DP", "NETWORK", "THREAD"]);
        assert!(b.default_variant().expect("default").is_default());
        assert!(b.variants.iter().all(|v| v.board == "PYBV11"));
    }

    #[test]
    fn duplicate_board_names_are_rejected() {
        let mut cat = Catalog::empty(PathBuf::from("/mpy"));
        cat.insert(board("X", "stm32").with_variants([]), PathBuf::from("/mpy/ports/stm32"))
            .expect("first insert");
        let err = cat
            .insert(board("X", "rp2").with_variants([]), PathBuf::from("/mpy/ports/rp2"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateBoard { .. }), "unexpected: {err}");
    }

    #[test]
    fn foreign_entities_are_errors_not_panics() {
        let mut cat = Catalog::empty(PathBuf::from("/mpy"));
        cat.insert(board("PYBV11", "stm32").with_variants([]), PathBuf::from("/mpy/ports/stm32"))
            .expect("insert");

        let stray = Variant {
            name: String::new(),
            text: String::new(),
            board: "RPI_PICO".into(),
        };
        assert!(matches!(cat.board_of(&stray), Err(Error::UnknownBoard { .. })));

        let orphan = board("RPI_PICO", "rp2").with_variants([]);
        assert!(matches!(cat.port_of(&orphan), Err(Error::UnknownBoard { .. })));
        assert!(cat.deploy_doc(&orphan).is_none());

        assert!(board("BARE", "stm32").default_variant().is_none());
    }

    #[test]
    fn variant_lookup_reports_valid_names() {
        let mut cat = Catalog::empty(PathBuf::from("/mpy"));
        cat.insert(
            board("PYBV11", "stm32").with_variants([("DP".to_string(), String::new())]),
            PathBuf::from("/mpy/ports/stm32"),
        )
        .expect("insert");

        assert!(cat.variant("PYBV11", None).expect("default").is_default());
        assert_eq!(cat.variant("PYBV11", Some("DP")).expect("dp").name, "DP");
        match cat.variant("PYBV11", Some("NOPE")).unwrap_err() {
            Error::UnknownVariant { variant, valid, .. } => {
                assert_eq!(variant, "NOPE");
                assert_eq!(valid, ["", "DP"]);
            }
            other => panic!("unexpected: {other}"),
        }
        match cat.board("DOES_NOT_EXIST").unwrap_err() {
            Error::UnknownBoard { board } => assert_eq!(board, "DOES_NOT_EXIST"),
            other => panic!("unexpected: {other}"),
        }
    }
}
