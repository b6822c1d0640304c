use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::catalog::manifest::{BoardManifest, MANIFEST_FILE};
use crate::catalog::{Board, Catalog};
use crate::error::{Error, Result};
use crate::ports::SPECIAL_PORTS;

/// Build a [`Catalog`] from `<root>/ports/<port>/boards/<board>/board.json`
/// plus the special port-level targets (`unix`, `webassembly`, ...).
///
/// Traversal is sorted, so loading an unchanged tree twice yields equal catalogs.
pub fn load(root: &Path) -> Result<Catalog> {
    let root = crate::workspace::validate_root(root)?;
    let ports_dir = root.join("ports");
    let mut catalog = Catalog::empty(root);

    for entry in WalkDir::new(&ports_dir)
        .min_depth(4)
        .max_depth(4)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
            continue;
        }
        let Some((port_name, board_name)) = manifest_location(&ports_dir, entry.path()) else {
            continue;
        };

        let manifest = BoardManifest::read(entry.path())?;
        let board = board_from_manifest(&port_name, &board_name, manifest);
        tracing::debug!(
            port = %port_name,
            board = %board_name,
            variants = board.variants.len(),
            "loaded board manifest"
        );
        catalog.insert(board, ports_dir.join(&port_name))?;
    }

    for special in SPECIAL_PORTS {
        let port_dir = ports_dir.join(special);
        if !port_dir.is_dir() {
            continue;
        }
        let board = special_board(special, &port_dir)?;
        tracing::debug!(
            port = %special,
            variants = board.variants.len(),
            "added port-level target"
        );
        catalog.insert(board, port_dir)?;
    }

    Ok(catalog)
}

// Accept only `<port>/boards/<board>/board.json` relative to the ports dir.
fn manifest_location(ports_dir: &Path, manifest: &Path) -> Option<(String, String)> {
    let rel = manifest.strip_prefix(ports_dir).ok()?;
    let parts: Vec<&str> = rel.iter().map(|s| s.to_str()).collect::<Option<_>>()?;
    match parts.as_slice() {
        [port, "boards", board, file] if *file == MANIFEST_FILE => {
            Some((port.to_string(), board.to_string()))
        }
        _ => None,
    }
}

fn board_from_manifest(port: &str, name: &str, manifest: BoardManifest) -> Board {
    let url = manifest.url_or_fallback(name);
    Board {
        name: name.to_string(),
        port: port.to_string(),
        variants: Vec::new(),
        url,
        mcu: manifest.mcu,
        product: manifest.product,
        vendor: manifest.vendor,
        images: manifest.images,
        deploy: manifest.deploy,
        physical_board: true,
    }
    .with_variants(manifest.variants)
}

fn special_board(port: &str, port_dir: &Path) -> Result<Board> {
    let variants = variant_dirs(&port_dir.join("variants"))?
        .into_iter()
        .map(|v| (v, String::new()));
    Ok(Board {
        name: port.to_string(),
        port: port.to_string(),
        variants: Vec::new(),
        url: format!("https://github.com/micropython/micropython/blob/master/ports/{port}/README.md"),
        mcu: String::new(),
        product: String::new(),
        vendor: String::new(),
        images: Vec::new(),
        deploy: Vec::new(),
        physical_board: false,
    }
    .with_variants(variants))
}

fn variant_dirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            out.push(name.to_string());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_location_requires_boards_segment() {
        let ports = Path::new("/mpy/ports");
        assert_eq!(
            manifest_location(ports, Path::new("/mpy/ports/stm32/boards/PYBV11/board.json")),
            Some(("stm32".to_string(), "PYBV11".to_string()))
        );
        assert_eq!(
            manifest_location(ports, Path::new("/mpy/ports/stm32/other/PYBV11/board.json")),
            None
        );
    }
}
