//! Shell completion candidates.

use crate::catalog::Catalog;

pub fn list_ports(catalog: &Catalog) -> Vec<String> {
    catalog.ports().map(|p| p.name.clone()).collect()
}

pub fn list_boards(catalog: &Catalog) -> Vec<String> {
    catalog.boards().map(|b| b.name.clone()).collect()
}

/// Named variants of a board; the default variant is left out.
pub fn list_variants_for_board(catalog: &Catalog, board: &str) -> Vec<String> {
    catalog
        .board(board)
        .map(|b| {
            b.variants
                .iter()
                .filter(|v| !v.is_default())
                .map(|v| v.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn with_prefix(words: Vec<String>, prefix: &str) -> Vec<String> {
    words.into_iter().filter(|w| w.starts_with(prefix)).collect()
}

pub fn complete_port(catalog: &Catalog, incomplete: &str) -> Vec<String> {
    with_prefix(list_ports(catalog), incomplete)
}

pub fn complete_board(catalog: &Catalog, incomplete: &str) -> Vec<String> {
    with_prefix(list_boards(catalog), incomplete)
}

/// Complete the `BOARD[-VARIANT]` form.
///
/// Without a dash, board names are offered; once the word names a board
/// exactly, its `BOARD-VARIANT` forms are offered as well (and alone when the
/// board is the only match). After a dash, the variants of that board are
/// filtered by the remaining prefix.
pub fn complete_board_variant(catalog: &Catalog, incomplete: &str) -> Vec<String> {
    let Some((board, variant_part)) = incomplete.split_once('-') else {
        let mut boards = complete_board(catalog, incomplete);
        if !boards.iter().any(|b| b == incomplete) {
            return boards;
        }
        let combined: Vec<String> = list_variants_for_board(catalog, incomplete)
            .into_iter()
            .map(|v| format!("{incomplete}-{v}"))
            .collect();
        if boards.len() == 1 && !combined.is_empty() {
            return combined;
        }
        boards.extend(combined);
        return boards;
    };

    list_variants_for_board(catalog, board)
        .into_iter()
        .filter(|v| v.starts_with(variant_part))
        .map(|v| format!("{board}-{v}"))
        .collect()
}
