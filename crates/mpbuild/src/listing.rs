use std::fmt::Write as _;

use crate::catalog::{Catalog, Port};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ListFormat {
    #[default]
    Tree,
    /// Space separated board names, for shell completion scripts.
    Text,
}

fn selected<'a>(catalog: &'a Catalog, port: Option<&'a str>) -> impl Iterator<Item = &'a Port> + 'a {
    catalog
        .ports()
        .filter(move |p| port.is_none_or(|want| want == p.name))
}

/// Port -> board tree with board counts and named variants.
pub fn render_tree(catalog: &Catalog, port: Option<&str>) -> String {
    let mut out = String::from("MicroPython Boards\n");
    let ports: Vec<&Port> = selected(catalog, port).collect();

    for (pi, p) in ports.iter().enumerate() {
        let last_port = pi + 1 == ports.len();
        let _ = writeln!(
            out,
            "{} {}   {}",
            if last_port { "└──" } else { "├──" },
            p.name,
            p.board_names().len()
        );
        let indent = if last_port { "    " } else { "│   " };
        let boards: Vec<_> = catalog.boards_of(p).collect();
        for (bi, b) in boards.iter().enumerate() {
            let branch = if bi + 1 == boards.len() { "└──" } else { "├──" };
            let named: Vec<&str> = b
                .variants
                .iter()
                .filter(|v| !v.is_default())
                .map(|v| v.name.as_str())
                .collect();
            let _ = write!(out, "{indent}{branch} {}", b.name);
            if !named.is_empty() {
                let _ = write!(out, "  {}", named.join(", "));
            }
            out.push('\n');
        }
    }
    out
}

pub fn render_text(catalog: &Catalog, port: Option<&str>) -> String {
    selected(catalog, port)
        .flat_map(|p| p.board_names().iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render(catalog: &Catalog, port: Option<&str>, format: ListFormat) -> String {
    match format {
        ListFormat::Tree => render_tree(catalog, port),
        ListFormat::Text => {
            let mut s = render_text(catalog, port);
            s.push('\n');
            s
        }
    }
}
