//! Build container selection.

use std::collections::BTreeMap;

use crate::catalog::{Board, Variant};
use crate::error::{Error, Result};
use crate::ports::{self, IDF_DEFAULT, VERSIONED_PORT};

/// Hardware special case keyed on the exact (board, variant) pair.
#[derive(Debug, Clone, Copy)]
pub struct ContainerException {
    pub board: &'static str,
    pub variant: &'static str,
    pub image: &'static str,
}

// The RP2350 RISC-V cores need their own toolchain; the ARM build of the same
// board needs a newer toolchain than the default ARM image.
pub const EXCEPTIONS: &[ContainerException] = &[
    ContainerException {
        board: "RPI_PICO2",
        variant: "RISCV",
        image: "micropython/build-micropython-rp2350riscv",
    },
    ContainerException {
        board: "RPI_PICO2",
        variant: "",
        image: "micropython/build-micropython-arm:bookworm",
    },
];

#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Used verbatim when set; no table lookup and no version tag.
    pub override_image: Option<String>,
    /// esp32 only; defaults to [`IDF_DEFAULT`].
    pub toolchain_version: Option<String>,
    /// Per-port replacements for the built-in default images.
    pub port_images: BTreeMap<String, String>,
}

pub fn resolve_container(board: &Board, variant: &Variant, opts: &ContainerOptions) -> Result<String> {
    let port = board.port.as_str();
    let version = opts
        .toolchain_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(v) = version
        && port != VERSIONED_PORT
    {
        return Err(Error::VersionNotApplicable {
            port: port.to_string(),
            version: v.to_string(),
        });
    }

    if let Some(image) = opts
        .override_image
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if let Some(v) = version {
            tracing::warn!(
                image,
                version = v,
                "toolchain version ignored because the build container was overridden"
            );
        }
        return Ok(image.to_string());
    }

    if let Some(exc) = EXCEPTIONS
        .iter()
        .find(|e| e.board == board.name && e.variant == variant.name)
    {
        tracing::debug!(
            board = %board.name,
            variant = %variant.name,
            image = exc.image,
            "using board specific build container"
        );
        return Ok(exc.image.to_string());
    }

    let image = match opts.port_images.get(port) {
        Some(configured) => configured.trim().to_string(),
        None => ports::toolchain(port)
            .map(|t| t.image.to_string())
            .ok_or_else(|| Error::UnsupportedPort {
                port: port.to_string(),
            })?,
    };

    if port != VERSIONED_PORT {
        return Ok(image);
    }
    // An explicit version replaces whatever tag the configured image carries.
    Ok(match version {
        Some(v) => format!("{}:{v}", strip_tag(&image)),
        None if has_tag(&image) => image,
        None => format!("{image}:{IDF_DEFAULT}"),
    })
}

// `registry:5000/name` has a port, not a tag; only a colon after the last `/` counts.
fn has_tag(image: &str) -> bool {
    let last = image.rsplit('/').next().unwrap_or(image);
    last.contains(':') || last.contains('@')
}

fn strip_tag(image: &str) -> &str {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].find([':', '@']) {
        Some(i) => &image[..name_start + i],
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(name: &str, port: &str, variants: &[&str]) -> Board {
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
        .with_variants(variants.iter().map(|v| (v.to_string(), String::new())))
    }

    #[test]
    fn rp2350_exception_depends_on_variant() {
        let b = board("RPI_PICO2", "rp2", &["RISCV"]);
        let opts = ContainerOptions::default();
        let riscv = resolve_container(&b, b.variant("RISCV").expect("riscv"), &opts).expect("riscv");
        let arm = resolve_container(&b, b.default_variant().expect("default"), &opts).expect("arm");
        assert_eq!(riscv, "micropython/build-micropython-rp2350riscv");
        assert_eq!(arm, "micropython/build-micropython-arm:bookworm");
    }

    #[test]
    fn exception_wins_over_configured_port_image() {
        let b = board("RPI_PICO2", "rp2", &["RISCV"]);
        let mut opts = ContainerOptions::default();
        opts.port_images.insert("rp2".into(), "example/rp2".into());
        let got = resolve_container(&b, b.variant("RISCV").expect("riscv"), &opts).expect("resolve");
        assert_eq!(got, "micropython/build-micropython-rp2350riscv");

        let pico = board("RPI_PICO", "rp2", &[]);
        let got = resolve_container(&pico, pico.default_variant().expect("default"), &opts).expect("resolve");
        assert_eq!(got, "example/rp2");
    }

    #[test]
    fn esp32_gets_idf_tag() {
        let b = board("ESP32_GENERIC", "esp32", &["SPIRAM"]);
        let mut opts = ContainerOptions::default();
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("default idf"),
            format!("espressif/idf:{IDF_DEFAULT}")
        );
        opts.toolchain_version = Some("v5.3".into());
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("custom idf"),
            "espressif/idf:v5.3"
        );
    }

    #[test]
    fn explicit_version_replaces_configured_tag() {
        let b = board("ESP32_GENERIC", "esp32", &[]);
        let mut opts = ContainerOptions {
            toolchain_version: Some("v5.3".into()),
            ..Default::default()
        };
        opts.port_images.insert("esp32".into(), "espressif/idf:v5.1".into());
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("pinned"),
            "espressif/idf:v5.3"
        );

        opts.port_images
            .insert("esp32".into(), "registry:5000/idf@sha256:abc".into());
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("digest"),
            "registry:5000/idf:v5.3"
        );

        opts.toolchain_version = None;
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("kept"),
            "registry:5000/idf@sha256:abc"
        );
    }

    #[test]
    fn override_is_used_verbatim() {
        let b = board("ESP32_GENERIC", "esp32", &[]);
        let opts = ContainerOptions {
            override_image: Some("my/idf".into()),
            toolchain_version: Some("v5.3".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_container(&b, b.default_variant().expect("default"), &opts).expect("override"),
            "my/idf"
        );

        let w = board("windows", "windows", &[]);
        let opts = ContainerOptions {
            override_image: Some("custom/windows".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_container(&w, w.default_variant().expect("default"), &opts).expect("override"),
            "custom/windows"
        );
    }

    #[test]
    fn version_for_other_port_is_rejected() {
        let b = board("PYBV11", "stm32", &[]);
        let opts = ContainerOptions {
            toolchain_version: Some("v5.3".into()),
            ..Default::default()
        };
        let err = resolve_container(&b, b.default_variant().expect("default"), &opts).unwrap_err();
        assert!(matches!(err, Error::VersionNotApplicable { .. }), "unexpected: {err}");
    }

    #[test]
    fn unknown_port_is_unsupported() {
        let b = board("windows", "windows", &[]);
        let err = resolve_container(&b, b.default_variant().expect("default"), &ContainerOptions::default()).unwrap_err();
        match err {
            Error::UnsupportedPort { port } => assert_eq!(port, "windows"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn tag_detection_ignores_registry_port() {
        assert!(!has_tag("registry:5000/espressif/idf"));
        assert!(has_tag("espressif/idf:v5.2.2"));
        assert_eq!(strip_tag("registry:5000/espressif/idf"), "registry:5000/espressif/idf");
        assert_eq!(strip_tag("espressif/idf:v5.1"), "espressif/idf");
    }
}
