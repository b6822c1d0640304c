//! Per-port toolchain table.
//!
//! Every port that can be built has exactly one row here, carrying both the
//! default build container and the name of the firmware file the port's
//! makefile produces. Keeping the two together means a port cannot be
//! buildable without also having an artifact rule.

pub const ARM_BUILD_CONTAINER: &str = "micropython/build-micropython-arm";

/// Default ESP-IDF release used for esp32 builds.
pub const IDF_DEFAULT: &str = "v5.2.2";

/// Port whose image reference carries a toolchain version tag.
pub const VERSIONED_PORT: &str = "esp32";

/// Ports without `boards/` directories, built by variant only.
pub const SPECIAL_PORTS: [&str; 3] = ["unix", "webassembly", "windows"];

/// Build directory suffix used by synthetic ports for their default variant.
pub const SYNTHETIC_DEFAULT_VARIANT_DIR: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortToolchain {
    pub port: &'static str,
    pub image: &'static str,
    pub firmware: &'static str,
}

pub const TOOLCHAINS: &[PortToolchain] = &[
    PortToolchain {
        port: "esp32",
        image: "espressif/idf",
        firmware: "micropython.bin",
    },
    PortToolchain {
        port: "esp8266",
        image: "larsks/esp-open-sdk",
        firmware: "firmware.bin",
    },
    PortToolchain {
        port: "mimxrt",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.hex",
    },
    PortToolchain {
        port: "nrf",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.hex",
    },
    PortToolchain {
        port: "renesas-ra",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.hex",
    },
    PortToolchain {
        port: "rp2",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.uf2",
    },
    PortToolchain {
        port: "samd",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.uf2",
    },
    PortToolchain {
        port: "stm32",
        image: ARM_BUILD_CONTAINER,
        firmware: "firmware.dfu",
    },
    PortToolchain {
        port: "unix",
        image: "micropython/build-micropython-unix",
        firmware: "micropython",
    },
    PortToolchain {
        port: "webassembly",
        image: "emscripten/emsdk",
        firmware: "micropython.mjs",
    },
];

pub fn toolchain(port: &str) -> Option<&'static PortToolchain> {
    TOOLCHAINS.iter().find(|t| t.port == port)
}
