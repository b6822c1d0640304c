use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "{} is not a MicroPython source tree (expected 'ports' and 'mpy-cross' directories); run from inside one or set MICROPY_DIR",
        path.display()
    )]
    InvalidRoot { path: PathBuf },

    #[error("failed to parse board manifest {}: {reason}", path.display())]
    ManifestParse { path: PathBuf, reason: String },

    #[error("board '{name}' is defined by both port '{first_port}' and port '{second_port}'")]
    DuplicateBoard {
        name: String,
        first_port: String,
        second_port: String,
    },

    #[error("builds are not supported for the '{port}' port")]
    UnsupportedPort { port: String },

    #[error("a toolchain version ('{version}') can only be given for esp32 builds, not for port '{port}'")]
    VersionNotApplicable { port: String, version: String },

    #[error("invalid board '{board}'")]
    UnknownBoard { board: String },

    #[error("invalid variant '{variant}' for board '{board}' (valid: {})", valid_list(valid))]
    UnknownVariant {
        board: String,
        variant: String,
        valid: Vec<String>,
    },

    #[error(
        "failed to build {}\n  returncode: {}\n  stdout: {stdout}\n  stderr: {stderr}",
        target_name(board, variant),
        code.map(|c| c.to_string()).unwrap_or_else(|| "killed by signal".into())
    )]
    BuildFailed {
        board: String,
        variant: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("the firmware for {} was not found: {}", target_name(board, variant), path.display())]
    MissingArtifact {
        board: String,
        variant: String,
        path: PathBuf,
    },

    #[error("port '{port}' has no firmware naming rule")]
    NoFirmwareRule { port: String },

    #[error("failed to translate path '{path}' for WSL: {reason}")]
    PathTranslation { path: String, reason: String },

    #[error("config error in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }
}

/// `BOARD` for the default variant, `BOARD-VARIANT` otherwise.
pub(crate) fn target_name(board: &str, variant: &str) -> String {
    if variant.is_empty() {
        board.to_string()
    } else {
        format!("{board}-{variant}")
    }
}

fn valid_list(valid: &[String]) -> String {
    let named: Vec<&str> = valid
        .iter()
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .collect();
    if named.is_empty() {
        "only the default variant".into()
    } else {
        named.join(", ")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
