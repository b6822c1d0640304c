//! Build orchestration: resolve, synthesize, run, then locate the firmware.

use std::fmt;
use std::path::PathBuf;

use crate::catalog::{Catalog, Variant};
use crate::command::{
    self, BuildMode, HostEnv, HostPlatform, IdentityPaths, Invocation, PathTranslator,
    SynthesisRequest, WslPathTranslator,
};
use crate::container::{ContainerOptions, resolve_container};
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, ProcessOutput};
use crate::ports::{self, SYNTHETIC_DEFAULT_VARIANT_DIR};

/// `BOARD` or `BOARD-VARIANT`, as accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub board: String,
    pub variant: Option<String>,
}

impl VariantSpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once('-') {
            Some((board, variant)) if !variant.is_empty() => Self {
                board: board.to_string(),
                variant: Some(variant.to_string()),
            },
            Some((board, _)) => Self {
                board: board.to_string(),
                variant: None,
            },
            None => Self {
                board: raw.to_string(),
                variant: None,
            },
        }
    }
}

impl fmt::Display for VariantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant.as_deref() {
            Some(v) if !v.is_empty() => write!(f, "{}-{v}", self.board),
            _ => write!(f, "{}", self.board),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    pub path: PathBuf,
    pub board: String,
    pub variant: String,
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Firmware({}, {})",
            crate::error::target_name(&self.board, &self.variant),
            self.path.display()
        )
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub board: String,
    pub variant: Option<String>,
    pub mode: BuildMode,
    pub extra_args: Vec<String>,
    pub container: ContainerOptions,
    /// Attach the terminal instead of capturing output.
    pub interactive: bool,
}

impl BuildRequest {
    pub fn new(board: impl Into<String>, variant: Option<String>, mode: BuildMode) -> Self {
        Self {
            board: board.into(),
            variant,
            mode,
            extra_args: Vec::new(),
            container: ContainerOptions::default(),
            interactive: false,
        }
    }

    pub fn from_spec(spec: &VariantSpec, mode: BuildMode) -> Self {
        Self::new(spec.board.clone(), spec.variant.clone(), mode)
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Set for successful builds; `None` for clean runs.
    pub firmware: Option<Firmware>,
    pub output: ProcessOutput,
    /// First deploy document of the board, when it exists.
    pub deploy_doc: Option<PathBuf>,
    pub invocation: Invocation,
}

/// Expected firmware location: `<port-dir>/build-<board>[-<variant>]/<file>`
/// for boards, `<port-dir>/build-<variant>/<file>` for port-level targets.
pub fn firmware_path(catalog: &Catalog, variant: &Variant) -> Result<PathBuf> {
    let board = catalog.board_of(variant)?;
    let port = catalog.port_of(board)?;
    let rule = ports::toolchain(&port.name).ok_or_else(|| Error::NoFirmwareRule {
        port: port.name.clone(),
    })?;

    let build_dir = if board.physical_board {
        if variant.is_default() {
            format!("build-{}", board.name)
        } else {
            format!("build-{}-{}", board.name, variant.name)
        }
    } else if variant.is_default() {
        format!("build-{SYNTHETIC_DEFAULT_VARIANT_DIR}")
    } else {
        format!("build-{}", variant.name)
    };
    Ok(port.directory.join(build_dir).join(rule.firmware))
}

pub struct Builder<'a> {
    catalog: &'a Catalog,
    runner: &'a dyn CommandRunner,
    host: HostEnv,
    translator: Box<dyn PathTranslator + 'a>,
}

impl<'a> Builder<'a> {
    pub fn new(catalog: &'a Catalog, runner: &'a dyn CommandRunner, host: HostEnv) -> Self {
        let translator: Box<dyn PathTranslator> = match host.platform {
            HostPlatform::Posix => Box::new(IdentityPaths),
            HostPlatform::Wsl => Box::new(WslPathTranslator),
        };
        Self {
            catalog,
            runner,
            host,
            translator,
        }
    }

    pub fn with_translator(mut self, translator: impl PathTranslator + 'a) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Resolve everything up to the command line without running anything.
    pub fn plan(&self, req: &BuildRequest) -> Result<(&'a Variant, Invocation)> {
        let variant = self
            .catalog
            .variant(&req.board, req.variant.as_deref())?;
        let board = self.catalog.board_of(variant)?;
        let image = resolve_container(board, variant, &req.container)?;
        let inv = command::synthesize(
            &SynthesisRequest {
                catalog: self.catalog,
                variant,
                mode: req.mode,
                image: &image,
                extra_args: &req.extra_args,
                interactive: req.interactive,
            },
            &self.host,
            self.translator.as_ref(),
        )?;
        Ok((variant, inv))
    }

    pub fn build(&self, req: &BuildRequest) -> Result<BuildOutcome> {
        let (variant, invocation) = self.plan(req)?;
        let board = self.catalog.board_of(variant)?;

        // Known before running, so a port without a firmware rule fails fast.
        let expected = match req.mode {
            BuildMode::Build => Some(firmware_path(self.catalog, variant)?),
            BuildMode::Clean => None,
        };

        tracing::info!(
            port = %board.port,
            board = %board.name,
            variant = %variant.name,
            mode = req.mode.label(),
            "starting containerised build"
        );
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(Error::BuildFailed {
                board: board.name.clone(),
                variant: variant.name.clone(),
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let firmware = match expected {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::MissingArtifact {
                        board: board.name.clone(),
                        variant: variant.name.clone(),
                        path,
                    });
                }
                tracing::info!(firmware = %path.display(), "build finished");
                Some(Firmware {
                    path,
                    board: board.name.clone(),
                    variant: variant.name.clone(),
                })
            }
            None => {
                tracing::info!(board = %board.name, "clean finished");
                None
            }
        };

        let deploy_doc = match req.mode {
            BuildMode::Build => self.catalog.deploy_doc(board),
            BuildMode::Clean => None,
        };

        Ok(BuildOutcome {
            firmware,
            output,
            deploy_doc,
            invocation,
        })
    }

    /// Build `BOARD[-VARIANT]` with captured output.
    pub fn build_by_variant_str(&self, spec: &str, mode: BuildMode) -> Result<BuildOutcome> {
        self.build(&BuildRequest::from_spec(&VariantSpec::parse(spec), mode))
    }

    /// Build several targets one after another; each result stands alone.
    pub fn build_many(
        &self,
        specs: &[VariantSpec],
        mode: BuildMode,
        container: &ContainerOptions,
    ) -> Vec<(VariantSpec, Result<BuildOutcome>)> {
        specs
            .iter()
            .map(|spec| {
                let mut req = BuildRequest::from_spec(spec, mode);
                req.container = container.clone();
                let res = self.build(&req);
                if let Err(e) = &res {
                    tracing::warn!(target_spec = %spec, error = %e, "build failed");
                }
                (spec.clone(), res)
            })
            .collect()
    }
}
