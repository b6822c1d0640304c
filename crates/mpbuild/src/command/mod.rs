//! Synthesis of the container invocation for one board/variant.
//!
//! The result is an argument vector executed without a shell. The only shell
//! involved is the `bash -c` script inside the container, and every value
//! interpolated into that script is quoted with [`shell_quote`].

use std::fmt;

use crate::catalog::{Catalog, Variant};
use crate::error::Result;

pub mod wsl;

pub use wsl::{PathTranslator, WslPathTranslator};

pub const DEFAULT_ENGINE: &str = "docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Build,
    Clean,
}

impl BuildMode {
    pub fn label(self) -> &'static str {
        match self {
            BuildMode::Build => "Build",
            BuildMode::Clean => "Clean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    /// The container engine runs directly on the host.
    Posix,
    /// Windows: the engine runs inside WSL and paths need translating.
    Wsl,
}

/// Everything the synthesizer needs to know about the invoking host.
#[derive(Debug, Clone)]
pub struct HostEnv {
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub nprocs: usize,
    pub engine: String,
    pub platform: HostPlatform,
}

impl HostEnv {
    pub fn detect(engine: &str) -> Self {
        let platform = if cfg!(windows) {
            HostPlatform::Wsl
        } else {
            HostPlatform::Posix
        };
        let (uid, gid) = host_ids();
        let home = home_or_tmp(
            std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok(),
        );
        Self {
            uid,
            gid,
            home,
            nprocs: num_cpus::get().max(1),
            engine: engine.to_string(),
            platform,
        }
    }
}

fn home_or_tmp(home: Option<String>) -> String {
    home.filter(|h| !h.is_empty()).unwrap_or_else(|| {
        tracing::warn!("neither HOME nor USERPROFILE is set; mounting /tmp as the container home");
        "/tmp".into()
    })
}

#[cfg(unix)]
fn host_ids() -> (u32, u32) {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    (uid, gid)
}

#[cfg(not(unix))]
fn host_ids() -> (u32, u32) {
    wsl::subsystem_user_ids().unwrap_or_else(|| {
        tracing::warn!("could not query WSL user ids; assuming 1000:1000");
        (1000, 1000)
    })
}

/// Translator used on hosts that need none.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPaths;

impl PathTranslator for IdentityPaths {
    fn to_subsystem(&self, native: &str) -> Result<String> {
        Ok(native.to_string())
    }

    fn subsystem_home(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Attach the terminal (`-it`) instead of capturing output.
    pub interactive: bool,
}

impl Invocation {
    /// The script handed to `bash -c` inside the container.
    pub fn container_script(&self) -> Option<&str> {
        let pos = self.args.iter().rposition(|a| a == "-c")?;
        self.args.get(pos + 1).map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for a in &self.args {
            write!(f, " {}", shell_quote(a))?;
        }
        Ok(())
    }
}

pub struct SynthesisRequest<'a> {
    pub catalog: &'a Catalog,
    pub variant: &'a Variant,
    pub mode: BuildMode,
    pub image: &'a str,
    pub extra_args: &'a [String],
    pub interactive: bool,
}

/// Make variable selecting the variant: boards use `BOARD_VARIANT`, port-level targets `VARIANT`.
pub fn variant_clause(physical_board: bool, variant: &Variant) -> Option<String> {
    if variant.is_default() {
        return None;
    }
    let param = if physical_board { "BOARD_VARIANT" } else { "VARIANT" };
    Some(format!("{param}={}", variant.name))
}

pub fn synthesize(
    req: &SynthesisRequest<'_>,
    host: &HostEnv,
    translator: &dyn PathTranslator,
) -> Result<Invocation> {
    let board = req.catalog.board_of(req.variant)?;
    let port = req.catalog.port_of(board)?;

    let host_root = req.catalog.root().display().to_string();
    let (repo_dir, home) = match host.platform {
        HostPlatform::Posix => (host_root, host.home.clone()),
        HostPlatform::Wsl => (
            wsl::subsystem_path(&host_root, translator)?,
            wsl::subsystem_home(&host.home, translator),
        ),
    };

    // Clean runs as root so it can remove files left by any earlier build.
    let (uid, gid) = match req.mode {
        BuildMode::Build => (host.uid, host.gid),
        BuildMode::Clean => (0, 0),
    };

    let mut make_vars = vec![format!("BOARD={}", board.name)];
    make_vars.extend(variant_clause(board.physical_board, req.variant));
    let port_dir = format!("ports/{}", port.name);

    let mut steps = Vec::new();
    if req.mode == BuildMode::Build {
        steps.push("git config --global --add safe.directory '*' 2> /dev/null; ".to_string());
        steps.push("make -C mpy-cross && ".to_string());
        steps.push(format!(
            "make -C {} submodules {} && ",
            shell_quote(&port_dir),
            quote_words(&make_vars)
        ));
    }
    let mut main = format!(
        "make -j {} -C {} {}",
        host.nprocs,
        shell_quote(&port_dir),
        quote_words(&make_vars)
    );
    if req.mode == BuildMode::Clean {
        main.push_str(" clean");
    }
    if !req.extra_args.is_empty() {
        main.push(' ');
        main.push_str(&quote_words(req.extra_args));
    }
    steps.push(main);
    let script = steps.concat();

    let mut args = vec!["run".to_string()];
    if req.interactive {
        args.push("-it".into());
    }
    args.push("--rm".into());
    // Device and bus access for deploying to attached boards.
    for dev in ["/sys/bus", "/dev"] {
        args.push("-v".into());
        args.push(format!("{dev}:{dev}"));
    }
    args.push("--net=host".into());
    args.push("--privileged".into());
    // Same path inside and out, so paths embedded in ELF/map files match the host.
    args.push("-v".into());
    args.push(format!("{repo_dir}:{repo_dir}"));
    args.push("-w".into());
    args.push(repo_dir.clone());
    args.push("--user".into());
    args.push(format!("{uid}:{gid}"));
    // The container user may not exist in the image; give it a writable home.
    args.push("-v".into());
    args.push(format!("{home}:{home}"));
    args.push("-e".into());
    args.push(format!("HOME={home}"));
    args.push(req.image.to_string());
    args.push("bash".into());
    args.push("-c".into());
    args.push(script);

    let inv = match host.platform {
        HostPlatform::Posix => Invocation {
            program: host.engine.clone(),
            args,
            interactive: req.interactive,
        },
        HostPlatform::Wsl => {
            let mut wrapped = vec!["--exec".to_string(), host.engine.clone()];
            wrapped.extend(args);
            Invocation {
                program: wsl::WSL_EXE.to_string(),
                args: wrapped,
                interactive: req.interactive,
            }
        }
    };
    tracing::debug!(command = %inv, "synthesized build command");
    Ok(inv)
}

fn quote_words<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// POSIX shell quoting. Words made only of safe characters are left bare.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
