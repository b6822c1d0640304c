//! Windows hosts run the container engine inside WSL, so host paths must be
//! expressed in WSL syntax before they reach `-v`/`-w`.

use std::process::{Command, Stdio};
use std::sync::{Once, OnceLock};

use regex::Regex;

use crate::error::{Error, Result};

pub const WSL_EXE: &str = "wsl.exe";

// `\\wsl$\Ubuntu\home\me\micropython` or `\\wsl.localhost\Ubuntu\...`
const UNC_PATTERN: &str = r"^(?:\\\\|//)wsl(?:\$|\.localhost)[\\/][^\\/]+(?P<rest>.*)$";
const DRIVE_PATTERN: &str = r"^[A-Za-z]:(?:[\\/]|$)";

static SLOW_DRIVE_WARNING: Once = Once::new();
static UNC_RE: OnceLock<Regex> = OnceLock::new();
static DRIVE_RE: OnceLock<Regex> = OnceLock::new();

fn unc_re() -> &'static Regex {
    UNC_RE.get_or_init(|| Regex::new(UNC_PATTERN).expect("UNC pattern is valid"))
}

fn drive_re() -> &'static Regex {
    DRIVE_RE.get_or_init(|| Regex::new(DRIVE_PATTERN).expect("drive pattern is valid"))
}

pub trait PathTranslator {
    /// Convert a drive-letter path (`C:\src\micropython`) to its WSL form.
    fn to_subsystem(&self, native: &str) -> Result<String>;
    /// `$HOME` inside WSL, if WSL reports one.
    fn subsystem_home(&self) -> Option<String>;
}

/// Asks the WSL distribution itself (`wslpath`, `$HOME`).
#[derive(Debug, Default, Clone, Copy)]
pub struct WslPathTranslator;

impl PathTranslator for WslPathTranslator {
    fn to_subsystem(&self, native: &str) -> Result<String> {
        let out = Command::new(WSL_EXE)
            .args(["--exec", "wslpath", "-a", native])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::PathTranslation {
                path: native.to_string(),
                reason: format!("failed to run wslpath: {e}"),
            })?;
        if !out.status.success() {
            return Err(Error::PathTranslation {
                path: native.to_string(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let translated = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if translated.is_empty() {
            return Err(Error::PathTranslation {
                path: native.to_string(),
                reason: "wslpath returned nothing".into(),
            });
        }
        Ok(translated)
    }

    fn subsystem_home(&self) -> Option<String> {
        let out = Command::new(WSL_EXE)
            .args(["--exec", "printenv", "HOME"])
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let home = String::from_utf8_lossy(&out.stdout).trim().to_string();
        (!home.is_empty()).then_some(home)
    }
}

/// Numeric uid/gid of the default WSL user.
pub fn subsystem_user_ids() -> Option<(u32, u32)> {
    let id = |flag: &str| -> Option<u32> {
        let out = Command::new(WSL_EXE)
            .args(["--exec", "id", flag])
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        String::from_utf8_lossy(&out.stdout).trim().parse().ok()
    };
    Some((id("-u")?, id("-g")?))
}

/// Translate a Windows path to WSL syntax.
///
/// WSL network paths are rewritten without calling out to WSL; drive-letter
/// paths go through the translator and trigger a one-time performance warning.
pub fn subsystem_path(native: &str, translator: &dyn PathTranslator) -> Result<String> {
    translate(native, translator, Some(&SLOW_DRIVE_WARNING))
}

// `warning` is fired at most once; `None` translates drive paths silently.
fn translate(native: &str, translator: &dyn PathTranslator, warning: Option<&Once>) -> Result<String> {
    if let Some(caps) = unc_re().captures(native) {
        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
        let rest = rest.replace('\\', "/");
        return Ok(if rest.is_empty() { "/".into() } else { rest });
    }

    if drive_re().is_match(native) {
        if let Some(once) = warning {
            once.call_once(|| {
                tracing::warn!(
                    path = native,
                    "building from a Windows drive through WSL is roughly an order of magnitude slower than \
                     building from the WSL filesystem; consider cloning MicroPython inside WSL (e.g. under ~/)"
                );
            });
        }
        return translator.to_subsystem(native);
    }

    // Already a POSIX style path.
    Ok(native.replace('\\', "/"))
}

/// WSL home directory: what WSL reports, else the host value translated.
/// The home mount is not the build tree, so it never triggers the slow drive warning.
pub fn subsystem_home(host_home: &str, translator: &dyn PathTranslator) -> String {
    if let Some(home) = translator.subsystem_home() {
        return home;
    }
    translate(host_home, translator, None).unwrap_or_else(|_| host_home.to_string())
}
