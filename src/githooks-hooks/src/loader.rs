//! Hook discovery.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/
//!   pre-commit/
//!     10-format.hook
//!     20-spell.hook.disabled
//!     30-license.hook
//!   commit-msg/
//!     10-conventional.hook
//! ```
//!
//! Hooks run in file name order; the `.disabled` suffix keeps a hook listed
//! but never executed.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::spec::{HookSpec, Interpreter};
use crate::{HookError, Result, Stage};

/// Suffix every hook file name carries.
pub const HOOK_SUFFIX: &str = ".hook";

/// Suffix appended to a hook file name to disable it.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// The dispatcher's own entry point, never returned as a hook.
pub const DISPATCHER_FILE: &str = "dispatcher.hook";

/// Bytes read from the start of a file when looking for a shebang.
const SHEBANG_PROBE_BYTES: u64 = 256;

/// Hooks found for one stage, ordered by file name.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub stage: Stage,
    pub specs: Vec<HookSpec>,
}

impl Discovery {
    /// Hooks that will run, in order.
    pub fn enabled(&self) -> impl Iterator<Item = &HookSpec> {
        self.specs.iter().filter(|s| !s.is_disabled)
    }

    /// Hooks skipped because of the disabled suffix.
    pub fn disabled(&self) -> impl Iterator<Item = &HookSpec> {
        self.specs.iter().filter(|s| s.is_disabled)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn disabled_count(&self) -> usize {
        self.disabled().count()
    }

    /// "N hooks found, M skipped (disabled)".
    pub fn summary(&self) -> String {
        format!(
            "{} hook{} found, {} skipped (disabled)",
            self.len(),
            if self.len() == 1 { "" } else { "s" },
            self.disabled_count()
        )
    }
}

/// Discovers hook files under a root directory.
#[derive(Debug, Clone)]
pub struct HookLoader {
    root: PathBuf,
}

impl HookLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the hooks of `stage`.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.as_str())
    }

    /// Discover the hooks of `stage`.
    ///
    /// Fails only when the root itself is missing. A missing or empty stage
    /// directory yields an empty discovery.
    pub fn discover(&self, stage: Stage) -> Result<Discovery> {
        if !self.root.is_dir() {
            return Err(HookError::Discovery {
                root: self.root.clone(),
            });
        }

        let stage_dir = self.stage_dir(stage);
        if !stage_dir.is_dir() {
            debug!(stage = %stage, dir = %stage_dir.display(), "No stage directory");
            return Ok(Discovery {
                stage,
                specs: Vec::new(),
            });
        }

        let entries = fs::read_dir(&stage_dir).map_err(|source| HookError::ReadDir {
            path: stage_dir.clone(),
            source,
        })?;

        let mut specs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| HookError::ReadDir {
                path: stage_dir.clone(),
                source,
            })?;

            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };

            let Some(is_disabled) = classify_filename(&filename) else {
                continue;
            };

            let path = entry.path();
            // Follows symlinks so linked hooks are picked up.
            let metadata = match fs::metadata(&path) {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let path = dunce::canonicalize(&path).unwrap_or(path);
            let (interpreter, is_binary) = sniff_header(&path);

            specs.push(HookSpec {
                stage,
                filename,
                is_executable: is_executable(&metadata),
                is_disabled,
                interpreter,
                is_binary,
                path,
            });
        }

        specs.sort_by(|a, b| a.filename.cmp(&b.filename));

        let discovery = Discovery { stage, specs };
        debug!(stage = %stage, "{}", discovery.summary());
        Ok(discovery)
    }
}

/// Decide whether a file name is a hook.
///
/// Returns `Some(disabled)` for hook files and `None` for anything else,
/// including the dispatcher's own file.
pub fn classify_filename(filename: &str) -> Option<bool> {
    let (base, disabled) = match filename.strip_suffix(DISABLED_SUFFIX) {
        Some(base) => (base, true),
        None => (filename, false),
    };

    if base == DISPATCHER_FILE {
        return None;
    }

    match base.strip_suffix(HOOK_SUFFIX) {
        Some(stem) if !stem.is_empty() => Some(disabled),
        _ => None,
    }
}

/// Read the start of a file: the shebang interpreter, if any, and whether
/// the file is a native executable.
fn sniff_header(path: &Path) -> (Interpreter, bool) {
    let mut buf = Vec::new();
    let read = fs::File::open(path).and_then(|f| f.take(SHEBANG_PROBE_BYTES).read_to_end(&mut buf));
    if let Err(e) = read {
        debug!(path = %path.display(), error = %e, "Could not read hook header");
        return (Interpreter::None, false);
    }

    if is_native_binary(&buf) {
        return (Interpreter::None, true);
    }

    let header = String::from_utf8_lossy(&buf);
    let first_line = header.lines().next().unwrap_or("");
    // Tolerate a UTF-8 byte order mark written by some Windows editors.
    let interpreter = Interpreter::from_shebang(first_line.trim_start_matches('\u{feff}'));
    (interpreter, false)
}

/// Magic numbers of ELF, Mach-O (thin and fat) and PE executables.
const BINARY_MAGICS: &[&[u8]] = &[
    b"\x7fELF",
    &[0xfe, 0xed, 0xfa, 0xce],
    &[0xfe, 0xed, 0xfa, 0xcf],
    &[0xce, 0xfa, 0xed, 0xfe],
    &[0xcf, 0xfa, 0xed, 0xfe],
    &[0xca, 0xfe, 0xba, 0xbe],
    b"MZ",
];

/// Whether `header` starts like a compiled executable.
pub fn is_native_binary(header: &[u8]) -> bool {
    BINARY_MAGICS.iter().any(|magic| header.starts_with(magic))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}
