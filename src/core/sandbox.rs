/// Path Sandbox
///
/// Confines client-supplied paths to a single base directory. Every file tool
/// resolves its `path` argument through `Sandbox::resolve` before touching the
/// filesystem.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::core::error::SandboxError;

/// Base directory that file tools are restricted to.
///
/// The base is fixed when the server starts and shared read-only between
/// requests.
#[derive(Debug, Clone)]
pub struct Sandbox {
    base: PathBuf,
}

impl Sandbox {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve `requested` to an absolute path inside the base directory.
    ///
    /// Absolute-looking input has its root (and drive prefix) stripped and is
    /// treated as relative. The joined path is resolved (`.`, `..` and
    /// symlinks, dangling ones included) before the containment check, so neither
    /// `../` sequences nor links pointing outside the base get through.
    /// Containment is checked per path component: `/srv/base2` is not inside
    /// `/srv/base`.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let base = fs::canonicalize(&self.base).map_err(SandboxError::BaseUnavailable)?;
        let relative = strip_anchor(Path::new(requested));
        let resolved = resolve_components(&base.join(relative)).inspect_err(|_| {
            tracing::warn!(requested, "symlink chain too long or unreadable");
        })?;

        if resolved.starts_with(&base) {
            Ok(resolved)
        } else {
            tracing::warn!(requested, "path escapes sandbox base");
            Err(SandboxError::AccessDenied)
        }
    }
}

/// Symlinks followed per resolution before the path is treated as a loop.
const MAX_LINK_HOPS: usize = 40;

/// Drop root and prefix components so the path can be joined onto the base.
fn strip_anchor(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Resolve `.`/`..` and symlinks for an absolute path whose tail may not exist
/// yet. Existing prefixes are canonicalized as they are built up. A dangling
/// symlink is replaced by its target and resolution continues through it; the
/// non-existent remainder is normalized lexically.
fn resolve_components(path: &Path) -> Result<PathBuf, SandboxError> {
    let mut resolved = PathBuf::new();
    let mut rest = path.to_path_buf();
    let mut hops = 0;

    loop {
        let mut components = rest.components();
        let Some(component) = components.next() else {
            break;
        };
        let tail = components.as_path().to_path_buf();

        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                match fs::canonicalize(&resolved) {
                    Ok(canonical) => resolved = canonical,
                    Err(_) => {
                        if let Some(target) = dangling_link_target(&resolved)? {
                            hops += 1;
                            if hops > MAX_LINK_HOPS {
                                return Err(SandboxError::AccessDenied);
                            }
                            // Relative targets are read from the link's parent;
                            // absolute ones reset `resolved` when their root is pushed.
                            resolved.pop();
                            rest = target.join(&tail);
                            continue;
                        }
                    }
                }
            }
        }
        rest = tail;
    }

    Ok(resolved)
}

/// Target of `path` if it is a symlink, `None` for anything else (including
/// entries that do not exist).
fn dangling_link_target(path: &Path) -> Result<Option<PathBuf>, SandboxError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::read_link(path)
            .map(Some)
            .map_err(|_| SandboxError::AccessDenied),
        _ => Ok(None),
    }
}
