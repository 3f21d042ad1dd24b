//! Per-scenario sandboxes.
//!
//! A sandbox is a private directory tree on the host:
//!
//! ```text
//! <root>/
//!   source/      test input fixtures
//!   artifacts/   local-filesystem artifact store
//!   results/     result reference files written by `create`
//!   restored/    extraction output of `use`
//!   certs/       domain.crt, domain.key
//! ```
//!
//! The same tree is bind-mounted into command containers at a fixed mount
//! point. [`MountView`] names paths as the container sees them; it never
//! touches the filesystem.

use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Prefix of every sandbox root.
pub const SANDBOX_PREFIX: &str = "ta-acceptance-";

/// Subdirectories present in every sandbox.
pub const SUBDIRS: [&str; 5] = ["source", "artifacts", "results", "restored", "certs"];

/// Certificate file name inside `certs/`.
pub const CERT_FILE: &str = "domain.crt";

/// Private key file name inside `certs/`.
pub const KEY_FILE: &str = "domain.key";

/// Relative layout shared by a sandbox and its in-container projection.
pub trait Layout {
    /// Returns the root of the tree.
    fn root(&self) -> &Path;

    /// Returns the source fixtures directory.
    fn source_dir(&self) -> PathBuf {
        self.root().join("source")
    }

    /// Returns the local artifact store directory.
    fn artifacts_dir(&self) -> PathBuf {
        self.root().join("artifacts")
    }

    /// Returns the result references directory.
    fn results_dir(&self) -> PathBuf {
        self.root().join("results")
    }

    /// Returns the restore target directory.
    fn restored_dir(&self) -> PathBuf {
        self.root().join("restored")
    }

    /// Returns the certificates directory.
    fn certs_dir(&self) -> PathBuf {
        self.root().join("certs")
    }

    /// Returns the registry certificate path.
    fn domain_cert(&self) -> PathBuf {
        self.certs_dir().join(CERT_FILE)
    }

    /// Returns the registry private key path.
    fn domain_key(&self) -> PathBuf {
        self.certs_dir().join(KEY_FILE)
    }
}

/// A materialized sandbox on the host, owned by one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Creates a fresh sandbox under `base`.
    ///
    /// The root gets a unique name and, like every subdirectory, owner-only
    /// permissions. The root is detached from its `TempDir` guard: removal
    /// happens in [`Sandbox::teardown`] so that `sandbox.keep` can skip it.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Provision` if any directory cannot be created.
    pub fn create(base: &Path) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(SANDBOX_PREFIX)
            .tempdir_in(base)
            .map_err(|e| {
                HarnessError::provision("sandbox", format!("creating under {}: {e}", base.display()))
            })?
            .keep();

        let sandbox = Self { root };
        if let Err(e) = sandbox.mkdirs() {
            let _ = sandbox.teardown();
            return Err(e);
        }
        debug!(root = %sandbox.root.display(), "sandbox created");
        Ok(sandbox)
    }

    fn mkdirs(&self) -> Result<()> {
        let mut builder = DirBuilder::new();
        builder.recursive(true).mode(0o700);
        for dir in SUBDIRS {
            let path = self.root.join(dir);
            builder.create(&path).map_err(|e| {
                HarnessError::provision("sandbox", format!("creating {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    /// Recursively deletes the sandbox.
    ///
    /// Deleting an already deleted sandbox succeeds, so teardown may run
    /// more than once.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree exists but cannot be removed.
    pub fn teardown(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(root = %self.root.display(), "sandbox removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Projects the sandbox onto `container_root`.
    ///
    /// Pure path arithmetic; nothing is created.
    #[must_use]
    pub fn project_mount(&self, container_root: impl Into<PathBuf>) -> MountView {
        MountView {
            root: container_root.into(),
        }
    }

    /// Returns the bind spec mounting the whole sandbox at `container_root`.
    ///
    /// `:Z` relabels the content for hosts enforcing SELinux.
    #[must_use]
    pub fn bind(&self, container_root: &Path) -> String {
        format!("{}:{}:Z", self.root.display(), container_root.display())
    }

    /// Returns true if the sandbox root still exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }
}

impl Layout for Sandbox {
    fn root(&self) -> &Path {
        &self.root
    }
}

/// A sandbox as seen from inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountView {
    root: PathBuf,
}

impl Layout for MountView {
    fn root(&self) -> &Path {
        &self.root
    }
}

/// Returns the host side of a bind spec (`host:container[:options]`).
#[must_use]
pub fn bind_host_path(bind: &str) -> &str {
    bind.split_once(':').map_or(bind, |(host, _)| host)
}
