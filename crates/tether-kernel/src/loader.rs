//! Package extraction and module loading
//!
//! Both concerns sit behind traits so the dispatcher can be driven with an
//! in-process module registry and temporary directories in tests.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tether_engine::{ModuleRegistry, ObjectRef};

use crate::assembly::{Assembly, ASSEMBLY_FILE};
use crate::error::{KernelError, KernelResult};

/// Unpacks a package tarball into a directory.
pub trait ArchiveExtractor {
    fn extract(&self, tarball: &Path, target: &Path) -> KernelResult<()>;
}

/// Instantiates the native side of a loaded assembly.
pub trait ModuleLoader {
    /// Returns the module's closure object.
    fn load(&mut self, assembly: &Assembly, package_dir: &Path) -> KernelResult<ObjectRef>;
}

// ============================================================================
// Tarballs
// ============================================================================

/// Extracts `.tgz` and plain `.tar` archives, dropping the archive's root
/// directory (`package/` in published tarballs).
#[derive(Debug, Default, Clone, Copy)]
pub struct TarballExtractor;

impl ArchiveExtractor for TarballExtractor {
    fn extract(&self, tarball: &Path, target: &Path) -> KernelResult<()> {
        let mut file = File::open(tarball).map_err(|e| {
            KernelError::Archive(format!("cannot open {}: {}", tarball.display(), e))
        })?;
        let mut magic = [0u8; 2];
        let gzipped = file.read(&mut magic)? == 2 && magic == [0x1f, 0x8b];
        file.seek(SeekFrom::Start(0))?;

        std::fs::create_dir_all(target)?;
        let reader = BufReader::new(file);
        if gzipped {
            unpack(Archive::new(GzDecoder::new(reader)), target)
        } else {
            unpack(Archive::new(reader), target)
        }
    }
}

fn unpack<R: Read>(mut archive: Archive<R>, target: &Path) -> KernelResult<()> {
    let entries = archive
        .entries()
        .map_err(|e| KernelError::Archive(format!("failed to read tar entries: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| KernelError::Archive(format!("failed to read entry: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| KernelError::Archive(format!("invalid entry path: {}", e)))?
            .into_owned();

        // Skip the archive root directory
        let components: Vec<Component<'_>> = entry_path.components().collect();
        if components.len() < 2 {
            continue;
        }
        if components.iter().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(KernelError::Archive(format!(
                "entry {} escapes the package directory",
                entry_path.display()
            )));
        }
        let rest: PathBuf = components[1..].iter().collect();
        let dest_path = target.join(rest);

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&dest_path).map_err(|e| {
                KernelError::Archive(format!("failed to extract {}: {}", dest_path.display(), e))
            })?;
        }
    }
    Ok(())
}

/// Read `.tether.json` from an unpacked package.
pub fn read_assembly(package_dir: &Path) -> KernelResult<Assembly> {
    let path = package_dir.join(ASSEMBLY_FILE);
    let text = std::fs::read_to_string(&path).map_err(|e| {
        KernelError::Archive(format!("cannot read {}: {}", path.display(), e))
    })?;
    let assembly: Assembly = serde_json::from_str(&text)?;
    Ok(assembly)
}

// ============================================================================
// Native modules
// ============================================================================

impl ModuleLoader for ModuleRegistry {
    fn load(&mut self, assembly: &Assembly, _package_dir: &Path) -> KernelResult<ObjectRef> {
        let module = self
            .get(&assembly.name)
            .ok_or_else(|| KernelError::AssemblyNotFound(assembly.name.clone()))?;
        if module.version() != assembly.version {
            tracing::warn!(
                module = module.name(),
                native = module.version(),
                manifest = %assembly.version,
                "native module version differs from its manifest"
            );
        }
        Ok(module.instantiate()?)
    }
}
