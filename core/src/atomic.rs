//! Whole-file replacement through a temp sibling and a rename.
//!
//! Readers of the target path see either the previous content or the new
//! content in full. An `AtomicFile` dropped without `commit()` removes its
//! temp file, so every exit path releases what it acquired.

use crate::error::{EtlError, EtlResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct AtomicFile {
    target:    PathBuf,
    temp_path: PathBuf,
    writer:    Option<BufWriter<File>>,
}

impl AtomicFile {
    /// Create the temp file next to `target`. Missing parent directories
    /// are created.
    pub fn create(target: impl AsRef<Path>) -> EtlResult<Self> {
        let target = target.as_ref().to_path_buf();
        let file_name = target
            .file_name()
            .ok_or_else(|| EtlError::Config(format!("{} is not a file path", target.display())))?
            .to_string_lossy()
            .into_owned();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| EtlError::write(&target, e))?;

        // Same directory as the target: rename never crosses filesystems.
        let temp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));
        let file = File::create(&temp_path).map_err(|e| EtlError::write(&target, e))?;
        log::debug!("Staging {} in {}", target.display(), temp_path.display());

        Ok(Self {
            target,
            temp_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Flush, sync, and rename over the target.
    pub fn commit(mut self) -> EtlResult<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| EtlError::write(&self.target, e.into_error()))?;
            file.sync_all().map_err(|e| EtlError::write(&self.target, e))?;
        }
        fs::rename(&self.temp_path, &self.target).map_err(|e| EtlError::write(&self.target, e))?;
        Ok(())
    }

    /// Write `bytes` to `target` in one step.
    pub fn replace(target: impl AsRef<Path>, bytes: &[u8]) -> EtlResult<()> {
        let mut file = Self::create(target)?;
        file.write_all(bytes)
            .map_err(|e| EtlError::write(&file.target, e))?;
        file.commit()
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.writer.as_mut() {
            Some(w) => w.write(buf),
            None => Err(std::io::Error::other("atomic file already committed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        // After a successful commit the temp path no longer exists.
        self.writer.take();
        if self.temp_path.exists() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
