//! Atomic file replacement for the persisted session

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes to a sibling temporary file and renames it over the target on commit.
///
/// Dropping the writer without committing removes the temporary file and
/// leaves the target untouched.
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: File,
    committed: bool,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = Self::temp_path(&final_path);
        let file = open_private(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file,
            committed: false,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    /// Flush, sync and rename the temporary file into place
    pub fn commit(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

/// Create or truncate `path`, readable by the owner only on unix
fn open_private(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        // A leftover temp file keeps its old mode
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        Ok(file)
    }
    #[cfg(not(unix))]
    {
        File::create(path)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
