// Directory plus base name under which a structure's extension-suffixed files live.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileSet {
    dir: Option<PathBuf>,
    base: String,
}

impl FileSet {
    /// Disk file set; the directory is created if missing.
    pub fn new(dir: impl AsRef<Path>, base: impl Into<String>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let base = base.into();
        check_base(&base)?;
        std::fs::create_dir_all(&dir).map_err(|err| Error::io(err).with_path(&dir))?;
        Ok(Self {
            dir: Some(dir),
            base,
        })
    }

    /// Memory-mode file set; nothing touches the filesystem.
    pub fn mem(base: impl Into<String>) -> Self {
        Self {
            dir: None,
            base: base.into(),
        }
    }

    pub fn is_mem(&self) -> bool {
        self.dir.is_none()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `dir/base.ext`, or `None` in memory mode.
    pub fn filename(&self, ext: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{ext}", self.base)))
    }

    pub fn exists(&self, ext: &str) -> bool {
        self.filename(ext).is_some_and(|path| path.exists())
    }

    /// Label used for memory-mode stores and log lines.
    pub fn label(&self, ext: &str) -> String {
        match self.filename(ext) {
            Some(path) => path.display().to_string(),
            None => format!("mem:{}.{ext}", self.base),
        }
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dir {
            Some(dir) => write!(f, "{}/{}", dir.display(), self.base),
            None => write!(f, "mem:{}", self.base),
        }
    }
}

fn check_base(base: &str) -> Result<(), Error> {
    if base.is_empty() || base.contains('/') || base.contains('\\') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid file set base name {base:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::FileSet;
    use crate::core::error::ErrorKind;

    #[test]
    fn filenames_join_base_and_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = FileSet::new(dir.path().join("db"), "SPO").expect("file set");
        assert!(dir.path().join("db").is_dir());
        assert_eq!(set.filename("idn"), Some(dir.path().join("db").join("SPO.idn")));
        assert!(!set.exists("idn"));
        std::fs::write(set.filename("idn").expect("name"), b"").expect("touch");
        assert!(set.exists("idn"));
    }

    #[test]
    fn memory_sets_have_no_files() {
        let set = FileSet::mem("nodes");
        assert!(set.is_mem());
        assert_eq!(set.filename("dat"), None);
        assert_eq!(set.label("dat"), "mem:nodes.dat");
        assert_eq!(set.to_string(), "mem:nodes");
    }

    #[test]
    fn base_names_may_not_contain_separators() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = FileSet::new(dir.path(), "a/b").expect_err("separator");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
