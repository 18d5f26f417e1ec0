use anyhow::{anyhow, bail, Context, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

pub trait FileSystem {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces `path` atomically, creating parent directories as needed.
    fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    fn write_durable(&self, path: &str, content: &[u8]) -> Result<()> {
        self.write(path, content)
    }

    fn remove(&self, path: &str) -> Result<bool>;

    /// Every file below `dir`, recursively, sorted. A missing directory is empty.
    fn list_files(&self, dir: &str) -> Result<Vec<String>>;

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.read(path)?.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct RealFileSystem {
    root: PathBuf,
}

impl RealFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() {
            bail!("repository path must not be empty");
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => bail!("repository path '{path}' must be relative without '..' components"),
            }
        }
        Ok(self.root.join(relative))
    }

    fn write_atomic(&self, path: &str, content: &[u8], durable: bool) -> Result<()> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .ok_or_else(|| anyhow!("path has no parent directory: {}", target.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("failed to create temp file for atomic write")?;
        tmp.write_all(content)
            .with_context(|| format!("failed to write temp file for {}", target.display()))?;
        if durable {
            tmp.as_file()
                .sync_all()
                .with_context(|| format!("failed to sync {}", target.display()))?;
        }
        tmp.persist(&target)
            .with_context(|| format!("failed to persist {}", target.display()))?;

        #[cfg(unix)]
        {
            if durable {
                if let Ok(dir) = fs::File::open(dir) {
                    let _ = dir.sync_all();
                }
            }
        }
        Ok(())
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", target.display())),
        }
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.write_atomic(path, content, false)
    }

    fn write_durable(&self, path: &str, content: &[u8]) -> Result<()> {
        self.write_atomic(path, content, true)
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", target.display())),
        }
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let base = self.resolve(dir)?;
        let mut files = Vec::new();
        collect_files(&base, dir.trim_end_matches('/'), &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read directory {}", dir.display()))
        }
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let file_type = entry.file_type()?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let relative = format!("{prefix}/{name}");
        if file_type.is_dir() {
            collect_files(&entry.path(), &relative, out)?;
        } else if file_type.is_file() {
            out.push(relative);
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    failing_writes: RefCell<BTreeSet<String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: AsRef<[u8]>,
    {
        let fs = Self::new();
        for (path, content) in files {
            fs.insert(path, content);
        }
        fs
    }

    pub fn insert(&self, path: impl Into<String>, content: impl AsRef<[u8]>) {
        self.files
            .borrow_mut()
            .insert(path.into(), content.as_ref().to_vec());
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.files
            .borrow()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn contents(&self) -> BTreeMap<String, Vec<u8>> {
        self.files.borrow().clone()
    }

    pub fn fail_writes_to(&self, path: impl Into<String>) {
        self.failing_writes.borrow_mut().insert(path.into());
    }

    fn check_writable(&self, path: &str) -> Result<()> {
        if self.failing_writes.borrow().contains(path) {
            bail!("simulated write failure for {path}");
        }
        Ok(())
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<bool> {
        self.check_writable(path)?;
        Ok(self.files.borrow_mut().remove(path).is_some())
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect())
    }
}
