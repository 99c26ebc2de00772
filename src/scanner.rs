use crate::parser::{GoParser, ParsedFile};
use anyhow::Result;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One source search pattern: a directory, optionally scanned recursively.
///
/// The textual form follows the Go tool convention: `internal/api` loads a
/// single package directory, `internal/api/...` loads it and everything
/// below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPattern {
    pub path: PathBuf,
    pub recursive: bool,
}

impl SearchPattern {
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }

    /// Parses the `dir` / `dir/...` textual form.
    pub fn parse(pattern: &str) -> Self {
        if let Some(stripped) = pattern
            .strip_suffix("/...")
            .or_else(|| (pattern == "...").then_some(""))
        {
            let path = if stripped.is_empty() { "." } else { stripped };
            Self::new(path, true)
        } else {
            Self::new(pattern, false)
        }
    }
}

/// A loaded Go package: all parseable `.go` files of one directory.
#[derive(Debug, Clone)]
pub struct GoPackage {
    /// Package name from the package clauses
    pub name: String,
    /// Import path, resolved against the root go.mod module when present
    pub import_path: String,
    /// Directory the package lives in
    pub dir: PathBuf,
    /// Parsed source files, in file-name order
    pub files: Vec<ParsedFile>,
}

/// A package together with the problems hit while loading it.
///
/// Packages with a non-empty error list are kept in the result so the
/// caller can log and skip them without losing the rest of the batch.
#[derive(Debug)]
pub struct LoadedPackage {
    pub package: GoPackage,
    pub errors: Vec<String>,
}

/// Package scanner for expanding search patterns into loaded packages.
///
/// The `PackageScanner` walks a Go project directory, groups source files
/// into packages by directory, and parses everything in one batch. Build
/// artifacts (`vendor`), fixtures (`testdata`), hidden directories and
/// `_test.go` files are skipped.
///
/// # Example
///
/// ```no_run
/// use contract_from_source::scanner::{PackageScanner, SearchPattern};
/// use std::path::PathBuf;
///
/// let scanner = PackageScanner::new(PathBuf::from("./my-service"));
/// let packages = scanner.load(&[SearchPattern::parse("internal/api/...")]).unwrap();
/// println!("Loaded {} packages", packages.len());
/// ```
pub struct PackageScanner {
    root: PathBuf,
}

impl PackageScanner {
    /// Creates a new `PackageScanner` rooted at the project directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Expands the search patterns and loads every matched package.
    ///
    /// # Errors
    ///
    /// Returns an error only when the root directory itself cannot be
    /// traversed. Per-package problems (unreadable files, syntax errors,
    /// conflicting package clauses) are collected on the corresponding
    /// [`LoadedPackage`] instead of failing the batch.
    pub fn load(&self, patterns: &[SearchPattern]) -> Result<Vec<LoadedPackage>> {
        let module = self.module_path();
        if let Some(ref module) = module {
            debug!("Resolved module path: {}", module);
        }

        let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for pattern in patterns {
            let base = self.root.join(&pattern.path);
            if pattern.recursive {
                self.collect_dirs(&base, &mut dirs)?;
            } else if dir_has_go_files(&base) {
                dirs.insert(base);
            } else {
                warn!("pattern matched no Go files: {}", base.display());
            }
        }

        let mut packages = Vec::new();
        for dir in dirs {
            packages.push(self.load_package(&dir, module.as_deref()));
        }

        debug!("Loaded {} packages", packages.len());
        Ok(packages)
    }

    fn collect_dirs(&self, base: &Path, dirs: &mut BTreeSet<PathBuf>) -> Result<()> {
        for entry in WalkDir::new(base).into_iter().filter_entry(|e| {
            if e.path() == base {
                return true;
            }
            let file_name = e.file_name().to_string_lossy();
            let is_hidden = file_name.starts_with('.');
            let is_skipped = file_name == "vendor" || file_name == "testdata";

            !is_hidden && !is_skipped
        }) {
            match entry {
                Ok(entry) => {
                    if entry.path().is_dir() && dir_has_go_files(entry.path()) {
                        dirs.insert(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    warn!("Failed to access path: {}", e);
                }
            }
        }
        Ok(())
    }

    fn load_package(&self, dir: &Path, module: Option<&str>) -> LoadedPackage {
        let mut errors = Vec::new();
        let mut files = Vec::new();

        for path in go_files_in(dir) {
            match GoParser::parse_file(&path) {
                Ok(parsed) => {
                    if parsed.has_syntax_errors() {
                        errors.push(format!("syntax errors in {}", path.display()));
                    }
                    files.push(parsed);
                }
                Err(e) => errors.push(format!("{:#}", e)),
            }
        }

        let mut name = String::new();
        for file in &files {
            match file.package_name() {
                Some(pkg) if name.is_empty() => name = pkg,
                Some(pkg) if pkg != name => {
                    errors.push(format!(
                        "conflicting package clauses in {}: {} vs {}",
                        dir.display(),
                        name,
                        pkg
                    ));
                }
                Some(_) => {}
                None => errors.push(format!("missing package clause in {}", file.path.display())),
            }
        }

        LoadedPackage {
            package: GoPackage {
                name,
                import_path: self.import_path_of(dir, module),
                dir: dir.to_path_buf(),
                files,
            },
            errors,
        }
    }

    /// Import path of a package directory: module path plus the directory's
    /// position below the project root.
    fn import_path_of(&self, dir: &Path, module: Option<&str>) -> String {
        let rel = dir
            .strip_prefix(&self.root)
            .unwrap_or(dir)
            .to_string_lossy()
            .replace('\\', "/");

        match module {
            Some(module) if rel.is_empty() || rel == "." => module.to_string(),
            Some(module) => format!("{}/{}", module, rel),
            None => {
                if rel.is_empty() || rel == "." {
                    ".".to_string()
                } else {
                    rel
                }
            }
        }
    }

    /// Module line of the root go.mod, when the project has one.
    fn module_path(&self) -> Option<String> {
        let content = fs::read_to_string(self.root.join("go.mod")).ok()?;
        for line in content.lines() {
            let line = line.trim();
            if let Some(module) = line.strip_prefix("module ") {
                return Some(module.trim().trim_matches('"').to_string());
            }
        }
        None
    }
}

fn dir_has_go_files(dir: &Path) -> bool {
    !go_files_in(dir).is_empty()
}

fn go_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            if !p.is_file() {
                return false;
            }
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.ends_with(".go") && !name.ends_with("_test.go")
        })
        .collect();
    files.sort();
    files
}

/// Loads packages with `load` and hands back only the clean ones, logging
/// and dropping packages that reported load errors.
pub fn usable_packages(loaded: Vec<LoadedPackage>) -> Vec<GoPackage> {
    let mut packages = Vec::new();
    for lp in loaded {
        if lp.errors.is_empty() {
            packages.push(lp.package);
        } else {
            for err in &lp.errors {
                log::error!(
                    "failed to process package {}: {}",
                    lp.package.import_path,
                    err
                );
            }
        }
    }
    packages
}
