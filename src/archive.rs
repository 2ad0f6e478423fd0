//! A filesystem backed archive of courses.
//!
//! The [`Archive`] is the persistence layer behind the CLI: a directory of
//! YAML course files, each holding one course tree. Opening the archive
//! imports every course into an in-memory store pair; saving exports a
//! course back to its file.

use std::{
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
};

use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    content::ContentStore,
    domain::{Config, CourseKey},
    import::{ImportError, ImportFailure, ImportNode, Importer},
    store::{ModuleStore, StoreError},
};

/// One course file on disk.
#[derive(Debug, Serialize, Deserialize)]
struct CourseArchive {
    course: CourseKey,
    tree: ImportNode,
}

/// State of an archive whose courses have been read into memory.
#[derive(Debug)]
pub struct Loaded {
    store: ModuleStore,
    content: ContentStore,
    courses: Vec<CourseKey>,
    config: Config,
}

/// State of an archive that has not been read yet.
#[derive(Debug, PartialEq, Eq)]
pub struct Unloaded;

/// A filesystem backed archive of courses.
#[derive(Debug)]
pub struct Archive<S> {
    /// The directory course files are stored in.
    root: PathBuf,
    state: S,
}

impl Archive<Unloaded> {
    /// Opens an archive directory at the given path.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: Unloaded,
        }
    }

    /// Loads every course archive in the directory.
    ///
    /// Files that cannot be parsed as course archives are skipped when the
    /// directory's `config.toml` sets `allow_unrecognised`, and rejected
    /// otherwise (the default).
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveLoadError::UnrecognisedFiles`] listing every file
    /// that failed to parse, or [`ArchiveLoadError::Import`] if a parsed
    /// course tree cannot be imported.
    pub fn load_all(self) -> Result<Archive<Loaded>, ArchiveLoadError> {
        let config = load_config(&self.root);
        let yaml_paths = collect_course_paths(&self.root);

        let (parsed, unrecognised_paths): (Vec<_>, Vec<_>) = yaml_paths
            .par_iter()
            .map(|path| try_parse_archive(path))
            .partition(Result::is_ok);

        let parsed: Vec<_> = parsed.into_iter().map(Result::unwrap).collect();
        let unrecognised_paths: Vec<_> = unrecognised_paths
            .into_iter()
            .map(Result::unwrap_err)
            .collect();

        if !config.allow_unrecognised && !unrecognised_paths.is_empty() {
            return Err(ArchiveLoadError::UnrecognisedFiles(unrecognised_paths));
        }

        let store = ModuleStore::new();
        let content = ContentStore::new();
        let mut courses = Vec::with_capacity(parsed.len());
        for archive in parsed {
            let importer = Importer::new(&store, &content);
            let report = importer.import_tree(&archive.tree, &archive.course, 0)?;
            if config.allow_unrecognised {
                for failure in &report.failures {
                    warn!(course = %archive.course, %failure, "node skipped during load");
                }
            } else if let Some(failures) = NonEmpty::from_vec(report.failures) {
                return Err(ArchiveLoadError::NodeFailures {
                    course: archive.course,
                    failures,
                });
            }
            courses.push(archive.course);
        }

        Ok(Archive {
            root: self.root,
            state: Loaded {
                store,
                content,
                courses,
                config,
            },
        })
    }
}

impl Archive<Loaded> {
    /// The module store holding every loaded course.
    #[must_use]
    pub const fn store(&self) -> &ModuleStore {
        &self.state.store
    }

    /// The asset store.
    #[must_use]
    pub const fn content(&self) -> &ContentStore {
        &self.state.content
    }

    /// An import engine bound to this archive's stores.
    #[must_use]
    pub const fn importer(&self) -> Importer<'_> {
        Importer::new(&self.state.store, &self.state.content)
    }

    /// The archive's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.state.config
    }

    /// The courses found when the archive was opened, in load order.
    #[must_use]
    pub fn courses(&self) -> &[CourseKey] {
        &self.state.courses
    }

    /// Records a freshly imported or duplicated course so that
    /// [`courses`](Self::courses) reflects it.
    pub fn register_course(&mut self, course_key: CourseKey) {
        if !self.state.courses.contains(&course_key) {
            self.state.courses.push(course_key);
        }
    }

    /// Exports a course back to its file in the archive directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the course does not exist, cannot be
    /// serialized, or the file cannot be written.
    pub fn save_course(&self, course_key: &CourseKey) -> Result<PathBuf, SaveCourseError> {
        let tree = self.importer().export_tree(course_key)?;
        let archive = CourseArchive {
            course: course_key.clone(),
            tree,
        };

        let path = self.course_path(course_key);
        let serialized = serde_yaml::to_string(&archive)?;
        std::fs::write(&path, serialized)?;
        debug!(course = %course_key, path = %path.display(), "saved course archive");
        Ok(path)
    }

    fn course_path(&self, course_key: &CourseKey) -> PathBuf {
        self.root.join(format!(
            "{}-{}-{}.yaml",
            course_key.org(),
            course_key.course(),
            course_key.run()
        ))
    }
}

/// Errors raised when opening an archive directory.
#[derive(Debug, Error)]
pub enum ArchiveLoadError {
    /// Files in the directory could not be parsed as course archives.
    UnrecognisedFiles(Vec<PathBuf>),
    /// A course file parsed but some of its nodes could not be imported.
    NodeFailures {
        /// The course whose file was being loaded.
        course: CourseKey,
        /// The nodes that failed.
        failures: NonEmpty<ImportFailure>,
    },
    /// A course file could not be imported at all.
    Import(#[from] ImportError),
}

impl fmt::Display for ArchiveLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX_DISPLAY: usize = 5;

        match self {
            Self::UnrecognisedFiles(paths) => {
                write!(f, "Unrecognised files: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::NodeFailures { course, failures } => {
                let total = failures.len();
                let displayed: Vec<String> = failures
                    .iter()
                    .take(MAX_DISPLAY)
                    .map(ToString::to_string)
                    .collect();
                write!(f, "course {course}: {}", displayed.join(", "))?;
                if total > MAX_DISPLAY {
                    write!(f, "... (and {} more)", total - MAX_DISPLAY)?;
                }
                Ok(())
            }
            Self::Import(error) => write!(f, "{error}"),
        }
    }
}

/// Errors raised when exporting a course to disk.
#[derive(Debug, Error)]
#[error("failed to save course: {0}")]
pub enum SaveCourseError {
    Course(#[from] StoreError),
    Serialize(#[from] serde_yaml::Error),
    Io(#[from] io::Error),
}

fn load_config(root: &Path) -> Config {
    let path = root.join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

fn collect_course_paths(root: &PathBuf) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension() == Some(OsStr::new("yaml")))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn try_parse_archive(path: &Path) -> Result<CourseArchive, PathBuf> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        tracing::debug!("Failed to read {}: {e}", path.display());
        path.to_path_buf()
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        tracing::debug!("Skipping unrecognised file {}: {e}", path.display());
        path.to_path_buf()
    })
}
