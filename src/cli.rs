use std::path::PathBuf;

mod terminal;

use clap::ArgAction;
use coursestore::{
    content::{ContentStore, LOCKED_ASSET_KEY},
    domain::{Category, CourseKey, Location},
    import::{DuplicateError, ImportNode},
    store::{PublishState, RevisionOption},
    Archive, Loaded,
};
use terminal::Colorize;
use tracing::instrument;

/// Parse a course key from a string at the CLI boundary.
fn parse_course_key(s: &str) -> Result<CourseKey, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// Parse a full node location (`org/course/run/category/name`).
fn parse_location(s: &str) -> Result<Location, String> {
    let mut parts = s.split('/');
    let (Some(org), Some(course), Some(run), Some(category), Some(name), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(format!(
            "expected org/course/run/category/name, got '{s}'"
        ));
    };

    let course_key: CourseKey = format!("{org}/{course}/{run}")
        .parse()
        .map_err(|e| format!("{e}"))?;
    let category: Category = category.parse().unwrap_or_else(|never| match never {});
    course_key
        .make_usage_key(category, name)
        .map_err(|e| format!("{e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The path to the course archive directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show archive status (default)
    Status(Status),

    /// Import a course tree from a YAML file
    Import(Import),

    /// Copy a whole course, nodes and assets, to a new course key
    Duplicate(Duplicate),

    /// Publish the draft content of a node
    Publish(Publish),

    /// List the nodes of a course
    List(List),

    /// Show detailed information about a node
    Show(Show),

    /// Lock or unlock an asset against anonymous download
    Lock(Lock),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::Import(command) => command.run(root)?,
            Self::Duplicate(command) => command.run(root)?,
            Self::Publish(command) => command.run(root)?,
            Self::List(command) => command.run(root)?,
            Self::Show(command) => command.run(root)?,
            Self::Lock(command) => command.run(root)?,
        }
        Ok(())
    }
}

fn open_archive(root: PathBuf) -> anyhow::Result<Archive<Loaded>> {
    Ok(Archive::new(root).load_all()?)
}

#[derive(Debug, Default, clap::Parser)]
pub struct Status {}

impl Status {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let archive = open_archive(root)?;

        if archive.courses().is_empty() {
            println!("No courses in archive.");
            return Ok(());
        }

        for course_key in archive.courses() {
            let nodes = archive.store().get_items(course_key, None, RevisionOption::All);
            let unpublished = nodes
                .iter()
                .filter(|node| {
                    archive
                        .store()
                        .compute_publish_state(node)
                        .is_ok_and(|state| state != PublishState::Public)
                })
                .count();
            let orphans = archive.store().orphans(course_key);
            let (_, assets) = archive.content().get_all_content_for_course(course_key);

            println!("{course_key}");
            println!("  nodes: {} ({unpublished} unpublished)", nodes.len());
            if orphans.is_empty() {
                println!("  orphans: 0");
            } else {
                println!("{}", format!("  orphans: {}", orphans.len()).warning());
            }
            println!("  assets: {assets}");
        }

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Import {
    /// The YAML file containing the course tree
    file: PathBuf,

    /// The course to import into
    #[clap(value_parser = parse_course_key)]
    course: CourseKey,
}

impl Import {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(&self.file)?;
        let tree: ImportNode = serde_yaml::from_str(&content)?;

        let mut archive = open_archive(root)?;

        let spinner = indicatif::ProgressBar::new_spinner();
        spinner.set_message(format!("importing into {}", self.course));
        let report = archive.importer().import_tree(&tree, &self.course, 0)?;
        spinner.finish_and_clear();

        for failure in &report.failures {
            eprintln!("{}", format!("  skipped: {failure}").warning());
        }

        archive.register_course(self.course.clone());
        archive.save_course(&self.course)?;

        println!(
            "{}",
            format!(
                "Imported {} nodes into {} ({} skipped)",
                report.imported,
                self.course,
                report.failures.len()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Duplicate {
    /// The course to copy
    #[clap(value_parser = parse_course_key)]
    source: CourseKey,

    /// The course key of the copy
    #[clap(value_parser = parse_course_key)]
    target: CourseKey,

    /// Skip confirmation prompts
    #[arg(long, short)]
    yes: bool,
}

impl Duplicate {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut archive = open_archive(root)?;

        match archive.importer().duplicate_course(&self.source, &self.target, 0) {
            Ok(()) => {}
            Err(DuplicateError::TargetExists(_)) => {
                if !self.yes {
                    let proceed = dialoguer::Confirm::new()
                        .with_prompt(format!(
                            "Target course {} already exists. Overwrite?",
                            self.target
                        ))
                        .default(false)
                        .interact()?;
                    if !proceed {
                        println!("Cancelled");
                        return Ok(());
                    }
                }
                archive.store().delete_course(&self.target, 0);
                archive.content().delete_all_content_for_course(&self.target);
                archive
                    .importer()
                    .duplicate_course(&self.source, &self.target, 0)?;
            }
            Err(error) => return Err(error.into()),
        }

        archive.register_course(self.target.clone());
        archive.save_course(&self.target)?;

        println!(
            "{}",
            format!("Duplicated {} to {}", self.source, self.target).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Publish {
    /// The node to publish (org/course/run/category/name)
    #[clap(value_parser = parse_location)]
    location: Location,
}

impl Publish {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let archive = open_archive(root)?;

        archive.store().publish(&self.location, 0)?;
        archive.save_course(self.location.course_key())?;

        println!("{}", format!("Published {}", self.location).success());
        Ok(())
    }
}

/// Revision filter at the CLI boundary.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum RevisionArg {
    /// Draft-preferred view of every node
    #[default]
    All,
    /// Only nodes with a published revision
    Published,
    /// Only nodes with a draft revision
    Draft,
}

impl From<RevisionArg> for RevisionOption {
    fn from(arg: RevisionArg) -> Self {
        match arg {
            RevisionArg::All => Self::All,
            RevisionArg::Published => Self::PublishedOnly,
            RevisionArg::Draft => Self::DraftOnly,
        }
    }
}

#[derive(Debug, clap::Parser)]
pub struct List {
    /// The course to list
    #[clap(value_parser = parse_course_key)]
    course: CourseKey,

    /// Only list nodes of this category
    #[arg(long, short)]
    category: Option<String>,

    /// Which revisions to list
    #[arg(long, default_value = "all")]
    revision: RevisionArg,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl List {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let archive = open_archive(root)?;

        let category: Option<Category> = self
            .category
            .map(|c| c.parse().unwrap_or_else(|never| match never {}));
        let nodes = archive
            .store()
            .get_items(&self.course, category.as_ref(), self.revision.into());

        if self.json {
            let rows: Vec<_> = nodes
                .iter()
                .map(|node| {
                    serde_json::json!({
                        "location": node.location().to_string(),
                        "state": archive.store().compute_publish_state(node).ok(),
                        "children": node.children().len(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        for node in &nodes {
            let state = archive
                .store()
                .compute_publish_state(node)
                .map_or_else(|_| "-".to_string(), |state| state.to_string());
            println!("{state:<8} {}", node.location());
        }
        println!("{}", format!("{} nodes", nodes.len()).dim());

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Show {
    /// The node to show (org/course/run/category/name)
    #[clap(value_parser = parse_location)]
    location: Location,
}

impl Show {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let archive = open_archive(root)?;

        let node = archive.store().get_item(&self.location, 0)?;
        let state = archive.store().compute_publish_state(&node)?;
        let inherited = archive.store().inherited_metadata(&self.location)?;

        let width = terminal::terminal_width().map_or(70, |w| usize::from(w).min(100));
        println!("{}", "─".repeat(width).dim());
        println!("{}", node.location());
        println!("  category: {}", node.category());
        println!("  state: {state}");
        if let Some(parent) = archive.store().parent_of(&self.location) {
            println!("  parent: {parent}");
        } else {
            println!("  parent: {}", "(none)".dim());
        }

        if node.has_children() {
            println!("  children:");
            for child in node.children() {
                println!("    {child}");
            }
        }
        if !node.metadata().is_empty() {
            println!("  metadata: {}", serde_json::to_string(node.metadata())?);
        }
        if !inherited.is_empty() {
            println!("  inherited: {}", serde_json::to_string(&inherited)?);
        }
        if !node.data().is_empty() {
            println!("  data: {} bytes", node.data().len());
        }

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Lock {
    /// The course the asset belongs to
    #[clap(value_parser = parse_course_key)]
    course: CourseKey,

    /// The asset name
    name: String,

    /// Unlock instead of locking
    #[arg(long)]
    unlock: bool,
}

impl Lock {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let archive = open_archive(root)?;

        let location = ContentStore::compute_location(&self.course, &self.name)?;
        archive
            .content()
            .set_attr(&location, LOCKED_ASSET_KEY, serde_json::json!(!self.unlock))?;

        let verb = if self.unlock { "Unlocked" } else { "Locked" };
        println!("{}", format!("{verb} {location}").success());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const TOY_COURSE: &str = r"
category: course
name: anything
children:
  - category: chapter
    name: c1
    children:
      - category: problem
        name: p1
";

    fn course_key() -> CourseKey {
        "MITx/999/Robot_Super_Course".parse().unwrap()
    }

    #[test]
    fn parse_location_accepts_five_segments() {
        let location = parse_location("MITx/999/Robot_Super_Course/vertical/v1").unwrap();
        assert_eq!(location.course_key(), &course_key());
        assert_eq!(location.category(), &Category::Vertical);
        assert_eq!(location.name(), "v1");
    }

    #[test]
    fn parse_location_rejects_wrong_arity() {
        assert!(parse_location("MITx/999/Robot_Super_Course").is_err());
        assert!(parse_location("a/b/c/d/e/f").is_err());
    }

    #[test]
    fn import_run_writes_a_course_archive() {
        let tmp = tempdir().unwrap();
        let tree_file = tmp.path().join("toy-tree.yml");
        std::fs::write(&tree_file, TOY_COURSE).unwrap();

        let import = Import {
            file: tree_file,
            course: course_key(),
        };
        import.run(tmp.path().to_path_buf()).unwrap();

        assert!(tmp.path().join("MITx-999-Robot_Super_Course.yaml").exists());

        let archive = open_archive(tmp.path().to_path_buf()).unwrap();
        assert_eq!(archive.courses(), [course_key()]);
        let root = archive.store().get_course(&course_key()).unwrap();
        assert_eq!(root.location().name(), "Robot_Super_Course");
    }

    #[test]
    fn duplicate_run_creates_the_target_archive_file() {
        let tmp = tempdir().unwrap();
        let tree_file = tmp.path().join("toy-tree.yml");
        std::fs::write(&tree_file, TOY_COURSE).unwrap();
        Import {
            file: tree_file,
            course: course_key(),
        }
        .run(tmp.path().to_path_buf())
        .unwrap();

        Duplicate {
            source: course_key(),
            target: "edX/toy/2012_Fall".parse().unwrap(),
            yes: true,
        }
        .run(tmp.path().to_path_buf())
        .unwrap();

        assert!(tmp.path().join("edX-toy-2012_Fall.yaml").exists());

        let archive = open_archive(tmp.path().to_path_buf()).unwrap();
        let target: CourseKey = "edX/toy/2012_Fall".parse().unwrap();
        let root = archive.store().get_course(&target).unwrap();
        assert_eq!(root.location().name(), "2012_Fall");
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn publish_run_round_trips_through_the_archive() {
        let tmp = tempdir().unwrap();
        let tree_file = tmp.path().join("toy-tree.yml");
        std::fs::write(&tree_file, TOY_COURSE).unwrap();
        Import {
            file: tree_file,
            course: course_key(),
        }
        .run(tmp.path().to_path_buf())
        .unwrap();

        // Add an unpublished vertical, then publish it via the command.
        {
            let archive = open_archive(tmp.path().to_path_buf()).unwrap();
            let vertical = course_key()
                .make_usage_key(Category::Vertical, "v1")
                .unwrap();
            archive
                .store()
                .create_and_save_xmodule(&vertical, 0, None)
                .unwrap();
            let mut root = archive.store().get_course(&course_key()).unwrap();
            root.children_mut().push(vertical);
            archive.store().update_item(&root, 0, false).unwrap();
            archive.save_course(&course_key()).unwrap();
        }

        Publish {
            location: parse_location("MITx/999/Robot_Super_Course/vertical/v1").unwrap(),
        }
        .run(tmp.path().to_path_buf())
        .unwrap();

        let archive = open_archive(tmp.path().to_path_buf()).unwrap();
        let vertical = course_key()
            .make_usage_key(Category::Vertical, "v1")
            .unwrap();
        let node = archive.store().get_item(&vertical, 0).unwrap();
        assert_eq!(
            archive.store().compute_publish_state(&node).unwrap(),
            PublishState::Public
        );
    }

    #[test]
    fn status_run_succeeds_on_empty_directory() {
        let tmp = tempdir().unwrap();
        Status::default().run(tmp.path().to_path_buf()).unwrap();
    }

    #[test]
    fn list_run_succeeds_after_import() {
        let tmp = tempdir().unwrap();
        let tree_file = tmp.path().join("toy-tree.yml");
        std::fs::write(&tree_file, TOY_COURSE).unwrap();
        Import {
            file: tree_file,
            course: course_key(),
        }
        .run(tmp.path().to_path_buf())
        .unwrap();

        List {
            course: course_key(),
            category: Some("problem".to_string()),
            revision: RevisionArg::Published,
            json: true,
        }
        .run(tmp.path().to_path_buf())
        .unwrap();
    }
}
