use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use planmark::config::EngineConfig;
use planmark::engine::PlanSession;
use planmark::error::ErrorCode;
use planmark::extract::extract_svg;
use planmark::migrate::migrate_str;
use planmark::model::{EntityKind, RoomMetadata};
use planmark::storage::FileStore;
use planmark::store::{AnnotationError, AnnotationStore, RoomDraft};
use planmark::view;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{code}: {source}")]
    Annotation {
        code: &'static str,
        #[source]
        source: AnnotationError,
    },
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("invalid metadata assignment `{0}`; expected key=value")]
    InvalidMeta(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<AnnotationError> for CliError {
    fn from(source: AnnotationError) -> Self {
        Self::Annotation { code: source.error_code(), source }
    }
}

#[derive(Parser, Debug)]
#[command(name = "planmark", about = "Floor-plan annotation CLI")]
struct Cli {
    /// Directory holding per-plan annotation documents.
    #[arg(long, env = "PLANMARK_STORE_DIR", default_value = ".planmark")]
    store_dir: PathBuf,

    /// Plan identifier; one annotation graph per plan.
    #[arg(long, env = "PLANMARK_PLAN", default_value = "default")]
    plan: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract rooms and metadata options from a drawing's labels.
    Extract { svg: PathBuf },
    /// Print the drawing with labels hidden and annotation styles applied.
    Render {
        svg: PathBuf,
        /// Entity to show as active.
        #[arg(long)]
        focus: Option<String>,
    },
    /// List groups and rooms, oldest first.
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Groups and rooms containing an element.
    Describe { element: String },
    /// Groups and rooms not yet containing an element.
    Targets { element: String },
    /// The plan's metadata option pool.
    Options,
    Group(GroupCommand),
    Room(RoomCommand),
    Meta(MetaCommand),
    Stone(StoneCommand),
    /// Delete a group or room.
    Delete { id: String },
    /// Normalize a persisted annotation document and print it.
    Migrate { file: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Group,
    Room,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Group => Self::Group,
            KindArg::Room => Self::Room,
        }
    }
}

#[derive(Args, Debug)]
struct GroupCommand {
    #[command(subcommand)]
    command: GroupSubcommand,
}

#[derive(Subcommand, Debug)]
enum GroupSubcommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(required = true, num_args = 2..)]
        elements: Vec<String>,
    },
    Add {
        group_id: String,
        element: String,
    },
    Remove {
        group_id: String,
        element: String,
    },
    Merge {
        source_id: String,
        target_id: String,
    },
}

#[derive(Args, Debug)]
struct RoomCommand {
    #[command(subcommand)]
    command: RoomSubcommand,
}

#[derive(Subcommand, Debug)]
enum RoomSubcommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Initial metadata as key=value; repeatable.
        #[arg(long = "meta")]
        meta: Vec<String>,
        #[arg(required = true, num_args = 2..)]
        groups: Vec<String>,
    },
    Show {
        room_id: String,
    },
}

#[derive(Args, Debug)]
struct MetaCommand {
    #[command(subcommand)]
    command: MetaSubcommand,
}

#[derive(Subcommand, Debug)]
enum MetaSubcommand {
    /// Assign a room metadata key; omit the value to clear it.
    Set {
        room_id: String,
        key: String,
        value: Option<String>,
    },
}

#[derive(Args, Debug)]
struct StoneCommand {
    #[command(subcommand)]
    command: StoneSubcommand,
}

#[derive(Subcommand, Debug)]
enum StoneSubcommand {
    /// Assign a stone type; omit the value to clear it.
    Set { id: String, value: Option<String> },
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Command::Extract { svg } => print_json(&extract_svg(&read(&svg)?, &config.extract)),
        Command::Migrate { file } => print_json(&migrate_str(&read(&file)?)?),
        Command::Render { svg, focus } => {
            let storage = FileStore::new(&cli.store_dir);
            let mut session = PlanSession::open(storage, cli.plan, &read(&svg)?, config)?;
            if let Some(id) = focus {
                session.click_entity(&id);
            }
            println!("{}", session.to_svg());
            Ok(())
        }
        command => {
            let store = AnnotationStore::open(FileStore::new(&cli.store_dir), cli.plan)?;
            run_store(store, command)
        }
    }
}

fn run_store(mut store: AnnotationStore<FileStore>, command: Command) -> Result<(), CliError> {
    match command {
        Command::List { kind } => print_json(&view::list_entities(store.graph(), kind.map(EntityKind::from))),
        Command::Describe { element } => print_json(&view::describe_element(store.graph(), &element)),
        Command::Targets { element } => print_json(&view::available_targets(store.graph(), &element)),
        Command::Options => print_json(store.options()),
        Command::Group(group) => run_group(&mut store, group),
        Command::Room(room) => run_room(&mut store, room),
        Command::Meta(MetaCommand { command: MetaSubcommand::Set { room_id, key, value } }) => {
            store.set_metadata_value(&room_id, &key, value.as_deref())?;
            print_json(&view::room_detail(store.graph(), &room_id))
        }
        Command::Stone(StoneCommand { command: StoneSubcommand::Set { id, value } }) => {
            store.set_stone_type(&id, value.as_deref())?;
            print_json(&store.graph().get(&id))
        }
        Command::Delete { id } => print_json(&store.delete_entity(&id)?),
        Command::Extract { .. } | Command::Render { .. } | Command::Migrate { .. } => Ok(()),
    }
}

fn run_group(store: &mut AnnotationStore<FileStore>, group: GroupCommand) -> Result<(), CliError> {
    match group.command {
        GroupSubcommand::Create { name, elements } => {
            let id = store.create_group(elements, &name)?;
            print_json(&store.graph().get(&id))
        }
        GroupSubcommand::Add { group_id, element } => {
            let added = store.add_element(&group_id, &element)?;
            print_json(&serde_json::json!({ "groupId": group_id, "elementId": element, "added": added }))
        }
        GroupSubcommand::Remove { group_id, element } => {
            let outcome = store.remove_element(&group_id, &element)?;
            print_json(&serde_json::json!({ "groupId": group_id, "elementId": element, "outcome": format!("{outcome:?}") }))
        }
        GroupSubcommand::Merge { source_id, target_id } => {
            store.merge_groups(&source_id, &target_id)?;
            print_json(&store.graph().get(&target_id))
        }
    }
}

fn run_room(store: &mut AnnotationStore<FileStore>, room: RoomCommand) -> Result<(), CliError> {
    match room.command {
        RoomSubcommand::Create { name, purpose, description, meta, groups } => {
            let draft = RoomDraft { child_group_ids: groups, name, purpose, description, metadata: parse_meta(&meta)? };
            let id = store.create_room(draft)?;
            print_json(&view::room_detail(store.graph(), &id))
        }
        RoomSubcommand::Show { room_id } => match view::room_detail(store.graph(), &room_id) {
            Some(detail) => print_json(&detail),
            None => Err(CliError::RoomNotFound(room_id)),
        },
    }
}

fn parse_meta(assignments: &[String]) -> Result<RoomMetadata, CliError> {
    assignments
        .iter()
        .map(|raw| match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(CliError::InvalidMeta(raw.clone())),
        })
        .collect()
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.display().to_string(), source })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
