use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, Command, DeleteArgs, EditArgs, ExportArgs, FilterArgs, SelectArgs};
use crate::config::Config;
use crate::datastore::TaskStore;
use crate::editor::TaskEditor;
use crate::list::{Confirm, TaskList};
use crate::render::Renderer;
use crate::storage::Storage;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: Command,
    pub json: bool,
    pub yes: bool,
    /// Reference time for deadline filters and overdue highlighting.
    pub now: DateTime<Utc>,
}

/// Confirmation through a `[y/N]` prompt on stderr, or automatic when
/// prompts are switched off.
#[derive(Debug)]
pub struct TerminalConfirm {
    auto_accept: bool,
}

impl TerminalConfirm {
    pub fn new(cfg: &Config, assume_yes: bool) -> Self {
        Self {
            auto_accept: assume_yes || !cfg.confirm(),
        }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.auto_accept {
            debug!(prompt, "confirmation skipped");
            return true;
        }

        eprint!("{prompt} [y/N] ");
        if let Err(err) = io::stderr().flush() {
            debug!(error = %err, "failed to flush prompt");
        }

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: Storage>(
    store: &TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = inv.now;
    let mut confirm = TerminalConfirm::new(cfg, inv.yes);
    debug!(command = ?inv.command, "dispatching command");

    match inv.command {
        Command::List(args) => cmd_list(store, renderer, &args, inv.json, now),
        Command::Show { id } => cmd_show(store, renderer, id, inv.json),
        Command::Add(args) => cmd_add(store, args),
        Command::Edit(args) => cmd_edit(store, args),
        Command::Toggle { id } => cmd_toggle(store, id),
        Command::Done(args) => cmd_mark(store, &args, true, now),
        Command::Undone(args) => cmd_mark(store, &args, false, now),
        Command::Delete(args) => cmd_delete(store, &args, &mut confirm, now),
        Command::Export(args) => cmd_export(store, cfg, &args, now),
        Command::Import { file } => cmd_import(store, &file),
        Command::Tags => cmd_tags(store),
        Command::Config => cmd_config(cfg),
    }
}

/// Check the targeted tasks in the working list and return how many are
/// checked. Explicit ids must exist; `--all` takes the filtered view, or the
/// whole list when no filter is given.
pub fn apply_selection<S: Storage>(
    list: &mut TaskList<'_, S>,
    ids: &[u64],
    all: bool,
    filter: &FilterArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    if all {
        let filter = filter.to_filter();
        if filter.is_empty() {
            list.check_all(true);
        } else {
            let visible: Vec<u64> = list.filtered_view(&filter, now).map(|t| t.id).collect();
            for id in visible {
                list.toggle_check(id);
            }
        }
    } else {
        let unique: BTreeSet<u64> = ids.iter().copied().collect();
        for id in unique {
            if !list.toggle_check(id) {
                return Err(anyhow!("no task with id {id}"));
            }
        }
    }

    let checked = list.checked_count();
    debug!(checked, "selection applied");
    Ok(checked)
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_list<S: Storage>(
    store: &TaskStore<S>,
    renderer: &mut Renderer,
    args: &FilterArgs,
    json: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let list = TaskList::load(store)?;
    let filter = args.to_filter();
    let view = list.filtered_view(&filter, now);

    if json {
        let rows: Vec<&Task> = view.collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let shown = view.clone().count();
    renderer.print_task_table(view, now)?;
    if shown != list.tasks().len() {
        println!();
        println!("{shown} of {} task(s) shown.", list.tasks().len());
    }
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_show<S: Storage>(
    store: &TaskStore<S>,
    renderer: &mut Renderer,
    id: u64,
    json: bool,
) -> anyhow::Result<()> {
    info!("command show");

    let task = store
        .get(id)?
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        renderer.print_task_info(&task)?;
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_add<S: Storage>(store: &TaskStore<S>, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let mut editor = TaskEditor::open(store, None)?;
    debug!(route = %editor.route(), "opened editor");
    let draft = editor.draft_mut();
    draft.name = args.name;
    draft.deadline = args.deadline;
    draft.tag = args.tag;
    draft.description = args.description;

    let next = editor.save()?;
    debug!(route = %next, "editor closed");
    println!("Created task {}.", editor.draft().id);
    Ok(())
}

#[instrument(skip(store, args), fields(id = args.id))]
fn cmd_edit<S: Storage>(store: &TaskStore<S>, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let mut editor = TaskEditor::open(store, Some(args.id))?;
    if editor.draft().id != args.id {
        return Err(anyhow!("no task with id {}", args.id));
    }
    debug!(route = %editor.route(), "opened editor");

    let draft = editor.draft_mut();
    if let Some(name) = args.name {
        draft.name = name;
    }
    if let Some(deadline) = args.deadline {
        draft.deadline = deadline;
    }
    if let Some(tag) = args.tag {
        draft.tag = tag;
    }
    if let Some(description) = args.description {
        draft.description = Some(description);
    }
    if args.done {
        draft.is_done = true;
    } else if args.not_done {
        draft.is_done = false;
    }

    editor.save()?;
    println!("Modified task {}.", args.id);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_toggle<S: Storage>(store: &TaskStore<S>, id: u64) -> anyhow::Result<()> {
    info!("command toggle");

    let mut list = TaskList::load(store)?;
    if !list.toggle_done(id)? {
        return Err(anyhow!("no task with id {id}"));
    }
    let label = list
        .find(id)
        .map(Task::status_label)
        .unwrap_or_default();
    println!("Task {id}: {label}.");
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_mark<S: Storage>(
    store: &TaskStore<S>,
    args: &SelectArgs,
    done: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command mark");

    let mut list = TaskList::load(store)?;
    if apply_selection(&mut list, &args.ids, args.all, &args.filter, now)? == 0 {
        println!("No tasks selected.");
        return Ok(());
    }

    let changed = list.mark_checked(done)?;
    let label = if done { "completed" } else { "due to finish" };
    println!("Marked {changed} task(s) as {label}.");
    Ok(())
}

#[instrument(skip(store, args, confirm, now))]
fn cmd_delete<S: Storage>(
    store: &TaskStore<S>,
    args: &DeleteArgs,
    confirm: &mut impl Confirm,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command delete");

    let mut list = TaskList::load(store)?;

    if let [id] = args.ids.as_slice()
        && !args.checked
        && !args.all
    {
        if list.find(*id).is_none() {
            return Err(anyhow!("no task with id {id}"));
        }
        if list.delete_one(*id, confirm)? {
            println!("Deleted task {id}.");
        } else {
            println!("Delete cancelled.");
        }
        return Ok(());
    }

    let selected = apply_selection(&mut list, &args.ids, args.all, &args.filter, now)?;
    if selected == 0 {
        println!("No tasks selected.");
        return Ok(());
    }

    if list.delete_checked(confirm)? {
        println!("Deleted {selected} task(s).");
    } else {
        println!("Delete cancelled.");
    }
    Ok(())
}

#[instrument(skip(store, cfg, args, now))]
fn cmd_export<S: Storage>(
    store: &TaskStore<S>,
    cfg: &Config,
    args: &ExportArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command export");

    let mut list = TaskList::load(store)?;
    let select = &args.select;
    let selected = apply_selection(&mut list, &select.ids, select.all, &select.filter, now)?;
    if selected == 0 {
        println!("No tasks selected.");
        return Ok(());
    }

    let path = args.out.clone().unwrap_or_else(|| cfg.export_file().to_path_buf());
    let bytes = list.export_checked()?;
    fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;

    println!("Exported {selected} task(s) to {}.", path.display());
    Ok(())
}

#[instrument(skip(store))]
fn cmd_import<S: Storage>(store: &TaskStore<S>, file: &Path) -> anyhow::Result<()> {
    info!("command import");

    let bytes = fs::read(file).with_context(|| format!("failed reading {}", file.display()))?;
    let mut list = TaskList::load(store)?;
    let count = list
        .import_from_workbook(&bytes)
        .with_context(|| format!("failed importing {}", file.display()))?;

    println!("Imported {count} task(s).");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_tags<S: Storage>(store: &TaskStore<S>) -> anyhow::Result<()> {
    info!("command tags");

    let list = TaskList::load(store)?;
    for tag in list.tags() {
        println!("{tag}");
    }
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    for (key, value) in cfg.entries() {
        println!("{key} = {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::DEFAULT_STORAGE_KEY;
    use crate::filter::DeadlineFilter;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid now")
    }

    fn seeded() -> TaskStore<MemoryStorage> {
        let store = TaskStore::new(MemoryStorage::new(), DEFAULT_STORAGE_KEY);
        for (name, deadline, tag) in [
            ("Write report", "2024-01-10", "work"),
            ("Water plants", "2024-12-01", "home"),
            ("Plan sprint", "2024-09-01", "work"),
        ] {
            store
                .save(Task::new(name.into(), deadline.into(), tag.into()))
                .expect("seed");
        }
        store
    }

    fn run(store: &TaskStore<MemoryStorage>, cfg: &Config, command: Command) -> anyhow::Result<()> {
        run_at(store, cfg, command, now())
    }

    fn run_at(
        store: &TaskStore<MemoryStorage>,
        cfg: &Config,
        command: Command,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut renderer = Renderer::new(cfg);
        dispatch(
            store,
            cfg,
            &mut renderer,
            Invocation {
                command,
                json: false,
                yes: true,
                now,
            },
        )
    }

    fn ids_named(store: &TaskStore<MemoryStorage>, names: &[&str]) -> Vec<u64> {
        store
            .list()
            .expect("list")
            .into_iter()
            .filter(|t| names.contains(&t.name.as_str()))
            .map(|t| t.id)
            .collect()
    }

    fn work_filter() -> FilterArgs {
        FilterArgs {
            tag: Some("work".into()),
            ..FilterArgs::default()
        }
    }

    #[test]
    fn select_all_with_filter_checks_visible_only() {
        let store = seeded();
        let mut list = TaskList::load(&store).expect("load");

        let count = apply_selection(&mut list, &[], true, &work_filter(), now()).expect("select");
        assert_eq!(count, 2);
        let expected: BTreeSet<u64> = ids_named(&store, &["Write report", "Plan sprint"])
            .into_iter()
            .collect();
        assert_eq!(list.checked_ids(), expected);
        assert!(!list.select_all());
    }

    #[test]
    fn select_all_without_filter_is_check_all() {
        let store = seeded();
        let mut list = TaskList::load(&store).expect("load");
        let count =
            apply_selection(&mut list, &[], true, &FilterArgs::default(), now()).expect("select");
        assert_eq!(count, 3);
        assert!(list.select_all());
    }

    #[test]
    fn select_rejects_unknown_ids_and_ignores_duplicates() {
        let store = seeded();
        let mut list = TaskList::load(&store).expect("load");
        let id = ids_named(&store, &["Water plants"])[0];

        let count = apply_selection(&mut list, &[id, id], false, &FilterArgs::default(), now())
            .expect("select");
        assert_eq!(count, 1);
        assert!(apply_selection(&mut list, &[7], false, &FilterArgs::default(), now()).is_err());
    }

    #[test]
    fn add_rejects_invalid_input() {
        let store = seeded();
        let cfg = Config::default();
        let err = run(
            &store,
            &cfg,
            Command::Add(AddArgs {
                name: "x".repeat(60),
                deadline: "2024-01-01".into(),
                tag: "t".into(),
                description: None,
            }),
        )
        .expect_err("too long");
        assert!(err.to_string().contains("Please fill in all required fields."));
        assert_eq!(store.list().expect("list").len(), 3);
    }

    #[test]
    fn edit_unknown_id_is_an_error() {
        let store = seeded();
        let cfg = Config::default();
        let result = run(
            &store,
            &cfg,
            Command::Edit(EditArgs {
                id: 5,
                name: Some("nope".into()),
                deadline: None,
                tag: None,
                description: None,
                done: false,
                not_done: false,
            }),
        );
        assert!(result.is_err());
        assert_eq!(store.list().expect("list").len(), 3);
    }

    #[test]
    fn done_then_delete_by_filter() {
        let store = seeded();
        let cfg = Config::default();

        run(
            &store,
            &cfg,
            Command::Done(SelectArgs {
                ids: vec![],
                all: true,
                filter: work_filter(),
            }),
        )
        .expect("done");
        let done: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .filter(|t| t.is_done)
            .map(|t| t.name)
            .collect();
        assert_eq!(done, vec!["Write report", "Plan sprint"]);

        run(
            &store,
            &cfg,
            Command::Delete(DeleteArgs {
                ids: vec![],
                checked: false,
                all: true,
                filter: FilterArgs {
                    deadline: DeadlineFilter::Passed,
                    ..FilterArgs::default()
                },
            }),
        )
        .expect("delete");
        let left: Vec<String> = store.list().expect("list").into_iter().map(|t| t.name).collect();
        assert_eq!(left, vec!["Water plants", "Plan sprint"]);
    }

    #[test]
    fn passed_filter_uses_the_invocation_clock() {
        let store = seeded();
        let cfg = Config::default();
        let passed = || {
            Command::Delete(DeleteArgs {
                ids: vec![],
                checked: false,
                all: true,
                filter: FilterArgs {
                    deadline: DeadlineFilter::Passed,
                    ..FilterArgs::default()
                },
            })
        };

        let early = Utc
            .with_ymd_and_hms(2023, 12, 31, 0, 0, 0)
            .single()
            .expect("valid time");
        run_at(&store, &cfg, passed(), early).expect("delete");
        assert_eq!(store.list().expect("list").len(), 3);

        let late = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("valid time");
        run_at(&store, &cfg, passed(), late).expect("delete");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn export_then_import_through_files() {
        let dir = tempdir().expect("tempdir");
        let out = dir.path().join("tasks.xlsx");
        let store = seeded();
        let cfg = Config::default();

        run(
            &store,
            &cfg,
            Command::Export(ExportArgs {
                select: SelectArgs {
                    ids: vec![],
                    all: true,
                    filter: work_filter(),
                },
                out: Some(out.clone()),
            }),
        )
        .expect("export");
        assert!(out.exists());

        run(&store, &cfg, Command::Import { file: out }).expect("import");
        let names: Vec<String> = store.list().expect("list").into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["Write report", "Water plants", "Plan sprint", "Write report", "Plan sprint"]
        );
    }

    #[test]
    fn declining_the_prompt_keeps_tasks() {
        let store = seeded();
        let id = ids_named(&store, &["Water plants"])[0];
        let mut list = TaskList::load(&store).expect("load");
        let mut never = |_: &str| false;

        assert!(!list.delete_one(id, &mut never).expect("delete"));
        assert_eq!(store.list().expect("list").len(), 3);

        let mut cfg = Config::default();
        cfg.set("confirm", "off").expect("set");
        assert!(TerminalConfirm::new(&cfg, false).confirm("sure?"));
    }
}
