use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tasklane_shared::{
    Attachment, AttachmentKind, DeleteAction, NewTodo, Task, TaskDraft, TaskStatus,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::attachments;
use crate::bucket::{CalendarView, CalendarViewMode, DateBucketer, DayFilter};
use crate::cli::{AddArgs, AttachArgs, Command, TodoCommand};
use crate::config::{self, Config};
use crate::datastore::DataStore;
use crate::datetime::{CalendarDay, format_timestamp, parse_day_arg};
use crate::drag::{Actor, DragAction, DragPolicy, DragTransferEngine, DropOutcome};
use crate::events::{CalendarEvent, EventBus, EventSubscriber};
use crate::render::Renderer;
use crate::storage::LocalStorage;
use crate::store::TaskStore;
use crate::todos::TodoList;
use crate::uploads::DirectoryUploader;

/// Everything a command needs, wired from the loaded configuration.
pub struct App {
    pub store: Arc<DataStore>,
    pub uploader: Arc<DirectoryUploader>,
    pub storage: LocalStorage,
    pub bucketer: DateBucketer,
    pub actor: Actor,
    pub policy: DragPolicy,
    pub week_start: chrono::Weekday,
    pub renderer: Renderer,
    pub events: EventBus,
}

impl App {
    #[instrument(skip(cfg, data_dir), fields(data_dir = %data_dir.display()))]
    pub fn open(cfg: &Config, data_dir: &Path) -> anyhow::Result<Self> {
        let store = DataStore::open(data_dir).with_context(|| {
            format!("failed to open datastore at {}", data_dir.display())
        })?;
        let uploads_dir = config::resolve_uploads_dir(cfg, data_dir);
        let storage = LocalStorage::open(&data_dir.join("local"))
            .context("failed to open local storage")?;

        let actor = cfg.actor();
        let tz = cfg.timezone();
        info!(user = %actor.id, role = ?actor.role, timezone = %tz, "session");

        Ok(Self {
            store: Arc::new(store),
            uploader: Arc::new(DirectoryUploader::new(uploads_dir)),
            storage,
            bucketer: DateBucketer::new(tz).with_current_user(actor.id.clone()),
            actor,
            policy: cfg.drag_policy(),
            week_start: cfg.week_start(),
            renderer: Renderer::new(cfg)?,
            events: EventBus::default(),
        })
    }

    fn engine(&self) -> DragTransferEngine {
        DragTransferEngine::new(
            self.store.clone(),
            self.uploader.clone(),
            self.bucketer.clone(),
            self.actor.clone(),
        )
        .with_policy(self.policy)
    }

    fn todos(&self) -> anyhow::Result<TodoList> {
        Ok(TodoList::load(self.storage.clone(), &self.actor.id)?)
    }

    fn day(&self, raw: &str, now: DateTime<Utc>) -> anyhow::Result<CalendarDay> {
        Ok(parse_day_arg(raw, now, self.bucketer.timezone())?)
    }
}

#[instrument(skip(app, command, now))]
pub async fn dispatch(
    app: &App,
    command: Option<Command>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut detail_view = app.events.subscribe();
    let command = command.unwrap_or(Command::Calendar { month: None });
    debug!(?command, "dispatching command");

    match command {
        Command::Calendar { month } => cmd_calendar(app, month.as_deref(), now).await?,
        Command::Week { date, shift } => cmd_week(app, date.as_deref(), shift, now).await?,
        Command::Day {
            date,
            employee,
            mine,
        } => cmd_day(app, &date, employee, mine, now).await?,
        Command::Add(args) => cmd_add(app, args, now).await?,
        Command::Move { task, date } => cmd_move(app, &task, &date, now).await?,
        Command::Todo(todo) => cmd_todo(app, todo)?,
        Command::Drop { todo, date, copy } => cmd_drop(app, &todo, &date, copy, now).await?,
        Command::Trash { task } => cmd_delete(app, &task, DeleteAction::Trash).await?,
        Command::Delete { task } => cmd_delete(app, &task, DeleteAction::Delete).await?,
        Command::Restore { task } => cmd_restore(app, &task)?,
        Command::TrashList => cmd_trash_list(app)?,
        Command::Purge => cmd_purge(app)?,
    }

    show_opened_tasks(app, &mut detail_view, now).await
}

#[instrument(skip(app, now))]
async fn cmd_calendar(app: &App, month: Option<&str>, now: DateTime<Utc>) -> anyhow::Result<()> {
    let today = app.bucketer.today(now);
    let (year, month0) = match month {
        Some(raw) => parse_month_arg(raw)?,
        None => (today.year(), today.month0()),
    };

    let tasks = app.store.list().await?;
    let counts: BTreeMap<u32, usize> = app
        .bucketer
        .bucket_month(&tasks, year, month0, &DayFilter::default())
        .into_iter()
        .map(|(day, tasks)| (day, tasks.len()))
        .collect();

    app.renderer.write_month(
        io::stdout().lock(),
        year,
        month0,
        app.week_start,
        &counts,
        Some(today),
    )
}

#[instrument(skip(app, now))]
async fn cmd_week(
    app: &App,
    date: Option<&str>,
    shift: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let anchor = match date {
        Some(raw) => app.day(raw, now)?,
        None => app.bucketer.today(now),
    };
    let mut view = CalendarView::new(CalendarViewMode::Week, anchor, app.week_start);
    if shift != 0 {
        view.shift(shift);
    }

    let tasks = app.store.list().await?;
    let filter = DayFilter::default();
    let mut out = io::stdout().lock();
    for day in view.cells().into_iter().flatten() {
        let on_day = app.bucketer.tasks_for_day(&tasks, day, &filter);
        app.renderer.write_day(&mut out, day, &on_day)?;
        writeln!(out)?;
    }
    Ok(())
}

#[instrument(skip(app, now))]
async fn cmd_day(
    app: &App,
    date: &str,
    employee: Option<String>,
    mine: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let day = app.day(date, now)?;
    let filter = DayFilter {
        employee_id: employee,
        current_user_only: mine,
    };

    let tasks = app.store.list().await?;
    let on_day = app.bucketer.tasks_for_day(&tasks, day, &filter);
    app.renderer.write_day(io::stdout().lock(), day, &on_day)
}

#[instrument(skip(app, args, now), fields(title = %args.title))]
async fn cmd_add(app: &App, args: AddArgs, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");
    let day = app.day(&args.on, now)?;
    let title = args.title.trim();
    if title.is_empty() {
        return Err(anyhow!("task title must not be empty"));
    }

    let stamp = format_timestamp(&app.bucketer.target_timestamp_for_drop(day)?);
    let attachments =
        attachments::reconcile(&collect_attachments(&args.files), app.uploader.as_ref()).await?;

    let task = app
        .store
        .create(TaskDraft {
            title: title.to_string(),
            description: args.description.unwrap_or_default(),
            created_at: Some(stamp.clone()),
            due_date: Some(stamp),
            priority: args.priority.unwrap_or_default(),
            status: TaskStatus::Planned,
            assigned_to: Some(args.assign.unwrap_or_else(|| app.actor.id.clone())),
            estimated_hours: args.hours.filter(|h| h.is_normal()).unwrap_or(1.0),
            attachments,
        })
        .await?;

    println!("Created task {} on {day}.", task.id);
    app.events.publisher().open_task(task.id);
    Ok(())
}

#[instrument(skip(app, now))]
async fn cmd_move(app: &App, token: &str, date: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command move");
    let day = app.day(date, now)?;
    let tasks = app.store.list().await?;
    let task = resolve_task(&tasks, token)?.clone();

    let mut todos = app.todos()?;
    let mut engine = app.engine();
    engine.start_task_drag(task)?;
    engine.hover(day);
    let outcome = engine.drop(&mut todos).await?;

    report_drop(app, &outcome, day);
    Ok(())
}

#[instrument(skip(app, now))]
async fn cmd_drop(
    app: &App,
    token: &str,
    date: &str,
    copy: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command drop");
    let day = app.day(date, now)?;
    let mut todos = app.todos()?;
    let id = todos.resolve(token)?;
    let todo = todos
        .get(id)
        .cloned()
        .ok_or_else(|| anyhow!("no todo with id {id}"))?;

    let action = if copy {
        DragAction::Copy
    } else {
        DragAction::Move
    };
    let mut engine = app.engine();
    engine.start_todo_drag(todo, action)?;
    engine.hover(day);
    let outcome = engine.drop(&mut todos).await?;

    report_drop(app, &outcome, day);
    Ok(())
}

fn report_drop(app: &App, outcome: &DropOutcome, day: CalendarDay) {
    match outcome {
        DropOutcome::Moved(task) => println!("Moved task {} to {day}.", task.id),
        DropOutcome::Created {
            task,
            action,
            list_saved,
        } => {
            println!(
                "Created task {} on {day} ({}).",
                task.id,
                action.as_str()
            );
            if !list_saved {
                eprintln!(
                    "warning: the todo list could not be saved; the todo will \
                     reappear until it is removed with `tasklane todo rm`"
                );
            }
        }
    }
    app.events.publisher().open_task(outcome.task().id);
}

#[instrument(skip(app, command))]
fn cmd_todo(app: &App, command: TodoCommand) -> anyhow::Result<()> {
    let mut todos = app.todos()?;
    match command {
        TodoCommand::Add(args) => {
            let item = todos.add(NewTodo {
                title: args.title.clone(),
                description: args.description.clone().unwrap_or_default(),
                priority: args.priority,
                estimated_hours: args.hours,
                attachments: collect_attachments(&args.files),
            })?;
            println!("Added todo {}.", item.id);
        }
        TodoCommand::List => {
            app.renderer.write_todos(io::stdout().lock(), todos.items())?;
        }
        TodoCommand::Done { todo } => {
            let id = todos.resolve(&todo)?;
            match todos.toggle_complete(id)? {
                Some(true) => println!("Completed todo {id}."),
                Some(false) => println!("Reopened todo {id}."),
                None => return Err(anyhow!("no todo with id {id}")),
            }
        }
        TodoCommand::Rm { todo } => {
            let id = todos.resolve(&todo)?;
            if !todos.delete(id)? {
                return Err(anyhow!("no todo with id {id}"));
            }
            println!("Removed todo {id}.");
        }
    }
    Ok(())
}

#[instrument(skip(app))]
async fn cmd_delete(app: &App, token: &str, action: DeleteAction) -> anyhow::Result<()> {
    let tasks = match action {
        DeleteAction::Trash => app.store.list().await?,
        DeleteAction::Delete => app.store.load_all()?,
    };
    let id = resolve_task(&tasks, token)?.id;
    app.store.delete(id, action).await?;

    match action {
        DeleteAction::Trash => println!("Moved task {id} to the trash."),
        DeleteAction::Delete => println!("Deleted task {id}."),
    }
    Ok(())
}

#[instrument(skip(app))]
fn cmd_restore(app: &App, token: &str) -> anyhow::Result<()> {
    let trashed = app.store.trash()?;
    let id = resolve_task(&trashed, token)?.id;
    let task = app.store.restore(id)?;
    println!("Restored task {}.", task.id);
    Ok(())
}

fn cmd_trash_list(app: &App) -> anyhow::Result<()> {
    let trashed = app.store.trash()?;
    app.renderer.write_trash(io::stdout().lock(), &trashed)
}

fn cmd_purge(app: &App) -> anyhow::Result<()> {
    let purged = app.store.purge_trash()?;
    println!("Purged {purged} task(s).");
    Ok(())
}

/// Shows every task some command asked to open, with the calendar focused
/// on the day it sits on.
async fn show_opened_tasks(
    app: &App,
    subscriber: &mut EventSubscriber,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut opened = Vec::new();
    while let Some(CalendarEvent::OpenTask { task_id }) = subscriber.try_recv() {
        opened.push(task_id);
    }
    if opened.is_empty() {
        return Ok(());
    }

    let tasks = app.store.list().await?;
    let filter = DayFilter::default();
    let mut view = CalendarView::new(
        CalendarViewMode::Day,
        app.bucketer.today(now),
        app.week_start,
    );
    let mut out = io::stdout().lock();
    for id in opened {
        let Some(task) = tasks.iter().find(|task| task.id == id) else {
            debug!(task_id = %id, "opened task is no longer listed");
            continue;
        };
        writeln!(out)?;
        app.renderer.write_task_detail(&mut out, task)?;

        if let Some(day) = app.bucketer.placement(task) {
            view.focus(day);
            writeln!(out)?;
            for day in view.cells().into_iter().flatten() {
                let on_day = app.bucketer.tasks_for_day(&tasks, day, &filter);
                app.renderer.write_day(&mut out, day, &on_day)?;
            }
        }
    }
    Ok(())
}

fn collect_attachments(args: &AttachArgs) -> Vec<Attachment> {
    let files = args.attach.iter().map(|path| {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut attachment =
            Attachment::pending(AttachmentKind::from_path(path), name, path.clone());
        attachment.size = std::fs::metadata(path).ok().map(|meta| meta.len());
        attachment
    });
    let links = args
        .link
        .iter()
        .map(|url| Attachment::link(url.clone(), url.clone()));
    files.chain(links).collect()
}

/// Full id or an unambiguous id prefix.
pub fn resolve_task<'a>(tasks: &'a [Task], token: &str) -> anyhow::Result<&'a Task> {
    if let Ok(id) = token.parse::<Uuid>() {
        return tasks
            .iter()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow!("no task with id {id}"));
    }

    let lowered = token.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(anyhow!("task id must not be empty"));
    }
    let mut hits = tasks
        .iter()
        .filter(|task| task.id.to_string().starts_with(&lowered));
    match (hits.next(), hits.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => Err(anyhow!("task id prefix {token:?} is ambiguous")),
        (None, _) => Err(anyhow!("no task matches {token:?}")),
    }
}

/// `YYYY-MM` into a year and zero-based month.
pub fn parse_month_arg(raw: &str) -> anyhow::Result<(i32, u32)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| anyhow!("expected YYYY-MM, got {raw:?}"))?;
    Ok((first.year(), first.month0()))
}

#[cfg(test)]
mod tests {
    use tasklane_shared::TaskPriority;

    use super::*;

    fn task_with_id(id: &str) -> Task {
        Task {
            id: id.parse().expect("uuid"),
            title: "t".to_string(),
            description: String::new(),
            created_at: None,
            due_date: None,
            assigned_to: None,
            status: TaskStatus::Planned,
            priority: TaskPriority::Low,
            estimated_hours: None,
            attachments: vec![],
        }
    }

    #[test]
    fn resolves_full_ids_and_unique_prefixes() {
        let tasks = vec![
            task_with_id("aaaaaaaa-0000-4000-8000-000000000001"),
            task_with_id("aaaabbbb-0000-4000-8000-000000000002"),
        ];
        assert_eq!(
            resolve_task(&tasks, "aaaab").expect("prefix").id,
            tasks[1].id
        );
        assert!(resolve_task(&tasks, "aaaa").is_err());
        assert!(resolve_task(&tasks, "ffff").is_err());
        assert_eq!(
            resolve_task(&tasks, "aaaaaaaa-0000-4000-8000-000000000001")
                .expect("full")
                .id,
            tasks[0].id
        );
    }

    #[test]
    fn month_argument_is_zero_based() {
        assert_eq!(parse_month_arg("2024-06").expect("month"), (2024, 5));
        assert!(parse_month_arg("2024-13").is_err());
        assert!(parse_month_arg("June").is_err());
    }

    #[test]
    fn add_arguments_become_pending_files_and_links() {
        let args = AttachArgs {
            attach: vec!["/nonexistent/shot.png".into()],
            link: vec!["http://example.com".to_string()],
        };
        let list = collect_attachments(&args);
        assert_eq!(list.len(), 2);
        assert!(list[0].is_pending());
        assert_eq!(list[0].kind, AttachmentKind::Photo);
        assert_eq!(list[0].name, "shot.png");
        assert_eq!(list[0].size, None);
        assert_eq!(list[1].kind, AttachmentKind::Link);
        assert_eq!(list[1].url(), Some("http://example.com"));
    }
}
