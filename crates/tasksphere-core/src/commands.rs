use std::io::Write;

use anyhow::{anyhow, bail};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cli::{Command, ThemeAction};
use crate::datetime::now_millis;
use crate::query::TaskQuery;
use crate::render::Renderer;
use crate::storage::SlotStorage;
use crate::task::{DueDateParts, Task};
use crate::task_store::TaskStore;
use crate::theme::ThemeState;

#[tracing::instrument(skip(store, theme, renderer, out))]
pub fn dispatch<S: SlotStorage, W: Write>(
    store: &mut TaskStore<S>,
    theme: &mut ThemeState<S>,
    renderer: &mut Renderer,
    out: &mut W,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Add {
            title,
            due_date,
            due_time,
        } => {
            let title = title.join(" ");
            let due = DueDateParts {
                date: due_date,
                time: due_time,
            };
            if due.date.is_some() != due.time.is_some() {
                warn!("due date needs both --due-date and --due-time; ignoring");
            }
            match store.add(&title, &due) {
                Some(task) => {
                    info!(id = %task.id, "added task");
                    let notice = format!("Added task {}.", task.short_id());
                    renderer.write_notice(&mut *out, &notice)
                }
                None => renderer.write_notice(&mut *out, "Nothing added: the title is blank."),
            }
        }
        Command::List { search, status } => {
            let query = TaskQuery::new(search, status);
            let visible = query.apply(store.tasks());
            debug!(total = store.tasks().len(), visible = visible.len(), "listing tasks");
            renderer.write_task_table(&mut *out, &visible, now_millis())
        }
        Command::Show { id } => {
            let id = resolve_id(store.tasks(), &id)?;
            let task = store
                .get(id)
                .ok_or_else(|| anyhow!("no task with id {id}"))?;
            renderer.write_task_detail(&mut *out, task)
        }
        Command::Edit { id, title } => {
            let id = resolve_id(store.tasks(), &id)?;
            if store.update(id, &title.join(" ")) {
                renderer.write_notice(&mut *out, "Task updated.")
            } else {
                renderer.write_notice(&mut *out, "Nothing changed.")
            }
        }
        Command::Status { id, status } => {
            let id = resolve_id(store.tasks(), &id)?;
            if store.set_status(id, status) {
                let notice = format!("Task is now {}.", status.label());
                renderer.write_notice(&mut *out, &notice)
            } else {
                renderer.write_notice(&mut *out, "Nothing changed.")
            }
        }
        Command::Toggle { id } => {
            let id = resolve_id(store.tasks(), &id)?;
            match store.toggle_completed(id) {
                Some(status) => {
                    let notice = format!("Task is now {}.", status.label());
                    renderer.write_notice(&mut *out, &notice)
                }
                None => renderer.write_notice(&mut *out, "Nothing changed."),
            }
        }
        Command::Delete { id } => {
            let id = resolve_id(store.tasks(), &id)?;
            if store.delete(id) {
                renderer.write_notice(&mut *out, "Task deleted.")
            } else {
                renderer.write_notice(&mut *out, "Nothing changed.")
            }
        }
        Command::Theme { action } => {
            let updated = match action {
                ThemeAction::Show => theme.theme(),
                ThemeAction::Toggle => theme.toggle(),
                ThemeAction::Dark => theme.set_dark(true),
                ThemeAction::Light => theme.set_dark(false),
            };
            renderer.set_theme(updated);
            renderer.write_theme(&mut *out)
        }
    }
}

/// Accepts a full UUID or an unambiguous prefix of one (hyphens optional).
/// A full UUID is returned as is, even when no task carries it.
pub fn resolve_id(tasks: &[Task], raw: &str) -> anyhow::Result<Uuid> {
    let raw = raw.trim();
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }

    let needle = raw.replace('-', "").to_ascii_lowercase();
    if needle.is_empty() {
        bail!("task id cannot be empty");
    }

    let mut matches = tasks
        .iter()
        .filter(|task| task.id.simple().to_string().starts_with(&needle));
    let Some(first) = matches.next() else {
        bail!("no task matches id '{raw}'");
    };
    if matches.next().is_some() {
        bail!("id prefix '{raw}' is ambiguous; use more characters");
    }
    Ok(first.id)
}
