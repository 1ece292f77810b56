// Line-oriented board session: one drag event per stdin line

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::cli::output::{format_board, format_toast};
use crate::models::{EntityId, PipelineKind};
use crate::pipeline::{
    ControllerConfig, DragOutcome, DragRejection, DragTransitionController, Retirement, StageBackend,
    ToastQueue,
};

const HELP: &str = "\
Commands:
  drag <id> <column>   drop a card on a column
  start <id>           pick up a card
  over <column>        hover over a column
  refresh              reload from the backend and reconcile
  board                show the board
  search <text>        only show cards whose name contains text
  clear                drop the search filter
  wait                 wait for in-flight moves to settle
  status [id]          show drag state per card
  retry                retry the most recent failed move
  help                 show this help
  quit                 end the session";

pub struct SessionOptions {
    pub pipeline: PipelineKind,
    pub mutation_timeout: Duration,
    pub is_tty: bool,
    pub width: usize,
}

/// Run a session until `quit` or end of input.
///
/// Completions are applied before every command. At end of input the session
/// waits for in-flight moves so no result is lost.
pub fn run_session<R: BufRead, W: Write>(
    backend: Arc<dyn StageBackend>,
    options: &SessionOptions,
    input: R,
    mut out: W,
) -> Result<()> {
    let toasts = ToastQueue::new();
    let mut controller = DragTransitionController::new(
        options.pipeline.table(),
        backend,
        Box::new(toasts.clone()),
        ControllerConfig { mutation_timeout: options.mutation_timeout },
    );
    controller
        .refresh()
        .map_err(|e| anyhow!("Failed to load the {} board: {}", options.pipeline, e))?;
    log::debug!("Session started on the {} board", options.pipeline);
    let mut search: Option<String> = None;

    for line in input.lines() {
        let line = line.context("Failed to read session input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        controller.poll();
        flush_toasts(&toasts, options, &mut out)?;

        let words: Vec<&str> = line.split_whitespace().collect();
        let keep_going = execute(&mut controller, options, &mut search, &words, &mut out)?;
        flush_toasts(&toasts, options, &mut out)?;
        if !keep_going {
            break;
        }
    }

    if controller.in_flight() > 0 {
        controller.wait_idle(settle_limit(options));
    }
    flush_toasts(&toasts, options, &mut out)?;
    out.flush()?;
    Ok(())
}

fn settle_limit(options: &SessionOptions) -> Duration {
    options.mutation_timeout + Duration::from_millis(250)
}

fn flush_toasts<W: Write>(toasts: &ToastQueue, options: &SessionOptions, out: &mut W) -> Result<()> {
    for toast in toasts.drain() {
        writeln!(out, "{}", format_toast(&toast, options.is_tty))?;
    }
    Ok(())
}

/// Returns false when the session should end
fn execute<W: Write>(
    controller: &mut DragTransitionController,
    options: &SessionOptions,
    search: &mut Option<String>,
    words: &[&str],
    out: &mut W,
) -> Result<bool> {
    match words {
        ["quit"] | ["exit"] => return Ok(false),
        ["help"] => writeln!(out, "{}", HELP)?,
        ["drag", id, column] => {
            let result = controller.on_drag_end(&EntityId::from(*id), column);
            report_drop(result, out)?;
        }
        ["start", id] => {
            if !controller.on_drag_start(&EntityId::from(*id)) {
                writeln!(out, "cannot pick up {}", id)?;
            }
        }
        ["over", column] => {
            controller.on_drag_over(column);
            match controller.hovered() {
                Some(key) => writeln!(out, "over {}", key)?,
                None => writeln!(out, "no column '{}'", column)?,
            }
        }
        ["refresh"] => match controller.refresh() {
            Ok(retired) => {
                for (id, why) in retired {
                    let why = match why {
                        Retirement::Confirmed => "confirmed",
                        Retirement::Removed => "removed",
                    };
                    writeln!(out, "{} {}", why, id)?;
                }
            }
            Err(e) => writeln!(out, "refresh failed: {}", e)?,
        },
        ["board"] => {
            let mut board = controller.board();
            if let Some(term) = search.as_deref() {
                board = board.filtered(term);
            }
            write!(out, "{}", format_board(&board, options.is_tty, options.width))?;
        }
        ["search", term @ ..] if !term.is_empty() => {
            let term = term.join(" ");
            writeln!(out, "searching for '{}'", term)?;
            *search = Some(term);
        }
        ["clear"] => {
            *search = None;
            writeln!(out, "search cleared")?;
        }
        ["wait"] => {
            let settled = controller.wait_idle(settle_limit(options));
            log::debug!("{} move(s) settled while waiting", settled.len());
        }
        ["status"] => {
            let ids: Vec<EntityId> = controller.state().store().entities().iter().map(|e| e.id.clone()).collect();
            for id in ids {
                write_status(controller, &id, out)?;
            }
        }
        ["status", id] => write_status(controller, &EntityId::from(*id), out)?,
        ["retry"] => match controller.retry_last_failure() {
            Some(result) => report_drop(result, out)?,
            None => writeln!(out, "nothing to retry")?,
        },
        _ => writeln!(out, "unknown command: {} (try 'help')", words.join(" "))?,
    }
    Ok(true)
}

fn report_drop<W: Write>(result: Result<DragOutcome, DragRejection>, out: &mut W) -> Result<()> {
    match result {
        Ok(DragOutcome::Pinned) | Ok(DragOutcome::Dispatched(_)) => {}
        Err(rejection) => writeln!(out, "ignored: {}", rejection)?,
    }
    Ok(())
}

fn write_status<W: Write>(controller: &DragTransitionController, id: &EntityId, out: &mut W) -> Result<()> {
    let column = controller.state().column_of(id).map(|c| c.key()).unwrap_or("-");
    let mut line = format!("{}  {}  {}", id, controller.transition_state(id).as_str(), column);
    if let Some(failure) = controller.last_failure().filter(|f| &f.id == id) {
        line.push_str(&format!("  ({})", failure.reason));
    }
    writeln!(out, "{}", line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;
    use crate::pipeline::{MemoryBackend, MutationError};

    fn options() -> SessionOptions {
        SessionOptions {
            pipeline: PipelineKind::Deals,
            mutation_timeout: Duration::from_secs(2),
            is_tty: false,
            width: 100,
        }
    }

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new(vec![
            Entity::new(PipelineKind::Deals, "Company 1").with_id("a").with_stage("prospect"),
            Entity::new(PipelineKind::Deals, "Company 2").with_id("b").with_stage("closing"),
        ]))
    }

    fn run(backend: Arc<MemoryBackend>, script: &str) -> String {
        let mut out = Vec::new();
        run_session(backend, &options(), script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_drag_and_board() {
        let backend = backend();
        let out = run(backend.clone(), "drag a initial-diligence\nwait\nboard\n");

        assert!(out.contains("✓ Moved Company 1 to Initial Diligence"));
        assert!(out.contains("Initial Diligence (1 deal)"));
        assert_eq!(backend.calls_for(&EntityId::from("a")), 1);
    }

    #[test]
    fn test_failed_drag_rolls_back() {
        let backend = backend();
        backend.fail_for(&EntityId::from("a"), MutationError::Server("boom".to_string()));
        let out = run(backend.clone(), "drag a ioi-loi\nwait\nstatus a\n");

        assert!(out.contains("✗ Failed to move Company 1 to IOI/LOI: server error: boom"));
        assert!(out.contains("a  rolled-back  response-received"));
    }

    #[test]
    fn test_rejections_are_reported() {
        let out = run(backend(), "drag b ioi-loi\ndrag a nowhere\ndrag zz all\n");
        assert!(out.contains("ignored:"));
        assert_eq!(out.matches("ignored:").count(), 3);
    }

    #[test]
    fn test_search_filters_board_only() {
        let backend = backend();
        let out = run(backend.clone(), "search company 2\nboard\ndrag a initial-diligence\nwait\nclear\nboard\n");

        let (filtered, unfiltered) = out.split_once("search cleared").unwrap();
        assert!(filtered.contains("IOI/LOI (1 deal)"));
        assert!(filtered.contains("Response Received (0 deals)"));
        assert!(!filtered.contains("Company 1  "));
        // The filter never blocks moves of hidden cards
        assert!(filtered.contains("✓ Moved Company 1 to Initial Diligence"));
        assert!(unfiltered.contains("Initial Diligence (1 deal)"));
        assert_eq!(backend.calls_for(&EntityId::from("a")), 1);
    }

    #[test]
    fn test_quit_stops_reading() {
        let out = run(backend(), "quit\ndrag a all\n");
        assert!(!out.contains("Moved"));
    }

    #[test]
    fn test_unknown_command() {
        let out = run(backend(), "fly away\n");
        assert!(out.contains("unknown command: fly away"));
    }
}
