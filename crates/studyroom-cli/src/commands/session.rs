//! `studyroom-cli session ...`
//!
//! Each invocation restores the parked live session from the kv table, lets
//! the engine reconcile the time since the last invocation, runs one command,
//! and parks the session again. `session run` keeps the engine in-process and
//! ticks it from the async service instead.

use std::time::Duration;

use chrono::Local;
use clap::Subcommand;
use serde_json::json;
use studyroom_core::session::SessionEnd;
use studyroom_core::{
    Config, Database, LiveSession, SessionConfig, SessionController, SessionMode, SessionService,
    SessionSnapshot, SystemClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

const LIVE_KEY: &str = "live_session";
const SUPPRESSED_ON_KEY: &str = "microbreaks_suppressed_on";

type Controller = SessionController<Database, SystemClock>;
type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a study session
    Start {
        /// Book being read
        #[arg(long)]
        book: String,
        /// "pomodoro" or "free"
        #[arg(long)]
        mode: Option<String>,
        /// Work phase length in minutes
        #[arg(long)]
        work: Option<u32>,
        /// Break phase length in minutes
        #[arg(long = "break")]
        break_minutes: Option<u32>,
        /// Minutes without input before the reader counts as away
        #[arg(long)]
        afk: Option<u32>,
        /// Microbreak reminder interval in minutes (0 disables)
        #[arg(long)]
        microbreak: Option<u32>,
    },
    /// Print the current snapshot as JSON
    Status,
    /// Report reader input
    Activity,
    /// Confirm presence after going AFK
    Presence,
    /// End the current break early
    SkipBreak,
    /// Record a page turn
    Page {
        /// Estimated words on the page
        #[arg(long, default_value = "0")]
        words: u32,
    },
    /// Record a highlight made during the session
    Highlight {
        /// Store the passage too
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record a note made during the session
    Note,
    /// Microbreak reminders
    Microbreak {
        #[command(subcommand)]
        action: MicrobreakAction,
    },
    /// End the session and print its wrap-up
    End,
    /// Discard the session
    Abandon,
    /// Run interactively, ticking once a second and reading commands from stdin
    Run,
}

#[derive(Subcommand)]
pub enum MicrobreakAction {
    Take,
    End,
    Postpone,
    /// Silence reminders until tomorrow
    DisableToday,
    /// Lift a "disable today"
    Enable,
}

fn today() -> String {
    Local::now().date_naive().to_string()
}

fn open_controller(config: &Config) -> CliResult<Controller> {
    let db = Database::open()?;
    let suppressed = db.kv_get(SUPPRESSED_ON_KEY)?.is_some_and(|day| day == today());
    let mut controller =
        SessionController::new(db, SystemClock).with_highlight_limit(config.wrap_up.highlight_limit);

    if let Some(json) = controller.store().kv_get(LIVE_KEY)? {
        match serde_json::from_str::<LiveSession>(&json) {
            Ok(live) => {
                controller.restore_live(live)?;
            }
            Err(e) => {
                warn!(error = %e, "dropping unreadable parked session");
                controller.store().kv_delete(LIVE_KEY)?;
            }
        }
    }
    controller.set_microbreaks_suppressed(suppressed);
    controller.tick();
    // The restore itself is not news to the caller.
    controller.drain_events();
    Ok(controller)
}

fn park(controller: &mut Controller) -> CliResult {
    match controller.export_live() {
        Some(live) => {
            let json = serde_json::to_string(&live)?;
            controller.store().kv_set(LIVE_KEY, &json)?;
        }
        None => controller.store().kv_delete(LIVE_KEY)?,
    }
    Ok(())
}

fn session_config(
    config: &Config,
    mode: Option<String>,
    work: Option<u32>,
    break_minutes: Option<u32>,
    afk: Option<u32>,
    microbreak: Option<u32>,
) -> CliResult<SessionConfig> {
    let mut session = config.session_config();
    if let Some(mode) = mode {
        session.mode = mode.parse::<SessionMode>()?;
    }
    if let Some(work) = work {
        session.work_minutes = work;
    }
    if let Some(break_minutes) = break_minutes {
        session.break_minutes = break_minutes;
    }
    if let Some(afk) = afk {
        session.afk_timeout_minutes = afk;
    }
    if let Some(microbreak) = microbreak {
        session.microbreak_interval_minutes = microbreak;
    }
    Ok(session)
}

fn print_result(controller: &mut Controller, applied: Option<bool>) -> CliResult {
    let mut out = json!({
        "snapshot": controller.snapshot(),
        "events": controller.drain_events(),
    });
    if let Some(applied) = applied {
        out["applied"] = json!(applied);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_end(end: &SessionEnd) -> CliResult {
    let out = json!({
        "wrap_up": end.wrap_up,
        "focus_ratio": end.wrap_up.focus_ratio(),
        "persist_error": end.persist_error.as_ref().map(|e| e.to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn set_suppressed_today(controller: &mut Controller, suppressed: bool) -> CliResult {
    if suppressed {
        controller.microbreak_disable_today()?;
        controller.store().kv_set(SUPPRESSED_ON_KEY, &today())?;
    } else {
        controller.set_microbreaks_suppressed(false);
        controller.store().kv_delete(SUPPRESSED_ON_KEY)?;
    }
    Ok(())
}

pub fn run(action: SessionAction) -> CliResult {
    let config = Config::load()?;
    let mut controller = open_controller(&config)?;

    match action {
        SessionAction::Start {
            book,
            mode,
            work,
            break_minutes,
            afk,
            microbreak,
        } => {
            let session = session_config(&config, mode, work, break_minutes, afk, microbreak)?;
            controller.start(&book, session)?;
            print_result(&mut controller, None)?;
        }
        SessionAction::Status => print_result(&mut controller, None)?,
        SessionAction::Activity => {
            controller.report_activity();
            print_result(&mut controller, None)?;
        }
        SessionAction::Presence => {
            let applied = controller.confirm_presence()?;
            print_result(&mut controller, Some(applied))?;
        }
        SessionAction::SkipBreak => {
            let applied = controller.skip_break()?;
            print_result(&mut controller, Some(applied))?;
        }
        SessionAction::Page { words } => {
            controller.record_page_view(words)?;
            print_result(&mut controller, None)?;
        }
        SessionAction::Highlight { text, note } => {
            controller.record_highlight()?;
            if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                let book = controller
                    .live()
                    .map(|live| live.book_id().to_string())
                    .unwrap_or_default();
                let now = chrono::Utc::now();
                controller
                    .store()
                    .add_highlight(&book, &text, note.as_deref(), now)?;
            }
            print_result(&mut controller, None)?;
        }
        SessionAction::Note => {
            controller.record_note()?;
            print_result(&mut controller, None)?;
        }
        SessionAction::Microbreak { action } => {
            let applied = match action {
                MicrobreakAction::Take => controller.microbreak_take()?,
                MicrobreakAction::End => controller.microbreak_end()?,
                MicrobreakAction::Postpone => controller.microbreak_postpone()?,
                MicrobreakAction::DisableToday => {
                    set_suppressed_today(&mut controller, true)?;
                    true
                }
                MicrobreakAction::Enable => {
                    set_suppressed_today(&mut controller, false)?;
                    true
                }
            };
            print_result(&mut controller, Some(applied))?;
        }
        SessionAction::End => {
            let end = controller.end()?;
            park(&mut controller)?;
            return print_end(&end);
        }
        SessionAction::Abandon => {
            let result = controller.abandon();
            park(&mut controller)?;
            result?;
            print_result(&mut controller, None)?;
            return Ok(());
        }
        SessionAction::Run => return run_interactive(controller, &config),
    }

    park(&mut controller)
}

/// Whether a snapshot differs from the last printed one in a way worth
/// printing. Counters move every tick and are left out.
fn changed_materially(prev: Option<&SessionSnapshot>, next: &SessionSnapshot) -> bool {
    match prev {
        None => true,
        Some(prev) => {
            prev.state != next.state
                || prev.phase != next.phase
                || prev.microbreak_due != next.microbreak_due
                || prev.microbreak_active != next.microbreak_active
        }
    }
}

fn run_interactive(controller: Controller, config: &Config) -> CliResult {
    let interval = Duration::from_millis(config.ticker.interval_ms.max(1));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let service = SessionService::new(controller, interval);
        service.resume_ticking().await;
        let mut rx = service.subscribe().await;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut last_printed: Option<SessionSnapshot> = None;

        eprintln!("commands: status activity presence skip-break page <words> highlight note take end-microbreak postpone end abandon quit");
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    for event in service.lock().await.drain_events() {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                    if changed_materially(last_printed.as_ref(), &snapshot) {
                        println!("{}", serde_json::to_string(&snapshot)?);
                        last_printed = Some(snapshot);
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match handle_line(&service, line.trim()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => eprintln!("error: {e}"),
                    }
                }
            }
        }

        let mut guard = service.lock().await;
        park(&mut guard)
    })
}

/// Returns `false` when the loop should stop.
async fn handle_line(service: &SessionService<Database, SystemClock>, line: &str) -> CliResult<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };

    match command {
        "end" => {
            let end = service.end().await?;
            print_end(&end)?;
            return Ok(false);
        }
        "abandon" => {
            service.abandon().await?;
            return Ok(false);
        }
        "quit" | "exit" => return Ok(false),
        "activity" | "a" => service.report_activity().await,
        _ => {
            let mut c = service.lock().await;
            let applied = match command {
                "status" => None,
                "presence" => Some(c.confirm_presence()?),
                "skip-break" => Some(c.skip_break()?),
                "page" => {
                    let words = parts.next().map(str::parse::<u32>).transpose()?.unwrap_or(0);
                    c.record_page_view(words)?;
                    None
                }
                "highlight" => {
                    c.record_highlight()?;
                    None
                }
                "note" => {
                    c.record_note()?;
                    None
                }
                "take" => Some(c.microbreak_take()?),
                "end-microbreak" => Some(c.microbreak_end()?),
                "postpone" => Some(c.microbreak_postpone()?),
                other => return Err(format!("unknown command: {other}").into()),
            };
            print_result(&mut c, applied)?;
        }
    }
    Ok(true)
}
