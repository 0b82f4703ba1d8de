use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dungeon_engine::{run_app, run_headless};
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;

const QUIT_LINE: &str = "quit";

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        session,
        mut thruport,
        headless,
    } = app;

    let outcome = if headless {
        let shutdown = Arc::new(AtomicBool::new(false));
        watch_stdin_for_quit(Arc::clone(&shutdown));
        info!(stop_with = QUIT_LINE, "headless_started");
        run_headless(config, session, shutdown);
        Ok(())
    } else {
        run_app(config, session)
    };
    thruport.stop();

    if let Err(err) = outcome {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// A `quit` line on stdin stops the headless loop. End of input does not,
/// so the process can run detached.
fn watch_stdin_for_quit(shutdown: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if is_quit_line(&line) => {
                        shutdown.store(true, Ordering::SeqCst);
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "stdin_read_failed");
                        return;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "stdin_watch_spawn_failed");
    }
}

fn is_quit_line(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(QUIT_LINE)
}
