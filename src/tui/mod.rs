pub mod app;
pub mod ui;

use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::dispatcher::JobDispatcher;
use crate::models::{BatchOutcome, GainMode};
use crate::progress::ProgressReceiver;

use app::{App, View};

/// Show live progress of a running batch until the user quits.
///
/// `s` stops the batch; `q` stops it if needed and exits once it has ended.
pub fn run(
    path: &Path,
    mode: GainMode,
    jobs: usize,
    dispatcher: JobDispatcher,
    progress: ProgressReceiver,
) -> Result<BatchOutcome> {
    let mut app = App::new(path.to_path_buf(), mode, jobs);
    let mut dispatcher = Some(dispatcher);

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &mut dispatcher, &progress);

    // Restore terminal
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    match (result, dispatcher.take()) {
        (Ok(outcome), _) => Ok(outcome),
        (Err(e), Some(dispatcher)) => {
            dispatcher.stop();
            let _ = dispatcher.join();
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    dispatcher: &mut Option<JobDispatcher>,
    progress: &ProgressReceiver,
) -> Result<BatchOutcome> {
    let mut outcome = None;
    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        // Drain progress events
        while let Some(event) = progress.try_recv() {
            app.on_progress(event);
        }

        // The view shows how the batch really ended, not what was last requested
        if dispatcher.as_ref().is_some_and(JobDispatcher::is_finished) {
            if let Some(finished) = dispatcher.take() {
                let ended = finished.join()?;
                app.on_outcome(&ended);
                outcome = Some(ended);
            }
        }

        if app.should_quit {
            if let Some(outcome) = outcome.take() {
                return Ok(outcome);
            }
        }

        // Poll for key events
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.view {
                    View::Main => match key.code {
                        KeyCode::Char('s') => {
                            if app.request_stop() {
                                if let Some(dispatcher) = dispatcher.as_ref() {
                                    dispatcher.stop();
                                }
                            }
                        }
                        KeyCode::Char('q') | KeyCode::Esc => {
                            if app.request_stop() {
                                if let Some(dispatcher) = dispatcher.as_ref() {
                                    dispatcher.stop();
                                }
                            }
                            app.should_quit = true;
                        }
                        KeyCode::Char('a') => app.toggle_about(),
                        _ => {}
                    },
                    View::About => {
                        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                            app.toggle_about();
                        }
                    }
                }
            }
        }
    }
}
