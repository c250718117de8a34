//! Interactive status screen over the HTTP API.

mod app;
mod ui;

use crate::client::Client;
use crate::error::Result;
use app::App;
use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEventKind};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::{FutureExt, StreamExt};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

const TICK_RATE: Duration = Duration::from_millis(250);

pub async fn run(client: Client) -> Result<()> {
    // Restore the terminal even when we panic mid-draw.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client);
    app.refresh().await;

    let result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK_RATE);

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            _ = tick.tick() => {
                app.on_tick().await;
            }
            event = events.next().fuse() => {
                if let Some(Ok(CrosstermEvent::Key(key))) = event {
                    if key.kind == KeyEventKind::Press && !app.handle_key(key).await {
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
