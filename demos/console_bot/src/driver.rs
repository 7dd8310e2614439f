//! A driver reading lines from stdin and printing replies to stdout.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use parley::core::{ChatError, ChatResult, Driver, Event, EventCategory, EventData, WeakBot};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Origin of every console line; listed as owner by default.
pub const ORIGIN: &str = "console@local";

/// Nick the console user speaks with.
pub const USER_NICK: &str = "you";

pub struct ConsoleDriver {
    bot: Arc<Mutex<Option<WeakBot>>>,
    reader_started: AtomicBool,
    closed: AtomicBool,
    eof: Arc<Notify>,
}

impl ConsoleDriver {
    /// `eof` is notified once stdin is exhausted.
    pub fn new(eof: Arc<Notify>) -> Self {
        Self {
            bot: Arc::new(Mutex::new(None)),
            reader_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            eof,
        }
    }

    fn spawn_reader(&self) -> io::Result<()> {
        let slot = Arc::clone(&self.bot);
        let eof = Arc::clone(&self.eof);
        thread::Builder::new()
            .name("console-reader".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            error!(error = %err, "Cannot read stdin");
                            break;
                        }
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Some(bot) = slot.lock().as_ref().and_then(|weak| weak.upgrade()) else {
                        warn!("No bot connected, line dropped");
                        continue;
                    };
                    let data = EventData::new(EventCategory::Message, line)
                        .with_origin(ORIGIN)
                        .with_nick(USER_NICK);
                    bot.put(Arc::new(Event::new(data)));
                }
                info!("stdin closed");
                eof.notify_one();
            })?;
        Ok(())
    }
}

impl Driver for ConsoleDriver {
    fn kind(&self) -> &str {
        "console"
    }

    fn connect(&self, bot: WeakBot) -> bool {
        *self.bot.lock() = Some(bot);
        self.closed.store(false, Ordering::SeqCst);
        if self.reader_started.swap(true, Ordering::SeqCst) {
            return true;
        }
        match self.spawn_reader() {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "Cannot spawn console reader");
                self.reader_started.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn ping_check(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn send_raw(&self, text: &str, target: &str) -> ChatResult<()> {
        let mut stdout = io::stdout().lock();
        for line in text.lines() {
            writeln!(stdout, "[{target}] {line}").map_err(|e| ChatError::driver(e.to_string()))?;
        }
        stdout.flush().map_err(|e| ChatError::driver(e.to_string()))
    }

    fn join(&self, channel: &str, _key: Option<&str>) -> ChatResult<()> {
        info!(channel = %channel, "Console joined channel");
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.bot.lock() = None;
    }
}
