use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use line_editor::Key;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How often the reader thread checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Blocking key reader on a dedicated thread.
///
/// Keys go into a bounded channel; when the session is busy the thread
/// blocks instead of dropping input. The channel closes when the reader
/// stops, which the session treats as a fatal input error.
pub struct KeyboardReader {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardReader {
    pub fn spawn(capacity: usize) -> std::io::Result<(Self, mpsc::Receiver<Key>)> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || read_keys(tx, flag))?;

        Ok((
            Self {
                shutdown,
                handle: Some(handle),
            },
            rx,
        ))
    }

    /// Stops the thread and waits for it to notice.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeyboardReader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn read_keys(tx: mpsc::Sender<Key>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!("keyboard poll failed: {}", e);
                break;
            }
        }
        let event = match event::read() {
            Ok(event) => event,
            Err(e) => {
                warn!("keyboard read failed: {}", e);
                break;
            }
        };
        let Event::Key(key_event) = event else {
            continue;
        };
        let Some(key) = key_from_event(&key_event) else {
            continue;
        };
        if tx.blocking_send(key).is_err() {
            break;
        }
    }
    debug!("keyboard reader stopped");
}

/// Maps a terminal key event onto the editor's key model.
pub fn key_from_event(event: &KeyEvent) -> Option<Key> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let alt = event.modifiers.contains(KeyModifiers::ALT);

    Some(match event.code {
        KeyCode::Char(c) if ctrl => match c.to_ascii_lowercase() {
            'c' => Key::CtrlC,
            'd' => Key::CtrlD,
            'r' => Key::CtrlR,
            's' => Key::CtrlS,
            'u' => Key::CtrlU,
            _ => return None,
        },
        KeyCode::Char(c) if alt => Key::Alt(c),
        KeyCode::Char(' ') => Key::Space,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace if alt => Key::AltBackspace,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Esc => Key::Esc,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        _ => return None,
    })
}
