/// RAII guard that puts stdin into raw mode and restores it on drop.
///
/// Output post-processing stays on so `\n` still moves to column zero; the
/// editor's render diffs rely on it.
#[cfg(unix)]
pub struct TerminalGuard {
    original: Option<nix::sys::termios::Termios>,
}

#[cfg(unix)]
impl TerminalGuard {
    /// Saves the current settings. Not a terminal means nothing to restore.
    pub fn new() -> Self {
        use nix::sys::termios;
        let original = termios::tcgetattr(std::io::stdin()).ok();
        Self { original }
    }

    pub fn enter_raw_mode(&self) -> std::io::Result<()> {
        use nix::sys::termios::{self, OutputFlags, SetArg};

        let Some(ref original) = self.original else {
            return Ok(());
        };
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        raw.output_flags |= OutputFlags::OPOST | OutputFlags::ONLCR;
        termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &raw)?;
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(ref original) = self.original {
            use nix::sys::termios;
            let _ = termios::tcsetattr(std::io::stdin(), termios::SetArg::TCSANOW, original);
        }
    }
}

/// Falls back to crossterm's raw mode where termios is unavailable.
#[cfg(not(unix))]
pub struct TerminalGuard {
    raw: std::cell::Cell<bool>,
}

#[cfg(not(unix))]
impl TerminalGuard {
    pub fn new() -> Self {
        Self {
            raw: std::cell::Cell::new(false),
        }
    }

    pub fn enter_raw_mode(&self) -> std::io::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        self.raw.set(true);
        Ok(())
    }
}

#[cfg(not(unix))]
impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.raw.get() {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}
