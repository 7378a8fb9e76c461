use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Byte(u8),
    Timeout,
    Closed,
}

#[allow(async_fn_in_trait)]
pub trait Console: Write {
    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Input>;

    fn set_raw(&mut self, raw: bool) -> Result<()>;

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            match self.read_byte(None).await? {
                Input::Byte(b'\n') => break,
                Input::Byte(b'\r') | Input::Timeout => {}
                Input::Byte(byte) => line.push(byte),
                Input::Closed if line.is_empty() => return Ok(None),
                Input::Closed => break,
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn clear_screen(&mut self) -> Result<()>
    where
        Self: Sized,
    {
        execute!(self, Clear(ClearType::All), MoveTo(0, 0)).context("failed clearing screen")
    }
}

/// Holds the console in raw mode; cooked mode comes back when this is dropped.
pub struct RawMode<'a, C: Console> {
    console: &'a mut C,
}

impl<'a, C: Console> RawMode<'a, C> {
    pub fn enter(console: &'a mut C) -> Result<Self> {
        console.set_raw(true)?;
        Ok(Self { console })
    }
}

impl<C: Console> Deref for RawMode<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.console
    }
}

impl<C: Console> DerefMut for RawMode<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.console
    }
}

impl<C: Console> Drop for RawMode<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.console.set_raw(false) {
            tracing::warn!("failed restoring cooked terminal mode: {err:#}");
        }
    }
}

pub struct StdConsole {
    bytes: mpsc::UnboundedReceiver<u8>,
    stdout: io::Stdout,
    raw: bool,
}

impl StdConsole {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("stdin-reader".to_owned())
            .spawn(move || {
                let mut stdin = io::stdin().lock();
                let mut buf = [0_u8; 64];
                loop {
                    let read_n = match stdin.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    for byte in &buf[..read_n] {
                        if tx.send(*byte).is_err() {
                            return;
                        }
                    }
                }
            })
            .context("failed spawning stdin reader thread")?;

        Ok(Self {
            bytes: rx,
            stdout: io::stdout(),
            raw: false,
        })
    }
}

impl Console for StdConsole {
    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Input> {
        let Some(timeout) = timeout else {
            return Ok(self.bytes.recv().await.map_or(Input::Closed, Input::Byte));
        };
        match tokio::time::timeout(timeout, self.bytes.recv()).await {
            Ok(Some(byte)) => Ok(Input::Byte(byte)),
            Ok(None) => Ok(Input::Closed),
            Err(_) => Ok(Input::Timeout),
        }
    }

    fn set_raw(&mut self, raw: bool) -> Result<()> {
        if raw == self.raw {
            return Ok(());
        }
        if raw {
            enable_raw_mode().context("failed to enable raw mode")?;
        } else {
            disable_raw_mode().context("failed disabling raw mode")?;
        }
        self.raw = raw;
        Ok(())
    }
}

impl Write for StdConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl Drop for StdConsole {
    fn drop(&mut self) {
        if self.raw {
            reset_terminal();
        }
    }
}

pub fn reset_terminal() {
    if let Err(err) = disable_raw_mode() {
        tracing::debug!("failed resetting terminal mode: {err}");
    }
}
