use crate::client::RemoteKey;
use crate::console::Input;
use std::collections::BTreeMap;
use std::time::Duration;

pub const ESC: u8 = 0x1b;
pub const DEL: u8 = 0x7f;
pub const BACKSPACE: u8 = 0x08;
pub const CTRL_C: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Key(RemoteKey),
    HoldSelect,
    Launch(String),
    AppCatalog,
    DeviceSelector,
    PromptText,
    TextEntry,
    Clear,
    Help,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Normal,
    EscapePending,
    CsiPending,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    state: DecodeState,
    presets: BTreeMap<char, String>,
    escape_timeout: Duration,
}

impl Decoder {
    pub const fn new(presets: BTreeMap<char, String>, escape_timeout: Duration) -> Self {
        Self {
            state: DecodeState::Normal,
            presets,
            escape_timeout,
        }
    }

    #[cfg(test)]
    pub const fn state(&self) -> DecodeState {
        self.state
    }

    /// How long the next read may wait. `None` blocks until a byte arrives.
    pub const fn read_timeout(&self) -> Option<Duration> {
        match self.state {
            DecodeState::Normal => None,
            DecodeState::EscapePending | DecodeState::CsiPending => Some(self.escape_timeout),
        }
    }

    pub fn feed(&mut self, input: Input) -> Option<Action> {
        match (self.state, input) {
            (_, Input::Closed) => {
                self.state = DecodeState::Normal;
                Some(Action::Exit)
            }
            (DecodeState::Normal, Input::Timeout) => None,
            (DecodeState::Normal, Input::Byte(ESC)) => {
                self.state = DecodeState::EscapePending;
                None
            }
            (DecodeState::Normal, Input::Byte(byte)) => self.map_byte(byte),
            (DecodeState::EscapePending, Input::Timeout) => {
                self.state = DecodeState::Normal;
                Some(Action::Exit)
            }
            (DecodeState::EscapePending, Input::Byte(b'[')) => {
                self.state = DecodeState::CsiPending;
                None
            }
            (DecodeState::EscapePending, Input::Byte(_)) | (DecodeState::CsiPending, Input::Timeout) => {
                self.state = DecodeState::Normal;
                None
            }
            (DecodeState::CsiPending, Input::Byte(byte)) => {
                self.state = DecodeState::Normal;
                arrow_key(byte).map(Action::Key)
            }
        }
    }

    fn map_byte(&self, byte: u8) -> Option<Action> {
        builtin_action(byte).or_else(|| {
            self.presets
                .get(&char::from(byte))
                .map(|app_id| Action::Launch(app_id.clone()))
        })
    }
}

pub fn is_builtin_binding(ch: char) -> bool {
    u8::try_from(ch).is_ok_and(|byte| builtin_action(byte).is_some())
}

fn builtin_action(byte: u8) -> Option<Action> {
    let action = match byte {
        b'\r' | b'\n' | b'e' => Action::Key(RemoteKey::Select),
        b' ' => Action::Key(RemoteKey::Play),
        b'.' => Action::HoldSelect,
        b'p' => Action::Key(RemoteKey::Power),
        b'[' => Action::Key(RemoteKey::PowerOn),
        b']' => Action::Key(RemoteKey::PowerOff),
        b'+' => Action::Key(RemoteKey::VolumeUp),
        b'-' => Action::Key(RemoteKey::VolumeDown),
        b'm' => Action::Key(RemoteKey::VolumeMute),
        b'r' => Action::Key(RemoteKey::Rev),
        b'f' => Action::Key(RemoteKey::Fwd),
        b'i' => Action::Key(RemoteKey::InstantReplay),
        b'h' => Action::Key(RemoteKey::Home),
        b'b' | DEL | BACKSPACE => Action::Key(RemoteKey::Back),
        b'o' => Action::Key(RemoteKey::Info),
        b'a' => Action::AppCatalog,
        b'd' => Action::DeviceSelector,
        b's' => Action::PromptText,
        b't' => Action::TextEntry,
        b'/' => Action::Clear,
        b'?' => Action::Help,
        b'x' | b'q' | CTRL_C => Action::Exit,
        _ => return None,
    };
    Some(action)
}

const fn arrow_key(byte: u8) -> Option<RemoteKey> {
    match byte {
        b'A' => Some(RemoteKey::Up),
        b'B' => Some(RemoteKey::Down),
        b'C' => Some(RemoteKey::Right),
        b'D' => Some(RemoteKey::Left),
        _ => None,
    }
}
