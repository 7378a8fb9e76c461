use crate::apps::AppCatalog;
use crate::client::{RemoteKey, Transport};
use crate::console::{Console, Input, RawMode};
use crate::decoder::{Action, BACKSPACE, DEL, Decoder, ESC};
use crate::discovery::HostProbe;
use crate::session::Session;
use anyhow::Result;
use std::net::Ipv4Addr;
use std::time::Duration;

const KEY_HELP: &str = "\
Navigation   arrows move, e/Enter select, . long-press select, b/Del back
Playback     space play/pause, r rewind, f fast-forward, i instant replay
Volume       + up, - down, m mute
Power        p toggle, [ on, ] off
Other        h home, o info, a apps, d devices, s send text, t type live
             / clear, ? help, q/x/Esc quit";

const ESCAPE_TAIL_MAX: usize = 3;

impl<T, P, C> Session<T, P, C>
where
    T: Transport,
    P: HostProbe,
    C: Console,
{
    /// Interactive remote. Runs until the user exits; network failures never end it.
    pub async fn run_remote(&mut self) -> Result<()> {
        if self.selected.is_none() && self.select_device().await?.is_none() {
            writeln!(self.console, "No device selected.")?;
            return Ok(());
        }
        self.print_banner()?;

        let mut decoder = Decoder::new(self.settings.presets.clone(), self.settings.escape_timeout);
        loop {
            let action = self.next_action(&mut decoder).await?;
            if !self.dispatch(action).await? {
                break;
            }
        }

        writeln!(self.console, "Bye.")?;
        Ok(())
    }

    async fn next_action(&mut self, decoder: &mut Decoder) -> Result<Action> {
        let mut raw = RawMode::enter(&mut self.console)?;
        loop {
            let input = raw.read_byte(decoder.read_timeout()).await?;
            if let Some(action) = decoder.feed(input) {
                return Ok(action);
            }
        }
    }

    async fn dispatch(&mut self, action: Action) -> Result<bool> {
        let Some(device) = self.selected.as_ref().map(|device| device.address) else {
            return Ok(false);
        };

        match action {
            Action::Key(key) => self.client.send(device, key).await,
            Action::HoldSelect => self.client.hold_select(device).await,
            Action::Launch(app_id) => self.client.launch(device, &app_id).await,
            Action::AppCatalog => self.open_app_catalog(device).await?,
            Action::DeviceSelector => {
                self.select_device().await?;
                self.print_banner()?;
            }
            Action::PromptText => self.prompt_text(device).await?,
            Action::TextEntry => self.text_entry(device).await?,
            Action::Clear => self.console.clear_screen()?,
            Action::Help => self.print_help()?,
            Action::Exit => return Ok(false),
        }
        Ok(true)
    }

    pub(crate) async fn prompt_text(&mut self, device: Ipv4Addr) -> Result<()> {
        write!(self.console, "Text to send: ")?;
        self.console.flush()?;
        let Some(line) = self.console.read_line().await? else {
            return Ok(());
        };
        if !line.is_empty() {
            self.client.send_text(device, &line).await;
        }
        Ok(())
    }

    pub(crate) async fn text_entry(&mut self, device: Ipv4Addr) -> Result<()> {
        writeln!(self.console, "Text entry: typing goes to the device, Esc to finish.")?;
        self.console.flush()?;

        let escape_timeout = self.settings.escape_timeout;
        let client = &self.client;
        let mut raw = RawMode::enter(&mut self.console)?;
        loop {
            let byte = match raw.read_byte(None).await? {
                Input::Byte(byte) => byte,
                Input::Timeout => continue,
                Input::Closed => break,
            };

            match byte {
                ESC => {
                    for _ in 0..ESCAPE_TAIL_MAX {
                        if !matches!(raw.read_byte(Some(escape_timeout)).await?, Input::Byte(_)) {
                            break;
                        }
                    }
                    break;
                }
                DEL | BACKSPACE => client.send(device, RemoteKey::Backspace).await,
                b'\r' | b'\n' => client.send(device, RemoteKey::Enter).await,
                lead => {
                    if let Some(ch) = read_utf8_char(&mut *raw, lead, escape_timeout).await? {
                        client.send(device, RemoteKey::Lit(ch)).await;
                    }
                }
            }
        }
        drop(raw);

        writeln!(self.console, "Text entry finished.")?;
        Ok(())
    }

    pub(crate) async fn open_app_catalog(&mut self, device: Ipv4Addr) -> Result<()> {
        writeln!(self.console, "Fetching installed apps...")?;
        self.console.flush()?;
        let catalog = match self.client.fetch_apps(device).await {
            Ok(xml) => AppCatalog::from_xml(&xml),
            Err(err) => {
                writeln!(self.console, "Could not fetch apps: {err:#}")?;
                return Ok(());
            }
        };
        if catalog.is_empty() {
            writeln!(self.console, "No apps found.")?;
            return Ok(());
        }

        for entry in catalog.entries() {
            writeln!(self.console, "  [{:>3}] {}", entry.shortcut, entry.name)?;
        }

        loop {
            write!(self.console, "App key (Enter to cancel): ")?;
            self.console.flush()?;
            let Some(line) = self.console.read_line().await? else {
                return Ok(());
            };
            if line.trim().is_empty() {
                return Ok(());
            }
            match catalog.resolve(&line) {
                Some(entry) => {
                    writeln!(self.console, "Launching {}.", entry.name)?;
                    self.client.launch(device, &entry.id).await;
                    return Ok(());
                }
                None => writeln!(self.console, "Invalid selection.")?,
            }
        }
    }

    fn print_banner(&mut self) -> Result<()> {
        if let Some(device) = &self.selected {
            writeln!(
                self.console,
                "Controlling {} ({}). Press ? for keys, q to quit.",
                device.display_name, device.address
            )?;
        }
        Ok(())
    }

    fn print_help(&mut self) -> Result<()> {
        writeln!(self.console, "{KEY_HELP}")?;
        if !self.settings.presets.is_empty() {
            let presets = self
                .settings
                .presets
                .iter()
                .map(|(key, app_id)| format!("{key}={app_id}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(self.console, "Presets      {presets}")?;
        }
        Ok(())
    }
}

async fn read_utf8_char<C: Console>(
    console: &mut C,
    lead: u8,
    timeout: Duration,
) -> Result<Option<char>> {
    let width = match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Ok(None),
    };

    let mut bytes = vec![lead];
    while bytes.len() < width {
        match console.read_byte(Some(timeout)).await? {
            Input::Byte(byte) => bytes.push(byte),
            Input::Timeout | Input::Closed => return Ok(None),
        }
    }

    Ok(std::str::from_utf8(&bytes)
        .ok()
        .and_then(|text| text.chars().next()))
}

#[cfg(test)]
mod tests {
    use crate::decoder::{DEL, ESC};
    use crate::registry::{Device, RegistryStore};
    use crate::testing::{
        RecordingTransport, ScriptedConsole, StaticProbe, TestSession, session,
    };
    use std::net::Ipv4Addr;

    const DEVICE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 5);

    fn ready_session(dir: &std::path::Path, console: ScriptedConsole) -> TestSession {
        RegistryStore::new(dir.join("devices.tsv"))
            .save(&[Device::new(DEVICE, "Den")], Some(DEVICE))
            .unwrap();
        let transport = RecordingTransport::default();
        transport.set_apps(
            DEVICE,
            r#"<apps><app id="12">Netflix</app><app id="99">Net Flicks</app></apps>"#,
        );
        session(transport, StaticProbe::default(), console, dir)
    }

    fn posted(session: &TestSession) -> Vec<String> {
        session.client().transport().posted_paths()
    }

    #[tokio::test]
    async fn keys_and_arrows_are_dispatched_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new()
            .bytes(&[ESC, b'[', b'A'])
            .bytes(b"h+\r.1")
            .bytes(&[ESC, b'x'])
            .bytes(b"q");
        let mut session = ready_session(dir.path(), console);

        session.run_remote().await.unwrap();

        assert_eq!(
            posted(&session),
            vec![
                "/keypress/Up",
                "/keypress/Home",
                "/keypress/VolumeUp",
                "/keypress/Select",
                "/keydown/Select",
                "/launch/12",
            ]
        );
        assert!(!session.console().is_raw());
    }

    #[tokio::test]
    async fn lone_escape_exits_and_restores_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new().bytes(b"h").bytes(&[ESC]).timeout();
        let mut session = ready_session(dir.path(), console);

        session.run_remote().await.unwrap();

        assert_eq!(posted(&session), vec!["/keypress/Home"]);
        assert!(!session.console().is_raw());
        assert!(session.console().output().contains("Bye."));
    }

    #[tokio::test]
    async fn failed_sends_do_not_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new().bytes(b"hmp q");
        let mut session = ready_session(dir.path(), console);
        session.client().transport().fail_posts();

        session.run_remote().await.unwrap();

        assert_eq!(
            posted(&session),
            vec![
                "/keypress/Home",
                "/keypress/VolumeMute",
                "/keypress/Power",
                "/keypress/Play"
            ]
        );
    }

    #[tokio::test]
    async fn text_entry_sends_literals_backspace_and_restores_cooked_mode() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new()
            .bytes(b"ab")
            .bytes(&[DEL, ESC])
            .timeout();
        let mut session = ready_session(dir.path(), console);

        session.text_entry(DEVICE).await.unwrap();

        assert_eq!(
            posted(&session),
            vec!["/keypress/Lit_a", "/keypress/Lit_b", "/keypress/Backspace"]
        );
        assert!(!session.console().is_raw());
        assert_eq!(session.console().mode_changes(), &[true, false]);
    }

    #[tokio::test]
    async fn text_entry_discards_trailing_escape_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new()
            .bytes(b"tx\r")
            .bytes(&[ESC, b'[', b'A'])
            .timeout()
            .bytes(b"hq");
        let mut session = ready_session(dir.path(), console);

        session.run_remote().await.unwrap();

        assert_eq!(
            posted(&session),
            vec!["/keypress/Lit_x", "/keypress/Enter", "/keypress/Home"]
        );
        assert!(!session.console().is_raw());
    }

    #[tokio::test]
    async fn text_entry_reassembles_multibyte_characters() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new()
            .bytes("é ".as_bytes())
            .bytes(&[ESC])
            .timeout();
        let mut session = ready_session(dir.path(), console);

        session.text_entry(DEVICE).await.unwrap();

        assert_eq!(
            posted(&session),
            vec!["/keypress/Lit_%C3%A9", "/keypress/Lit_%20"]
        );
    }

    #[tokio::test]
    async fn prompt_text_sends_each_character_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new().bytes(b"s").line("Hi!").bytes(b"q");
        let mut session = ready_session(dir.path(), console);

        session.run_remote().await.unwrap();

        assert_eq!(
            posted(&session),
            vec!["/keypress/Lit_H", "/keypress/Lit_i", "/keypress/Lit_%21"]
        );
    }

    #[tokio::test]
    async fn app_catalog_reprompts_then_launches() {
        let dir = tempfile::tempdir().unwrap();
        let console = ScriptedConsole::new()
            .bytes(b"a")
            .line("z")
            .line("e")
            .bytes(b"q");
        let mut session = ready_session(dir.path(), console);

        session.run_remote().await.unwrap();

        assert_eq!(posted(&session), vec!["/launch/99"]);
        let output = session.console().output();
        assert!(output.contains("[  N] Netflix"));
        assert!(output.contains("[  E] Net Flicks"));
        assert!(output.contains("Invalid selection."));
        assert!(output.contains("Launching Net Flicks."));
    }

    #[tokio::test]
    async fn app_catalog_fetch_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ready_session(dir.path(), ScriptedConsole::new());

        session
            .open_app_catalog(Ipv4Addr::new(192, 168, 1, 99))
            .await
            .unwrap();

        assert!(session.console().output().contains("Could not fetch apps"));
        assert!(posted(&session).is_empty());
    }

    #[tokio::test]
    async fn no_selectable_device_ends_without_sending() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(
            RecordingTransport::default(),
            StaticProbe::default(),
            ScriptedConsole::new().bytes(b"hhh"),
            dir.path(),
        );

        session.run_remote().await.unwrap();

        assert!(posted(&session).is_empty());
        assert!(session.console().output().contains("No device selected."));
    }
}
