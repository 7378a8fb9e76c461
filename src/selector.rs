use crate::client::Transport;
use crate::console::Console;
use crate::discovery::HostProbe;
use crate::registry::Device;
use crate::session::Session;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Index(usize),
    Rescan,
    Invalid,
}

fn parse_choice(input: &str, count: usize) -> Choice {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("r") {
        return Choice::Rescan;
    }
    match trimmed.parse::<usize>() {
        Ok(0) => Choice::Rescan,
        Ok(n) if n == count + 1 => Choice::Rescan,
        Ok(n) if (1..=count).contains(&n) => Choice::Index(n - 1),
        _ => Choice::Invalid,
    }
}

impl<T, P, C> Session<T, P, C>
where
    T: Transport,
    P: HostProbe,
    C: Console,
{
    /// Interactive device pick. Only a device that passes the reachability check is
    /// committed; `None` means the previous selection is unchanged.
    pub async fn select_device(&mut self) -> Result<Option<Device>> {
        if self.store.exists() {
            self.reload_registry();
        } else {
            let devices = self.scan().await?;
            if !devices.is_empty() {
                self.registry.replace_devices(devices);
                self.persist()?;
            }
        }

        if self.registry.is_empty() {
            writeln!(
                self.console,
                "No devices found. Make sure the device is on and on this network."
            )?;
            return Ok(None);
        }

        loop {
            self.render_device_list()?;
            let count = self.registry.len();
            write!(self.console, "Select a device [1-{count}, R to rescan]: ")?;
            self.console.flush()?;

            let Some(line) = self.console.read_line().await? else {
                writeln!(self.console)?;
                return Ok(None);
            };

            match parse_choice(&line, count) {
                Choice::Rescan => {
                    let devices = self.scan().await?;
                    if devices.is_empty() {
                        writeln!(self.console, "No devices found.")?;
                        return Ok(None);
                    }
                    self.registry.replace_devices(devices);
                    self.persist()?;
                }
                Choice::Index(idx) => {
                    let device = self.registry.devices()[idx].clone();
                    writeln!(self.console, "Checking {}...", device.address)?;
                    self.console.flush()?;
                    if !self.client.is_reachable(device.address).await {
                        writeln!(
                            self.console,
                            "{} ({}) is not reachable. Pick another device or rescan.",
                            device.display_name, device.address
                        )?;
                        continue;
                    }

                    self.registry.select(device.address);
                    self.selected = Some(device.clone());
                    self.persist()?;
                    writeln!(
                        self.console,
                        "Selected {} ({}).",
                        device.display_name, device.address
                    )?;
                    return Ok(Some(device));
                }
                Choice::Invalid => {
                    writeln!(self.console, "Invalid selection.")?;
                }
            }
        }
    }

    fn render_device_list(&mut self) -> Result<()> {
        let selected = self.selected.as_ref().map(|device| device.address);
        writeln!(self.console)?;
        writeln!(self.console, "Devices:")?;
        for (idx, device) in self.registry.devices().iter().enumerate() {
            let marker = if Some(device.address) == selected { "*" } else { " " };
            writeln!(
                self.console,
                "{marker} {:>2}. {:<15}  {}",
                idx + 1,
                device.address,
                device.display_name
            )?;
        }
        writeln!(self.console, "  {:>2}. Rescan network", self.registry.len() + 1)?;
        Ok(())
    }
}
