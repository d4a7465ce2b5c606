//! Administrative text endpoint.
//!
//! Line-oriented control surface, a thin wrapper over the hub's
//! attribute API:
//!
//! - writing `<name> <0|1>` disables/enables the named unit (through the
//!   manual enable toggle, never through the open refcount)
//! - `list` produces one line per registered unit: `<name>\t<0|1>`
//!
//! Malformed input is logged and otherwise ignored. The TCP server
//! handles connections sequentially; admin traffic is rare.

use crate::hub::SensorHub;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Enable or disable one unit by name.
    SetEnabled { name: String, on: bool },
    /// Produce the per-unit listing.
    List,
}

/// Parse one input line. Returns `None` for malformed input.
pub fn parse_command(line: &str) -> Option<AdminCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.eq_ignore_ascii_case("list") {
        return Some(AdminCommand::List);
    }
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let on = match parts.next()? {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(AdminCommand::SetEnabled {
        name: name.to_string(),
        on,
    })
}

/// Render the listing: one `<name>\t<0|1>` line per registered unit.
pub fn render_list(hub: &SensorHub) -> String {
    let mut out = String::new();
    for (name, enabled) in hub.list() {
        out.push_str(&name);
        out.push('\t');
        out.push(if enabled { '1' } else { '0' });
        out.push('\n');
    }
    out
}

/// Apply one command against the hub. Returns the reply to send, if any.
pub fn dispatch(hub: &SensorHub, cmd: AdminCommand) -> Option<String> {
    match cmd {
        AdminCommand::List => Some(render_list(hub)),
        AdminCommand::SetEnabled { name, on } => {
            match hub.write_enabled(&name, on) {
                Ok(()) => info!(unit = %name, enabled = on, "admin set enable"),
                Err(e) => warn!(unit = %name, error = %e, "admin set enable failed"),
            }
            None
        }
    }
}

/// Running admin server handle.
pub struct AdminServer {
    addr: SocketAddr,
    _join: JoinHandle<()>,
}

impl AdminServer {
    /// Bind `addr` and serve the admin protocol on a background thread.
    ///
    /// # Errors
    /// Returns the bind or spawn error.
    pub fn spawn(hub: Arc<SensorHub>, addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local = listener.local_addr()?;
        info!(addr = %local, "admin endpoint listening");
        let join = std::thread::Builder::new()
            .name("sensmux-admin".to_string())
            .spawn(move || accept_loop(&hub, &listener))?;
        Ok(Self {
            addr: local,
            _join: join,
        })
    }

    /// The actually bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

fn accept_loop(hub: &SensorHub, listener: &TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_connection(hub, stream) {
                    debug!(error = %e, "admin connection error");
                }
            }
            Err(e) => {
                warn!(error = %e, "admin accept failed");
                return;
            }
        }
    }
}

fn handle_connection(hub: &SensorHub, stream: TcpStream) -> std::io::Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        match parse_command(&line) {
            Some(cmd) => {
                if let Some(reply) = dispatch(hub, cmd) {
                    writer.write_all(reply.as_bytes())?;
                    writer.flush()?;
                }
            }
            None => warn!(input = %line, "malformed admin input"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_enabled() {
        assert_eq!(
            parse_command("accel 1"),
            Some(AdminCommand::SetEnabled {
                name: "accel".to_string(),
                on: true
            })
        );
        assert_eq!(
            parse_command("  gyro 0 "),
            Some(AdminCommand::SetEnabled {
                name: "gyro".to_string(),
                on: false
            })
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_command("list"), Some(AdminCommand::List));
        assert_eq!(parse_command("LIST"), Some(AdminCommand::List));
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("accel"), None);
        assert_eq!(parse_command("accel 2"), None);
        assert_eq!(parse_command("accel on"), None);
        assert_eq!(parse_command("accel 1 extra"), None);
    }
}
