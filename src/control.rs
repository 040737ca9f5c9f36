use crate::control_log;
use crate::events::ClockEvent;
use crate::settings::Rgb;
use crate::timer::COUNTDOWN_MINUTES_RANGE;
use crate::ui::surface::FONT_SIZE_RANGE;
use log::Level::{Debug, Info, Warn};
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use winit::event_loop::EventLoopProxy;

pub const DEFAULT_CONTROL_ADDRESS: &str = "127.0.0.1:7878";
pub const CONTROL_ADDRESS_ENV: &str = "DESKTOP_CLOCK_CONTROL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownAction {
    Start(Option<u32>),
    Pause,
    Toggle,
    Reset(Option<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopwatchAction {
    Start,
    Pause,
    Toggle,
    Reset,
}

/// Commands accepted from the tray, the settings dialog or any other
/// control client. Numeric arguments are already clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockCommand {
    SetFontFamily(String),
    SetFontSize(u32),
    SetOpacity(u8),
    SetColor(Rgb),
    SetTheme(String),
    ShowDate(bool),
    ShowWeek(bool),
    ShowSeconds(bool),
    FixedPosition(bool),
    StayOnTop(bool),
    SetCountdownMinutes(u32),
    Countdown(CountdownAction),
    Stopwatch(StopwatchAction),
    ToggleVisibility,
    Show,
    Hide,
    /// Hides the clock; the process keeps running.
    Close,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument for {command}: {value}")]
    InvalidArgument { command: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to bind control listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Control connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn split_word(text: &str) -> (&str, Option<&str>) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, Some(rest.trim()).filter(|r| !r.is_empty())),
        None => (text, None),
    }
}

fn required<'a>(command: &'static str, arg: Option<&'a str>) -> Result<&'a str, CommandError> {
    arg.ok_or(CommandError::MissingArgument(command))
}

fn invalid(command: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        command,
        value: value.to_string(),
    }
}

fn switch(command: &'static str, arg: Option<&str>) -> Result<bool, CommandError> {
    let value = required(command, arg)?;
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(command, value)),
    }
}

fn clamped(
    command: &'static str,
    value: &str,
    range: RangeInclusive<u32>,
) -> Result<u32, CommandError> {
    let number: i64 = value.parse().map_err(|_| invalid(command, value))?;
    Ok(number.clamp(i64::from(*range.start()), i64::from(*range.end())) as u32)
}

fn optional_minutes(command: &'static str, arg: Option<&str>) -> Result<Option<u32>, CommandError> {
    arg.map(|value| clamped(command, value, COUNTDOWN_MINUTES_RANGE))
        .transpose()
}

fn countdown_action(arg: Option<&str>) -> Result<CountdownAction, CommandError> {
    let (action, rest) = split_word(required("countdown", arg)?);
    match action.to_ascii_lowercase().as_str() {
        "start" => Ok(CountdownAction::Start(optional_minutes("countdown", rest)?)),
        "pause" => Ok(CountdownAction::Pause),
        "toggle" => Ok(CountdownAction::Toggle),
        "reset" => Ok(CountdownAction::Reset(optional_minutes("countdown", rest)?)),
        _ => Err(invalid("countdown", action)),
    }
}

fn stopwatch_action(arg: Option<&str>) -> Result<StopwatchAction, CommandError> {
    let action = required("stopwatch", arg)?;
    match action.to_ascii_lowercase().as_str() {
        "start" => Ok(StopwatchAction::Start),
        "pause" => Ok(StopwatchAction::Pause),
        "toggle" => Ok(StopwatchAction::Toggle),
        "reset" => Ok(StopwatchAction::Reset),
        _ => Err(invalid("stopwatch", action)),
    }
}

impl FromStr for ClockCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (word, arg) = split_word(line);
        if word.is_empty() {
            return Err(CommandError::Empty);
        }
        let command = match word.to_ascii_lowercase().as_str() {
            "font" => ClockCommand::SetFontFamily(required("font", arg)?.to_string()),
            "size" => ClockCommand::SetFontSize(clamped("size", required("size", arg)?, FONT_SIZE_RANGE)?),
            "opacity" => {
                ClockCommand::SetOpacity(clamped("opacity", required("opacity", arg)?, 0..=255)? as u8)
            }
            "color" => {
                let value = required("color", arg)?;
                ClockCommand::SetColor(Rgb::parse_hex(value).ok_or_else(|| invalid("color", value))?)
            }
            "theme" => ClockCommand::SetTheme(required("theme", arg)?.to_string()),
            "show_date" => ClockCommand::ShowDate(switch("show_date", arg)?),
            "show_week" => ClockCommand::ShowWeek(switch("show_week", arg)?),
            "show_seconds" => ClockCommand::ShowSeconds(switch("show_seconds", arg)?),
            "fixed" => ClockCommand::FixedPosition(switch("fixed", arg)?),
            "on_top" => ClockCommand::StayOnTop(switch("on_top", arg)?),
            "countdown_minutes" => ClockCommand::SetCountdownMinutes(clamped(
                "countdown_minutes",
                required("countdown_minutes", arg)?,
                COUNTDOWN_MINUTES_RANGE,
            )?),
            "countdown" => ClockCommand::Countdown(countdown_action(arg)?),
            "stopwatch" => ClockCommand::Stopwatch(stopwatch_action(arg)?),
            "toggle_visibility" => ClockCommand::ToggleVisibility,
            "show" => ClockCommand::Show,
            "hide" => ClockCommand::Hide,
            "close" => ClockCommand::Close,
            "quit" => ClockCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

pub fn control_address() -> String {
    std::env::var(CONTROL_ADDRESS_ENV).unwrap_or_else(|_| DEFAULT_CONTROL_ADDRESS.to_string())
}

/// Accepts control clients until the runtime shuts down.
pub async fn run_listener(
    addr: String,
    proxy: EventLoopProxy<ClockCommand>,
    events: broadcast::Sender<ClockEvent>,
) -> Result<(), ControlError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ControlError::Bind {
            addr: addr.clone(),
            source,
        })?;
    control_log!(Info, "Control listener on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        control_log!(Debug, "Control client connected: {}", peer);
        let proxy = proxy.clone();
        let events = events.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, proxy, events).await {
                control_log!(Warn, "Control client {} dropped: {}", peer, e);
            }
            control_log!(Debug, "Control client disconnected: {}", peer);
        });
    }
}

async fn serve_client(
    stream: TcpStream,
    proxy: EventLoopProxy<ClockCommand>,
    mut events: broadcast::Receiver<ClockEvent>,
) -> Result<(), ControlError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match line.parse::<ClockCommand>() {
                    Ok(command) => {
                        control_log!(Debug, "Command: {:?}", command);
                        match proxy.send_event(command) {
                            Ok(()) => "OK".to_string(),
                            Err(_) => "ERR clock is shutting down".to_string(),
                        }
                    }
                    Err(e) => {
                        control_log!(Warn, "Rejected command '{}': {}", line.trim(), e);
                        format!("ERR {e}")
                    }
                };
                writer.write_all(format!("{reply}\n").as_bytes()).await?;
            }
            event = events.recv() => match event {
                Ok(event) => writer.write_all(format!("{event}\n").as_bytes()).await?,
                Err(RecvError::Lagged(missed)) => {
                    control_log!(Warn, "Control client fell behind by {} events", missed);
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ClockCommand, CommandError> {
        line.parse()
    }

    #[test]
    fn test_appearance_commands() {
        assert_eq!(parse("font Noto Sans CJK SC"), Ok(ClockCommand::SetFontFamily("Noto Sans CJK SC".into())));
        assert_eq!(parse("theme  Ocean Blue "), Ok(ClockCommand::SetTheme("Ocean Blue".into())));
        assert_eq!(parse("color #FF8000"), Ok(ClockCommand::SetColor(Rgb::new(255, 128, 0))));
        assert_eq!(parse("SHOW_DATE off"), Ok(ClockCommand::ShowDate(false)));
        assert_eq!(parse("on_top yes"), Ok(ClockCommand::StayOnTop(true)));
    }

    #[test]
    fn test_numeric_arguments_are_clamped() {
        assert_eq!(parse("size 5"), Ok(ClockCommand::SetFontSize(20)));
        assert_eq!(parse("size 900"), Ok(ClockCommand::SetFontSize(250)));
        assert_eq!(parse("opacity -3"), Ok(ClockCommand::SetOpacity(0)));
        assert_eq!(parse("opacity 300"), Ok(ClockCommand::SetOpacity(255)));
        assert_eq!(parse("countdown_minutes 0"), Ok(ClockCommand::SetCountdownMinutes(1)));
        assert_eq!(parse("countdown_minutes 5000"), Ok(ClockCommand::SetCountdownMinutes(999)));
    }

    #[test]
    fn test_timer_commands() {
        assert_eq!(parse("countdown start"), Ok(ClockCommand::Countdown(CountdownAction::Start(None))));
        assert_eq!(parse("countdown start 10"), Ok(ClockCommand::Countdown(CountdownAction::Start(Some(10)))));
        assert_eq!(parse("countdown reset 1200"), Ok(ClockCommand::Countdown(CountdownAction::Reset(Some(999)))));
        assert_eq!(parse("countdown toggle"), Ok(ClockCommand::Countdown(CountdownAction::Toggle)));
        assert_eq!(parse("stopwatch reset"), Ok(ClockCommand::Stopwatch(StopwatchAction::Reset)));
        assert_eq!(parse("quit"), Ok(ClockCommand::Quit));
        assert_eq!(parse("close"), Ok(ClockCommand::Close));
    }

    #[test]
    fn test_bad_commands_are_rejected() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert_eq!(parse("explode"), Err(CommandError::Unknown("explode".into())));
        assert_eq!(parse("size"), Err(CommandError::MissingArgument("size")));
        assert!(matches!(parse("size big"), Err(CommandError::InvalidArgument { command: "size", .. })));
        assert!(matches!(parse("color red"), Err(CommandError::InvalidArgument { command: "color", .. })));
        assert!(matches!(parse("show_week maybe"), Err(CommandError::InvalidArgument { .. })));
        assert!(matches!(parse("countdown launch"), Err(CommandError::InvalidArgument { .. })));
        assert_eq!(parse("stopwatch"), Err(CommandError::MissingArgument("stopwatch")));
    }
}
