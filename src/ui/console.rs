use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};

use crate::{domain::event::DispatchedEvent, usecases::contracts::EventHandler};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes one line per event:
/// `[time]-[Recalled]-[seq] name: content` for recalls, `[time]-[seq] name: content` otherwise.
pub struct ConsoleHandler<W> {
    out: W,
}

impl ConsoleHandler<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleHandler<W> {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> EventHandler for ConsoleHandler<W> {
    fn handle(&mut self, event: &DispatchedEvent) -> Result<()> {
        let line = format_event_line(event, &Local);
        writeln!(self.out, "{line}").context("failed to write event to console")?;
        self.out.flush().context("failed to flush console")
    }
}

pub fn format_event_line<Tz>(event: &DispatchedEvent, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let time = tz
        .timestamp_opt(event.create_time, 0)
        .single()
        .map(|at| at.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| event.create_time.to_string());

    if event.is_recalled() {
        format!(
            "[{time}]-[Recalled]-[{}] {}: {}",
            event.sequence_id.as_str(),
            event.source_name,
            event.content
        )
    } else {
        format!(
            "[{time}]-[{}] {}: {}",
            event.sequence_id.as_str(),
            event.source_name,
            event.content
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::event::RawEvent;

    #[test]
    fn formats_plain_message() {
        let event = DispatchedEvent::resolved(
            RawEvent::message("g1", "7001", 1_700_000_000, "hi"),
            "Team A".to_owned(),
        );

        assert_eq!(
            format_event_line(&event, &Utc),
            "[2023-11-14 22:13:20]-[7001] Team A: hi"
        );
    }

    #[test]
    fn formats_recall_notice_with_marker() {
        let event = DispatchedEvent::resolved(
            RawEvent::recall("g9", "7001", 1_700_000_000),
            "g9".to_owned(),
        );

        assert_eq!(
            format_event_line(&event, &Utc),
            "[2023-11-14 22:13:20]-[Recalled]-[7001] g9: "
        );
    }

    #[test]
    fn handler_writes_one_line_per_event() {
        let mut handler = ConsoleHandler::new(Vec::new());
        let event = DispatchedEvent::resolved(
            RawEvent::message("g1", "1", 0, "first"),
            "Team A".to_owned(),
        );

        handler.handle(&event).expect("write should succeed");
        handler.handle(&event).expect("write should succeed");

        let output = String::from_utf8(handler.out).expect("utf8 output");
        assert_eq!(output.lines().count(), 2);
        assert!(output.lines().all(|line| line.ends_with("Team A: first")));
    }
}
