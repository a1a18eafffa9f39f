//! Line-oriented console presentation
//!
//! Prints new messages for the current room as session events arrive and
//! turns stdin lines into sends or room commands. Reads room state only
//! through [`ChatSession`].

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::session::{ChatSession, SessionEvent, SessionState};

/// One parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rooms,
    Join(String),
    Next,
    Prev,
    Quit,
    Help,
    /// Send to the current room
    Say(String),
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Say(line.to_string());
        }

        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        match (name, arg) {
            ("/rooms", _) => Command::Rooms,
            ("/join", room) if !room.is_empty() => Command::Join(room.to_string()),
            ("/next", _) => Command::Next,
            ("/prev", _) => Command::Prev,
            ("/quit", _) | ("/q", _) => Command::Quit,
            ("/help", _) => Command::Help,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

const HELP: &str = "\
/rooms          list rooms
/join <room>    switch to a room (public or a username)
/next, /prev    cycle through rooms
/quit           leave
anything else is sent to the current room";

/// Tracks what has already been printed so refreshes only show new lines
#[derive(Debug, Default)]
pub struct Renderer {
    room: Option<String>,
    shown: usize,
}

impl Renderer {
    /// Print the current room's unseen messages; a room switch reprints the
    /// room from the start
    pub fn render(&mut self, state: &SessionState, out: &mut impl Write) -> std::io::Result<()> {
        let room = state.current_room();
        if self.room.as_deref() != Some(room.name()) {
            writeln!(out, "== {} ==", room.name())?;
            self.room = Some(room.name().to_string());
            self.shown = 0;
        }

        for message in room.messages().iter().skip(self.shown) {
            writeln!(out, "<{}> {}", message.username, message.content)?;
        }
        self.shown = room.messages().len();
        out.flush()
    }
}

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "ROOM")]
    name: String,
    #[tabled(rename = "MESSAGES")]
    messages: usize,
}

/// Room list with the current room marked
pub fn format_rooms(state: &SessionState) -> String {
    let current = state.current_room().name();
    let rows = state.rooms().iter().map(|room| RoomRow {
        marker: if room.name() == current { "*" } else { "" },
        name: room.name().to_string(),
        messages: room.messages().len(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Run until the user quits, stdin closes or the connection drops
pub async fn run(session: Arc<ChatSession>, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::default();
    let mut stdout = std::io::stdout();

    println!("[system] type /help for commands");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Refresh) => {
                    renderer.render(&*session.state().await, &mut stdout)?;
                }
                Some(SessionEvent::ErrorNotice) => {
                    println!("[system] the server rejected the last request");
                }
                Some(SessionEvent::StateChanged(state)) => {
                    println!("[system] {}", state);
                }
                Some(SessionEvent::Disconnected) | None => {
                    println!("[system] connection closed");
                    break;
                }
            },

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Quit => break,
                    Command::Help => println!("{}", HELP),
                    Command::Rooms => println!("{}", format_rooms(&*session.state().await)),
                    Command::Join(room) => {
                        if !session.select_room(&room).await {
                            println!("[system] no room named {}", room);
                        }
                    }
                    Command::Next => {
                        session.select_next_room().await;
                    }
                    Command::Prev => {
                        session.select_previous_room().await;
                    }
                    Command::Say(text) => {
                        let room = session.state().await.current_room().name().to_string();
                        if let Err(e) = session.send_message(&room, &text).await {
                            println!("[system] message not sent: {}", e);
                        }
                    }
                    Command::Unknown(input) => {
                        println!("[system] unknown command {} (try /help)", input);
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_protocol::Packet;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("hello there"), Command::Say("hello there".into()));
        assert_eq!(Command::parse("/rooms"), Command::Rooms);
        assert_eq!(Command::parse("/join  bob "), Command::Join("bob".into()));
        assert_eq!(Command::parse("/join"), Command::Unknown("/join".into()));
        assert_eq!(Command::parse("/next"), Command::Next);
        assert_eq!(Command::parse("/prev"), Command::Prev);
        assert_eq!(Command::parse("/q"), Command::Quit);
        assert_eq!(Command::parse("/dance"), Command::Unknown("/dance".into()));
    }

    #[test]
    fn test_renderer_prints_only_new_messages() {
        let mut state = SessionState::new("me");
        state.apply(Packet::UserListInit {
            users: vec!["bob".to_string()],
        });
        state.apply(Packet::public("bob", "one"));

        let mut renderer = Renderer::default();
        let mut out = Vec::new();
        renderer.render(&state, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "== public ==\n<bob> one\n");

        state.apply(Packet::public("bob", "two"));
        let mut out = Vec::new();
        renderer.render(&state, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<bob> two\n");
    }

    #[test]
    fn test_renderer_reprints_on_room_switch() {
        let mut state = SessionState::new("me");
        state.apply(Packet::direct("bob", "me", "psst"));

        let mut renderer = Renderer::default();
        renderer.render(&state, &mut Vec::new()).unwrap();

        state.select_room("bob");
        let mut out = Vec::new();
        renderer.render(&state, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "== bob ==\n<bob> psst\n");
    }

    #[test]
    fn test_format_rooms_marks_current() {
        let mut state = SessionState::new("me");
        state.apply(Packet::UserListInit {
            users: vec!["bob".to_string()],
        });
        state.select_room("bob");

        let table = format_rooms(&state);
        assert!(table.contains("ROOM"));
        let bob_line = table.lines().find(|line| line.contains("bob")).unwrap();
        assert!(bob_line.contains('*'));
        let public_line = table.lines().find(|line| line.contains("public")).unwrap();
        assert!(!public_line.contains('*'));
    }
}
