//! Terminal presenter
//!
//! Stands in for the rendering, audio and notification collaborators:
//! revealed text is streamed to stdout as it arrives, and expression
//! changes, cues and notices are printed inline in brackets.

use std::io::{self, Write};

use dialogue_core::{ConversationState, NotifyLevel, PresentationMessage, Role, SessionSettings};

/// Writes presentation messages to a terminal
pub struct Presenter<W: Write> {
    out: W,
    character: String,
    /// A character line is open and has not been terminated yet
    mid_line: bool,
}

impl Presenter<io::Stdout> {
    /// Presenter on stdout
    pub fn stdout(character: impl Into<String>) -> Self {
        Self::new(io::stdout(), character)
    }
}

impl<W: Write> Presenter<W> {
    /// Presenter on any writer
    pub fn new(out: W, character: impl Into<String>) -> Self {
        Self {
            out,
            character: character.into(),
            mid_line: false,
        }
    }

    /// Render one message
    pub fn present(&mut self, msg: &PresentationMessage, settings: &SessionSettings) -> io::Result<()> {
        match msg {
            PresentationMessage::TurnStarted {
                role: Role::Character,
                ..
            } => {
                self.end_line()?;
                write!(self.out, "{}: ", self.character)?;
                self.mid_line = true;
            }
            PresentationMessage::TurnStarted { .. } => {}
            PresentationMessage::Text { delta, .. } => {
                write!(self.out, "{delta}")?;
            }
            PresentationMessage::TurnFinished { .. } => {
                self.end_line()?;
            }
            PresentationMessage::Expression { id } => {
                write!(self.out, "<{id}>")?;
            }
            PresentationMessage::Cue { id } => {
                // A muted player still sees the cue, just without the volume tag
                if settings.volume > 0.0 {
                    write!(self.out, "<sfx:{id} @{:.0}%>", settings.volume * 100.0)?;
                } else {
                    write!(self.out, "<sfx:{id}>")?;
                }
            }
            PresentationMessage::State { state } => {
                if *state == ConversationState::MenuOpen {
                    self.end_line()?;
                    writeln!(self.out, "-- {} --", state.description())?;
                }
            }
            PresentationMessage::Notify {
                level,
                title,
                message,
            } => {
                self.end_line()?;
                let tag = match level {
                    NotifyLevel::Info => "info",
                    NotifyLevel::Warning => "warning",
                    NotifyLevel::Error => "error",
                };
                writeln!(self.out, "[{tag}] {title}: {message}")?;
            }
        }
        self.out.flush()
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogue_core::TurnId;
    use std::time::Duration;

    fn render(messages: &[PresentationMessage]) -> String {
        let settings = SessionSettings::new("Rue", Duration::from_millis(10), 0.5, "bg").unwrap();
        let mut presenter = Presenter::new(Vec::new(), "Niko");
        for msg in messages {
            presenter.present(msg, &settings).unwrap();
        }
        String::from_utf8(presenter.out).unwrap()
    }

    #[test]
    fn test_character_line() {
        let turn_id = TurnId::new();
        let out = render(&[
            PresentationMessage::TurnStarted {
                turn_id,
                role: Role::Character,
            },
            PresentationMessage::Text {
                turn_id,
                delta: "Hi ".into(),
            },
            PresentationMessage::Expression { id: "happy".into() },
            PresentationMessage::Text {
                turn_id,
                delta: "there".into(),
            },
            PresentationMessage::Cue { id: "chime".into() },
            PresentationMessage::TurnFinished {
                turn_id,
                text: "Hi there".into(),
                fallback: false,
            },
        ]);
        assert_eq!(out, "Niko: Hi <happy>there<sfx:chime @50%>\n");
    }

    #[test]
    fn test_notice_breaks_line() {
        let turn_id = TurnId::new();
        let out = render(&[
            PresentationMessage::TurnStarted {
                turn_id,
                role: Role::Character,
            },
            PresentationMessage::Notify {
                level: NotifyLevel::Warning,
                title: "History not saved".into(),
                message: "disk full".into(),
            },
        ]);
        assert_eq!(out, "Niko: \n[warning] History not saved: disk full\n");
    }
}
