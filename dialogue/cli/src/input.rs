//! Input dispatch
//!
//! Maps terminal lines onto engine verbs and options-menu edits.

use dialogue_core::{InputVerb, TextSpeed};

/// Help text printed for `/help`
pub const HELP: &str = "\
Type a message and press Enter to talk.
  /menu            open the options menu (pauses the reveal)
  /close           close the options menu
  /skip            reveal the current line at once
  /speed <name>    slow | normal | fast | instant   (menu only)
  /name <name>     what the character calls you     (menu only)
  /volume <0-1>    cue volume                       (menu only)
  /quit            leave";

/// One parsed terminal line
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Forward to the controller
    Verb(InputVerb),
    /// Change the text speed
    Speed(TextSpeed),
    /// Change the player name
    Name(String),
    /// Change the cue volume
    Volume(f32),
    /// Print help
    Help,
    /// Exit
    Quit,
}

impl Command {
    /// Whether this edits settings and so needs the menu open
    pub fn is_settings_edit(&self) -> bool {
        matches!(self, Self::Speed(_) | Self::Name(_) | Self::Volume(_))
    }
}

/// Parse a terminal line
///
/// Anything not starting with `/` is submitted as dialogue.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Verb(InputVerb::submit(line)));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "menu" => Ok(Command::Verb(InputVerb::OpenMenu)),
        "close" => Ok(Command::Verb(InputVerb::CloseMenu)),
        "skip" => Ok(Command::Verb(InputVerb::Skip)),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "speed" => TextSpeed::from_name(arg)
            .map(Command::Speed)
            .ok_or_else(|| format!("unknown speed '{arg}'")),
        "name" if !arg.is_empty() => Ok(Command::Name(arg.to_string())),
        "name" => Err("usage: /name <name>".to_string()),
        "volume" => arg
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Command::Volume(v.clamp(0.0, 1.0)))
            .ok_or_else(|| format!("invalid volume '{arg}'")),
        other => Err(format!("unknown command '/{other}', try /help")),
    }
}
