//! Line-oriented command console over stdin.

/// One console command.
#[derive(Debug, PartialEq)]
pub enum ConsoleCommand {
    Play(String),
    Stop,
    Pause,
    Resume,
    Volume(u8),
    State,
    Status,
    Help,
    Quit,
}

pub const HELP: &str =
    "commands: play <path|file://url>, stop, pause, resume, vol <0-100>, state, status, help, quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => {
            if rest.is_empty() {
                return Err("play needs a path".to_string());
            }
            ConsoleCommand::Play(to_url(rest))
        }
        "stop" | "s" => ConsoleCommand::Stop,
        "pause" => ConsoleCommand::Pause,
        "resume" | "r" => ConsoleCommand::Resume,
        "vol" | "volume" => {
            let v = rest
                .parse::<u8>()
                .map_err(|_| format!("bad volume {rest:?}"))?;
            ConsoleCommand::Volume(v)
        }
        "state" => ConsoleCommand::State,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok(Some(cmd))
}

/// Bare paths become `file://` urls; urls pass through.
fn to_url(arg: &str) -> String {
    if arg.contains("://") {
        arg.to_string()
    } else {
        format!("file://{arg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_path_or_url() {
        assert_eq!(
            parse_line("play /music/a.flac").unwrap(),
            Some(ConsoleCommand::Play("file:///music/a.flac".to_string()))
        );
        assert_eq!(
            parse_line("  PLAY file:///music/b c.mp3 ").unwrap(),
            Some(ConsoleCommand::Play("file:///music/b c.mp3".to_string()))
        );
        assert!(parse_line("play").is_err());
    }

    #[test]
    fn parses_volume() {
        assert_eq!(parse_line("vol 40").unwrap(), Some(ConsoleCommand::Volume(40)));
        assert!(parse_line("vol loud").is_err());
        assert!(parse_line("vol 300").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("rewind").is_err());
        assert_eq!(parse_line("q").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_line("state").unwrap(), Some(ConsoleCommand::State));
    }
}
