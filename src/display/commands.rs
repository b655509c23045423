//! Operator commands as text lines.
//!
//! Stands in for the GUI buttons: one command per line on stdin.
//!
//! ```text
//! clear            reopen the work-order latch
//! good | bad       label the current archive
//! threshold <x>    set the warn threshold
//! exit | quit      shut down
//! ```

use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::OperatorCommand;

/// Parse one input line. Blank lines and unknown words yield `None`.
pub fn parse_command(line: &str) -> Option<OperatorCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "clear" => Some(OperatorCommand::ClearAlert),
        "good" => Some(OperatorCommand::MarkGood),
        "bad" => Some(OperatorCommand::MarkBad),
        "threshold" => Some(OperatorCommand::SetThreshold(rest.to_string())),
        "exit" | "quit" => Some(OperatorCommand::Exit),
        _ => None,
    }
}

/// Forward commands read from `reader` until EOF, `exit`, or the receiver
/// is gone. Blocking; run it on a plain thread.
pub fn forward_commands<R: BufRead>(reader: R, tx: &mpsc::Sender<OperatorCommand>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Command input failed");
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let Some(cmd) = parse_command(&line) else {
            warn!(input = %line.trim(), "Unknown command");
            continue;
        };
        let exit = cmd == OperatorCommand::Exit;
        if tx.blocking_send(cmd).is_err() || exit {
            return;
        }
    }
    debug!("Command input closed");
}

/// Read operator commands from stdin.
///
/// Uses a detached OS thread rather than a runtime task: a blocking stdin
/// read would otherwise hold up runtime shutdown.
pub fn spawn_stdin_commands(
    tx: mpsc::Sender<OperatorCommand>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || forward_commands(std::io::stdin().lock(), &tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(parse_command("clear"), Some(OperatorCommand::ClearAlert));
        assert_eq!(parse_command("  GOOD "), Some(OperatorCommand::MarkGood));
        assert_eq!(parse_command("bad"), Some(OperatorCommand::MarkBad));
        assert_eq!(parse_command("quit"), Some(OperatorCommand::Exit));
        assert_eq!(parse_command("exit"), Some(OperatorCommand::Exit));
    }

    #[test]
    fn test_parse_threshold_keeps_raw_argument() {
        assert_eq!(
            parse_command("threshold  30.5 "),
            Some(OperatorCommand::SetThreshold("30.5".to_string()))
        );
        assert_eq!(
            parse_command("threshold abc"),
            Some(OperatorCommand::SetThreshold("abc".to_string()))
        );
        assert_eq!(
            parse_command("threshold"),
            Some(OperatorCommand::SetThreshold(String::new()))
        );
    }

    #[test]
    fn test_parse_unknown_and_blank() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("reboot"), None);
    }

    #[test]
    fn test_forward_commands_in_order() {
        let input: &[u8] = b"clear\n\nnonsense\nthreshold 30\ngood\n";
        let (tx, mut rx) = mpsc::channel(8);

        forward_commands(input, &tx);
        drop(tx);

        assert_eq!(rx.blocking_recv(), Some(OperatorCommand::ClearAlert));
        assert_eq!(rx.blocking_recv(), Some(OperatorCommand::SetThreshold("30".to_string())));
        assert_eq!(rx.blocking_recv(), Some(OperatorCommand::MarkGood));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn test_forward_stops_after_exit() {
        let input: &[u8] = b"exit\nclear\n";
        let (tx, mut rx) = mpsc::channel(8);

        forward_commands(input, &tx);
        drop(tx);

        assert_eq!(rx.blocking_recv(), Some(OperatorCommand::Exit));
        assert_eq!(rx.blocking_recv(), None);
    }
}
