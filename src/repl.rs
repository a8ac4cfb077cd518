//! Interactive terminal conversation (`documentor chat`).
//!
//! Reads one question per line from stdin and prints the answer to stdout.
//! Lines starting with `/` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/history` | print the conversation so far |
//! | `/reset` | clear the conversation, index, and uploaded files |
//! | `/quit` | exit |

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use documentor_core::models::Role;

use crate::session::{Session, GREETING};

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Question(&'a str),
    History,
    Reset,
    Quit,
    Unknown(&'a str),
    Empty,
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/reset" => Input::Reset,
        "/history" => Input::History,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        question => Input::Question(question),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Run the conversation loop until `/quit` or end of input.
pub async fn run<R>(session: &mut Session, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    println!("{}", GREETING);
    let mut lines = input.lines();
    prompt();

    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Reset => {
                session.reset().await?;
                println!("{}", GREETING);
            }
            Input::History => {
                for turn in session.history() {
                    let who = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    println!("{}: {}", who, turn.content);
                }
            }
            Input::Unknown(cmd) => {
                eprintln!("Unknown command: {} (try /history, /reset, /quit)", cmd);
            }
            Input::Question(question) => {
                let answer = session.respond(question).await;
                println!("{}\n", answer);
            }
        }
        prompt();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_questions() {
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/reset\n"), Input::Reset);
        assert_eq!(parse_input("/history"), Input::History);
        assert_eq!(parse_input("/nope"), Input::Unknown("/nope"));
        assert_eq!(
            parse_input(" What is opportunity cost? "),
            Input::Question("What is opportunity cost?")
        );
    }
}
