//! Line commands driving a running [`App`] from a terminal.
//!
//! A line is either a hash (`#/students`) or a word command. Parsing and
//! execution are separate so the binary stays a thin stdin loop.

#[cfg(test)]
#[path = "console_test.rs"]
mod console_test;

use std::str::FromStr;

use crate::app::App;
use crate::events::RecordId;

pub const HELP: &str = "\
commands:
  #/<path>        navigate (e.g. #/students)
  exams           fetch and show all exams
  students        fetch and show all students
  exam <id>       fetch one exam's results
  student <id>    fetch one student
  select <row>    pick a row of the current table (0-based)
  render          print the page
  help            show this text
  quit            exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Navigate(String),
    Exams,
    Students,
    Exam(RecordId),
    Student(RecordId),
    Select(usize),
    Render,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}; try `help`")]
    Unknown(String),

    #[error("`{command}` expects {expected}")]
    BadArgument { command: &'static str, expected: &'static str },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.starts_with('#') {
            return Ok(Self::Navigate(line.to_owned()));
        }

        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(CommandError::Empty);
        };
        let arg = words.next();

        match word {
            "exams" => Ok(Self::Exams),
            "students" => Ok(Self::Students),
            "exam" => parse_arg("exam", "a numeric id", arg).map(Self::Exam),
            "student" => parse_arg("student", "a numeric id", arg).map(Self::Student),
            "select" => parse_arg("select", "a row number", arg).map(Self::Select),
            "render" => Ok(Self::Render),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_owned())),
        }
    }
}

fn parse_arg<T: FromStr>(command: &'static str, expected: &'static str, arg: Option<&str>) -> Result<T, CommandError> {
    match arg.map(str::parse::<T>) {
        Some(Ok(value)) => Ok(value),
        Some(Err(_)) | None => Err(CommandError::BadArgument { command, expected }),
    }
}

/// What the terminal should do after a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Silent,
    Print(String),
    Quit,
}

/// Apply `command` to `app`. Data commands only start a fetch; results show
/// up on the next `render`.
pub fn execute(app: &App, command: Command) -> Reply {
    match command {
        Command::Navigate(hash) => {
            app.context().navigation.set_hash(&hash);
            Reply::Silent
        }
        Command::Exams => {
            app.broker().get_exams();
            Reply::Silent
        }
        Command::Students => {
            app.broker().get_students();
            Reply::Silent
        }
        Command::Exam(id) => {
            app.broker().get_exam_results_by_id(id);
            Reply::Silent
        }
        Command::Student(id) => {
            app.broker().get_student_by_id(id);
            Reply::Silent
        }
        Command::Select(row) => {
            if app.shell().select(row) {
                Reply::Silent
            } else {
                Reply::Print(format!("no row {row} in the current view"))
            }
        }
        Command::Render => Reply::Print(app.render()),
        Command::Help => Reply::Print(HELP.to_owned()),
        Command::Quit => Reply::Quit,
    }
}
