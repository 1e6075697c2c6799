use std::fmt;
use std::sync::Arc;

use exam_core::{QuestionStatus, TimerTick};
use services::{ExamError, ExamSessionService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::warn;

/// Remaining-time marks announced on the console.
const TIME_WARNINGS: [u32; 3] = [300, 60, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Show,
    Answer { index: usize, option: usize },
    Clear { index: usize },
    Mark { index: usize },
    GoTo { index: usize },
    Next,
    Previous,
    Palette,
    Time,
    Status,
    Submit,
    Result,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    Unknown(String),
    MissingArgument { command: &'static str },
    InvalidNumber { raw: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unknown(raw) => write!(f, "unknown command: {raw} (try `help`)"),
            CommandError::MissingArgument { command } => {
                write!(f, "{command} needs a question number")
            }
            CommandError::InvalidNumber { raw } => write!(f, "not a valid number: {raw}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Question and option numbers are typed 1-based.
fn one_based(raw: Option<&str>, command: &'static str) -> Result<usize, CommandError> {
    let raw = raw.ok_or(CommandError::MissingArgument { command })?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(CommandError::InvalidNumber {
            raw: raw.to_owned(),
        }),
    }
}

impl Command {
    /// Parse one console line; blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let command = match head {
            "start" => Self::Start,
            "show" | "q" => Self::Show,
            "answer" | "a" => Self::Answer {
                index: one_based(words.next(), "answer")?,
                option: one_based(words.next(), "answer")?,
            },
            "clear" => Self::Clear {
                index: one_based(words.next(), "clear")?,
            },
            "mark" => Self::Mark {
                index: one_based(words.next(), "mark")?,
            },
            "goto" | "g" => Self::GoTo {
                index: one_based(words.next(), "goto")?,
            },
            "next" | "n" => Self::Next,
            "prev" | "p" => Self::Previous,
            "palette" => Self::Palette,
            "time" => Self::Time,
            "status" => Self::Status,
            "submit" => Self::Submit,
            "result" => Self::Result,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_owned())),
        };
        Ok(Some(command))
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start                 begin the attempt");
    println!("  show                  print the current question");
    println!("  answer <q> <option>   select an option (1-based)");
    println!("  clear <q>             clear a selection");
    println!("  mark <q>              toggle the review flag");
    println!("  goto <q> | next | prev");
    println!("  palette | time | status");
    println!("  submit | result | quit");
}

fn status_symbol(status: QuestionStatus) -> &'static str {
    match status {
        QuestionStatus::AnsweredMarked => "A+",
        QuestionStatus::Answered => "A",
        QuestionStatus::Marked => "M",
        QuestionStatus::NotAnswered => "-",
        QuestionStatus::NotVisited => ".",
    }
}

fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `time_taken` in results is reported in whole minutes.
fn format_minutes(minutes: u32) -> String {
    format!("{minutes} min")
}

/// Interactive loop over one loaded attempt, reading commands from stdin.
pub struct Console {
    sessions: Arc<ExamSessionService>,
}

impl Console {
    pub fn new(sessions: Arc<ExamSessionService>) -> Self {
        Self { sessions }
    }

    /// # Errors
    ///
    /// Returns an error only when stdin cannot be read.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let announcer = tokio::spawn(announce_time(self.sessions.subscribe_ticks()));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        print_help();

        while let Some(line) = lines.next_line().await? {
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    eprintln!("{err}");
                    continue;
                }
            };
            if command == Command::Quit {
                break;
            }
            if let Err(err) = self.execute(command).await {
                eprintln!("error: {err}");
            }
        }

        announcer.abort();
        self.sessions.close();
        Ok(())
    }

    async fn execute(&self, command: Command) -> Result<(), ExamError> {
        let sessions = &self.sessions;
        match command {
            Command::Start => {
                let started_at = sessions.start().await?;
                println!("started at {started_at}");
                self.show()?;
            }
            Command::Show => self.show()?,
            Command::Answer { index, option } => {
                sessions.select_answer(index, option).await?;
                println!("Q{} -> option {}", index + 1, option + 1);
            }
            Command::Clear { index } => {
                if sessions.clear_answer(index).await?.is_none() {
                    println!("Q{} had no answer", index + 1);
                }
            }
            Command::Mark { index } => {
                let marked = sessions.toggle_review(index).await?;
                let state = if marked { "marked" } else { "unmarked" };
                println!("Q{} {state} for review", index + 1);
            }
            Command::GoTo { index } => {
                sessions.go_to(index).await?;
                self.show()?;
            }
            Command::Next => {
                if sessions.next().await? {
                    self.show()?;
                } else {
                    println!("already at the last question");
                }
            }
            Command::Previous => {
                if sessions.previous().await? {
                    self.show()?;
                } else {
                    println!("already at the first question");
                }
            }
            Command::Palette => {
                for group in sessions.palette()? {
                    let cells: Vec<String> = group
                        .entries
                        .iter()
                        .map(|entry| {
                            let cursor = if entry.is_current { "*" } else { "" };
                            format!("{}{}{cursor}", entry.index + 1, status_symbol(entry.status))
                        })
                        .collect();
                    println!("{:<16} {}", group.subject, cells.join(" "));
                }
            }
            Command::Time => match sessions.remaining_seconds()? {
                Some(remaining) => println!("{} remaining", format_clock(remaining)),
                None => println!("timer not running"),
            },
            Command::Status => {
                let progress = sessions.progress()?;
                println!(
                    "{}: {} answered, {} marked, {} not answered, {} not visited (of {})",
                    sessions.status()?,
                    progress.answered,
                    progress.marked,
                    progress.not_answered,
                    progress.not_visited,
                    progress.total
                );
            }
            Command::Submit => {
                let result = sessions.submit().await?;
                println!(
                    "submitted: {}/{} correct ({:.1}%)",
                    result.correct_answers, result.total_questions, result.percentage
                );
            }
            Command::Result => {
                let result = sessions.fetch_result().await?;
                println!(
                    "score {:.1}, {}/{} correct ({:.1}%), {} unanswered, time taken {}",
                    result.score,
                    result.correct_answers,
                    result.total_questions,
                    result.percentage,
                    result.unanswered(),
                    format_minutes(result.time_taken)
                );
                for (subject, score) in &result.subject_wise_score {
                    println!(
                        "  {subject:<16} {}/{} ({:.1}%)",
                        score.correct,
                        score.total,
                        score.percentage()
                    );
                }
            }
            Command::Help => print_help(),
            Command::Quit => {}
        }
        Ok(())
    }

    fn show(&self) -> Result<(), ExamError> {
        let current = self.sessions.current()?;
        let status = self.sessions.status_of(current)?;
        self.sessions.with_session(|session| {
            let Some(question) = session.questions().get(current) else {
                return;
            };
            println!(
                "Q{}/{} [{}] ({})",
                current + 1,
                session.questions().len(),
                question.subject(),
                status
            );
            println!("{}", question.text());
            for (i, option) in question.options().iter().enumerate() {
                println!("  {}. {option}", i + 1);
            }
        })
    }
}

async fn announce_time(mut ticks: watch::Receiver<Option<TimerTick>>) {
    let mut announced: Option<u32> = None;
    while ticks.changed().await.is_ok() {
        let Some(tick) = *ticks.borrow_and_update() else {
            announced = None;
            continue;
        };
        let due = TIME_WARNINGS
            .iter()
            .copied()
            .find(|&mark| tick.remaining_seconds <= mark && announced.is_none_or(|last| mark < last));
        if let Some(mark) = due {
            announced = Some(mark);
            if mark == 0 {
                warn!("time is up, answers are being submitted");
            } else {
                println!("{} remaining", format_clock(tick.remaining_seconds));
            }
        }
    }
}
