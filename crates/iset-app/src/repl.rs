//! Line-oriented console over the conversation engine.
//!
//! Plain lines are sent as typed messages; lines starting with `:` are
//! commands. Results and notifications are printed by the event printer, so
//! most commands only report what they could not do locally.

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use iset_chat::{parse_share_link, SessionStore, SubmissionPipeline};
use iset_core::events::{ConversationEvent, NotificationLevel};
use iset_core::types::{Category, InputSource, SessionId};
use iset_review::CandidateReviewWorkflow;
use iset_voice::{StopTrigger, VoiceCaptureController};

pub const HELP: &str = "\
Type a message to send it. Commands:
  :sessions               list conversations
  :new                    start a new conversation
  :open <id|link>         open a conversation
  :delete <id>            delete a conversation
  :share                  print the link to the current conversation
  :shortcut <label>       send a shortcut (e.g. Horaires)
  :rate <n> up|down       rate answer number n
  :voice <words>          dictate a message
  :status                 self-learning status
  :review                 fetch candidates for review
  :toggle <n>             select or unselect candidate n
  :answer <n> <text>      edit candidate n's answer
  :category <n> <name>    recategorize candidate n
  :integrate              submit the reviewed candidates
  :help                   show this help
  :quit                   exit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    Sessions,
    New,
    Open(SessionId),
    Delete(SessionId),
    Share,
    Shortcut(String),
    Rate { sequence: u64, useful: bool },
    Voice(String),
    Status,
    Review,
    Toggle(usize),
    Answer(usize, String),
    Recategorize(usize, Category),
    Integrate,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "sessions" | "ls" => Ok(Command::Sessions),
            "new" => Ok(Command::New),
            "open" => session_arg(arg).map(Command::Open),
            "delete" | "rm" => session_arg(arg).map(Command::Delete),
            "share" => Ok(Command::Share),
            "shortcut" | "s" if !arg.is_empty() => Ok(Command::Shortcut(arg.to_string())),
            "rate" => {
                let (seq, verdict) = arg
                    .split_once(char::is_whitespace)
                    .ok_or("usage: :rate <n> up|down")?;
                let sequence = seq.parse().map_err(|_| format!("not a number: {seq}"))?;
                let useful = match verdict.trim() {
                    "up" | "+" | "yes" => true,
                    "down" | "-" | "no" => false,
                    other => return Err(format!("expected up or down, got {other}")),
                };
                Ok(Command::Rate { sequence, useful })
            }
            "voice" | "v" => Ok(Command::Voice(arg.to_string())),
            "status" => Ok(Command::Status),
            "review" => Ok(Command::Review),
            "toggle" => index_arg(arg).map(Command::Toggle),
            "answer" => {
                let (n, text) = arg
                    .split_once(char::is_whitespace)
                    .ok_or("usage: :answer <n> <text>")?;
                Ok(Command::Answer(index_arg(n)?, text.trim().to_string()))
            }
            "category" => {
                let (n, name) = arg
                    .split_once(char::is_whitespace)
                    .ok_or("usage: :category <n> <name>")?;
                Ok(Command::Recategorize(index_arg(n)?, name.trim().parse()?))
            }
            "integrate" => Ok(Command::Integrate),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            _ => Err(format!("unknown command :{name} (try :help)")),
        }
    }
}

fn session_arg(arg: &str) -> Result<SessionId, String> {
    arg.parse::<SessionId>()
        .ok()
        .or_else(|| parse_share_link(arg))
        .ok_or_else(|| format!("not a conversation id or link: {arg}"))
}

/// Candidates are numbered from 1 on screen.
fn index_arg(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("not a candidate number: {arg}")),
    }
}

// =============================================================================
// Console
// =============================================================================

pub struct Console {
    pub store: SessionStore,
    pub pipeline: SubmissionPipeline,
    pub voice: VoiceCaptureController,
    pub review: CandidateReviewWorkflow,
}

impl Console {
    /// Read commands from stdin until `:quit` or end of input.
    pub async fn run(mut self) -> std::io::Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(message) => println!("{message}"),
            }
        }
        tracing::info!("Console closed");
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        // Failures are already on the event bus as notifications.
        match command {
            Command::Send(text) => {
                tokio::spawn(self.pipeline.submit(text, InputSource::Typed));
            }
            Command::Shortcut(label) => {
                tokio::spawn(self.pipeline.submit_shortcut(&label));
            }
            Command::Sessions => {
                if let Ok(sessions) = self.store.list_sessions().await {
                    let active = self.store.active();
                    for s in sessions {
                        let marker = if Some(s.key) == active { '*' } else { ' ' };
                        let id = s.id.map(|id| id.to_string()).unwrap_or_else(|| "new".into());
                        println!("{marker} {id:>5}  {}  {}", s.created_at, s.preview);
                    }
                }
            }
            Command::New => {
                let _ = self.store.open_new_chat().await;
            }
            Command::Open(id) => {
                if let Ok(key) = self.store.select_by_id(id).await {
                    for turn in self.store.turns(key) {
                        print_turn(&turn);
                    }
                }
            }
            Command::Delete(id) => {
                let _ = self.store.delete_session(id).await;
            }
            Command::Share => println!("{}", self.store.share_link()),
            Command::Rate { sequence, useful } => match self.store.active() {
                Some(key) => {
                    let _ = self.store.rate(key, sequence, useful).await;
                }
                None => println!("Open a conversation first"),
            },
            Command::Voice(words) => {
                if self.voice.start().is_ok() {
                    self.voice.on_interim(words);
                    let voice = self.voice.clone();
                    tokio::spawn(async move { voice.stop(StopTrigger::User).await });
                }
            }
            Command::Status => {
                if let Ok(status) = self.review.status().await {
                    println!(
                        "well-rated questions: {}, knowledge base: {}",
                        status.well_rated_available,
                        status
                            .total_questions
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "?".into())
                    );
                }
            }
            Command::Review => {
                let config = self.review.config().clone();
                if let Ok(candidates) = self.review.fetch_candidates().await {
                    for (i, c) in candidates.iter().enumerate() {
                        println!(
                            "{:>2}. [{}] ({:?}, {}) {}\n    -> {}",
                            i + 1,
                            if c.selected { 'x' } else { ' ' },
                            c.confidence_band(&config),
                            c.category,
                            c.question,
                            c.answer
                        );
                    }
                }
            }
            Command::Toggle(i) => report(self.review.toggle_selection(i).map(|_| ())),
            Command::Answer(i, text) => report(self.review.edit_answer(i, text)),
            Command::Recategorize(i, category) => report(self.review.edit_category(i, category)),
            Command::Integrate => match self.review.integrate().await {
                Ok(result) => {
                    for item in &result.per_item {
                        println!("  {:?}: {}", item.status, item.question);
                    }
                }
                Err(err) => println!("{}", err.user_message()),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }
}

fn report(result: Result<(), iset_review::ReviewError>) {
    if let Err(err) = result {
        println!("{}", err.user_message());
    }
}

fn print_turn(turn: &iset_core::types::Turn) {
    println!("[{}] you: {}", turn.sequence, turn.user_text);
    if let Some(reply) = &turn.bot_reply {
        println!("    bot: {}", reply.answer_text);
    }
    if let Some(reason) = &turn.failure {
        println!("    failed: {reason}");
    }
}

// =============================================================================
// Event printer
// =============================================================================

/// Print turns and notifications as they happen.
pub async fn print_events(store: SessionStore, mut rx: broadcast::Receiver<ConversationEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        tracing::trace!(event = event.event_name(), "Event");

        match event {
            ConversationEvent::TurnConfirmed { session, sequence }
            | ConversationEvent::TurnFailed {
                session, sequence, ..
            } => {
                if let Some(turn) = store.turns(session).into_iter().find(|t| t.sequence == sequence)
                {
                    print_turn(&turn);
                    if let Some(reply) = &turn.bot_reply {
                        for s in &reply.suggestions {
                            println!("    > {}", s.label);
                        }
                    }
                }
            }
            ConversationEvent::SessionCommitted { id, .. } => {
                println!("(conversation {id})");
            }
            ConversationEvent::Notice(notice) => {
                let tag = match notice.level {
                    NotificationLevel::Info => "info",
                    NotificationLevel::Success => "ok",
                    NotificationLevel::Warning => "warn",
                    NotificationLevel::Error => "error",
                };
                println!("[{tag}] {}", notice.message);
            }
            _ => {}
        }
    }
}
