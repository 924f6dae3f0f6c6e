use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "studyaid",
    version,
    about = "Study streaks, plans, flashcards and progress"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "STUDYAID_WORKSPACE",
        help = "Workspace holding config/, state/ and logs/ (defaults to the current directory)"
    )]
    pub workspace: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record today's launch and print the streak.
    Streak(StreakArgs),
    #[command(subcommand)]
    Session(SessionCommand),
    #[command(subcommand)]
    Plan(PlanCommand),
    #[command(subcommand)]
    Flashcards(FlashcardsCommand),
    Progress(ProgressArgs),
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct StreakArgs {
    #[arg(long, help = "Print the stored streak without recording a launch")]
    pub peek: bool,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    Set(SessionSet),
    Clear,
    Show,
}

#[derive(Args, Debug)]
pub struct SessionSet {
    pub user_id: String,
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    Generate(PlanGenerate),
    List,
    Toggle(PlanToggle),
    Remove(PlanRemove),
    Reconcile,
    Stats,
}

#[derive(Args, Debug)]
pub struct PlanGenerate {
    #[arg(value_name = "PROMPT", num_args = 1.., help = "Free-form description of what to study")]
    pub prompt: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PlanToggle {
    #[arg(value_name = "YYYY-MM-DD")]
    pub date: String,
    pub subject: String,
}

#[derive(Args, Debug)]
pub struct PlanRemove {
    #[arg(value_name = "YYYY-MM-DD")]
    pub date: String,
}

#[derive(Subcommand, Debug)]
pub enum FlashcardsCommand {
    Generate(FlashcardsGenerate),
    List,
    Delete(FlashcardsDelete),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false, id = "source")]
pub struct FlashcardSourceArgs {
    #[arg(long, value_name = "PATH", help = "Document to upload")]
    pub file: Option<PathBuf>,
    #[arg(long, help = "Topic to generate cards about")]
    pub topic: Option<String>,
    #[arg(long, help = "Notes to turn into cards")]
    pub text: Option<String>,
}

#[derive(Args, Debug)]
pub struct FlashcardsGenerate {
    #[command(flatten)]
    pub source: FlashcardSourceArgs,
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug)]
pub struct FlashcardsDelete {
    pub set_id: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalArg {
    Week,
    Month,
    Year,
}

impl IntervalArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

#[derive(Args, Debug)]
pub struct ProgressArgs {
    #[arg(long, value_enum, default_value_t = IntervalArg::Week)]
    pub interval: IntervalArg,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(value_name = "MESSAGE", num_args = 1..)]
    pub message: Vec<String>,
    #[arg(long, value_name = "ID", help = "Continue an earlier conversation")]
    pub conversation_id: Option<String>,
}
