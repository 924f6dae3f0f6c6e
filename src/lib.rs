pub mod application;
mod cli;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    chat_impl, check_streak_impl, clear_user_impl, current_streak_impl, delete_flashcard_set_impl,
    generate_flashcards_impl, generate_plan_impl, list_flashcard_sets_impl, list_plans_impl,
    plan_statistics_impl, progress_impl, reconcile_plans_impl, remove_plan_impl, set_user_impl,
    show_user_impl, toggle_task_impl, AppState, FlashcardInput,
};
use clap::Parser;
use cli::{
    ChatArgs, Cli, Command, FlashcardSourceArgs, FlashcardsCommand, PlanCommand, SessionCommand,
};
use infrastructure::config::read_log_level;
use infrastructure::error::InfraError;
use infrastructure::logging;
use serde::Serialize;
use std::process::ExitCode;

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<String, String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;

    let level = read_log_level(state.config_dir()).map_err(|error| error.to_string())?;
    let _logging = logging::init(state.logs_dir(), &level).map_err(|error| error.to_string())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())?;
    runtime.block_on(dispatch(&state, cli.command))
}

async fn dispatch(state: &AppState, command: Command) -> Result<String, String> {
    match command {
        Command::Streak(args) if args.peek => respond(state, "current_streak", current_streak_impl(state)),
        Command::Streak(_) => respond(state, "check_streak", check_streak_impl(state).await),
        Command::Session(command) => match command {
            SessionCommand::Set(args) => respond(state, "set_user", set_user_impl(state, args.user_id).await),
            SessionCommand::Clear => respond(state, "clear_user", clear_user_impl(state)),
            SessionCommand::Show => respond(state, "show_user", show_user_impl(state)),
        },
        Command::Plan(command) => match command {
            PlanCommand::Generate(args) => respond(
                state,
                "generate_plan",
                generate_plan_impl(state, args.prompt.join(" ")).await,
            ),
            PlanCommand::List => respond(state, "list_plans", list_plans_impl(state).await),
            PlanCommand::Toggle(args) => respond(
                state,
                "toggle_task",
                toggle_task_impl(state, args.date, args.subject).await,
            ),
            PlanCommand::Remove(args) => {
                respond(state, "remove_plan", remove_plan_impl(state, args.date).await)
            }
            PlanCommand::Reconcile => respond(state, "reconcile_plans", reconcile_plans_impl(state).await),
            PlanCommand::Stats => respond(state, "plan_statistics", plan_statistics_impl(state).await),
        },
        Command::Flashcards(command) => match command {
            FlashcardsCommand::Generate(args) => respond(
                state,
                "generate_flashcards",
                generate_flashcards_impl(state, flashcard_input(args.source), args.title).await,
            ),
            FlashcardsCommand::List => {
                respond(state, "list_flashcard_sets", list_flashcard_sets_impl(state).await)
            }
            FlashcardsCommand::Delete(args) => respond(
                state,
                "delete_flashcard_set",
                delete_flashcard_set_impl(state, args.set_id).await,
            ),
        },
        Command::Progress(args) => respond(
            state,
            "progress",
            progress_impl(state, args.interval.as_str().to_string()).await,
        ),
        Command::Chat(ChatArgs {
            message,
            conversation_id,
        }) => respond(state, "chat", chat_impl(state, message.join(" "), conversation_id).await),
    }
}

fn respond<T: Serialize>(state: &AppState, command: &str, result: Result<T, InfraError>) -> Result<String, String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    serde_json::to_string_pretty(&value).map_err(|error| state.command_error(command, &InfraError::from(error)))
}

fn flashcard_input(source: FlashcardSourceArgs) -> FlashcardInput {
    match (source.file, source.topic) {
        (Some(path), _) => FlashcardInput::File(path),
        (None, Some(topic)) => FlashcardInput::Topic(topic),
        (None, None) => FlashcardInput::Text(source.text.unwrap_or_default()),
    }
}
