use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use lime_auth::{AuthFailure, SessionManager};
use lime_client::GeminiClient;
use lime_config::{AssistantSettings, LimeConfig};
use lime_conversation::{ConversationState, TurnOutcome};
use lime_core::{AssistantClient, KeyValueStore};
use lime_storage::FileStore;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lime-chat")]
#[command(about = "lime.ai terminal chat", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $LIME_HOME/config.yaml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and chat with the assistant (default)
    Chat,

    /// Generate an image and print it as a data URI
    Image {
        #[arg(short, long)]
        prompt: String,
    },
}

enum ChatExit {
    Logout,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = load_config(cli.config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(config).await?,
        Commands::Image { prompt } => generate_image(config, &prompt).await?,
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<LimeConfig> {
    let path = path.or_else(|| {
        let default = LimeConfig::default_config_path();
        default.exists().then_some(default)
    });

    match path {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            LimeConfig::from_yaml(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => {
            info!("Using default configuration");
            Ok(LimeConfig::default())
        }
    }
}

async fn run_chat(config: LimeConfig) -> Result<()> {
    let store_path = config.storage.store_path();
    info!("Using local store at {:?}", store_path);

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(store_path));
    let mut sessions = SessionManager::new(store);
    sessions.restore_session()?;

    let mut assistant: Option<Arc<dyn AssistantClient>> = None;

    println!("lime.ai");
    println!("═══════════════════════════════════════");

    loop {
        if !sessions.state().is_authenticated() && !authenticate(&mut sessions)? {
            break;
        }

        let client = assistant_for(&mut assistant, &config.assistant)?;
        let conversation = ConversationState::new(client, &config.chat.greeting);
        match chat_loop(&sessions, &conversation).await? {
            ChatExit::Logout => {
                sessions.logout()?;
                println!("Signed out.\n");
            }
            ChatExit::Quit => break,
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Builds the Gemini client on first use. It needs the API key, so the chat
/// loop only calls this once someone is signed in.
fn assistant_for(
    slot: &mut Option<Arc<dyn AssistantClient>>,
    settings: &AssistantSettings,
) -> Result<Arc<dyn AssistantClient>> {
    if let Some(client) = slot {
        return Ok(Arc::clone(client));
    }

    let client: Arc<dyn AssistantClient> = Arc::new(GeminiClient::new(settings)?);
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// Prompts until the user is signed in. `false` means they chose to quit.
fn authenticate(sessions: &mut SessionManager) -> Result<bool> {
    loop {
        let Some(choice) = prompt("[login / signup / quit]> ")? else {
            return Ok(false);
        };

        let signup = match choice.trim().to_ascii_lowercase().as_str() {
            "login" | "l" => false,
            "signup" | "s" => true,
            "quit" | "exit" | "q" => return Ok(false),
            "" => continue,
            other => {
                println!("Unknown choice '{other}'.");
                continue;
            }
        };

        let Some(username) = prompt("Username: ")? else {
            return Ok(false);
        };
        let Some(password) = prompt_password()? else {
            return Ok(false);
        };

        let (success, failure) = if signup {
            (sessions.signup(&username, &password)?, AuthFailure::UsernameTaken)
        } else {
            (sessions.login(&username, &password)?, AuthFailure::InvalidCredentials)
        };

        if success {
            println!("Welcome, {username}!\n");
            return Ok(true);
        }
        println!("{}", failure.message());
    }
}

async fn chat_loop(sessions: &SessionManager, conversation: &ConversationState) -> Result<ChatExit> {
    println!("Type '/logout' to sign out, 'exit' to quit.");
    if let Some(greeting) = conversation.messages().first() {
        println!("\nAssistant> {}\n", greeting.content);
    }

    loop {
        let Some(input) = prompt("You> ")? else {
            return Ok(ChatExit::Quit);
        };

        match input.trim() {
            "exit" | "quit" => return Ok(ChatExit::Quit),
            "/logout" => return Ok(ChatExit::Logout),
            "/whoami" => {
                println!("{}\n", sessions.current_user().unwrap_or("(not signed in)"));
                continue;
            }
            _ => {}
        }

        match conversation.submit_turn(&input).await {
            TurnOutcome::Answered | TurnOutcome::Fallback => {
                if let Some(reply) = conversation.messages().last() {
                    println!("\nAssistant> {}\n", reply.content);
                }
            }
            TurnOutcome::Busy => println!("Still waiting for the previous answer."),
            TurnOutcome::Ignored => {}
        }
    }
}

async fn generate_image(config: LimeConfig, image_prompt: &str) -> Result<()> {
    let client = GeminiClient::new(&config.assistant)?;
    match client.generate_image(image_prompt).await? {
        Some(data_uri) => println!("{data_uri}"),
        None => println!("No image was generated."),
    }
    Ok(())
}

/// Reads one line from stdin. `None` on end of input.
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Reads the password without echo on a terminal; piped input falls back to
/// a plain line read.
fn prompt_password() -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        return prompt("Password: ");
    }

    let password = Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()?;
    Ok(Some(password))
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lime_core::MockAssistantClient;

    #[test]
    fn test_existing_assistant_is_reused_without_api_key() {
        let existing: Arc<dyn AssistantClient> = Arc::new(MockAssistantClient::new());
        let mut slot = Some(Arc::clone(&existing));
        let client = assistant_for(&mut slot, &AssistantSettings::default()).unwrap();
        assert!(Arc::ptr_eq(&client, &existing));
    }

    #[test]
    fn test_assistant_built_once() {
        let mut slot = None;
        let settings = AssistantSettings {
            api_key: Some("test-key".to_string()),
            ..AssistantSettings::default()
        };

        let first = assistant_for(&mut slot, &settings).unwrap();
        let second = assistant_for(&mut slot, &settings).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
