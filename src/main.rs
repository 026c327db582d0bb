//! Chat Client
//!
//! A line-oriented terminal front end over [`ChatClient`]. Each line is one
//! command; notifications are printed after every command.

use chat_client::chat::Alignment;
use chat_client::validation::{GroupForm, SignInForm, SignUpForm};
use chat_client::{ChatClient, Config, NotificationLevel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str = "\
Commands:
  login <email> <password>
  signup <name> <email> <password> <confirm>
  logout
  chats
  open <conversation-id>
  search <term>
  chat-with <user-id>
  group <user-id,user-id,...> <name>
  rename <name>
  add <user-id>
  remove <user-id>
  feed
  say <text>
  typing on|off
  status
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    let client = ChatClient::from_config(&config);

    // A session that cannot be read leaves the client anonymous
    if let Ok(Some(_)) = client.restore_session().await {
        enter(&client).await;
    }
    print_notifications(&client).await;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                None
            }
        };
        let Some(line) = line else { break };

        if !run_command(&client, line.trim()).await {
            break;
        }
        print_notifications(&client).await;
    }

    client.leave_authenticated_area().await;
    info!("Client shutdown complete");
    Ok(())
}

/// Open the channel and load the chat list after a session appears
async fn enter(client: &ChatClient) {
    if client.enter_authenticated_area().await.is_ok() {
        let _ = client.load_conversations().await;
    }
}

/// Run one command line; returns false when the user quits
async fn run_command(client: &ChatClient, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    // Failures are already pushed as notifications, so results are dropped here
    match (command, args.as_slice()) {
        ("", _) => {}
        ("quit" | "exit", _) => return false,
        ("help", _) => println!("{}", HELP),
        ("login", [email, password]) => {
            let form = SignInForm {
                email: email.to_string(),
                password: password.to_string(),
            };
            if client.sign_in(&form).await.is_ok() {
                enter(client).await;
            }
        }
        ("signup", [name, email, password, confirm]) => {
            let form = SignUpForm {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                confirm_password: confirm.to_string(),
            };
            let _ = client.sign_up(&form).await;
        }
        ("logout", _) => {
            let _ = client.sign_out().await;
        }
        ("chats", _) => print_chats(client).await,
        ("open", [id]) => {
            let _ = client.select_conversation(id).await;
            print_feed(client).await;
        }
        ("search", _) if !rest.trim().is_empty() => {
            if let Ok(users) = client.search_users(rest).await {
                for user in users {
                    println!("  {}  {} <{}>", user.id, user.name, user.email);
                }
            }
        }
        ("chat-with", [user_id]) => {
            let _ = client.access_chat(user_id).await;
            print_feed(client).await;
        }
        ("group", [members, ..]) if args.len() > 1 => {
            let form = GroupForm {
                name: args[1..].join(" "),
                member_ids: members.split(',').map(str::to_string).collect(),
            };
            let _ = client.create_group(&form).await;
        }
        ("rename", _) if !rest.trim().is_empty() => {
            if let Some(id) = client.active_conversation_id().await {
                let _ = client.rename_group(&id, rest).await;
            }
        }
        ("add", [user_id]) => {
            if let Some(id) = client.active_conversation_id().await {
                let _ = client.add_to_group(&id, user_id).await;
            }
        }
        ("remove", [user_id]) => {
            if let Some(id) = client.active_conversation_id().await {
                let _ = client.remove_from_group(&id, user_id).await;
            }
        }
        ("feed", _) => print_feed(client).await,
        ("say", _) if !rest.trim().is_empty() => {
            let _ = client.send_message(rest).await;
        }
        ("typing", ["on"]) => {
            let _ = client.start_typing().await;
        }
        ("typing", ["off"]) => {
            let _ = client.stop_typing().await;
        }
        ("status", _) => print_status(client).await,
        _ => println!("Unknown command. Type `help` for the list."),
    }
    true
}

async fn print_notifications(client: &ChatClient) {
    for notification in client.take_notifications().await {
        let prefix = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        println!("[{}] {}", prefix, notification.message);
    }
}

async fn print_status(client: &ChatClient) {
    let state = client.snapshot().await;
    match &state.session {
        Some(session) => println!("Signed in as {} <{}>", session.name, session.email),
        None => println!("Not signed in"),
    }
    println!(
        "Connection: {:?} (ready: {}, acknowledged: {})",
        state.connection,
        state.is_ready(),
        state.server_acknowledged
    );
    if !state.outbox.is_empty() {
        println!("Awaiting echo for {} message(s)", state.outbox.len());
    }
}

async fn print_chats(client: &ChatClient) {
    let state = client.snapshot().await;
    let me = state.current_user_id().unwrap_or_default();
    for conversation in &state.conversations {
        let title = conversation
            .membership(me)
            .map(|m| m.title)
            .unwrap_or_else(|e| format!("<{}>", e));
        let unread = state.unread_count(&conversation.id);
        let marker = if state.active_conversation_id() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        let badge = if unread > 0 {
            format!(" ({} new)", unread)
        } else {
            String::new()
        };
        println!("{} {}  {}{}", marker, conversation.id, title, badge);
    }
}

async fn print_feed(client: &ChatClient) {
    let state = client.snapshot().await;
    let Some(active) = &state.active else {
        println!("No conversation selected");
        return;
    };

    match &active.membership {
        Ok(membership) => {
            let admin = if state.can_manage_group() {
                "  [you manage this group]"
            } else {
                ""
            };
            println!("== {}{}", membership.title, admin);
        }
        Err(e) => println!("== {} (error: {})", active.conversation.display_name, e),
    }

    let me = state.current_user_id().unwrap_or_default();
    for message in active.feed.messages() {
        match message.alignment(me) {
            Alignment::Outgoing => {
                println!("{:>60}  {}", message.body, message.time_label())
            }
            Alignment::Incoming => println!(
                "{}: {}  {}",
                message.sender.name,
                message.body,
                message.time_label()
            ),
        }
    }
    if state.is_typing(active.id()) {
        println!("typing...");
    }
}
