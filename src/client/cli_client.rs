// Client a riga di comando: conversazioni, storico e canale push
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use linkup_chat::client::config::ClientConfig;
use linkup_chat::client::models::session::SessionContext;
use linkup_chat::client::models::timeline::TimelineEntry;
use linkup_chat::client::services::api::HttpApi;
use linkup_chat::client::services::messenger::Messenger;
use linkup_chat::client::services::websocket_client::{ChannelClient, ChannelNotice};
use linkup_chat::client::utils::session_store;
use linkup_chat::common::events::ChannelEvent;
use linkup_chat::utils::logger;

#[derive(Parser, Debug)]
#[command(name = "linkup-cli", about = "Terminal client for linkup-chat")]
struct Args {
    /// Base URL of the HTTP API
    #[arg(long)]
    api: Option<String>,
    /// URL of the push channel
    #[arg(long)]
    ws: Option<String>,
    /// Bearer credential; falls back to the stored one
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
    #[arg(long, default_value = "warn")]
    log_level: String,
}

const HELP: &str = "\
/login <token>        start a session
/logout               end the session
/list                 conversations, newest first
/requests             pending connection requests
/request <userId>     send a connection request
/accept <id>          accept a request
/reject <id>          reject a request
/remove <id>          remove a connection
/open <userId>        open a conversation
/older                load the previous page
/close                close the conversation
/typing               notify the partner that you are typing
/dismiss              hide the last error
/quit                 exit
Any other text is sent to the open conversation.";

type Cli = Messenger<HttpApi>;

async fn print_conversations(m: &Cli) {
    let snap = m.snapshot().await;
    if snap.conversations.is_empty() {
        println!("[CLIENT] Nessuna conversazione.");
    } else {
        println!("[CLIENT] {} messaggi non letti", snap.total_unread);
    }
    for c in snap.conversations {
        let last = c.last_message_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<4} {:<16} {} unread={} last={}",
            c.partner_id,
            c.partner_name,
            if c.is_online { "●" } else { "○" },
            c.unread_count,
            last
        );
    }
}

async fn print_timeline(m: &Cli) {
    let snap = m.snapshot().await;
    if !snap.reached_start && !snap.timeline.is_empty() {
        println!("  ... (/older)");
    }
    for entry in snap.timeline {
        match entry {
            TimelineEntry::Confirmed(msg) => println!("  [{}] {}: {}", msg.timestamp, msg.sender_id, msg.content),
            TimelineEntry::Pending(d) => println!("  [sending] {}", d.content),
            TimelineEntry::Rejected { draft, reason } => println!("  [failed: {}] {}", reason, draft.content),
        }
    }
}

async fn report<T>(m: &Cli, result: linkup_chat::common::error::ChatResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            if e.is_transient() {
                println!("[CLIENT] Errore: {} (riprova)", e);
            } else {
                println!("[CLIENT] Errore: {}", e);
            }
            if m.session().token().is_none() {
                let _ = session_store::clear_session_token();
            }
            None
        }
    }
}

async fn login(m: &Cli, token: String) {
    if let Some(identity) = report(m, m.start_session(token.clone()).await).await {
        println!("[CLIENT] Benvenuto {} (id {})", identity.username, identity.user_id);
        if let Err(e) = session_store::save_session_token(&token) {
            println!("[CLIENT] Credential not persisted: {}", e);
        }
        print_conversations(m).await;
    }
}

fn parse_id(arg: Option<&str>) -> Option<i64> {
    arg.and_then(|a| a.parse().ok())
}

/// Returns false when the user asked to quit.
async fn handle_line(m: &Cli, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    if !line.starts_with('/') {
        if report(m, m.send(line).await).await.is_some() {
            print_timeline(m).await;
        }
        return true;
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let arg = parts.next();
    match command {
        "/help" => println!("{}", HELP),
        "/quit" => return false,
        "/login" => match arg {
            Some(token) => login(m, token.to_string()).await,
            None => println!("[CLIENT] Uso: /login <token>"),
        },
        "/logout" => {
            m.sign_out().await;
            let _ = session_store::clear_session_token();
            println!("[CLIENT] Logout effettuato");
        }
        "/list" => {
            if report(m, m.refresh_all().await).await.is_some() {
                print_conversations(m).await;
            }
        }
        "/requests" => {
            if report(m, m.refresh_all().await).await.is_some() {
                for r in m.snapshot().await.requests {
                    println!("  request #{} from {} ({}) at {}", r.connection_id, r.requester_name, r.requester_id, r.sent_at);
                }
            }
        }
        "/request" => match parse_id(arg) {
            Some(target) => {
                if let Some(id) = report(m, m.send_request(target).await).await {
                    println!("[CLIENT] Request #{} sent", id);
                }
            }
            None => println!("[CLIENT] Uso: /request <userId>"),
        },
        "/accept" | "/reject" | "/remove" => match parse_id(arg) {
            Some(id) => {
                let result = match command {
                    "/accept" => m.accept_request(id).await,
                    "/reject" => m.reject_request(id).await,
                    _ => m.remove_connection(id).await,
                };
                if report(m, result).await.is_some() {
                    print_conversations(m).await;
                }
            }
            None => println!("[CLIENT] Uso: {} <id>", command),
        },
        "/open" => match parse_id(arg) {
            Some(partner) => {
                if report(m, m.open_conversation(partner).await).await.is_some() {
                    print_timeline(m).await;
                }
            }
            None => println!("[CLIENT] Uso: /open <userId>"),
        },
        "/older" => {
            m.scroll_to(0.0).await;
            match report(m, m.load_older().await).await {
                Some(true) => print_timeline(m).await,
                Some(false) => println!("[CLIENT] Nothing older to load"),
                None => {}
            }
        }
        "/close" => m.close_conversation().await,
        "/typing" => m.notify_typing().await,
        "/dismiss" => m.dismiss_notice().await,
        _ => println!("[CLIENT] Comando sconosciuto, /help per la lista"),
    }
    true
}

async fn on_notice(m: &Cli, notice: ChannelNotice) {
    let me = m.session().user_id();
    match &notice {
        ChannelNotice::Event(ChannelEvent::NewMessage(msg)) if Some(msg.sender_id) != me => {
            println!("[new] {} -> {}: {}", msg.sender_id, msg.receiver_id, msg.content);
        }
        ChannelNotice::Event(ChannelEvent::Typing(t)) => println!("[typing] {} sta scrivendo...", t.sender_id),
        ChannelNotice::Event(ChannelEvent::Presence(p)) => {
            println!("[presence] {} {}", p.user_id, if p.is_online { "online" } else { "offline" })
        }
        ChannelNotice::Connected { reconnect: true } => println!("[CLIENT] Riconnesso"),
        ChannelNotice::Disconnected => println!("[CLIENT] Canale disconnesso, riprovo..."),
        ChannelNotice::AuthRejected => println!("[CLIENT] Sessione non valida, effettua di nuovo il login"),
        _ => {}
    }
    m.handle_notice(notice).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api) = args.api {
        config.api_base_url = api;
    }
    if let Some(ws) = args.ws {
        config.websocket_url = ws;
    }
    if let Some(ms) = args.reconnect_delay_ms {
        config.reconnect_delay = Duration::from_millis(ms);
    }
    logger::init(&args.log_level);
    config.validate()?;

    let session = SessionContext::new();
    let api = Arc::new(HttpApi::new(config.api_base_url.clone(), session.clone()));
    let messenger = Messenger::new(api, session.clone(), config.clone());
    let (mut notices, channel_task) =
        ChannelClient::new(config.websocket_url.clone(), config.reconnect_delay, session.clone()).spawn();

    println!("[CLIENT] Benvenuto! /help per i comandi");
    if let Some(token) = args.token.or_else(session_store::load_session_token) {
        login(&messenger, token).await;
    }

    // gli eventi push non aspettano i comandi in corso
    let listener = messenger.clone();
    let notice_task = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            on_notice(&listener, notice).await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !handle_line(&messenger, &line).await {
            break;
        }
    }

    notice_task.abort();
    channel_task.abort();
    Ok(())
}
