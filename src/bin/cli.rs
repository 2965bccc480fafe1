// HiveMind CLI
// Drives and inspects a running HiveMind session server

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser)]
#[command(name = "hivemind-cli")]
#[command(about = "HiveMind session CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Student,
    Teacher,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get server configuration
    Config,

    /// Log in (any non-empty ID and password work)
    Login {
        #[arg(short, long)]
        id: String,

        #[arg(short, long)]
        password: String,

        #[arg(short, long, value_enum, default_value = "teacher")]
        role: RoleArg,
    },

    /// Print the current session
    Status {
        /// Filter students by name or topic
        #[arg(long)]
        search: Option<String>,
    },

    /// Connect the session and start monitoring
    Connect,

    /// Disconnect and reset the roster
    Disconnect,

    /// Toggle selection of a student
    Select { student_id: u32 },

    /// Group the selected students into a peer node
    CreateNode { name: String },

    /// Broadcast a coach message to the class
    Coach { message: String },

    /// Run the AI analysis pass
    Analyze,

    /// Show or change settings
    Settings {
        #[arg(long)]
        auto_detection: Option<bool>,
    },

    /// Stream live session updates (press Ctrl+C to exit)
    Watch {
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("http://{}", cli.server);

    match &cli.command {
        Commands::Health => check_health(&client, &base).await,
        Commands::Config => {
            if let Some(body) = get(&client, &format!("{}/hivemind/config", base)).await {
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            }
        }
        Commands::Login { id, password, role } => {
            let role = match role {
                RoleArg::Student => "student",
                RoleArg::Teacher => "teacher",
            };
            let body = json!({ "id": id, "password": password, "role": role });
            if let Some(user) = post(&client, &format!("{}/login", base), Some(body)).await {
                println!(
                    "{} Logged in as {} ({})",
                    "✓".green(),
                    user["username"].as_str().unwrap_or("?").bold(),
                    user["role"].as_str().unwrap_or("?")
                );
            }
        }
        Commands::Status { search } => {
            let mut url = format!("{}/session", base);
            if let Some(term) = search {
                url.push_str(&format!("?search={}", urlencoding::encode(term)));
            }
            if let Some(view) = get(&client, &url).await {
                print_session(&view);
            }
        }
        Commands::Connect => session_action(&client, &base, "connect", None).await,
        Commands::Disconnect => session_action(&client, &base, "disconnect", None).await,
        Commands::Select { student_id } => {
            session_action(&client, &base, &format!("students/{}/select", student_id), None).await
        }
        Commands::CreateNode { name } => {
            session_action(&client, &base, "peer-nodes", Some(json!({ "name": name }))).await
        }
        Commands::Coach { message } => {
            session_action(&client, &base, "coach", Some(json!({ "message": message }))).await
        }
        Commands::Analyze => session_action(&client, &base, "analysis", None).await,
        Commands::Settings { auto_detection } => {
            let url = format!("{}/session/settings", base);
            let settings = match auto_detection {
                Some(enabled) => send(client.put(&url).json(&json!({ "auto_detection": enabled }))).await,
                None => get(&client, &url).await,
            };
            if let Some(settings) = settings {
                println!("{}", serde_json::to_string_pretty(&settings).unwrap_or_default());
            }
        }
        Commands::Watch { search } => watch(&cli.server, search.as_deref()).await,
    }
}

async fn check_health(client: &reqwest::Client, base: &str) {
    println!("{}", "Checking server health...".cyan());

    if let Some(body) = get(client, &format!("{}/hivemind/health", base)).await {
        println!("{} Health check passed", "✓".green());
        println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
        println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
        println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
    }
}

async fn session_action(client: &reqwest::Client, base: &str, action: &str, body: Option<Value>) {
    let url = format!("{}/session/{}", base, action);
    if let Some(view) = post(client, &url, body).await {
        print_session(&view);
    }
}

async fn get(client: &reqwest::Client, url: &str) -> Option<Value> {
    send(client.get(url)).await
}

async fn post(client: &reqwest::Client, url: &str, body: Option<Value>) -> Option<Value> {
    let request = client.post(url);
    let request = match body {
        Some(body) => request.json(&body),
        None => request,
    };
    send(request).await
}

/// Sends a request and prints any failure; returns the JSON body on success
async fn send(request: reqwest::RequestBuilder) -> Option<Value> {
    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return None;
        }
    };

    let status = resp.status();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    if status.is_success() {
        Some(body)
    } else {
        let message = body["error"].as_str().unwrap_or("unknown error");
        println!("{} {} ({})", "✗".red(), message, status);
        None
    }
}

fn print_session(view: &Value) {
    let connected = view["connected"].as_bool().unwrap_or(false);
    let stats = &view["stats"];

    println!("\n{}", "═".repeat(60).as_str().blue());
    println!(
        "{} {}   {} {}",
        "HiveMind".bold(),
        if connected { "● Zoom Connected".green() } else { "○ Disconnected".dimmed() },
        "Attentiveness:".bold(),
        match &view["attentiveness"] {
            Value::Null => "n/a".dimmed(),
            v => v.to_string().trim_matches('"').normal(),
        }
    );
    println!(
        "Students: {}  Struggling: {}  Peer nodes: {}  Avg engagement: {}%",
        stats["total_students"],
        stats["struggling"].to_string().as_str().red(),
        stats["peer_nodes"].to_string().as_str().green(),
        stats["average_engagement"]
    );
    println!("{}", "═".repeat(60).as_str().blue());

    for card in view["students"].as_array().into_iter().flatten() {
        let confusion = card["confusion"].as_u64().unwrap_or(0);
        let confusion_text = format!("{:>3}%", confusion);
        let confusion_text = match card["level"].as_str() {
            Some("high") => confusion_text.as_str().red(),
            Some("elevated") => confusion_text.as_str().yellow(),
            _ => confusion_text.as_str().green(),
        };
        let mut flags = Vec::new();
        if card["selected"].as_bool().unwrap_or(false) {
            flags.push("selected".blue().to_string());
        }
        if let Some(node) = card["peer_node"].as_str() {
            flags.push(format!("node:{}", node).as_str().green().to_string());
        }
        if card["speaking"].as_bool().unwrap_or(false) {
            flags.push("speaking".to_string());
        }
        if card["hand_raised"].as_bool().unwrap_or(false) {
            flags.push("✋".to_string());
        }
        println!(
            "{:>3} {:<12} {:<24} attention {:>3}%  confusion {}  {}",
            card["id"],
            card["name"].as_str().unwrap_or("?"),
            card["topic"].as_str().unwrap_or("?").dimmed(),
            card["attention"],
            confusion_text,
            flags.join(" ")
        );
    }

    let nodes = view["peer_nodes"].as_array().cloned().unwrap_or_default();
    if !nodes.is_empty() {
        println!("\n{}", "Active Peer Nodes".bold());
        for node in nodes {
            let members = node["members"].as_array().map(|m| m.len()).unwrap_or(0);
            println!("  {} ({} members)", node["name"].as_str().unwrap_or("?").green(), members);
        }
    }

    let notifications = view["notifications"].as_array().cloned().unwrap_or_default();
    if !notifications.is_empty() {
        println!("\n{}", "Recent Notifications".bold());
        for n in notifications {
            let message = n["message"].as_str().unwrap_or("");
            let message = match n["severity"].as_str() {
                Some("success") => message.green(),
                Some("error") => message.red(),
                Some("alert") => message.yellow(),
                _ => message.blue(),
            };
            println!("  {} {}", n["timestamp"].as_str().unwrap_or("").dimmed(), message);
        }
    }
}

async fn watch(server: &str, search: Option<&str>) {
    let url = format!("ws://{}/hivemind/ws", server);
    println!("{} {}", "Connecting to".cyan(), url);

    let (ws_stream, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if let Some(term) = search {
        let msg = json!({ "type": "Search", "term": term });
        if write.send(Message::Text(msg.to_string())).await.is_err() {
            println!("{} Failed to send Search message", "✗".red());
            return;
        }
    }

    println!("{} Watching session. Press {} to exit.", "✓".green(), "Ctrl+C".bold());

    loop {
        match timeout(Duration::from_secs(30), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: Value = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(_) => continue,
                };
                match event["type"].as_str() {
                    Some("Snapshot") => print_session(&event),
                    Some("Error") => println!("{} {}", "✗".red(), event["message"]),
                    _ => println!("{} {}", "◀".green(), text),
                }
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                println!("{} Server closed the connection", "✗".yellow());
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Connection error: {}", "✗".red(), e);
                break;
            }
            Ok(None) => {
                println!("{} Connection closed", "✗".yellow());
                break;
            }
            // Quiet session, keep listening
            Err(_) => continue,
        }
    }
}
