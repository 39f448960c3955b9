#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for the wiremail service
//!
//! Speaks the wiremail line protocol over a fresh TCP connection per
//! invocation. Credentials come from `WIREMAIL_USERNAME` /
//! `WIREMAIL_PASSWORD` (or a `.env` file); authenticated commands log
//! in, run, and log out.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;
use wiremail::{parse_message_record, ClientConfig, Message, FIELD_DELIMITER, RECORD_DELIMITER};

#[derive(Parser)]
#[command(name = "wiremail")]
#[command(about = "Command-line client for a wiremail server")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Register the configured account on the server
    Register,

    /// Send a message
    Send {
        /// Recipient username
        #[arg(long)]
        to: String,

        /// Message subject
        #[arg(long)]
        subject: String,

        /// Message body
        #[arg(long)]
        body: String,
    },

    /// List received messages
    Received {
        /// Maximum number of messages to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List sent messages
    Sent {
        /// Maximum number of messages to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a single message by id, marking it read
    Read {
        /// Message id
        id: u64,
    },

    /// Search messages by subject substring
    Search {
        /// Which view to search (RECEIVED or SENT)
        #[arg(value_parser = parse_direction)]
        direction: String,

        /// Literal, case-sensitive subject substring
        term: String,

        /// Maximum number of results
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

fn parse_direction(s: &str) -> Result<String, String> {
    match s {
        "RECEIVED" | "SENT" => Ok(s.to_string()),
        other => Err(format!("Invalid direction '{other}': expected RECEIVED or SENT")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env()?;

    match &args.command {
        Command::Register => cmd_register(&config).await?,
        Command::Send { to, subject, body } => cmd_send(&config, to, subject, body).await?,
        Command::Received { limit } => {
            cmd_list(&config, &args, "GET_RECEIVED_EMAILS", *limit).await?;
        }
        Command::Sent { limit } => {
            cmd_list(&config, &args, "GET_SENT_EMAILS", *limit).await?;
        }
        Command::Read { id } => cmd_read(&config, &args, *id).await?,
        Command::Search {
            direction,
            term,
            limit,
        } => cmd_search(&config, &args, direction, term, *limit).await?,
    }

    Ok(())
}

/// One half-duplex protocol connection: a line out, a line back.
struct Connection {
    stream: BufReader<TcpStream>,
}

impl Connection {
    async fn open(config: &ClientConfig) -> anyhow::Result<Self> {
        let addr = config.address();
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to {addr}"))?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    async fn request(&mut self, frame: &str) -> anyhow::Result<String> {
        self.stream
            .get_mut()
            .write_all(format!("{frame}\n").as_bytes())
            .await?;
        self.stream.get_mut().flush().await?;

        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            bail!("Server closed the connection");
        }
        Ok(line.trim_end().to_string())
    }

    async fn login(&mut self, config: &ClientConfig) -> anyhow::Result<()> {
        let frame = join_fields(&["LOGIN", &config.username, &config.password]);
        let response = self.request(&frame).await?;
        if response != "SUCCESS" {
            bail!("Login failed: {response}");
        }
        Ok(())
    }

    async fn logout(&mut self, config: &ClientConfig) {
        let frame = join_fields(&["LOGOUT", &config.username]);
        self.request(&frame).await.ok();
    }
}

fn join_fields(fields: &[&str]) -> String {
    fields.join(FIELD_DELIMITER)
}

/// Decode a list response into messages. `NO_EMAILS_FOUND` is an
/// empty list, not an error.
fn parse_messages(response: &str) -> anyhow::Result<Vec<Message>> {
    if response == "NO_EMAILS_FOUND" {
        return Ok(Vec::new());
    }
    let Some(payload) = response.strip_prefix(&format!("SUCCESS{RECORD_DELIMITER}")) else {
        bail!("Server error: {response}");
    };
    payload
        .split(RECORD_DELIMITER)
        .map(|record| {
            parse_message_record(record)
                .with_context(|| format!("Malformed message record: {record}"))
        })
        .collect()
}

async fn cmd_register(config: &ClientConfig) -> anyhow::Result<()> {
    let mut conn = Connection::open(config).await?;
    let frame = join_fields(&[
        "REGISTER",
        &config.username,
        &config.password,
        &config.password,
    ]);
    let response = conn.request(&frame).await?;
    if response != "SUCCESS" {
        bail!("Registration failed: {response}");
    }
    println!("Registered {}", config.username);
    Ok(())
}

async fn cmd_send(
    config: &ClientConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> anyhow::Result<()> {
    let mut conn = Connection::open(config).await?;
    conn.login(config).await?;

    let frame = join_fields(&["SEND_EMAIL", to, subject, body]);
    let response = conn.request(&frame).await?;
    conn.logout(config).await;

    if response != "SUCCESS" {
        bail!("Send failed: {response}");
    }
    println!("Sent to {to}");
    Ok(())
}

async fn cmd_list(
    config: &ClientConfig,
    args: &Args,
    frame: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let mut conn = Connection::open(config).await?;
    conn.login(config).await?;
    let response = conn.request(frame).await?;
    conn.logout(config).await;

    let messages = parse_messages(&response)?;
    let display: Vec<&Message> = messages.iter().take(limit).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        print_message_table(&display);
    }

    Ok(())
}

async fn cmd_read(config: &ClientConfig, args: &Args, id: u64) -> anyhow::Result<()> {
    let mut conn = Connection::open(config).await?;
    conn.login(config).await?;
    let response = conn.request(&format!("READ_EMAIL{FIELD_DELIMITER}{id}")).await?;
    conn.logout(config).await;

    let Some(record) = response.strip_prefix(&format!("SUCCESS{FIELD_DELIMITER}")) else {
        bail!("Server error: {response}");
    };
    let message = parse_message_record(record)
        .with_context(|| format!("Malformed message record: {record}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        print_message_detail(&message);
    }

    Ok(())
}

async fn cmd_search(
    config: &ClientConfig,
    args: &Args,
    direction: &str,
    term: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let mut conn = Connection::open(config).await?;
    conn.login(config).await?;
    let frame = join_fields(&["SEARCH_DETAILS", direction, term]);
    let response = conn.request(&frame).await?;
    conn.logout(config).await;

    let messages = parse_messages(&response)?;
    let display: Vec<&Message> = messages.iter().take(limit).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        print_message_table(&display);
    }

    Ok(())
}

fn print_message_table(messages: &[&Message]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    let header = format!(
        "{:<6} {:<20} {:<16} {:<16} {:<6} {}",
        "ID", "Sent at", "From", "To", "Read", "Subject"
    );
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        println!(
            "{:<6} {:<20} {:<16} {:<16} {:<6} {}",
            message.id,
            message.sent_at.format("%Y-%m-%d %H:%M"),
            truncate(&message.sender, 14),
            truncate(&message.recipient, 14),
            if message.is_read { "yes" } else { "no" },
            truncate(&message.subject, 40),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn print_message_detail(message: &Message) {
    println!("ID:      {}", message.id);
    println!("Sent at: {}", message.sent_at.format("%Y-%m-%d %H:%M:%S"));
    println!("From:    {}", message.sender);
    println!("To:      {}", message.recipient);
    println!("Subject: {}", message.subject);
    println!("Read:    {}", if message.is_read { "yes" } else { "no" });
    println!("\n--- Body ---\n");
    println!("{}", message.body);
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
