use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tollgate_ipc::admin::{Command, Response};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the daemon's admin socket
    #[clap(short, long, default_value = "/var/run/tollgate.sock")]
    socket: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List tracked sessions, most recently started first
    List,
}

async fn send_command(socket: &str, command: Command) -> Result<Response> {
    let mut stream = UnixStream::connect(socket).await?;
    let serialized = serde_json::to_vec(&command)?;

    stream.write_all(&serialized).await?;
    stream.shutdown().await?; // Half-close the stream

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;

    let response: Response = serde_json::from_slice(&buffer)?;
    Ok(response)
}

fn dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::List => {
            let response = send_command(&cli.socket, Command::List).await?;
            match response {
                Response::List(rows) => {
                    println!(
                        "{:<12} {:<17} {:<7} {:<24} {:<19} {:<19}",
                        "User", "MAC", "Source", "Address", "Started", "Ended"
                    );
                    println!("{:-<101}", "");
                    for row in rows {
                        let address = row
                            .ipv4
                            .map(|ip| ip.to_string())
                            .or_else(|| row.ipv6.map(|ip| ip.to_string()));
                        println!(
                            "{:<12} {:<17} {:<7} {:<24} {:<19} {:<19}",
                            dash(row.user),
                            row.mac.to_string(),
                            row.source.to_string(),
                            dash(address),
                            row.addr_start.to_string(),
                            dash(row.addr_end.map(|t| t.to_string())),
                        );
                    }
                }
                Response::Error(e) => {
                    eprintln!("Server error: {}", e);
                }
            }
        }
    }

    Ok(())
}
