//! `jukebox`: command-line control for a jukebox server.

mod render;
mod server_api;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::server_api::GuildClient;

#[derive(Parser, Debug)]
#[command(name = "jukebox", version)]
struct Args {
    /// Base URL of the jukebox server, e.g. http://127.0.0.1:8080
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Guild whose queue to control.
    #[arg(long)]
    guild: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a link, playlist or search.
    Play {
        /// Link or search words.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Requesting member id.
        #[arg(long)]
        requester: Option<String>,
    },
    /// Show the current track and upcoming queue.
    Queue,
    Skip,
    /// Stop playback, drop the queue and leave.
    Stop,
    /// Drop every pending track.
    Clear,
    /// Remove a pending track by 1-based position.
    Remove { position: usize },
    Pause,
    Resume,
    /// Print recent notices.
    Notices,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = GuildClient::new(&args.server, args.guild);
    tracing::debug!(server = %args.server, guild = args.guild, command = ?args.command, "sending");
    match args.command {
        Command::Play { query, requester } => {
            let resp = client.enqueue(&query.join(" "), requester)?;
            println!("{}", render::enqueue(&resp));
        }
        Command::Queue => print!("{}", render::queue(&client.queue()?)),
        Command::Skip => {
            client.control("skip")?;
            println!("Skipped");
        }
        Command::Stop => {
            client.control("stop")?;
            println!("Stopped");
        }
        Command::Clear => {
            let resp = client.clear()?;
            println!("Cleared {} tracks", resp.removed);
        }
        Command::Remove { position } => {
            let resp = client.remove(position)?;
            println!("Removed {} from position {}", resp.track.title, resp.position);
        }
        Command::Pause => {
            client.control("pause")?;
            println!("Paused");
        }
        Command::Resume => {
            client.control("resume")?;
            println!("Resumed");
        }
        Command::Notices => {
            for entry in client.notices()?.notices {
                println!("{}", render::notice(&entry));
            }
        }
    }
    Ok(())
}
