use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod context;
mod identity;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which profile (config file) this command should use
    #[arg(short, long, value_name = "NAME", default_value = "default")]
    profile: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the profile's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Print the user's relay list
    Relays,
    /// Show or publish the user's Blossom server list
    Servers {
        #[command(subcommand)]
        cmd: ServersCmd,
    },
    /// Browse and edit Blossom drives
    Drives {
        #[command(subcommand)]
        cmd: DrivesCmd,
    },
    /// Low-level blob operations against Blossom servers
    Blobs {
        #[command(subcommand)]
        cmd: BlobsCmd,
    },
    /// Public chat channels
    Channels {
        #[command(subcommand)]
        cmd: ChannelsCmd,
    },
    /// Manage the local response cache
    Cache {
        #[command(subcommand)]
        cmd: CacheCmd,
    },
}

#[derive(Subcommand)]
enum ServersCmd {
    /// List known servers, marking the ones in the published list
    List,
    /// Publish a new server list
    Set {
        /// Server base URLs, in order of preference
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DrivesCmd {
    /// List the user's drives
    List,
    /// Print a drive's directory tree
    Tree {
        /// Drive name or `d` identifier
        drive: String,
    },
    /// Download every blob of a drive into a local directory
    Fetch {
        drive: String,
        /// Output directory; drive paths are recreated below it
        #[arg(long)]
        out: PathBuf,
    },
    /// Create an empty folder
    Mkdir {
        drive: String,
        /// Folder (or file next to which) the new folder is created
        at: String,
        name: String,
    },
    /// Delete a file or folder, and its blobs from the drive's servers
    Rm {
        drive: String,
        path: String,
        /// Keep the blobs on the servers
        #[arg(long, action = ArgAction::SetTrue)]
        keep_blobs: bool,
    },
    /// Copy a file or folder to a new path
    Cp {
        drive: String,
        path: String,
        new_path: String,
    },
    /// Move or rename a file or folder
    Mv {
        drive: String,
        path: String,
        new_path: String,
    },
    /// Add an SVG to the drive from a local file, a URL or an existing blob
    Upload {
        drive: String,
        /// Folder (or file next to which) the upload is placed
        at: String,
        /// Local SVG file
        #[arg(required_unless_present_any = ["url", "hash"], conflicts_with_all = ["url", "hash"])]
        file: Option<PathBuf>,
        /// Download the SVG from this URL and upload it
        #[arg(long, conflicts_with = "hash")]
        url: Option<String>,
        /// Place a blob that is already on the selected servers
        #[arg(long, requires = "name")]
        hash: Option<String>,
        /// File name for `--hash`, without the `.svg` extension
        #[arg(long, requires = "hash")]
        name: Option<String>,
    },
    /// Set the emotion keywords of an asset
    Emotion {
        drive: String,
        path: String,
        /// Comma-separated keywords; empty clears them
        keywords: String,
    },
}

#[derive(Subcommand)]
enum BlobsCmd {
    /// Download a blob from the first server that serves it correctly
    Get {
        /// Blob hash in hex (SHA-256, 32 bytes)
        sha256: String,
        /// Output file path to write the blob to
        #[arg(long)]
        out: PathBuf,
        /// Require this content type
        #[arg(long)]
        mime: Option<String>,
    },
    /// Upload a local file to the selected servers
    Upload {
        path: PathBuf,
        /// Content type sent with the upload
        #[arg(long)]
        mime: Option<String>,
    },
    /// Delete a blob from the selected servers
    Delete { sha256: String },
    /// Ask the selected servers to copy a blob from a URL
    Mirror { url: String },
    /// List the user's blobs on a server
    List {
        /// Defaults to every selected server
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Subcommand)]
enum ChannelsCmd {
    /// List channels from the user's relays
    List {
        /// Only comic rooms
        #[arg(long, action = ArgAction::SetTrue)]
        comic: bool,
        /// Only channels created by the user
        #[arg(long, action = ArgAction::SetTrue)]
        mine: bool,
        /// Case-insensitive text, or an exact channel id
        #[arg(long)]
        search: Option<String>,
        /// Ignore cached results
        #[arg(long, action = ArgAction::SetTrue)]
        refresh: bool,
    },
    /// Create a comic room
    Create {
        #[command(flatten)]
        content: ChannelArgs,
    },
    /// Replace a channel's name, description and picture
    Update {
        id: String,
        #[command(flatten)]
        content: ChannelArgs,
    },
    /// Add a channel to the pinned list
    Pin { id: String },
    /// Remove a channel from the pinned list
    Unpin { id: String },
    /// Print recent messages
    Messages {
        id: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Send a message
    Send { id: String, text: String },
    /// List the channels kept open next to the pinned ones
    Opened,
    /// Keep a channel open without pinning it
    Open { id: String },
    /// Close an opened channel
    Close { id: String },
}

#[derive(clap::Args)]
struct ChannelArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    about: String,
    #[arg(long, default_value = "")]
    picture: String,
    /// Relay recommended for the channel; repeatable
    #[arg(long = "relay")]
    relays: Vec<String>,
}

#[derive(Subcommand)]
enum CacheCmd {
    /// Drop every cached response
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Configs under ~/.config/comic/<profile>.toml, data (cache) under
    // ~/.local/share/comic/<profile>/.
    let dirs =
        ProjectDirs::from("", "", "comic").context("failed to determine config directory path")?;

    let config_file = dirs.config_dir().join(&cli.profile).with_extension("toml");
    let data_dir = dirs.data_dir().join(&cli.profile);

    cmd::run_command(config_file, &data_dir, cli.cmd).await
}
