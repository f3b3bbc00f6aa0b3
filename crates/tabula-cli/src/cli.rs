use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tabula",
    about = "Tabula — versioned, content-addressed datasets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Node configuration file
    #[arg(long, global = true, default_value = "tabula.toml")]
    pub config: PathBuf,

    /// Run against the node listening at this address instead of the local repo
    #[arg(long, global = true)]
    pub remote: Option<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a new dataset from a file or URL
    Init(InitArgs),
    /// List named datasets
    List(ListArgs),
    /// Show a dataset by name or path
    Info(InfoArgs),
    /// Create a new revision of a dataset
    Update(UpdateArgs),
    /// Rename a dataset
    Rename(RenameArgs),
    /// Remove a dataset name and unpin its content
    Remove(RemoveArgs),
    /// Fetch a dataset from the network and name it
    Add(AddArgs),
    /// Read rows from a dataset
    Data(DataArgs),
    /// Show a dataset's revision history
    Log(LogArgs),
    /// Show the query log
    Queries(QueriesArgs),
    /// Work with peers
    Peers(PeersArgs),
    /// Show the effective configuration
    Config,
    /// Start the RPC server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Local data file, or an http(s) URL to fetch
    pub source: String,
    #[arg(short, long)]
    pub name: Option<String>,
    /// JSON metadata file merged into the new dataset
    #[arg(long)]
    pub meta: Option<PathBuf>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short = 'n', long, default_value = "25")]
    pub limit: i64,
    #[arg(long, default_value = "0")]
    pub offset: i64,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Dataset name or content path
    pub dataset: String,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Dataset name or content path
    pub dataset: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Replacement data file
    #[arg(long)]
    pub data: Option<PathBuf>,
}

#[derive(Args)]
pub struct RenameArgs {
    pub current: String,
    pub new: String,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub name: String,
}

#[derive(Args)]
pub struct AddArgs {
    pub name: String,
    /// Content path of the dataset on the network
    pub hash: String,
}

#[derive(Args)]
pub struct DataArgs {
    /// Dataset name or content path
    pub dataset: String,
    /// Output encoding: csv or json
    #[arg(long = "as", default_value = "json")]
    pub output: String,
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: i64,
    #[arg(long, default_value = "0")]
    pub offset: i64,
    #[arg(long)]
    pub all: bool,
    /// Emit JSON rows as arrays instead of objects
    #[arg(long)]
    pub arrays: bool,
}

#[derive(Args)]
pub struct LogArgs {
    /// Dataset name or content path
    pub dataset: String,
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: i64,
}

#[derive(Args)]
pub struct QueriesArgs {
    #[arg(short = 'n', long, default_value = "25")]
    pub limit: i64,
    #[arg(long, default_value = "0")]
    pub offset: i64,
}

#[derive(Args)]
pub struct PeersArgs {
    #[command(subcommand)]
    pub action: Option<PeerAction>,
}

#[derive(Subcommand)]
pub enum PeerAction {
    /// Known peer profiles
    List {
        #[arg(short = 'n', long, default_value = "25")]
        limit: i64,
    },
    /// Currently connected peers
    Connected {
        #[arg(short = 'n', long, default_value = "0")]
        limit: i64,
    },
    /// Connect to a configured peer
    Connect { id: String },
    /// Show a peer by id or username
    Info { peer: String },
    /// List a peer's datasets
    Namespace {
        id: String,
        #[arg(short = 'n', long, default_value = "25")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address, overriding `rpc_addr` from the config
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["tabula", "init", "movies.csv", "-n", "films"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.source, "movies.csv");
            assert_eq!(args.name, Some("films".into()));
            assert!(args.meta.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_list_defaults() {
        let cli = Cli::try_parse_from(["tabula", "list"]).unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.limit, 25);
            assert_eq!(args.offset, 0);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_update() {
        let cli = Cli::try_parse_from(["tabula", "update", "movies", "--title", "Films"]).unwrap();
        if let Command::Update(args) = cli.command {
            assert_eq!(args.dataset, "movies");
            assert_eq!(args.title, Some("Films".into()));
            assert!(args.data.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_rename() {
        let cli = Cli::try_parse_from(["tabula", "rename", "movies", "films"]).unwrap();
        if let Command::Rename(args) = cli.command {
            assert_eq!(args.current, "movies");
            assert_eq!(args.new, "films");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_data() {
        let cli = Cli::try_parse_from(["tabula", "data", "counter", "--as", "csv", "--all"]).unwrap();
        if let Command::Data(args) = cli.command {
            assert_eq!(args.output, "csv");
            assert!(args.all);
            assert_eq!(args.limit, 50);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_log_limit() {
        let cli = Cli::try_parse_from(["tabula", "log", "cities", "-n", "3"]).unwrap();
        if let Command::Log(args) = cli.command {
            assert_eq!(args.limit, 3);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_peers_namespace() {
        let cli = Cli::try_parse_from(["tabula", "peers", "namespace", "QmPeer", "-n", "5"]).unwrap();
        if let Command::Peers(args) = cli.command {
            assert!(matches!(
                args.action,
                Some(PeerAction::Namespace { limit: 5, offset: 0, .. })
            ));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_peers_default_action() {
        let cli = Cli::try_parse_from(["tabula", "peers"]).unwrap();
        if let Command::Peers(args) = cli.command {
            assert!(args.action.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["tabula", "serve", "--bind", "0.0.0.0:2503"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:2503".parse().unwrap()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from([
            "tabula", "list", "--remote", "10.0.0.2:2503", "--config", "node.toml", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.remote, Some("10.0.0.2:2503".into()));
        assert_eq!(cli.config, PathBuf::from("node.toml"));
        assert!(matches!(cli.format, OutputFormat::Text));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["tabula", "--format", "json", "queries"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
