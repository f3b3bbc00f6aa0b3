use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tabula_core::{
    new_dataset_requests, new_history_requests, new_peer_requests, new_query_log_requests,
    open_repo, AddParams, DatasetRequests, DeleteParams, GetDatasetParams, GetParams,
    HistoryRequests, InitDatasetParams, LogParams, NamespaceParams, NodeConfig, PeerNode,
    PeerRequests, QueryLogRequests, RenameParams, RpcClient, RpcServer, StructuredDataParams,
    TcpPeerNode, UpdateParams,
};
use tabula_repo::{ref_type, RefType, Repo};
use tabula_types::{
    ContentKey, DataFormat, DatasetRecord, DatasetRef, FormatConfig, ListParams, PeerId, Profile,
};

use crate::cli::*;

/// The four request handlers, all local or all remote.
struct Handlers {
    datasets: Box<dyn DatasetRequests>,
    history: Box<dyn HistoryRequests>,
    queries: Box<dyn QueryLogRequests>,
    peers: Box<dyn PeerRequests>,
}

impl Handlers {
    fn local(config: &NodeConfig) -> anyhow::Result<Self> {
        let repo: Arc<dyn Repo> = Arc::new(
            open_repo(config)
                .with_context(|| format!("opening repo at {}", config.repo_path.display()))?,
        );
        let node: Arc<dyn PeerNode> = Arc::new(TcpPeerNode::from_config(config, Arc::clone(&repo)));
        Ok(Self {
            datasets: Box::new(
                tabula_core::LocalDatasetRequests::new(Arc::clone(&repo))
                    .with_fetch_timeout(config.fetch_timeout()),
            ),
            history: new_history_requests(Some(Arc::clone(&repo)), None),
            queries: new_query_log_requests(Some(repo), None),
            peers: new_peer_requests(Some(node), None),
        })
    }

    async fn remote(addr: &str) -> anyhow::Result<Self> {
        let client = Arc::new(
            RpcClient::connect(addr)
                .await
                .with_context(|| format!("connecting to {addr}"))?,
        );
        Ok(Self {
            datasets: new_dataset_requests(None, Some(Arc::clone(&client))),
            history: new_history_requests(None, Some(Arc::clone(&client))),
            queries: new_query_log_requests(None, Some(Arc::clone(&client))),
            peers: new_peer_requests(None, Some(client)),
        })
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = NodeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match &cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        Command::Serve(args) => {
            if cli.remote.is_some() {
                bail!("serve always runs against the local repo");
            }
            return cmd_serve(&config, args).await;
        }
        _ => {}
    }

    let handlers = match &cli.remote {
        Some(addr) => Handlers::remote(addr).await?,
        None => Handlers::local(&config)?,
    };
    let out = Output { format: cli.format };

    match cli.command {
        Command::Init(args) => cmd_init(&handlers, &out, args).await,
        Command::List(args) => {
            let refs = handlers
                .datasets
                .list(&ListParams::new("", args.limit, args.offset))
                .await
                .context("listing datasets")?;
            out.refs(&refs)
        }
        Command::Info(args) => {
            let path = resolve(handlers.datasets.as_ref(), &args.dataset).await?;
            let r = handlers
                .datasets
                .get(&GetDatasetParams {
                    path,
                    ..Default::default()
                })
                .await
                .context("getting dataset")?;
            out.dataset(&r)
        }
        Command::Update(args) => cmd_update(&handlers, &out, args).await,
        Command::Rename(args) => {
            let r = handlers
                .datasets
                .rename(&RenameParams {
                    current: args.current.clone(),
                    new: args.new,
                })
                .await
                .with_context(|| format!("renaming {}", args.current))?;
            out.done(&r, || {
                println!("{} Renamed {} → {}", "✓".green().bold(), args.current, r.name.yellow())
            })
        }
        Command::Remove(args) => {
            handlers
                .datasets
                .delete(&DeleteParams {
                    name: args.name.clone(),
                    ..Default::default()
                })
                .await
                .with_context(|| format!("removing {}", args.name))?;
            out.done(&true, || println!("{} Removed {}", "✓".green().bold(), args.name.yellow()))
        }
        Command::Add(args) => {
            let r = handlers
                .datasets
                .add_dataset(&AddParams {
                    name: args.name,
                    hash: args.hash,
                })
                .await
                .context("adding dataset")?;
            out.done(&r, || {
                println!("{} Added {} at {}", "✓".green().bold(), r.name.yellow(), r.path.to_string().dimmed())
            })
        }
        Command::Data(args) => cmd_data(&handlers, args).await,
        Command::Log(args) => {
            let path = resolve(handlers.datasets.as_ref(), &args.dataset).await?;
            let log = handlers
                .history
                .log(&LogParams {
                    list: ListParams {
                        limit: args.limit,
                        ..Default::default()
                    },
                    path,
                })
                .await
                .context("reading history")?;
            out.log(&log)
        }
        Command::Queries(args) => {
            let items = handlers
                .queries
                .list(&ListParams::new("", args.limit, args.offset))
                .await
                .context("reading query log")?;
            out.done(&items, || {
                if items.is_empty() {
                    println!("No queries logged.");
                }
                for q in &items {
                    let when = q.time.map(|t| t.to_rfc3339()).unwrap_or_default();
                    println!("{}  {}  {}", when.dimmed(), q.key.to_string().yellow(), q.query);
                }
            })
        }
        Command::Peers(args) => cmd_peers(&handlers, &out, args).await,
        Command::Config | Command::Serve(_) => Ok(()),
    }
}

/// Turn a dataset name or content path into a content path.
async fn resolve(datasets: &dyn DatasetRequests, dataset: &str) -> anyhow::Result<ContentKey> {
    let name = match ref_type(dataset) {
        RefType::Path(path) => return Ok(path),
        RefType::Name(name) => name,
    };
    const PAGE: i64 = 100;
    let mut offset = 0;
    loop {
        let page = datasets
            .list(&ListParams::new("", PAGE, offset))
            .await
            .context("listing datasets")?;
        if let Some(r) = page.iter().find(|r| r.name == name) {
            return Ok(r.path.clone());
        }
        if (page.len() as i64) < PAGE {
            bail!("no dataset named '{name}'");
        }
        offset += PAGE;
    }
}

async fn cmd_init(handlers: &Handlers, out: &Output, args: InitArgs) -> anyhow::Result<()> {
    let mut params = InitDatasetParams {
        name: args.name.unwrap_or_default(),
        ..Default::default()
    };
    if args.source.starts_with("http://") || args.source.starts_with("https://") {
        params.url = args.source.clone();
    } else {
        params.data = Some(read_file(Path::new(&args.source))?);
        params.data_filename = file_name(Path::new(&args.source));
    }
    if let Some(meta) = &args.meta {
        params.metadata = Some(read_file(meta)?);
    }

    let r = handlers
        .datasets
        .init_dataset(&params)
        .await
        .with_context(|| format!("initializing dataset from {}", args.source))?;
    out.done(&r, || {
        println!("{} Initialized {}", "✓".green().bold(), r.name.yellow().bold());
        println!("  Path: {}", r.path.to_string().cyan());
        if let Some(st) = r.dataset.as_ref().and_then(|d| d.structure.as_ref()) {
            println!("  Rows: {}", st.entries);
        }
    })
}

async fn cmd_update(handlers: &Handlers, out: &Output, args: UpdateArgs) -> anyhow::Result<()> {
    // a bare name becomes `/<name>`, which update still resolves as a name
    let mut params = UpdateParams {
        changes: DatasetRecord {
            title: args.title.unwrap_or_default(),
            description: args.description.unwrap_or_default(),
            previous: ContentKey::new(&args.dataset),
            ..Default::default()
        },
        ..Default::default()
    };
    if let Some(data) = &args.data {
        params.data = Some(read_file(data)?);
        params.data_filename = file_name(data);
    }

    let r = handlers
        .datasets
        .update(&params)
        .await
        .with_context(|| format!("updating {}", args.dataset))?;
    out.done(&r, || {
        println!("{} Updated {}", "✓".green().bold(), r.name.yellow().bold());
        println!("  Path: {}", r.path.to_string().cyan());
        if let Some(ds) = &r.dataset {
            println!("  Previous: {}", ds.previous.to_string().dimmed());
        }
    })
}

async fn cmd_data(handlers: &Handlers, args: DataArgs) -> anyhow::Result<()> {
    let format: DataFormat = args
        .output
        .parse()
        .with_context(|| format!("unsupported output format '{}'", args.output))?;
    let path = resolve(handlers.datasets.as_ref(), &args.dataset).await?;
    let data = handlers
        .datasets
        .structured_data(&StructuredDataParams {
            format,
            format_config: Some(FormatConfig {
                header_row: true,
                array_entries: args.arrays,
            }),
            path,
            limit: args.limit,
            offset: args.offset,
            all: args.all,
        })
        .await
        .context("reading dataset rows")?;
    println!("{}", data.data);
    Ok(())
}

async fn cmd_peers(handlers: &Handlers, out: &Output, args: PeersArgs) -> anyhow::Result<()> {
    let peers = handlers.peers.as_ref();
    match args.action.unwrap_or(PeerAction::List { limit: 25 }) {
        PeerAction::List { limit } => {
            let profiles = peers
                .list(&ListParams::new("", limit, 0))
                .await
                .context("listing peers")?;
            out.done(&profiles, || {
                if profiles.is_empty() {
                    println!("No known peers.");
                }
                profiles.iter().for_each(print_profile);
            })
        }
        PeerAction::Connected { limit } => {
            let ids = peers.connected_peers(limit).await.context("listing connections")?;
            out.done(&ids, || {
                if ids.is_empty() {
                    println!("Not connected to any peers.");
                }
                for id in &ids {
                    println!("{}", id.cyan());
                }
            })
        }
        PeerAction::Connect { id } => {
            let profile = peers
                .connect_to_peer(&PeerId::new(&id))
                .await
                .with_context(|| format!("connecting to {id}"))?;
            out.done(&profile, || {
                println!("{} Connected", "✓".green().bold());
                print_profile(&profile);
            })
        }
        PeerAction::Info { peer } => {
            let profile = peers
                .get(&GetParams {
                    username: peer.clone(),
                    hash: peer,
                    ..Default::default()
                })
                .await
                .context("looking up peer")?;
            out.done(&profile, || print_profile(&profile))
        }
        PeerAction::Namespace { id, limit, offset } => {
            let refs = peers
                .get_namespace(&NamespaceParams {
                    peer_id: id.clone(),
                    limit,
                    offset,
                })
                .await
                .with_context(|| format!("listing datasets of {id}"))?;
            out.refs(&refs)
        }
    }
}

async fn cmd_serve(config: &NodeConfig, args: &ServeArgs) -> anyhow::Result<()> {
    let repo: Arc<dyn Repo> = Arc::new(
        open_repo(config)
            .with_context(|| format!("opening repo at {}", config.repo_path.display()))?,
    );
    let node: Arc<dyn PeerNode> = Arc::new(TcpPeerNode::from_config(config, Arc::clone(&repo)));
    let addr = args.bind.unwrap_or(config.rpc_addr);
    println!(
        "Tabula node {} on {} (repo: {})",
        node.peer_id().to_string().cyan(),
        addr.to_string().bold(),
        config.repo_path.display()
    );
    let server = RpcServer::new(repo)
        .with_node(node)
        .with_fetch_timeout(config.fetch_timeout());
    Arc::new(server)
        .listen(addr)
        .await
        .with_context(|| format!("serving on {addr}"))
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_profile(p: &Profile) {
    println!("{}  {}", p.username.yellow().bold(), p.id.to_string().dimmed());
    if !p.name.is_empty() {
        println!("  Name: {}", p.name);
    }
    if !p.home_url.is_empty() {
        println!("  Home: {}", p.home_url.blue());
    }
}

struct Output {
    format: OutputFormat,
}

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn done<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }

    fn refs(&self, refs: &[DatasetRef]) -> anyhow::Result<()> {
        self.done(&refs, || {
            if refs.is_empty() {
                println!("No datasets.");
            }
            for r in refs {
                let title = r.dataset.as_ref().map(|d| d.title.as_str()).unwrap_or("");
                println!("{}  {}  {}", r.name.yellow().bold(), r.path.to_string().dimmed(), title);
            }
        })
    }

    fn dataset(&self, r: &DatasetRef) -> anyhow::Result<()> {
        self.done(r, || {
            println!("{}  {}", r.name.yellow().bold(), r.path.to_string().cyan());
            if let Some(ds) = &r.dataset {
                if !ds.title.is_empty() {
                    println!("  Title: {}", ds.title.bold());
                }
                if !ds.description.is_empty() {
                    println!("  Description: {}", ds.description);
                }
                if let Some(st) = &ds.structure {
                    println!("  Format: {}, {} rows, {} bytes", st.format, st.entries, ds.length);
                }
                if !ds.previous.is_empty() {
                    println!("  Previous: {}", ds.previous.to_string().dimmed());
                }
                if let Some(ts) = ds.timestamp {
                    println!("  Created: {}", ts.to_rfc3339());
                }
            }
        })
    }

    fn log(&self, log: &[DatasetRef]) -> anyhow::Result<()> {
        self.done(&log, || {
            for (i, r) in log.iter().enumerate() {
                let title = r.dataset.as_ref().map(|d| d.title.as_str()).unwrap_or("");
                let marker = if i == 0 { "*".green().bold() } else { "|".dimmed() };
                println!("{} {}  {}", marker, r.path.to_string().yellow(), title);
            }
        })
    }
}
