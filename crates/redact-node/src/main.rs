//! redact-node: in-process demo of the redaction protocol

use std::sync::Arc;
use std::time::Duration;

use chameleon::{GroupElement, GroupParameters, DEFAULT_DOMAIN};
use clap::Parser;
use rand::rngs::OsRng;
use redact_node::{
    commit_block, BlockStore, Element, Error, MemoryBlockStore, MemoryNetwork, NodeConfig,
    PeerId, Reactor, Result, SetupPhase, Task,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "redact-node")]
#[command(about = "Distributed chameleon-hash transaction redaction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run setup and one redaction on an in-process cluster
    Demo {
        /// Number of nodes
        #[arg(short, long, default_value = "4")]
        nodes: usize,

        /// Polynomial threshold
        #[arg(short, long, default_value = "3")]
        threshold: usize,

        /// Height of the block to redact in
        #[arg(long, default_value = "10")]
        height: i64,

        /// Index of the transaction to rewrite
        #[arg(long, default_value = "2")]
        index: i32,

        /// New key
        #[arg(short, long, default_value = "k")]
        key: String,

        /// New value
        #[arg(short, long, default_value = "v2")]
        value: String,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Print the group parameters
    Params {
        /// Derive the generator from this seed instead of the basepoint
        #[arg(short, long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("redact_node=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Demo {
            nodes,
            threshold,
            height,
            index,
            key,
            value,
            timeout,
        } => {
            run_demo(
                nodes,
                threshold,
                Task::new(height, index, key, value),
                Duration::from_secs(timeout),
            )
            .await
        }
        Command::Params { seed } => {
            show_params(seed);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn show_params(seed: Option<String>) {
    let params = match seed {
        Some(seed) => GroupParameters::<Element>::from_seed(seed.as_bytes(), DEFAULT_DOMAIN),
        None => GroupParameters::<Element>::default(),
    };
    println!("=== Group Parameters ===");
    println!("Group:     ristretto255");
    println!("Generator: {}", hex::encode(GroupElement::compress(&params.generator)));
    println!("Domain:    {}", String::from_utf8_lossy(&params.domain));
}

async fn wait_for<F, Fut>(deadline: tokio::time::Instant, what: &'static str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::NotReady(what));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

async fn run_demo(nodes: usize, threshold: usize, task: Task, timeout: Duration) -> Result<()> {
    let ids: Vec<PeerId> = (0..nodes).map(|i| format!("node-{}", i)).collect();
    let network = MemoryNetwork::new();
    let deadline = tokio::time::Instant::now() + timeout;

    let mut reactors = Vec::with_capacity(nodes);
    let mut stores = Vec::with_capacity(nodes);
    for config in NodeConfig::cluster(&ids, threshold) {
        let (transport, inbox) = network.attach(config.node_id.clone())?;
        let store = MemoryBlockStore::new();
        let reactor = Reactor::spawn(config, Arc::new(transport), Arc::new(store.clone()))?;
        reactor.serve(inbox);
        reactors.push(reactor);
        stores.push(store);
    }
    network.connect_all()?;

    wait_for(deadline, "cluster setup", || {
        let reactors = reactors.clone();
        async move {
            for reactor in &reactors {
                if reactor.status().await.phase != SetupPhase::Ready {
                    return false;
                }
            }
            true
        }
    })
    .await?;
    println!("setup complete on {} nodes", nodes);

    // a block with the target slot filled with placeholder transactions
    let key = reactors[0].chameleon_key().await?;
    let slot_count = usize::try_from(task.tx_index)
        .map_err(|_| Error::Config(format!("negative tx index {}", task.tx_index)))?
        + 1;
    let txs: Vec<String> = (0..slot_count).map(|i| format!("tx{}=original", i)).collect();
    let slots = commit_block(&key, &txs, &mut OsRng);
    for store in &stores {
        store.insert_block(task.block_height, slots.clone())?;
    }

    let before = stores[0].tx_slot(task.block_height, task.tx_index)?;
    reactors[0].submit_redact_task(task.clone()).await?;

    wait_for(deadline, "redaction", || {
        let stores = stores.clone();
        async move {
            stores
                .iter()
                .all(|s| s.rewrites().map(|r| !r.is_empty()).unwrap_or(false))
        }
    })
    .await?;

    let after = stores[0].tx_slot(task.block_height, task.tx_index)?;
    println!("=== Redaction applied ===");
    println!("Slot:    {}/{}", task.block_height, task.tx_index);
    println!("Before:  {}", String::from_utf8_lossy(&before.tx));
    println!("After:   {}", String::from_utf8_lossy(&after.tx));
    println!("Digest:  {}", hex::encode(chameleon::GroupScalar::to_bytes(&after.digest)));
    println!("Same digest: {}", before.digest == after.digest);
    for (id, store) in ids.iter().zip(&stores) {
        println!(
            "  {}: verifies = {}",
            id,
            store.verify_slot(&key, task.block_height, task.tx_index)?
        );
    }
    Ok(())
}
