use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use receipt_amount::application::orchestrator::ReceiptProcessor;
use receipt_amount::config::{ProcessingArgs, StorageArgs};
use receipt_amount::domain::client::ClientId;
use receipt_amount::domain::ports::{
    ClientStore, ClientStoreRef, ReceiptStoreRef, TransactionStore, TransactionStoreRef,
};
use receipt_amount::infrastructure::filesystem::ImageStore;
use receipt_amount::infrastructure::in_memory::{
    InMemoryClientStore, InMemoryReceiptStore, InMemoryTransactionStore,
};
use receipt_amount::infrastructure::subprocess::SubprocessEngine;
use receipt_amount::interfaces::request::{ErrorResponse, ProcessRequest};
use receipt_amount::telemetry;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the amount from a receipt request read as JSON
    Process {
        /// Request file; `-` or nothing reads stdin
        request: Option<PathBuf>,

        #[command(flatten)]
        processing: ProcessingArgs,
    },
    /// Register a client credential
    RegisterClient {
        client: String,
        /// Initial credits; omitted leaves the client without a balance
        #[arg(long)]
        credits: Option<u64>,
    },
    /// Add credits to a client
    GrantCredits { client: String, credits: u64 },
    /// Print a client's credit balance
    Balance { client: String },
    /// Print a client's transaction records, one JSON object per line
    History { client: String },
}

struct Stores {
    clients: ClientStoreRef,
    receipts: ReceiptStoreRef,
    transactions: TransactionStoreRef,
}

fn open_stores(storage: &StorageArgs) -> Result<Stores> {
    if let Some(db_path) = &storage.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = receipt_amount::infrastructure::rocksdb::RocksDBStore::open(db_path)
                .into_diagnostic()?;
            return Ok(Stores {
                clients: Arc::new(store.clone()),
                receipts: Arc::new(store.clone()),
                transactions: Arc::new(store),
            });
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        warn!(
            db_path = %db_path.display(),
            "persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
        );
    }

    Ok(Stores {
        clients: Arc::new(InMemoryClientStore::new()),
        receipts: Arc::new(InMemoryReceiptStore::new()),
        transactions: Arc::new(InMemoryTransactionStore::new()),
    })
}

fn read_request(source: Option<PathBuf>) -> Result<ProcessRequest> {
    let reader: Box<dyn Read> = match source {
        Some(path) if path.as_os_str() != "-" => {
            Box::new(BufReader::new(File::open(path).into_diagnostic()?))
        }
        _ => Box::new(io::stdin().lock()),
    };
    serde_json::from_reader(reader).into_diagnostic()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let stores = open_stores(&cli.storage)?;

    match cli.command {
        Command::Process {
            request,
            processing,
        } => {
            let request = read_request(request)?;
            let engine = SubprocessEngine::new(processing.recognition(), stores.receipts.clone());
            let processor = ReceiptProcessor::new(
                stores.clients,
                stores.receipts,
                stores.transactions,
                ImageStore::new(processing.upload_dir),
                Arc::new(engine),
            );

            match processor.process(request).await {
                Ok(done) => print_json(&done)?,
                Err(e) => {
                    print_json(&ErrorResponse::from(&e))?;
                    return Err(miette!("{}", e.client_message()));
                }
            }
        }
        Command::RegisterClient { client, credits } => {
            let client = ClientId::parse(&client).into_diagnostic()?;
            stores.clients.register(&client).await.into_diagnostic()?;
            if let Some(credits) = credits {
                let balance = stores
                    .clients
                    .grant_credits(&client, credits)
                    .await
                    .into_diagnostic()?;
                print_json(&balance)?;
            }
        }
        Command::GrantCredits { client, credits } => {
            let client = ClientId::parse(&client).into_diagnostic()?;
            let balance = stores
                .clients
                .grant_credits(&client, credits)
                .await
                .into_diagnostic()?;
            print_json(&balance)?;
        }
        Command::Balance { client } => {
            let client = ClientId::parse(&client).into_diagnostic()?;
            match stores.clients.balance(&client).await.into_diagnostic()? {
                Some(balance) => print_json(&balance)?,
                None => return Err(miette!("client {client} has no credit balance")),
            }
        }
        Command::History { client } => {
            let client = ClientId::parse(&client).into_diagnostic()?;
            for record in stores
                .transactions
                .for_client(&client)
                .await
                .into_diagnostic()?
            {
                print_json(&record)?;
            }
        }
    }

    Ok(())
}
