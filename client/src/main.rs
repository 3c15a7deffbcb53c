use clap::Parser;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use paxoskv::command::Command;
use paxoskv::rpc_client::RpcClient;
use paxoskv::KvError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host running the replicas
    host: String,

    /// Port of the first replica
    port: u16,

    /// Service name the replicas were started with
    service_name: String,

    /// Number of replicas listening from `port` upwards
    #[arg(short, long, default_value = "5")]
    nodes: u16,

    /// Per request timeout in ms
    #[arg(short, long, default_value = "5000")]
    timeout: u64,
}

/// What the user sees for one command.
struct Outcome {
    success: bool,
    text: String,
}

impl Outcome {
    fn ok(text: String) -> Self {
        Outcome {
            success: true,
            text,
        }
    }

    fn failed(text: String) -> Self {
        Outcome {
            success: false,
            text,
        }
    }
}

/// Every command goes to a randomly chosen replica.
fn connect(args: &Args) -> Result<RpcClient, KvError> {
    let offset = rand::thread_rng().gen_range(0..args.nodes.max(1));
    let addr = format!("{}:{}", args.host, args.port.saturating_add(offset));
    log::info!("using replica at {}", addr);
    RpcClient::new(&addr, &args.service_name, Duration::from_millis(args.timeout))
}

async fn execute(command: &Command, client: &RpcClient) -> Result<Outcome, KvError> {
    let outcome = match command {
        Command::Put { key, value } => {
            let reply = client.put(key, value).await?;
            if reply.success {
                Outcome::ok(format!("Key:{} added with the Value:{}", key, value))
            } else {
                Outcome::failed(reply.message)
            }
        }
        Command::Get { key } => {
            if !client.contains_key(key).await? {
                return Ok(Outcome::failed("Key not found in key store".to_string()));
            }
            match client.get(key).await? {
                Some(value) => Outcome::ok(format!(
                    "Value returned for the given Key is : {}",
                    value
                )),
                None => Outcome::failed(format!("No entry exist for the key - {}", key)),
            }
        }
        Command::Delete { key } => {
            let reply = client.delete(key).await?;
            if reply.success {
                Outcome::ok(format!("Value deleted for Key:{}", key))
            } else {
                Outcome::failed(reply.message)
            }
        }
        Command::Shutdown => Outcome::ok("shutting down".to_string()),
    };
    Ok(outcome)
}

async fn handle_line(line: &str, args: &Args) {
    log::info!("Received operation - {}", line);
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            log::error!("Operation failed: {}", e);
            return;
        }
    };
    let result = match connect(args) {
        Ok(client) => execute(&command, &client).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) if outcome.success => {
            log::info!("Response from server - {}", outcome.text)
        }
        Ok(outcome) => log::error!("Operation failed: {}", outcome.text),
        Err(e) => log::error!("Request failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .unwrap_or_default();
    let args = Args::parse();

    // pre-populate, then read some of it back and remove it
    for i in 0..10 {
        handle_line(&format!("PUT key{} value{}", i, i), &args).await;
    }
    for i in 0..5 {
        handle_line(&format!("GET key{}", i), &args).await;
    }
    for i in 0..5 {
        handle_line(&format!("DELETE key{}", i), &args).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("Enter operation: PUT <key> <value> or GET <key> or DELETE <key> or SHUTDOWN:");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if matches!(line.parse::<Command>(), Ok(Command::Shutdown)) {
            break;
        }
        handle_line(&line, &args).await;
    }
    Ok(())
}
