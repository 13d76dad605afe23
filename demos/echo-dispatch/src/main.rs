mod backend;

use std::io::Write;
use std::path::PathBuf;
use clap::Parser;
use futures::StreamExt;
use futures::future::join_all;
use stoker::backend::{BackendKind, HostProbe};
use stoker::{Dispatcher, DispatcherConfig, Error, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;
use crate::backend::EchoBackend;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file, `STOKER_*` environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model file, used when no configuration file is given
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Stream tokens instead of returning whole results
    #[arg(long)]
    stream: bool,

    /// Upper bound on streamed tokens
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Send all prompts through one explicit batch call, chunked to this size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Prompts to run
    #[arg(required = true)]
    prompts: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!(error = %err, "echo-dispatch failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match (&args.config, &args.model) {
        (Some(path), _) => DispatcherConfig::from_path(path)?,
        (None, Some(model)) => DispatcherConfig::new(model),
        (None, None) => return Err(Error::Config("either --config or --model is required".into())),
    };

    let probe = HostProbe::new();
    let dispatcher = Dispatcher::new(
        move |kind: BackendKind| EchoBackend::new(kind, probe.clone()),
        config,
    )
    .await?;

    println!("{}", to_json(&dispatcher.info()));

    if args.stream {
        for prompt in args.prompts {
            let mut tokens = dispatcher.stream_infer(prompt, args.max_tokens).await?;
            while let Some(token) = tokens.next().await {
                print!("{} ", token?);
                let _ = std::io::stdout().flush();
            }
            println!();
        }
    } else if let Some(batch_size) = args.batch_size {
        let results = dispatcher.batch_infer(args.prompts, Some(batch_size)).await?;
        for result in results {
            print_result(result);
        }
    } else {
        let calls = args.prompts.into_iter().map(|prompt| dispatcher.infer(prompt));
        for result in join_all(calls).await {
            print_result(result);
        }
    }

    println!("{}", to_json(&dispatcher.memory_snapshot()));
    dispatcher.shutdown().await;
    Ok(())
}

fn print_result(result: Result<String>) {
    match result {
        Ok(output) => println!("{output}"),
        Err(err) => println!("error: {err}"),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}
