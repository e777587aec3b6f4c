use std::env;
use std::process;

use jushin::{ChannelStoreFactory, ServerOptions, SmtpServer};
use log::info;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let addr = if args.len() > 1 {
        args[1].as_str()
    } else {
        "127.0.0.1:2525"
    };

    let hostname = if args.len() > 2 {
        args[2].as_str()
    } else {
        "jushin.local"
    };

    let endpoint = match addr.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("Invalid listen address {addr}: {e}");
            process::exit(1);
        }
    };

    println!("Starting Jushin SMTP server...");
    println!("Address: {addr}");
    println!("Hostname: {hostname}");

    let (store, mut inbox) = ChannelStoreFactory::new();
    let options = ServerOptions::new(hostname)
        .with_endpoint(endpoint)
        .with_message_store(store);
    let server = SmtpServer::new(options);

    tokio::spawn(async move {
        let mut count = 0;
        while let Some(email) = inbox.recv().await {
            count += 1;
            println!(
                "Received email #{} from: {} to: {:?}",
                count,
                email.from.as_deref().unwrap_or("<>"),
                email.to
            );
            if let Some(subject) = email.subject() {
                println!("  Subject: {subject}");
            }
        }
    });

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal.cancel();
        }
    });

    if let Err(e) = server.serve(shutdown).await {
        eprintln!("Failed to start server: {e}");
        process::exit(1);
    }
}
