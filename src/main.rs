use distributed_mutex::config::NodeConfig;
use distributed_mutex::membership::types::Address;
use distributed_mutex::mutex::types::random_start_value;
use distributed_mutex::node::service::Node;
use distributed_mutex::rpc::handlers::router;
use distributed_mutex::rpc::http::HttpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --address <ip> [--port <port>] [--join <ip>] [--start [<value>]] [--algorithm tr|ra] [--duration-ms <ms>]",
        program
    );
    eprintln!("Example: {} --address 10.0.0.1", program);
    eprintln!(
        "Example: {} --address 10.0.0.2 --join 10.0.0.1 --start 10 --algorithm ra",
        program
    );
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_default();

    let mut config = NodeConfig::from_env();
    let mut address: Option<Address> = None;
    let mut join_target: Option<Address> = None;
    let mut start_value: Option<i64> = None;
    let mut algorithm = "tr".to_string();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1).filter(|v| !v.starts_with("--"));

        // A bare --start draws the initial value.
        if flag == "--start" {
            start_value = Some(match value {
                Some(raw) => raw.parse()?,
                None => random_start_value(&mut rand::thread_rng()),
            });
            i += if value.is_some() { 2 } else { 1 };
            continue;
        }

        let Some(value) = value else {
            usage(&program);
        };
        match flag {
            "--address" => address = Some(value.parse()?),
            "--port" => config.rpc_port = value.parse()?,
            "--join" => join_target = Some(value.parse()?),
            "--algorithm" => algorithm = value.clone(),
            "--duration-ms" => config.duration = Duration::from_millis(value.parse()?),
            _ => usage(&program),
        }
        i += 2;
    }

    let Some(address) = address else {
        usage(&program);
    };

    tracing::info!("Starting node {} on port {}", address, config.rpc_port);

    let transport = Arc::new(HttpTransport::new(&config));
    let node = Node::new(address, transport, config.clone());

    let app = router(node.clone());
    let bind_addr = SocketAddr::new(address.0.into(), config.rpc_port);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("RPC server listening on {}", bind_addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("RPC server stopped: {}", e);
        }
    });

    if let Some(target) = join_target {
        if let Err(e) = node.join(target).await {
            tracing::error!("Join failed: {}", e);
        }
    }

    if let Some(value) = start_value {
        if let Err(e) = node.start_calculation(value, &algorithm).await {
            tracing::error!("Could not start calculation: {}", e);
        }
    }

    let reporter_node = node.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let status = reporter_node.status().await;
            tracing::info!(
                "Node {}: {} members, {} value={} running={}",
                status.address,
                status.members.len(),
                status.algorithm,
                status.current_value,
                status.running
            );
            for member in status.members {
                tracing::info!("  - {}", member);
            }
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    reporter.abort();
    if let Some(value) = node.shutdown().await {
        tracing::info!("Last calculation result: {}", value);
    }
    server.abort();

    Ok(())
}
