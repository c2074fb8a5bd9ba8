#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("webhook=info,k_kafka=info,k_store=info").init();

    webhook::run_server().await
}
