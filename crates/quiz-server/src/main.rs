use std::net::SocketAddr;

use quiz_core::Config;
use quiz_server::{router, startup};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    quiz_core::config::load_dotenv();

    let config = Config::from_env();
    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind_host, config.server.bind_port).parse()?;

    let state = startup::build(config).await;
    let app = router::build(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "quiz-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
