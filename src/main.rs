#[tokio::main]
async fn main() {
    let code = lanerouter::app::startup::startup().await;
    std::process::exit(code);
}
