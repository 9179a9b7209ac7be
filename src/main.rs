/// Entry point of the containerd check.
///
/// # Examples
///
/// ```bash
/// CONTAINERD_CHECK_CONFIG=/etc/containerd-check.yaml RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    containerd_check::run().await
}
