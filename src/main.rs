#[tokio::main]
async fn main() {
    if let Err(err) = flowtrack_lib::run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
