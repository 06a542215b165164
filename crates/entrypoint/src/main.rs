#[tokio::main]
async fn main() {
    let code = alibi_entrypoint::boot::run().await;
    std::process::exit(code);
}
