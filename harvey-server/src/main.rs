//! CLI launcher for the Harvey Agent Core chat facade, in the style of
//! `brain`'s `main.rs`: a thin wrapper that prints any failure and
//! exits with the process code a startup failure is assigned.

#[tokio::main]
async fn main() {
    if let Err(err) = harvey_server::serve().await {
        eprintln!("harvey-server error: {err}");
        std::process::exit(err.exit_code());
    }
}
