use clap::Parser;
use ravel::cli::Args;
use ravel::config;
use ravel::server::Server;

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let settings = match config::preset(args.settings) {
        Some(s) => s,
        None => {
            tracing::error!(key = args.settings, "no such settings preset");
            std::process::exit(1);
        }
    };

    let server = match Server::new(settings, args.strategy, args.port) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to build server from settings");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.serve() {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
