use clap::Parser;
use tokengate::cli::{
    Args, build_config, handle_create_user, init_logging, load_jwt_secret, open_database,
    validate_ttls,
};
use tokengate::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(lifetimes) = validate_ttls(args.access_ttl_ms, args.refresh_ttl_ms) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(username) = args.create_user.as_deref() {
        handle_create_user(&db, username, &args.roles).await;
    }

    init_cleanup(&db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read local address");
            std::process::exit(1);
        }
    };

    let config = build_config(db, jwt_secret, lifetimes);

    info!(
        address = %local_addr,
        access_ttl_ms = lifetimes.access_ttl_ms,
        refresh_ttl_ms = lifetimes.refresh_ttl_ms,
        "Listening"
    );

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
