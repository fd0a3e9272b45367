use actix_web::{middleware, web, App, HttpServer};
use collegeform::db::Store;
use collegeform::routes::{self, TokenTtl};
use collegeform::{seed, unlock};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt)]
struct Args {
    #[structopt(short, long, env = "BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,
    /// URL for PostgreSQL database. Without it every API call answers 503.
    #[structopt(short, long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Lifetime of issued bearer tokens
    #[structopt(long, env = "TOKEN_TTL_HOURS", default_value = "24")]
    token_ttl_hours: i64,
    /// Seconds between server-side auto-unlock sweeps
    #[structopt(long, env = "SWEEP_INTERVAL", default_value = "60")]
    sweep_interval: u64,
    /// Don't insert demo users and questions on startup
    #[structopt(long)]
    no_seed: bool,
}

#[actix_rt::main]
async fn main() -> Result<(), exitfailure::ExitFailure> {
    let _ = dotenv::dotenv();
    env_logger::init();
    let args = Args::from_args();

    let store = match &args.database_url {
        Some(url) => Store::connect(url),
        None => {
            warn!("DATABASE_URL not set, the API will answer 503 until it is configured");
            Store::unconfigured()
        }
    };

    if store.is_configured() {
        if !args.no_seed {
            match store.run(|conn| seed::seed(conn)).await {
                Ok(report) => info!(
                    "Seed complete: {} users, {} questions created",
                    report.users_created, report.questions_created
                ),
                Err(e) => error!("Error initializing database: {}", e),
            }
        }
        let every = Duration::from_secs(args.sweep_interval.max(1));
        actix_rt::spawn(unlock::run_sweeper(store.clone(), every));
    }

    let ttl = TokenTtl(chrono::Duration::hours(args.token_ttl_hours));
    info!("Listening on {}", args.bind);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(ttl))
            .configure(routes::config)
            .wrap(routes::cors())
            .wrap(middleware::Logger::default())
    })
    .bind(&args.bind)?
    .run()
    .await?;
    Ok(())
}
