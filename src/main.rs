use scaleout_bench::{
    bench::{self, Benches},
    config::Config,
    logging, metrics, BenchError, Result,
};
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let run_id = Uuid::new_v4();
    let span = match logging::init_logger(run_id, &config.case, config.log_json) {
        Ok(span) => span,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).instrument(span).await {
        error!(error = %e, class = ?e.class(), "Bench failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        cluster = %config.cluster_name,
        tidb = %config.tidb,
        pd = %config.pd,
        prometheus = %config.prometheus,
        api = %config.api_server,
        scale_num = config.scale_num,
        variance_factor = config.balance.variance_factor,
        "Run in bench mode"
    );

    let mut case = Benches::standard(&config)?.take(&config.case)?;

    tokio::select! {
        result = bench::run_and_collect(case.as_mut()) => result?,
        _ = tokio::signal::ctrl_c() => return Err(BenchError::Cancelled),
    }

    debug!(metrics = %metrics::render(), "Harness metrics");
    info!("Bench finish");
    Ok(())
}
