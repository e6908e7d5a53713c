use httpeek::configuration::config::Config;
use httpeek::controller::controller_handler::Controller;
use httpeek::controller::shutdown::shutdown_channel;
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    // stdout carries the records, keep the banner out of it
    eprintln!(
        "
==============================================================
  httpeek v{} - passive HTTP stream inspector
==============================================================
",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_args();

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Invalid configuration: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                trigger.cancel();
            }
            Err(e) => error!("Unable to listen for interrupts: {}", e),
        }
    });

    match controller.run(shutdown).await {
        Ok(summary) => info!(
            "Done ({:?}): {} packets, {} segments",
            summary.reason, summary.packets_received, summary.segments_assembled
        ),
        Err(e) => {
            error!("Capture failed: {}, exiting...", e);
            std::process::exit(1);
        }
    }
}
