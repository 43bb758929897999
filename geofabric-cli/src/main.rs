//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    env_logger::init();

    if let Err(err) = geofabric_cli::run() {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
