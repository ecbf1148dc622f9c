use rmsms::{app, logging, storage, utils};

fn main() {
    logging::init();
    let Some(path) = storage::default_config_path() else {
        log::error!("Unable to detect the user's config directory, aborting.");
        std::process::exit(1);
    };
    utils::RUNTIME.block_on(app::run(path));
}
