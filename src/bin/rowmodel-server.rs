/// Row model server
///
/// Serves a dataset to a grid client using the server-side row model
/// protocol. Usage: `rowmodel-server [config.toml]`; the config path may also
/// come from `ROWMODEL_CONFIG`.

use actix_web::web;
use rowmodel::config::{Config, CONFIG_ENV};
use rowmodel::server::{run_server, AppState};
use rowmodel::Session;
use std::path::PathBuf;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            log::error!("cannot load configuration: {}", err);
            std::process::exit(2);
        }
    };

    let mut session = Session::new(config.session.clone());
    if let Some(path) = &config.server.data_path {
        if let Err(err) = session.load_path(path) {
            log::error!("cannot load {}: {}", path.display(), err);
            std::process::exit(1);
        }
    }

    let state = web::Data::new(AppState::new(session));
    run_server(state, &config.server.host, config.server.port).await
}
