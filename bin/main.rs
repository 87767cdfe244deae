use tracing::info;
use tracing_subscriber;

use clap::{values_t, App, Arg};

use spv_net::server::{node, Settings};
use spv_net::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = App::new("spv-net")
        .version("0.1")
        .author("zero.fx labs ltd.")
        .about("Runs the peer table of an SPV node")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listener-ip")
                .short("a")
                .long("listener-ip")
                .value_name("LISTENER_IP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bootstrap-ip")
                .short("b")
                .long("bootstrap-ip")
                .value_name("BOOTSTRAP_IP")
                .multiple(true),
        )
        .arg(
            Arg::with_name("network")
                .short("n")
                .long("network")
                .value_name("NETWORK")
                .takes_value(true),
        )
        .get_matches();

    let mut settings = Settings::load(matches.value_of("config"))?;
    if let Some(listener_ip) = matches.value_of("listener-ip") {
        settings.listener_ip = Some(listener_ip.to_owned());
    }
    if matches.is_present("bootstrap-ip") {
        settings.bootstrap_peers =
            values_t!(matches.values_of("bootstrap-ip"), String).unwrap_or_else(|e| e.exit());
    }
    if let Some(network) = matches.value_of("network") {
        settings.network = Some(network.to_owned());
    }
    let config = settings.peer_table_config()?;

    let sys = actix::System::new();
    sys.block_on(async move {
        let table = match node::run(config) {
            Ok(table) => table,
            Err(err) => {
                tracing::error!("cannot start: {}", err);
                actix::System::current().stop();
                return;
            }
        };

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt()).unwrap();
            let mut sigterm = signal(SignalKind::terminate()).unwrap();

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await.unwrap();
            "Ctrl+C"
        };
        info!(target: "spv-net", "Got {}, stopping...", sig);

        node::stop(&table);
        actix::System::current().stop();
    });
    sys.run()?;

    Ok(())
}
