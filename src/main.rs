//! # wikicorpus
//!
//! Builds shuffled, sharded training corpora from Wikipedia multistream dumps.
//!
//! ## Getting started
//!
//! ```sh
//! wikicorpus 0.1.0
//! Builds training corpora from Wikipedia dumps.
//!
//! USAGE:
//!     wikicorpus <SUBCOMMAND>
//!
//! SUBCOMMANDS:
//!     download    Download the configured dump
//!     help        Prints this message or the help of the given subcommand(s)
//!     pipeline    Run pipeline
//! ```
//!
//! Set `RUST_LOG=info` to follow progress.
use structopt::StructOpt;

use wikicorpus::cli::{self, Wikicorpus};
use wikicorpus::download::{Directories, DumpLocator};
use wikicorpus::error::Error;
use wikicorpus::pipelines::{CancellationToken, CorpusPipeline, Pipeline};

#[macro_use]
extern crate log;

/// Token set on the first Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current units of work");
            on_signal.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let opt = Wikicorpus::from_args();
    debug!("cli args\n{:#?}", opt);

    match opt {
        Wikicorpus::Download(d) => {
            let config = cli::load_config(d.config.as_ref())?;
            config.validate()?;
            let cancel = cancel_on_ctrl_c();
            let path = tokio::task::spawn_blocking(move || -> Result<_, Error> {
                Directories::from_config(&config).prepare()?;
                DumpLocator::from_config(&config)?
                    .with_cancel(cancel)
                    .locate()
            })
            .await
            .map_err(|e| Error::Custom(format!("download task failed: {e}")))??;
            info!("dump available at {:?}", path);
        }

        Wikicorpus::Pipeline(p) => {
            let mut config = cli::load_config(p.config.as_ref())?;
            p.apply(&mut config);
            config.validate()?;
            debug!("configuration\n{:#?}", config);

            let cancel = cancel_on_ctrl_c();
            let pipeline = CorpusPipeline::new(config, p.dump, cancel);
            let report = tokio::task::spawn_blocking(move || pipeline.run())
                .await
                .map_err(|e| Error::Custom(format!("pipeline task failed: {e}")))??;
            report.log();
        }
    };
    Ok(())
}
