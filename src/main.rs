use anyhow::Result;
use clap::Parser;

mod cli;
mod codec;
mod port;
mod rx;
mod tx;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match args.cmd {
        cli::Cmd::Peripheral(opts) => rx::run(opts),
        cli::Cmd::Send(opts) => tx::run(opts),
        cli::Cmd::Encode(opts) => codec::encode(opts),
        cli::Cmd::Decode(opts) => codec::decode(opts),
    }
}
